//! One news-summarizer run: fetch every source, summarize what is new,
//! persist it locally and to the articles table.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info, warn};

use crate::feeds::{FeedIngestor, DEFAULT_MAX_ENTRIES};
use crate::fingerprint::FingerprintStore;
use crate::io::append_json_list;
use crate::models::{FeedSource, ProcessedRecord, RawItem};
use crate::sheets::TabularStore;
use crate::summarizer::{Summarizer, DEFAULT_MAX_WORDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FetchingFeeds,
    Summarizing,
    Persisting,
    /// A source or summary degraded. Always rejoins `Persisting`.
    PartialFailure,
    Done,
}

impl RunPhase {
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, FetchingFeeds | Done)
                | (FetchingFeeds, Summarizing | PartialFailure | Persisting | Done)
                | (Summarizing, PartialFailure | Persisting)
                | (PartialFailure, Persisting)
                | (Persisting, FetchingFeeds | Done)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::FetchingFeeds => "fetching-feeds",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Persisting => "persisting",
            RunPhase::PartialFailure => "partial-failure",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub sources: usize,
    pub sources_failed: usize,
    pub new_records: usize,
    pub summary_fallbacks: usize,
    pub local_write_failures: usize,
    pub remote_write_failures: usize,
    /// Every phase the run passed through, starting at `Idle`.
    pub phases: Vec<RunPhase>,
}

impl IngestReport {
    fn new() -> Self {
        Self {
            sources: 0,
            sources_failed: 0,
            new_records: 0,
            summary_fallbacks: 0,
            local_write_failures: 0,
            remote_write_failures: 0,
            phases: vec![RunPhase::Idle],
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Idle)
    }

    pub fn is_degraded(&self) -> bool {
        self.phases.contains(&RunPhase::PartialFailure)
            || self.local_write_failures > 0
            || self.remote_write_failures > 0
    }

    fn advance(&mut self, next: RunPhase) {
        let current = self.phase();
        debug_assert!(current.can_advance_to(next), "{current} -> {next}");
        debug!(from = %current, to = %next, "ingest: phase");
        self.phases.push(next);
    }
}

pub struct IngestionPipeline {
    ingestor: FeedIngestor,
    summarizer: Summarizer,
    articles: Option<Arc<dyn TabularStore>>,
    summaries_path: PathBuf,
    sources: Vec<FeedSource>,
    max_entries: usize,
    max_words: usize,
}

impl IngestionPipeline {
    pub fn new(
        ingestor: FeedIngestor,
        summarizer: Summarizer,
        sources: Vec<FeedSource>,
        summaries_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ingestor,
            summarizer,
            articles: None,
            summaries_path: summaries_path.into(),
            sources,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_words: DEFAULT_MAX_WORDS,
        }
    }

    /// Also append new records to the remote articles table.
    pub fn with_articles_table(mut self, table: Arc<dyn TabularStore>) -> Self {
        self.articles = Some(table);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }

    /// Run every source once. Source, service and per-batch write failures
    /// degrade the run; only a fingerprint cache that cannot be saved is
    /// returned as an error.
    pub async fn run(&self, store: &mut FingerprintStore) -> Result<IngestReport> {
        let mut report = IngestReport::new();

        for source in &self.sources {
            report.advance(RunPhase::FetchingFeeds);
            report.sources += 1;

            let items = match self.ingestor.try_fetch(source, self.max_entries, store).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(source = %source.name, error = %e, "ingest: source skipped");
                    report.sources_failed += 1;
                    report.advance(RunPhase::PartialFailure);
                    report.advance(RunPhase::Persisting);
                    continue;
                }
            };

            if items.is_empty() {
                debug!(source = %source.name, "ingest: nothing new");
                report.advance(RunPhase::Persisting);
                continue;
            }

            report.advance(RunPhase::Summarizing);
            let mut batch = Vec::with_capacity(items.len());
            let mut fallbacks = 0;
            for item in items {
                let (record, fallback) = self.process_item(source, &item).await;
                // Registered before the record is written anywhere.
                store.add(item.fingerprint);
                if fallback {
                    fallbacks += 1;
                }
                batch.push(record);
            }
            report.summary_fallbacks += fallbacks;
            if fallbacks > 0 {
                report.advance(RunPhase::PartialFailure);
            }

            report.advance(RunPhase::Persisting);
            // Fingerprints reach disk before the records they cover.
            save_fingerprints(store)?;
            self.persist(&batch, &mut report).await;
        }

        save_fingerprints(store)?;

        report.advance(RunPhase::Done);
        info!(
            sources = report.sources,
            failed = report.sources_failed,
            new = report.new_records,
            fallbacks = report.summary_fallbacks,
            "ingest: run finished"
        );
        Ok(report)
    }

    async fn process_item(&self, source: &FeedSource, item: &RawItem) -> (ProcessedRecord, bool) {
        let content = if item.excerpt.is_empty() {
            item.title.as_str()
        } else {
            item.excerpt.as_str()
        };
        let summary = self
            .summarizer
            .summarize(&item.title, content, self.max_words)
            .await;

        let fallback = summary.is_fallback();
        let record = ProcessedRecord {
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            title: item.title.clone(),
            url: item.url.clone(),
            summary: summary.into_text(),
            source: source.name.clone(),
            source_url: source.homepage.clone(),
            category: source.category.clone(),
        };
        (record, fallback)
    }

    /// Local file first, then one remote append. Neither failure undoes
    /// the other write or the fingerprints.
    async fn persist(&self, batch: &[ProcessedRecord], report: &mut IngestReport) {
        let mut stored = match append_json_list(batch, &self.summaries_path) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    path = %self.summaries_path.display(),
                    count = batch.len(),
                    error = %format!("{e:#}"),
                    "ingest: local append failed"
                );
                report.local_write_failures += 1;
                false
            }
        };

        if let Some(table) = &self.articles {
            let rows: Vec<Vec<String>> = batch.iter().map(ProcessedRecord::to_row).collect();
            match table.append_rows(&rows).await {
                Ok(()) => stored = true,
                Err(e) => {
                    warn!(count = rows.len(), error = %e, "ingest: remote append failed");
                    report.remote_write_failures += 1;
                }
            }
        }

        if stored {
            report.new_records += batch.len();
            info!(count = batch.len(), "ingest: stored new articles");
        }
    }
}

fn save_fingerprints(store: &FingerprintStore) -> Result<()> {
    store
        .save()
        .with_context(|| format!("Failed to save {}", store.cache_path().display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_may_finish_directly() {
        assert!(RunPhase::Idle.can_advance_to(RunPhase::Done));
        assert!(!RunPhase::Idle.can_advance_to(RunPhase::Persisting));
    }

    #[test]
    fn partial_failure_only_rejoins_persisting() {
        assert!(RunPhase::PartialFailure.can_advance_to(RunPhase::Persisting));
        assert!(!RunPhase::PartialFailure.can_advance_to(RunPhase::Done));
        assert!(!RunPhase::Summarizing.can_advance_to(RunPhase::Done));
        assert!(!RunPhase::Done.can_advance_to(RunPhase::FetchingFeeds));
    }

    #[test]
    fn report_tracks_current_phase() {
        let mut report = IngestReport::new();
        assert_eq!(report.phase(), RunPhase::Idle);
        report.advance(RunPhase::FetchingFeeds);
        report.advance(RunPhase::PartialFailure);
        report.advance(RunPhase::Persisting);
        report.advance(RunPhase::Done);
        assert_eq!(report.phase(), RunPhase::Done);
        assert!(report.is_degraded());
    }
}
