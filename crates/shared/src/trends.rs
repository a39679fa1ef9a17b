//! Keyword trend scoring over the most recent stored articles.
//!
//! A record's score is the highest window-wide count among the keywords it
//! matches. Selection only uses matching as a gate and keeps recency order;
//! the score travels along for logging.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::io::load_json_list;
use crate::models::ProcessedRecord;
use crate::sheets::TabularStore;

pub const DEFAULT_SCAN_DEPTH: usize = 30;

/// Built-in interest keywords (lowercase substrings).
pub fn default_interest_keywords() -> Vec<String> {
    [
        "ransomware",
        "phishing",
        "vpn",
        "password",
        "zero-day",
        "vulnerability",
        "breach",
        "malware",
        "ai",
        "automation",
        "cloud",
        "microsoft 365",
        "privacy",
        "encryption",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Lowercase, trim, drop blanks and duplicates; keeps first-seen order.
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for keyword in keywords {
        let keyword = keyword.as_ref().trim().to_lowercase();
        if !keyword.is_empty() && !out.contains(&keyword) {
            out.push(keyword);
        }
    }
    out
}

/// Keyword → number of records in the window containing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordIndex(BTreeMap<String, usize>);

impl KeywordIndex {
    pub fn build(window: &[ProcessedRecord], keywords: &[String]) -> Self {
        let haystacks: Vec<String> = window.iter().map(ProcessedRecord::haystack).collect();
        let counts = keywords
            .iter()
            .map(|keyword| {
                let count = haystacks.iter().filter(|h| h.contains(keyword.as_str())).count();
                (keyword.clone(), count)
            })
            .collect();
        Self(counts)
    }

    pub fn count(&self, keyword: &str) -> usize {
        self.0.get(keyword).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Highest count among the keywords `record` contains, `None` if it
    /// contains none of them.
    pub fn score_record(&self, record: &ProcessedRecord) -> Option<usize> {
        let haystack = record.haystack();
        self.0
            .iter()
            .filter(|(keyword, _)| haystack.contains(keyword.as_str()))
            .map(|(_, count)| *count)
            .max()
    }
}

/// Score every item against an index built from the same items. Only
/// items matching at least one keyword appear in the result.
pub fn score(items: &[ProcessedRecord], keywords: &[String]) -> BTreeMap<usize, usize> {
    let keywords = normalize_keywords(keywords);
    let index = KeywordIndex::build(items, &keywords);
    items
        .iter()
        .enumerate()
        .filter_map(|(i, record)| index.score_record(record).map(|s| (i, s)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredRecord {
    /// Position within the scanned window (0 = newest).
    pub index: usize,
    pub score: usize,
    pub record: ProcessedRecord,
}

#[derive(Debug, Clone)]
pub struct TrendScorer {
    keywords: Vec<String>,
    scan_depth: usize,
}

impl TrendScorer {
    pub fn new<I, S>(keywords: I, scan_depth: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: normalize_keywords(keywords),
            scan_depth,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// The newest `scan_depth` records. `records` must be newest-first.
    pub fn window<'a>(&self, records: &'a [ProcessedRecord]) -> &'a [ProcessedRecord] {
        &records[..records.len().min(self.scan_depth)]
    }

    pub fn index(&self, records: &[ProcessedRecord]) -> KeywordIndex {
        KeywordIndex::build(self.window(records), &self.keywords)
    }

    /// Up to `max_rows` keyword-matching records from the window, in
    /// window order.
    pub fn select(&self, records: &[ProcessedRecord], max_rows: usize) -> Vec<ScoredRecord> {
        let window = self.window(records);
        score(window, &self.keywords)
            .into_iter()
            .take(max_rows)
            .map(|(index, score)| ScoredRecord {
                index,
                score,
                record: window[index].clone(),
            })
            .collect()
    }
}

/// Stored articles, newest first.
///
/// The articles table is kept newest-at-top, so its order is used as is.
/// When it cannot be read the local summaries file (oldest first) is
/// reversed instead.
pub async fn load_recent_records(
    articles: Option<&dyn TabularStore>,
    summaries_path: &Path,
) -> Result<Vec<ProcessedRecord>> {
    if let Some(table) = articles {
        match table.read_records().await {
            Ok(rows) => {
                let records: Vec<ProcessedRecord> =
                    rows.iter().filter_map(ProcessedRecord::from_row).collect();
                info!(count = records.len(), "trends: loaded articles from remote table");
                return Ok(records);
            }
            Err(e) => warn!(error = %e, "trends: articles table unreadable, using local summaries"),
        }
    }

    let mut records: Vec<ProcessedRecord> = load_json_list(summaries_path)?;
    records.reverse();
    info!(count = records.len(), "trends: loaded articles from local summaries");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, summary: &str) -> ProcessedRecord {
        ProcessedRecord {
            date: "2026-01-01 07:00:00".into(),
            title: title.into(),
            url: format!("https://news.example/{}", title.replace(' ', "-")),
            summary: summary.into(),
            source: "Example".into(),
            source_url: "https://news.example".into(),
            category: "cybersecurity".into(),
        }
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn score_is_max_not_sum() {
        let items = vec![
            record("Ransomware hits hospital", "A ransomware gang"),
            record("Ransomware returns", "More extortion"),
            record("New VPN flaw", "ransomware operators use it"),
            record("Phishing kit", "credential theft"),
        ];
        let scores = score(&items, &kw(&["ransomware", "vpn", "phishing"]));

        assert_eq!(scores.get(&0), Some(&3));
        // matches ransomware (3) and vpn (1): max wins
        assert_eq!(scores.get(&2), Some(&3));
        assert_eq!(scores.get(&3), Some(&1));
    }

    #[test]
    fn matching_is_case_insensitive_across_fields() {
        let mut r = record("Quarterly roundup", "nothing here");
        r.category = "AI".into();
        let scores = score(&[r], &kw(&["  AI "]));
        assert_eq!(scores.get(&0), Some(&1));
    }

    #[test]
    fn non_matching_records_are_not_scored() {
        let items = vec![record("Gardening tips", "tomatoes"), record("VPN deals", "cheap")];
        let scores = score(&items, &kw(&["vpn"]));
        assert_eq!(scores.len(), 1);
        assert!(!scores.contains_key(&0));
    }

    #[test]
    fn raising_a_keyword_count_never_lowers_a_single_match_score() {
        let target = record("Phishing wave", "inbox attacks");
        let base = vec![
            target.clone(),
            record("Phishing again", "more"),
            record("Malware drop", "loader"),
        ];
        let keywords = kw(&["phishing", "malware"]);
        let before = score(&base, &keywords)[&0];

        let mut grown = base.clone();
        grown.push(record("Phishing third", "yet more"));
        let after = score(&grown, &keywords)[&0];

        assert!(after >= before);
        assert_eq!((before, after), (2, 3));
    }

    #[test]
    fn selection_respects_window_order_and_limits() {
        let records = vec![
            record("Cloud outage", "a"),
            record("Cooking", "b"),
            record("VPN vuln", "c"),
            record("VPN again", "d"),
            record("Cloud again", "e"),
        ];
        let scorer = TrendScorer::new(["vpn", "cloud"], 4);

        let selected = scorer.select(&records, 2);
        let indexes: Vec<_> = selected.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert_eq!(selected[1].score, 2);

        // the fifth record sits outside the scan window
        let all = scorer.select(&records, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(scorer.index(&records).count("cloud"), 1);
    }

    #[test]
    fn keywords_are_normalized_once() {
        assert_eq!(
            normalize_keywords(["VPN", " vpn", "", "Cloud "]),
            vec!["vpn".to_string(), "cloud".to_string()]
        );
    }

    struct DownTable;

    #[async_trait::async_trait]
    impl TabularStore for DownTable {
        async fn read_records(&self) -> crate::error::PipelineResult<Vec<crate::sheets::SheetRow>> {
            Err(crate::error::PipelineError::remote("503"))
        }

        async fn append_rows(&self, _rows: &[Vec<String>]) -> crate::error::PipelineResult<()> {
            Err(crate::error::PipelineError::remote("503"))
        }
    }

    #[tokio::test]
    async fn unreadable_table_falls_back_to_local_summaries_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("news_summaries.json");
        crate::io::save_json(&[record("Older", "x"), record("Newer", "y")], &path).expect("seed");

        let records = load_recent_records(Some(&DownTable), &path).await.expect("load");
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer", "Older"]);
    }
}
