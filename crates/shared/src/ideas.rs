//! Content ideas derived from trending articles.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::{append_json_list, load_json_list};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::models::{title_key, Difficulty, IdeaCandidate, IdeaRecord, IdeaType, ProcessedRecord};
use crate::sheets::TabularStore;
use crate::util::{strip_code_fences, truncate_chars};

const SYSTEM_PROMPT: &str =
    "You are an expert cybersecurity content strategist who outputs valid JSON only.";
const MAX_RESPONSE_TOKENS: u32 = 800;
const TEMPERATURE: f32 = 0.7;
pub const IDEAS_PER_RECORD: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdeaParseError {
    #[error("response was empty")]
    Empty,
    #[error("response contains no JSON array or object")]
    NoStructuredData,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("expected a JSON array of ideas, got {0}")]
    NotASequence(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIdeas {
    pub ideas: Vec<IdeaCandidate>,
    /// Array entries dropped for a missing title or an unknown label.
    pub rejected: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIdea {
    #[serde(deserialize_with = "lenient_string")]
    idea_title: String,
    #[serde(deserialize_with = "lenient_string")]
    idea_type: String,
    #[serde(deserialize_with = "lenient_string")]
    angle: String,
    #[serde(deserialize_with = "lenient_string")]
    target_audience: String,
    #[serde(deserialize_with = "lenient_string")]
    difficulty: String,
    #[serde(deserialize_with = "lenient_string")]
    affiliate_potential: String,
    #[serde(deserialize_with = "lenient_string")]
    notes: String,
}

/// Any JSON scalar as text; `null` and nested values read as empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => String::new(),
    })
}

impl RawIdea {
    fn validate(self) -> Option<IdeaCandidate> {
        let idea_title = self.idea_title.trim().to_string();
        if idea_title.is_empty() {
            return None;
        }
        Some(IdeaCandidate {
            idea_title,
            idea_type: IdeaType::parse(&self.idea_type)?,
            angle: self.angle.trim().to_string(),
            target_audience: self.target_audience.trim().to_string(),
            difficulty: Difficulty::parse(&self.difficulty)?,
            affiliate_potential: self.affiliate_potential.trim().to_string(),
            notes: self.notes.trim().to_string(),
        })
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Turn a model response into validated ideas.
///
/// Accepts a bare array, a fenced block, or an array preceded by prose.
/// Anything after the first complete JSON value is ignored.
pub fn parse_idea_response(raw: &str) -> Result<ParsedIdeas, IdeaParseError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(IdeaParseError::Empty);
    }

    let start = body
        .find(|c: char| c == '[' || c == '{')
        .ok_or(IdeaParseError::NoStructuredData)?;

    let value = serde_json::Deserializer::from_str(&body[start..])
        .into_iter::<JsonValue>()
        .next()
        .ok_or(IdeaParseError::NoStructuredData)?
        .map_err(|e| IdeaParseError::InvalidJson(e.to_string()))?;

    let entries = match value {
        JsonValue::Array(entries) => entries,
        other => return Err(IdeaParseError::NotASequence(json_kind(&other))),
    };

    let mut parsed = ParsedIdeas::default();
    for entry in entries {
        match serde_json::from_value::<RawIdea>(entry).ok().and_then(RawIdea::validate) {
            Some(idea) => parsed.ideas.push(idea),
            None => parsed.rejected += 1,
        }
    }
    Ok(parsed)
}

pub fn build_idea_prompt(record: &ProcessedRecord) -> String {
    format!(
        r#"You are a senior content strategist and cybersecurity educator helping a solo creator plan monetizable content.

You are given a single news article with this context:

- Title: {title}
- URL: {url}
- Source: {source}
- Topical category: {category}
- Summary: {summary}

Based on this, generate {count} high-quality content ideas that:
- Fit a cybersecurity / AI tools / automation brand
- Are realistic for a solo creator with a full-time job
- Have clear potential for affiliate angles (e.g. VPN, password managers, cloud security tools, M365 security, automation platforms, AI tools)
- Could be tutorials, newsletter issues, tool reviews, or cheat sheets

Return your answer as VALID JSON ONLY, no commentary, in this format:

[
  {{
    "idea_title": "...",
    "idea_type": "tutorial | newsletter | tool_review | cheat_sheet",
    "angle": "...",
    "target_audience": "...",
    "difficulty": "easy | medium | advanced",
    "affiliate_potential": "...",
    "notes": "..."
  }}
]
"#,
        title = record.title,
        url = record.url,
        source = record.source,
        category = record.category,
        summary = record.summary,
        count = IDEAS_PER_RECORD,
    )
}

/// Prompts the generative service for ideas about one article.
pub struct IdeaGenerator {
    client: Arc<dyn CompletionClient>,
}

impl IdeaGenerator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Never fails: service or parse errors produce an empty batch.
    pub async fn generate_ideas(&self, record: &ProcessedRecord) -> ParsedIdeas {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_idea_prompt(record),
            max_tokens: MAX_RESPONSE_TOKENS,
            temperature: TEMPERATURE,
        };

        let raw = match self.client.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(title = %record.title, error = %e, "ideas: generation failed");
                return ParsedIdeas::default();
            }
        };

        match parse_idea_response(&raw) {
            Ok(parsed) => {
                info!(
                    title = truncate_chars(&record.title, 60),
                    ideas = parsed.ideas.len(),
                    rejected = parsed.rejected,
                    "ideas: generated"
                );
                parsed
            }
            Err(e) => {
                warn!(title = %record.title, error = %e, "ideas: unparseable response");
                ParsedIdeas::default()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdeaStats {
    pub records_processed: usize,
    pub ideas_added: usize,
    pub skipped_duplicates: usize,
    pub rejected: usize,
    pub empty_batches: usize,
    pub local_write_failures: usize,
    pub remote_write_failures: usize,
}

/// Per-run dedup state: every title already in the backlog plus every
/// title added earlier in this run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    seen_titles: HashSet<String>,
    pub stats: IdeaStats,
}

impl RunContext {
    pub fn new<I, S>(existing_titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            seen_titles: existing_titles
                .into_iter()
                .map(|t| title_key(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
            stats: IdeaStats::default(),
        }
    }

    pub fn is_known(&self, title: &str) -> bool {
        self.seen_titles.contains(&title_key(title))
    }

    pub fn known_titles(&self) -> usize {
        self.seen_titles.len()
    }
}

pub struct IdeaPipeline {
    generator: IdeaGenerator,
    backlog: Option<Arc<dyn TabularStore>>,
    local_path: PathBuf,
}

impl IdeaPipeline {
    pub fn new(
        generator: IdeaGenerator,
        backlog: Option<Arc<dyn TabularStore>>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            backlog,
            local_path: local_path.into(),
        }
    }

    /// Read existing backlog titles once, from the remote table and the
    /// local backlog file. An unreadable remote only narrows the set.
    pub async fn load_context(&self) -> Result<RunContext> {
        let mut titles: Vec<String> = load_json_list::<IdeaRecord>(&self.local_path)?
            .into_iter()
            .map(|r| r.idea.idea_title)
            .collect();

        if let Some(backlog) = &self.backlog {
            match backlog.read_records().await {
                Ok(rows) => titles.extend(
                    rows.iter()
                        .filter_map(|row| row.get("idea_title"))
                        .map(String::from),
                ),
                Err(e) => {
                    warn!(error = %e, "ideas: backlog unreadable, deduplicating against local ideas only")
                }
            }
        }

        let ctx = RunContext::new(titles);
        info!(titles = ctx.known_titles(), "ideas: loaded existing backlog titles");
        Ok(ctx)
    }

    /// Generate, dedup and persist ideas for one article. Returns how many
    /// were stored. Failures stay inside this record's batch.
    pub async fn process_record(&self, ctx: &mut RunContext, record: &ProcessedRecord) -> usize {
        ctx.stats.records_processed += 1;

        let parsed = self.generator.generate_ideas(record).await;
        ctx.stats.rejected += parsed.rejected;
        if parsed.ideas.is_empty() {
            ctx.stats.empty_batches += 1;
            return 0;
        }

        let date = Utc::now().format("%Y-%m-%dT%H:%M:%S.000Z").to_string();
        let mut batch_titles = HashSet::new();
        let mut batch = Vec::new();
        for idea in parsed.ideas {
            let key = idea.title_key();
            if ctx.seen_titles.contains(&key) || !batch_titles.insert(key) {
                debug!(title = %idea.idea_title, "ideas: duplicate title skipped");
                ctx.stats.skipped_duplicates += 1;
                continue;
            }
            batch.push(IdeaRecord::new(date.clone(), record, idea));
        }

        if batch.is_empty() {
            return 0;
        }

        // Local first, then one backlog append.
        let mut stored = match append_json_list(&batch, &self.local_path) {
            Ok(_) => true,
            Err(e) => {
                ctx.stats.local_write_failures += 1;
                warn!(
                    path = %self.local_path.display(),
                    count = batch.len(),
                    error = %format!("{e:#}"),
                    "ideas: local append failed"
                );
                false
            }
        };

        if let Some(backlog) = &self.backlog {
            let rows: Vec<Vec<String>> = batch.iter().map(IdeaRecord::to_row).collect();
            match backlog.append_rows(&rows).await {
                Ok(()) => {
                    stored = true;
                    info!(count = rows.len(), "ideas: appended to backlog");
                }
                Err(e) => {
                    ctx.stats.remote_write_failures += 1;
                    warn!(count = rows.len(), error = %e, "ideas: backlog append failed");
                }
            }
        }

        if !stored {
            return 0;
        }
        ctx.seen_titles.extend(batch_titles);
        ctx.stats.ideas_added += batch.len();
        batch.len()
    }

    pub async fn run(&self, ctx: &mut RunContext, records: &[ProcessedRecord]) -> IdeaStats {
        for record in records {
            self.process_record(ctx, record).await;
        }
        ctx.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_IDEAS: &str = r#"[
        {"idea_title": "Foo Bar", "idea_type": "tutorial", "angle": "a", "target_audience": "admins", "difficulty": "easy", "affiliate_potential": "vpn", "notes": ""},
        {"idea_title": "VPN Cheat Sheet", "idea_type": "cheat_sheet", "angle": "b", "target_audience": "users", "difficulty": "medium", "affiliate_potential": "vpn", "notes": "n"},
        {"idea_title": "Weekly Threat Brief", "idea_type": "newsletter", "angle": "c", "target_audience": "smb", "difficulty": "advanced", "affiliate_potential": "none", "notes": ""}
    ]"#;

    #[test]
    fn parses_bare_array() {
        let parsed = parse_idea_response(THREE_IDEAS).expect("parse");
        assert_eq!(parsed.ideas.len(), 3);
        assert_eq!(parsed.rejected, 0);
        assert_eq!(parsed.ideas[1].idea_type, IdeaType::CheatSheet);
    }

    #[test]
    fn parses_fenced_array_with_leading_prose() {
        let raw = format!("```json\nHere are your ideas:\n{THREE_IDEAS}\n```");
        assert_eq!(parse_idea_response(&raw).expect("parse").ideas.len(), 3);

        let trailing = format!("Sure! {THREE_IDEAS}\nLet me know if you want more.");
        assert_eq!(parse_idea_response(&trailing).expect("parse").ideas.len(), 3);
    }

    #[test]
    fn rejects_non_sequences_and_garbage() {
        assert_eq!(
            parse_idea_response(r#"{"idea_title": "x"}"#),
            Err(IdeaParseError::NotASequence("an object"))
        );
        assert_eq!(parse_idea_response("   "), Err(IdeaParseError::Empty));
        assert_eq!(
            parse_idea_response("I cannot help with that."),
            Err(IdeaParseError::NoStructuredData)
        );
        assert!(matches!(
            parse_idea_response("[{\"idea_title\": "),
            Err(IdeaParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn invalid_entries_are_dropped_individually() {
        let raw = r#"[
            {"idea_title": "Good", "idea_type": "Tool Review", "difficulty": "Easy"},
            {"idea_title": "   ", "idea_type": "tutorial", "difficulty": "easy"},
            {"idea_title": "Bad type", "idea_type": "video_script", "difficulty": "easy"},
            {"idea_title": "Bad difficulty", "idea_type": "tutorial", "difficulty": "expert"},
            "not an object"
        ]"#;
        let parsed = parse_idea_response(raw).expect("parse");
        assert_eq!(parsed.ideas.len(), 1);
        assert_eq!(parsed.ideas[0].idea_type, IdeaType::ToolReview);
        assert_eq!(parsed.rejected, 4);
    }

    #[test]
    fn null_and_numeric_fields_are_tolerated() {
        let raw = r#"[{"idea_title": "Patch Tuesday Recap", "idea_type": "newsletter",
            "difficulty": "easy", "angle": null, "affiliate_potential": 3, "notes": true}]"#;
        let parsed = parse_idea_response(raw).expect("parse");
        assert_eq!(parsed.rejected, 0);
        let idea = &parsed.ideas[0];
        assert_eq!(idea.angle, "");
        assert_eq!(idea.affiliate_potential, "3");
        assert_eq!(idea.notes, "true");
    }

    #[test]
    fn run_context_normalizes_titles() {
        let ctx = RunContext::new(["Foo Bar", "", "  Other  "]);
        assert_eq!(ctx.known_titles(), 2);
        assert!(ctx.is_known(" foo bar "));
        assert!(ctx.is_known("OTHER"));
        assert!(!ctx.is_known("foo"));
    }

    #[test]
    fn prompt_embeds_record_fields() {
        let record = ProcessedRecord {
            date: "d".into(),
            title: "Big Breach".into(),
            url: "https://news.example/b".into(),
            summary: "Millions exposed".into(),
            source: "Example".into(),
            source_url: String::new(),
            category: "cybersecurity".into(),
        };
        let prompt = build_idea_prompt(&record);
        assert!(prompt.contains("- Title: Big Breach"));
        assert!(prompt.contains("- Summary: Millions exposed"));
        assert!(prompt.contains("tool_review"));
    }
}
