use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::sheets::SheetRow;

/// Column order of the articles table. Rows are written positionally.
pub const ARTICLE_COLUMNS: [&str; 13] = [
    "date",
    "title",
    "url",
    "summary",
    "source",
    "clean_summary",
    "image_url",
    "web_source_url",
    "NeedsCap",
    "EndsWrong",
    "TooShort",
    "TooManySentences",
    "Category",
];

/// Column order of the backlog table.
pub const BACKLOG_COLUMNS: [&str; 11] = [
    "date",
    "source_title",
    "source_url",
    "idea_title",
    "idea_type",
    "angle",
    "target_audience",
    "difficulty",
    "affiliate_potential",
    "notes",
    "status",
];

/// A syndication feed the news summarizer pulls from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub endpoint: String,
    pub name: String,
    pub category: String,
    /// Publisher homepage written next to each article.
    pub homepage: String,
}

impl FeedSource {
    pub fn new(
        endpoint: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        homepage: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            name: name.into(),
            category: category.into(),
            homepage: homepage.into(),
        }
    }
}

/// One feed entry that survived fingerprint filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
    pub excerpt: String,
    pub fingerprint: Fingerprint,
}

/// An ingested and summarized article as stored locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub date: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub source: String,
    pub source_url: String,
    pub category: String,
}

impl ProcessedRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.title.clone(),
            self.url.clone(),
            self.summary.clone(),
            self.source.clone(),
            // clean_summary mirrors the generated summary
            self.summary.clone(),
            String::new(),
            self.source_url.clone(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            self.category.clone(),
        ]
    }

    /// Rebuild a record from an articles-table row. Rows without a url are
    /// not articles (blank or spacer rows) and yield `None`.
    pub fn from_row(row: &SheetRow) -> Option<Self> {
        let url = row.get("url")?.to_string();
        let field = |name: &str| row.get(name).unwrap_or_default().to_string();

        Some(Self {
            date: field("date"),
            title: field("title"),
            url,
            summary: row
                .get("clean_summary")
                .or_else(|| row.get("summary"))
                .unwrap_or_default()
                .to_string(),
            source: field("source"),
            source_url: field("web_source_url"),
            category: field("category"),
        })
    }

    /// Lowercased text the trend scorer matches keywords against.
    pub fn haystack(&self) -> String {
        format!(
            "{} {} {} {}",
            self.title, self.summary, self.source, self.category
        )
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaType {
    Tutorial,
    Newsletter,
    ToolReview,
    CheatSheet,
}

impl IdeaType {
    pub const ALL: [IdeaType; 4] = [
        IdeaType::Tutorial,
        IdeaType::Newsletter,
        IdeaType::ToolReview,
        IdeaType::CheatSheet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaType::Tutorial => "tutorial",
            IdeaType::Newsletter => "newsletter",
            IdeaType::ToolReview => "tool_review",
            IdeaType::CheatSheet => "cheat_sheet",
        }
    }

    /// Accepts the loose spellings models tend to produce ("Tool Review",
    /// "cheat-sheet").
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = normalize_label(value);
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for IdeaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match normalize_label(value).as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// A validated content idea returned by the generative service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaCandidate {
    pub idea_title: String,
    pub idea_type: IdeaType,
    pub angle: String,
    pub target_audience: String,
    pub difficulty: Difficulty,
    pub affiliate_potential: String,
    pub notes: String,
}

impl IdeaCandidate {
    /// Dedup key: trimmed, lowercased title.
    pub fn title_key(&self) -> String {
        title_key(&self.idea_title)
    }
}

pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// An idea as persisted to the backlog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaRecord {
    pub date: String,
    pub source_title: String,
    pub source_url: String,
    #[serde(flatten)]
    pub idea: IdeaCandidate,
    pub status: String,
}

impl IdeaRecord {
    pub const NEW_STATUS: &'static str = "new";

    pub fn new(date: impl Into<String>, source: &ProcessedRecord, idea: IdeaCandidate) -> Self {
        Self {
            date: date.into(),
            source_title: source.title.clone(),
            source_url: source.url.clone(),
            idea,
            status: Self::NEW_STATUS.to_string(),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.source_title.clone(),
            self.source_url.clone(),
            self.idea.idea_title.clone(),
            self.idea.idea_type.to_string(),
            self.idea.angle.clone(),
            self.idea.target_audience.clone(),
            self.idea.difficulty.to_string(),
            self.idea.affiliate_potential.clone(),
            self.idea.notes.clone(),
            self.status.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idea_labels_accept_loose_spellings() {
        assert_eq!(IdeaType::parse("Tool Review"), Some(IdeaType::ToolReview));
        assert_eq!(IdeaType::parse(" cheat-sheet "), Some(IdeaType::CheatSheet));
        assert_eq!(IdeaType::parse("blog_post"), None);
        assert_eq!(Difficulty::parse("Advanced"), Some(Difficulty::Advanced));
        assert_eq!(Difficulty::parse("hard"), None);
    }

    #[test]
    fn rows_follow_declared_column_order() {
        let record = ProcessedRecord {
            date: "2026-01-02 07:00:00".into(),
            title: "Patch now".into(),
            url: "https://example.com/a".into(),
            summary: "A summary".into(),
            source: "Example".into(),
            source_url: "https://example.com".into(),
            category: "cybersecurity".into(),
        };
        let row = record.to_row();
        assert_eq!(row.len(), ARTICLE_COLUMNS.len());
        assert_eq!(row[2], "https://example.com/a");
        assert_eq!(row[5], "A summary");
        assert_eq!(row[7], "https://example.com");
        assert_eq!(row[12], "cybersecurity");

        let idea = IdeaRecord::new(
            "2026-01-02T07:00:00.000Z",
            &record,
            IdeaCandidate {
                idea_title: "Patch faster".into(),
                idea_type: IdeaType::Tutorial,
                angle: "speed".into(),
                target_audience: "admins".into(),
                difficulty: Difficulty::Easy,
                affiliate_potential: "patch tools".into(),
                notes: String::new(),
            },
        );
        let row = idea.to_row();
        assert_eq!(row.len(), BACKLOG_COLUMNS.len());
        assert_eq!(row[1], "Patch now");
        assert_eq!(row[4], "tutorial");
        assert_eq!(row[7], "easy");
        assert_eq!(row[10], "new");
    }
}
