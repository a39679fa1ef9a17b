// Public modules
pub mod config;
pub mod error;
pub mod feeds;
pub mod fingerprint;
pub mod ideas;
pub mod ingest;
pub mod io;
pub mod llm;
pub mod models;
pub mod sheets;
pub mod summarizer;
pub mod trends;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use feeds::{default_feed_sources, FeedIngestor, FeedTransport, HttpFeedTransport};
pub use fingerprint::{Fingerprint, FingerprintStore, RemoteLoad};
pub use ideas::{parse_idea_response, IdeaGenerator, IdeaParseError, IdeaPipeline, IdeaStats, RunContext};
pub use ingest::{IngestReport, IngestionPipeline, RunPhase};
pub use llm::{CompletionClient, CompletionRequest, OpenAiClient};
pub use models::{FeedSource, IdeaCandidate, IdeaRecord, ProcessedRecord, RawItem};
pub use sheets::{SheetRow, SheetTable, SheetsClient, TabularStore};
pub use summarizer::{Summarizer, Summary};
pub use trends::{load_recent_records, KeywordIndex, ScoredRecord, TrendScorer};
