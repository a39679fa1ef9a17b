use thiserror::Error;

/// Failure categories shared by every worker component.
///
/// None of these are fatal to a run: callers downgrade them to a skipped
/// source, a fallback summary, an empty idea batch or a local-only write.
/// Local file failures are reported through `anyhow` instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },
    #[error("generative service call failed: {0}")]
    GenerativeService(String),
    #[error("remote store is unavailable: {0}")]
    RemoteStoreUnavailable(String),
    #[error("could not parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
    #[error("missing configuration: {0}")]
    ConfigurationMissing(&'static str),
}

impl PipelineError {
    pub fn source_unavailable(source_name: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn remote(reason: impl ToString) -> Self {
        Self::RemoteStoreUnavailable(reason.to_string())
    }

    pub fn generative(reason: impl ToString) -> Self {
        Self::GenerativeService(reason.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
