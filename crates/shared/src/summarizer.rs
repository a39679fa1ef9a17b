use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::{CompletionClient, CompletionRequest};
use crate::util::truncate_chars;

pub const DEFAULT_MAX_WORDS: usize = 120;
pub const FALLBACK_MARKER: &str = "...";
/// Characters allowed per requested word when building a fallback summary.
pub const FALLBACK_CHARS_PER_WORD: usize = 6;

const SYSTEM_PROMPT: &str =
    "You are a cybersecurity journalist who creates concise, accurate news summaries.";
const MAX_RESPONSE_TOKENS: u32 = 200;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Summary {
    Generated(String),
    /// Truncated excerpt used when the generative service is unavailable.
    Fallback(String),
}

impl Summary {
    pub fn text(&self) -> &str {
        match self {
            Summary::Generated(text) | Summary::Fallback(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Summary::Generated(text) | Summary::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Summary::Fallback(_))
    }
}

pub struct Summarizer {
    client: Option<Arc<dyn CompletionClient>>,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A summarizer with no service behind it; every summary is a fallback.
    pub fn offline() -> Self {
        Self { client: None }
    }

    /// One attempt against the service; any failure falls back immediately.
    pub async fn summarize(&self, title: &str, content: &str, max_words: usize) -> Summary {
        let Some(client) = &self.client else {
            return Summary::Fallback(fallback_summary(content, max_words));
        };

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(title, content, max_words),
            max_tokens: MAX_RESPONSE_TOKENS,
            temperature: TEMPERATURE,
        };

        match client.complete(&request).await {
            Ok(text) => Summary::Generated(text),
            Err(e) => {
                warn!(title, error = %e, "summarizer: falling back to truncated excerpt");
                Summary::Fallback(fallback_summary(content, max_words))
            }
        }
    }
}

fn build_prompt(title: &str, content: &str, max_words: usize) -> String {
    format!(
        r#"Summarize this cybersecurity/tech news article in exactly {max_words} words or less.
Focus on the key facts, impact, and takeaways. Write in a clear, engaging style for IT professionals and non-technical readers.

Title: {title}

Content: {content}

Summary:"#
    )
}

pub fn fallback_char_budget(max_words: usize) -> usize {
    max_words.max(1).saturating_mul(FALLBACK_CHARS_PER_WORD)
}

/// Deterministic summary: the content cut to the word-derived character
/// budget, marker included.
pub fn fallback_summary(content: &str, max_words: usize) -> String {
    let budget = fallback_char_budget(max_words);
    let keep = budget.saturating_sub(FALLBACK_MARKER.chars().count());
    let head = truncate_chars(content.trim(), keep).trim_end();
    format!("{head}{FALLBACK_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, PipelineResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: PipelineResult<String>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> PipelineResult<String> {
            self.prompts.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(PipelineError::generative(e)),
            }
        }
    }

    #[tokio::test]
    async fn generated_summary_is_passed_through() {
        let client = Arc::new(Scripted {
            reply: Ok("Attackers exploited a VPN flaw.".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = Summarizer::new(client.clone());

        let summary = summarizer.summarize("VPN flaw", "long text", 50).await;
        assert_eq!(summary, Summary::Generated("Attackers exploited a VPN flaw.".into()));

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user.contains("in exactly 50 words or less"));
        assert!(prompts[0].user.contains("Title: VPN flaw"));
        assert_eq!(prompts[0].max_tokens, 200);
    }

    #[tokio::test]
    async fn service_failure_falls_back_without_retry() {
        let client = Arc::new(Scripted {
            reply: Err(PipelineError::generative("rate limited")),
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = Summarizer::new(client.clone());
        let content = "x".repeat(5_000);

        let summary = summarizer.summarize("t", &content, 20).await;

        assert!(summary.is_fallback());
        assert!(summary.text().chars().count() <= fallback_char_budget(20));
        assert!(summary.text().ends_with(FALLBACK_MARKER));
        assert_eq!(client.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_summarizer_always_falls_back() {
        let summary = Summarizer::offline().summarize("t", "Short body.", 120).await;
        assert_eq!(summary, Summary::Fallback("Short body....".into()));
    }

    #[test]
    fn fallback_respects_budget_for_multibyte_text() {
        let content = "é".repeat(1_000);
        for max_words in [0, 1, 5, 120] {
            let text = fallback_summary(&content, max_words);
            assert!(text.chars().count() <= fallback_char_budget(max_words));
            assert!(text.ends_with(FALLBACK_MARKER));
        }
    }

    #[test]
    fn huge_word_limit_saturates_the_budget() {
        assert_eq!(fallback_char_budget(usize::MAX), usize::MAX);
        assert_eq!(fallback_summary("Short body.", usize::MAX), "Short body....");
    }
}
