use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::io::{get_default_data_dir, FINGERPRINT_CACHE_FILE, IDEAS_FILE, SUMMARIES_FILE};
use crate::llm::{OpenAiClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::sheets::{ServiceAccountKey, SheetsClient};
use crate::summarizer::DEFAULT_MAX_WORDS;
use crate::trends::{default_interest_keywords, normalize_keywords, DEFAULT_SCAN_DEPTH};

const APP_DIR: &str = "content-automation";
const DEFAULT_ARTICLES_TAB: &str = "Inoreader Articles";
const DEFAULT_BACKLOG_TAB: &str = "Content_Backlog";

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub summary_max_words: usize,
    /// Inline service-account JSON, or a path to the key file.
    pub service_account: Option<String>,
    pub sheet_id: Option<String>,
    pub articles_tab: String,
    pub backlog_tab: String,
    pub data_dir: PathBuf,
    pub interest_keywords: Vec<String>,
    pub trend_scan_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openai_base_url = var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        url::Url::parse(&openai_base_url)
            .with_context(|| format!("OPENAI_BASE_URL is not a valid URL: {openai_base_url}"))?;

        let data_dir = match var("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => get_default_data_dir()?,
        };

        let interest_keywords = match var("INTEREST_KEYWORDS") {
            Some(list) => normalize_keywords(list.split(',')),
            None => default_interest_keywords(),
        };

        Ok(Self {
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url,
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            summary_max_words: parse_var(&var, "SUMMARY_MAX_LENGTH", DEFAULT_MAX_WORDS)?,
            service_account: var("GOOGLE_SERVICE_ACCOUNT_JSON"),
            sheet_id: var("GOOGLE_SHEET_ID"),
            articles_tab: var("ARTICLES_TAB").unwrap_or_else(|| DEFAULT_ARTICLES_TAB.to_string()),
            backlog_tab: var("BACKLOG_TAB").unwrap_or_else(|| DEFAULT_BACKLOG_TAB.to_string()),
            data_dir,
            interest_keywords,
            trend_scan_depth: parse_var(&var, "TREND_SCAN_DEPTH", DEFAULT_SCAN_DEPTH)?,
        })
    }

    fn try_load_dotenv() {
        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/content-automation/.env
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(APP_DIR).join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }
    }

    pub fn fingerprint_cache_path(&self) -> PathBuf {
        self.data_dir.join(FINGERPRINT_CACHE_FILE)
    }

    pub fn summaries_path(&self) -> PathBuf {
        self.data_dir.join(SUMMARIES_FILE)
    }

    pub fn ideas_path(&self) -> PathBuf {
        self.data_dir.join(IDEAS_FILE)
    }

    pub fn has_sheet_credentials(&self) -> bool {
        self.service_account.is_some() && self.sheet_id.is_some()
    }

    pub fn completion_client(&self) -> PipelineResult<OpenAiClient> {
        let key = self
            .openai_api_key
            .clone()
            .ok_or(PipelineError::ConfigurationMissing("OPENAI_API_KEY"))?;
        Ok(OpenAiClient::new(key, self.openai_model.clone())?.with_base_url(&self.openai_base_url))
    }

    pub fn sheets_client(&self) -> PipelineResult<Arc<SheetsClient>> {
        let raw = self
            .service_account
            .as_deref()
            .ok_or(PipelineError::ConfigurationMissing("GOOGLE_SERVICE_ACCOUNT_JSON"))?;
        let sheet_id = self
            .sheet_id
            .clone()
            .ok_or(PipelineError::ConfigurationMissing("GOOGLE_SHEET_ID"))?;

        let json = if raw.starts_with('{') {
            raw.to_string()
        } else {
            fs::read_to_string(raw).map_err(|e| PipelineError::Parse {
                what: "service account key file",
                reason: format!("{raw}: {e}"),
            })?
        };

        let key = ServiceAccountKey::from_json(&json)?;
        Ok(Arc::new(SheetsClient::new(sheet_id, key)?))
    }
}

fn parse_var<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("DATA_DIR", "/tmp/ca")]).expect("config");
        assert_eq!(config.openai_model, "gpt-4o");
        assert_eq!(config.summary_max_words, 120);
        assert_eq!(config.trend_scan_depth, 30);
        assert_eq!(config.articles_tab, "Inoreader Articles");
        assert_eq!(config.backlog_tab, "Content_Backlog");
        assert_eq!(config.summaries_path(), PathBuf::from("/tmp/ca/news_summaries.json"));
        assert!(config.openai_api_key.is_none());
        assert!(!config.has_sheet_credentials());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = config_from(&[("DATA_DIR", "/tmp/ca"), ("OPENAI_API_KEY", "  ")])
            .expect("config");
        assert!(matches!(
            config.completion_client(),
            Err(PipelineError::ConfigurationMissing("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            config.sheets_client(),
            Err(PipelineError::ConfigurationMissing("GOOGLE_SERVICE_ACCOUNT_JSON"))
        ));
    }

    #[test]
    fn keyword_list_is_normalized() {
        let config = config_from(&[
            ("DATA_DIR", "/tmp/ca"),
            ("INTEREST_KEYWORDS", "VPN, zero-day,,Cloud ,vpn"),
        ])
        .expect("config");
        assert_eq!(config.interest_keywords, vec!["vpn", "zero-day", "cloud"]);
    }

    #[test]
    fn malformed_numbers_and_urls_are_rejected() {
        assert!(config_from(&[("DATA_DIR", "/tmp/ca"), ("TREND_SCAN_DEPTH", "lots")]).is_err());
        assert!(config_from(&[("DATA_DIR", "/tmp/ca"), ("OPENAI_BASE_URL", "not a url")]).is_err());
    }
}
