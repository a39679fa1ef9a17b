use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    default_feed_sources, Config, FeedIngestor, FingerprintStore, IngestionPipeline, RemoteLoad,
    Summarizer, TabularStore,
};
use std::fs;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "news-summarizer")]
#[command(about = "Fetch security news feeds, summarize new articles and store them")]
struct Args {
    /// Entries to read from the top of each feed
    #[arg(long, default_value = "5")]
    max_entries: usize,

    /// Word limit for each summary (defaults to SUMMARY_MAX_LENGTH)
    #[arg(long)]
    max_words: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let max_words = args.max_words.unwrap_or(config.summary_max_words);

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let articles: Option<Arc<dyn TabularStore>> = match config.sheets_client() {
        Ok(client) => Some(Arc::new(client.table(config.articles_tab.clone()))),
        Err(e) => {
            warn!(error = %e, "sheets disabled, storing articles locally only");
            None
        }
    };

    let summarizer = match config.completion_client() {
        Ok(client) => Summarizer::new(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "no generative service, every summary will be a truncated excerpt");
            Summarizer::offline()
        }
    };

    println!("\n🔎 Loading known articles...");
    let mut store =
        FingerprintStore::load(config.fingerprint_cache_path(), articles.as_deref()).await;
    let report = store.report();
    match &report.remote {
        RemoteLoad::Loaded { rows } => {
            println!("✓ {} known ({} cached, {} rows in sheet)", report.total, report.local, rows)
        }
        RemoteLoad::Disabled => println!("✓ {} known from local cache", report.total),
        RemoteLoad::Unavailable(reason) => {
            println!("⚠ Sheet unreachable ({reason}), using {} cached", report.total)
        }
    }

    let sources = default_feed_sources();
    println!("\n📰 Checking {} feeds...", sources.len());

    let mut pipeline = IngestionPipeline::new(
        FeedIngestor::over_http()?,
        summarizer,
        sources,
        config.summaries_path(),
    )
    .with_max_entries(args.max_entries)
    .with_max_words(max_words);
    if let Some(table) = articles {
        pipeline = pipeline.with_articles_table(table);
    }

    let report = pipeline.run(&mut store).await?;

    println!("\n✓ Stored {} new articles", report.new_records);
    if report.sources_failed > 0 {
        println!("⚠ {}/{} feeds could not be read", report.sources_failed, report.sources);
    }
    if report.summary_fallbacks > 0 {
        println!("⚠ {} summaries fell back to the excerpt", report.summary_fallbacks);
    }
    if report.local_write_failures > 0 {
        println!(
            "⚠ {} batches could not be written to {}",
            report.local_write_failures,
            config.summaries_path().display()
        );
    }
    if report.remote_write_failures > 0 {
        println!(
            "⚠ {} batches were not written to the sheet",
            report.remote_write_failures
        );
    }

    Ok(())
}
