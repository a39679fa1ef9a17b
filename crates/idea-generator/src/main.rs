use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    load_recent_records, Config, IdeaGenerator, IdeaPipeline, ProcessedRecord, TabularStore,
    TrendScorer,
};
use std::fs;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "idea-generator")]
#[command(about = "Turn trending stored articles into content ideas for the backlog")]
struct Args {
    /// Trending articles to generate ideas for
    #[arg(long, default_value = "5")]
    max_rows: usize,

    /// Newest articles scanned for keyword trends (defaults to TREND_SCAN_DEPTH)
    #[arg(long)]
    scan_depth: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    // Both services are required; a missing credential ends the run cleanly.
    let llm = match config.completion_client() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "idea generation skipped");
            return Ok(());
        }
    };
    let sheets = match config.sheets_client() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "idea generation skipped");
            return Ok(());
        }
    };

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let articles: Arc<dyn TabularStore> = Arc::new(sheets.table(config.articles_tab.clone()));
    let backlog: Arc<dyn TabularStore> = Arc::new(sheets.table(config.backlog_tab.clone()));

    println!("\n📈 Scanning recent articles for trends...");
    let records = load_recent_records(Some(articles.as_ref()), &config.summaries_path()).await?;
    let scorer = TrendScorer::new(
        &config.interest_keywords,
        args.scan_depth.unwrap_or(config.trend_scan_depth),
    );
    let selected = scorer.select(&records, args.max_rows);

    if selected.is_empty() {
        println!("No recent articles match the interest keywords.");
        return Ok(());
    }

    println!("✓ {} trending articles:", selected.len());
    for scored in &selected {
        println!("  [{}] {}", scored.score, scored.record.title);
    }

    let pipeline = IdeaPipeline::new(
        IdeaGenerator::new(Arc::new(llm)),
        Some(backlog),
        config.ideas_path(),
    );
    let mut ctx = pipeline.load_context().await?;
    println!("\n💡 Generating ideas ({} titles already in backlog)...", ctx.known_titles());

    let targets: Vec<ProcessedRecord> = selected.into_iter().map(|s| s.record).collect();
    let stats = pipeline.run(&mut ctx, &targets).await;

    println!("\n✓ Added {} ideas", stats.ideas_added);
    if stats.skipped_duplicates > 0 {
        println!("  Skipped {} duplicate titles", stats.skipped_duplicates);
    }
    if stats.rejected > 0 {
        println!("  Rejected {} malformed ideas", stats.rejected);
    }
    if stats.empty_batches > 0 {
        println!("⚠ {} articles produced no usable ideas", stats.empty_batches);
    }
    if stats.local_write_failures > 0 {
        println!(
            "⚠ {} batches could not be written to {}",
            stats.local_write_failures,
            config.ideas_path().display()
        );
    }
    if stats.remote_write_failures > 0 {
        println!(
            "⚠ {} batches were not written to the backlog sheet",
            stats.remote_write_failures
        );
    }

    Ok(())
}
