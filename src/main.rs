use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use review_insights::{
    config::AppConfig, db, logging, pipeline, BankRegistry, CsvReviewSource, IngestionRun,
    ReviewAnalyzer,
};

#[derive(Parser)]
#[command(name = "review-insights", version, about = "Bank app review sentiment and themes")]
struct Cli {
    /// TOML configuration file (defaults apply when missing)
    #[arg(long, short, default_value = "review-insights.toml", env = "REVIEW_INSIGHTS_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema and store the bank registry
    Setup,
    /// Fetch reviews per bank from a CSV export, analyze and store them
    Ingest { csv: PathBuf },
    /// Re-score and re-theme every stored review
    Analyze,
    /// Print the sentiment summary
    Show {
        #[arg(long)]
        bank: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    logging::init_logging(&config.logging.level);

    let registry = BankRegistry::from_config(&config.banks);
    let mut conn = db::open_database(&config.database.path).context("Failed to open database")?;

    match cli.command {
        Command::Setup => run_setup(&mut conn, &registry),
        Command::Ingest { csv } => run_ingest(&mut conn, &config, &registry, csv),
        Command::Analyze => run_analyze(&mut conn, &config),
        Command::Show { bank } => run_show(&conn, &registry, bank.as_deref()),
    }
}

fn run_setup(conn: &mut rusqlite::Connection, registry: &BankRegistry) -> Result<()> {
    println!("🔧 Setting up database...");
    let report = db::setup_database(conn).context("Failed to create schema")?;
    for table in &report.created {
        println!("✓ Created table {}", table);
    }
    for table in &report.existing {
        println!("• Table {} already exists", table);
    }

    let banks = db::insert_banks(conn, registry).context("Failed to insert banks")?;
    println!("✓ Stored {} banks", banks);
    Ok(())
}

fn run_ingest(
    conn: &mut rusqlite::Connection,
    config: &AppConfig,
    registry: &BankRegistry,
    csv: PathBuf,
) -> Result<()> {
    db::setup_database(conn).context("Failed to create schema")?;
    db::insert_banks(conn, registry).context("Failed to insert banks")?;

    let source = CsvReviewSource::new(&csv);
    let analyzer = ReviewAnalyzer::from_config(&config.analysis);
    info!(scorers = ?analyzer.available_scorers(), "analyzer ready");

    let summary = IngestionRun::new(registry, &source, &analyzer)
        .with_limits(
            config.scraping.max_reviews_per_bank,
            config.scraping.request_delay(),
        )
        .run(conn)
        .context("Ingestion failed")?;

    println!("\n📥 Ingestion {}", summary.run_id);
    for bank in &summary.banks {
        match &bank.fetch_error {
            Some(e) => println!("  ✗ {:<8} fetch failed: {}", bank.bank_id, e),
            None => println!(
                "  ✓ {:<8} fetched {:>4}, skipped {}",
                bank.bank_id, bank.fetched, bank.skipped
            ),
        }
    }
    println!(
        "💾 Stored: {} new, {} updated, {} rejected",
        summary.stored.inserted,
        summary.stored.updated,
        summary.stored.rejected.len()
    );
    if let Some(e) = &summary.analysis.theme_error {
        println!("⚠️  Themes not assigned: {}", e);
    }
    Ok(())
}

fn run_analyze(conn: &mut rusqlite::Connection, config: &AppConfig) -> Result<()> {
    let analyzer = ReviewAnalyzer::from_config(&config.analysis);
    let (report, outcome) =
        pipeline::reanalyze_store(conn, &analyzer).context("Analysis failed")?;

    println!("📊 Analyzed {} reviews", report.reviews);
    for (label, count) in &report.labels {
        println!("  {:<9} {}", label, count);
    }
    match &report.theme_error {
        Some(e) => println!("⚠️  Themes not assigned: {}", e),
        None => println!("🏷️  Themes: {}", report.themes.join(" | ")),
    }
    println!("💾 Updated {} reviews", outcome.written());
    Ok(())
}

fn run_show(
    conn: &rusqlite::Connection,
    registry: &BankRegistry,
    bank: Option<&str>,
) -> Result<()> {
    let bank_id = match bank {
        Some(code) => Some(
            registry
                .find_by_string(code)
                .map(|b| b.bank_id.clone())
                .with_context(|| format!("Unknown bank: {}", code))?,
        ),
        None => None,
    };

    let total = db::count_reviews(conn)?;
    println!("📊 {} reviews stored\n", total);
    println!("{:<8} {:<10} {:>6} {:>10}", "BANK", "LABEL", "COUNT", "AVG SCORE");

    for row in db::sentiment_summary(conn)? {
        if bank_id.as_deref().is_some_and(|b| b != row.bank_id) {
            continue;
        }
        println!(
            "{:<8} {:<10} {:>6} {:>10.3}",
            row.bank_id, row.label, row.count, row.average_score
        );
    }

    println!("\n🏷️  Top themes");
    for row in db::theme_summary(conn)? {
        if bank_id.as_deref().is_some_and(|b| b != row.bank_id) {
            continue;
        }
        println!("{:<8} {:<50} {:>6}", row.bank_id, row.theme, row.count);
    }
    Ok(())
}
