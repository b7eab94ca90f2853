// Review Insights - Core Library
// Bank app reviews: ingestion, sentiment ensemble, themes, storage

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod sentiment;
pub mod source;
pub mod themes;

// Re-export commonly used types
pub use config::{AnalysisConfig, AppConfig, BankEntry, DatabaseConfig, ScrapingConfig};
pub use db::{
    BankRow, BatchOutcome, RejectedReview, SchemaReport, SentimentSummaryRow, ThemeSummaryRow,
    count_reviews, get_all_banks, get_all_reviews, get_bank, get_review, get_reviews_by_bank,
    insert_banks, insert_review_strict, open_database, sentiment_summary, setup_database,
    theme_summary, upsert_reviews,
};
pub use entities::{Bank, BankRegistry, RawReview, Review, SentimentLabel};
pub use error::{Result, ReviewError};
pub use pipeline::{
    AnalysisReport, IngestionRun, IngestionSummary, ReviewAnalyzer, SentimentBreakdown,
    reanalyze_store,
};
pub use sentiment::{
    AggregateSentiment, LexiconScorer, NeuralFirstMajority, NeuralScorer, PolarityScorer,
    ReconciliationStrategy, Scorer, ScorerKind, ScorerResult, SentimentAggregator,
};
pub use source::{CsvReviewSource, ReviewSource};
pub use themes::{ThematicExtractor, ThemeCatalog, ThemeModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
