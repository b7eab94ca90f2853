// ⚠️ Error taxonomy for the review pipeline
//
// Scorer failures are recoverable (the scorer degrades to NEUTRAL/0.5),
// storage failures escalate to whoever started the batch, and the
// thematic stage fails on its own without touching sentiment results.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    /// A scoring method cannot run at all (model artifact missing or broken)
    #[error("Scorer unavailable: {scorer}: {reason}")]
    ScorerUnavailable { scorer: String, reason: String },

    /// A single scoring call failed during inference
    #[error("Scorer runtime error: {scorer}: {reason}")]
    ScorerRuntime { scorer: String, reason: String },

    /// The storage sink could not be reached
    #[error("Storage connection error: {0}")]
    StorageConnection(String),

    /// A table already exists during setup (non-fatal)
    #[error("Schema object already exists: {0}")]
    SchemaConflict(String),

    /// Corpus too small for the requested number of theme clusters
    #[error("Insufficient data: {corpus} reviews for {clusters} theme clusters")]
    InsufficientData { corpus: usize, clusters: usize },

    /// A record was rejected by a store constraint (rating range, foreign key)
    #[error("Constraint violation for review {review_id}: {reason}")]
    ConstraintViolation { review_id: String, reason: String },

    #[error("Unknown bank: {0}")]
    UnknownBank(String),

    /// A field of an input record could not be parsed (date, label)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReviewError {
    /// Scorer problems never abort a batch
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReviewError::ScorerUnavailable { .. }
                | ReviewError::ScorerRuntime { .. }
                | ReviewError::SchemaConflict(_)
                | ReviewError::ConstraintViolation { .. }
                | ReviewError::InvalidRecord(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
