// 📥 Data source - where raw reviews come from
//
// The acquisition process itself is external. A source only has to hand
// back raw records for one bank, at most `max` of them.

use crate::entities::{Bank, RawReview};
use crate::error::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait ReviewSource {
    /// Human-readable origin, used in logs
    fn describe(&self) -> String;

    fn fetch(&self, bank: &Bank, max: usize) -> Result<Vec<RawReview>>;
}

/// Deterministic id for records that arrive without one, so re-ingesting
/// the same export updates rows instead of duplicating them
pub fn review_identity(bank_id: &str, user_name: &str, date: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", bank_id, user_name, date, text));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// CSV SOURCE
// ============================================================================

#[derive(Debug, Deserialize)]
struct CsvRow {
    review_id: Option<String>,
    bank_id: String,
    text: Option<String>,
    rating: i64,
    date: String,
    user_name: Option<String>,
    thumbs_up: Option<i64>,
}

impl CsvRow {
    fn into_raw(self) -> RawReview {
        let text = self.text.unwrap_or_default();
        let user_name = self.user_name.unwrap_or_default();
        let review_id = match self.review_id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => review_identity(&self.bank_id, &user_name, &self.date, &text),
        };

        RawReview {
            review_id,
            bank_id: self.bank_id,
            text,
            rating: self.rating,
            date: self.date,
            user_name,
            thumbs_up: self.thumbs_up.unwrap_or(0),
        }
    }
}

/// Reads a review export with the columns
/// `review_id, bank_id, text, rating, date, user_name, thumbs_up`
pub struct CsvReviewSource {
    path: PathBuf,
}

impl CsvReviewSource {
    pub fn new(path: &Path) -> Self {
        CsvReviewSource {
            path: path.to_path_buf(),
        }
    }
}

impl ReviewSource for CsvReviewSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn fetch(&self, bank: &Bank, max: usize) -> Result<Vec<RawReview>> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut reviews = Vec::new();
        let mut malformed = 0;

        for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
            if reviews.len() >= max {
                break;
            }

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    malformed += 1;
                    debug!(line = line + 2, error = %e, "skipping malformed row");
                    continue;
                }
            };

            if row.bank_id != bank.bank_id {
                continue;
            }
            reviews.push(row.into_raw());
        }

        if malformed > 0 {
            warn!(bank = %bank.bank_id, malformed, "malformed rows skipped");
        }
        info!(bank = %bank.bank_id, fetched = reviews.len(), max, "reviews fetched from csv");
        Ok(reviews)
    }
}

// ============================================================================
// TESTS
// ============================================================================
