// 🗄️ Storage sink - SQLite (banks + reviews)
//
// Two tables with a fixed schema. The store itself enforces the rating
// range (CHECK) and review → bank referential integrity (FOREIGN KEY).
// Writes are committed per logical unit: one transaction per bank batch
// and one per review batch.

use crate::entities::{Bank, BankRegistry, Review, SentimentLabel};
use crate::error::{Result, ReviewError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const BANKS_TABLE_SQL: &str = "CREATE TABLE banks (
    bank_id VARCHAR(10) PRIMARY KEY,
    bank_name VARCHAR(100) NOT NULL,
    app_name VARCHAR(100),
    app_id VARCHAR(100),
    created_date DATETIME DEFAULT CURRENT_TIMESTAMP
)";

const REVIEWS_TABLE_SQL: &str = "CREATE TABLE reviews (
    review_id VARCHAR(100) PRIMARY KEY,
    bank_id VARCHAR(10) NOT NULL,
    review_text TEXT,
    rating INTEGER CHECK (rating BETWEEN 1 AND 5),
    review_date TEXT,
    user_name VARCHAR(100),
    thumbs_up INTEGER DEFAULT 0,
    sentiment_label VARCHAR(20),
    sentiment_score REAL,
    primary_theme VARCHAR(50),
    word_count INTEGER,
    created_date DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (bank_id) REFERENCES banks(bank_id)
)";

const REVIEW_COLUMNS: &str = "review_id, bank_id, review_text, rating, review_date, user_name,
    thumbs_up, sentiment_label, sentiment_score, primary_theme, word_count";

// ============================================================================
// CONNECTION + SCHEMA
// ============================================================================

/// Open the store; failure here is fatal for the run
pub fn open_database(path: &str) -> Result<Connection> {
    let conn = if path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .map_err(|e| ReviewError::StorageConnection(format!("{}: {}", path, e)))?;

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| ReviewError::StorageConnection(format!("enable foreign keys: {}", e)))?;

    // WAL for crash recovery; not applicable to in-memory databases
    if path != ":memory:" {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| ReviewError::StorageConnection(format!("enable WAL: {}", e)))?;
    }

    info!(path, "connected to review store");
    Ok(conn)
}

/// Which tables were created and which already existed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Create both tables; an existing table is logged and skipped
pub fn setup_database(conn: &Connection) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();

    for (table, sql) in [("banks", BANKS_TABLE_SQL), ("reviews", REVIEWS_TABLE_SQL)] {
        match create_table(conn, table, sql) {
            Ok(()) => {
                info!(table, "table created");
                report.created.push(table.to_string());
            }
            Err(ReviewError::SchemaConflict(_)) => {
                info!(table, "table already exists");
                report.existing.push(table.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reviews_bank ON reviews(bank_id)",
        [],
    )?;

    Ok(report)
}

fn create_table(conn: &Connection, table: &str, sql: &str) -> Result<()> {
    if table_exists(conn, table)? {
        return Err(ReviewError::SchemaConflict(table.to_string()));
    }
    conn.execute(sql, [])?;
    Ok(())
}

// ============================================================================
// BANKS
// ============================================================================

/// A row of the banks table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRow {
    pub bank_id: String,
    pub bank_name: String,
    pub app_name: Option<String>,
    pub app_id: Option<String>,
}

/// Upsert every registry bank in one transaction
pub fn insert_banks(conn: &mut Connection, registry: &BankRegistry) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut written = 0;

    for bank in registry.all_banks() {
        upsert_bank(&tx, bank)?;
        written += 1;
    }

    tx.commit()?;
    info!(banks = written, "bank registry stored");
    Ok(written)
}

pub fn upsert_bank(conn: &Connection, bank: &Bank) -> Result<()> {
    conn.execute(
        "INSERT INTO banks (bank_id, bank_name, app_name, app_id) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(bank_id) DO UPDATE SET
            bank_name = excluded.bank_name,
            app_name = excluded.app_name,
            app_id = excluded.app_id",
        params![bank.bank_id, bank.name, bank.app_name, bank.app_id],
    )?;
    Ok(())
}

pub fn get_bank(conn: &Connection, bank_id: &str) -> Result<Option<BankRow>> {
    let bank = conn
        .query_row(
            "SELECT bank_id, bank_name, app_name, app_id FROM banks WHERE bank_id = ?1",
            [bank_id],
            |row| {
                Ok(BankRow {
                    bank_id: row.get(0)?,
                    bank_name: row.get(1)?,
                    app_name: row.get(2)?,
                    app_id: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(bank)
}

pub fn get_all_banks(conn: &Connection) -> Result<Vec<BankRow>> {
    let mut stmt =
        conn.prepare("SELECT bank_id, bank_name, app_name, app_id FROM banks ORDER BY bank_id")?;
    let banks = stmt
        .query_map([], |row| {
            Ok(BankRow {
                bank_id: row.get(0)?,
                bank_name: row.get(1)?,
                app_name: row.get(2)?,
                app_id: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(banks)
}

// ============================================================================
// REVIEWS
// ============================================================================

/// A review the store refused, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedReview {
    pub review_id: String,
    pub reason: String,
}

/// Result of one review batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub rejected: Vec<RejectedReview>,
}

impl BatchOutcome {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.rejected.extend(other.rejected);
    }
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn review_exists(conn: &Connection, review_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM reviews WHERE review_id = ?1",
            [review_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn write_review(conn: &Connection, review: &Review, upsert: bool) -> rusqlite::Result<usize> {
    let conflict_clause = if upsert {
        " ON CONFLICT(review_id) DO UPDATE SET
            bank_id = excluded.bank_id,
            review_text = excluded.review_text,
            rating = excluded.rating,
            review_date = excluded.review_date,
            user_name = excluded.user_name,
            thumbs_up = excluded.thumbs_up,
            sentiment_label = excluded.sentiment_label,
            sentiment_score = excluded.sentiment_score,
            primary_theme = COALESCE(excluded.primary_theme, reviews.primary_theme),
            word_count = excluded.word_count"
    } else {
        ""
    };

    let sql = format!(
        "INSERT INTO reviews ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11){}",
        REVIEW_COLUMNS, conflict_clause
    );

    conn.execute(
        &sql,
        params![
            review.review_id,
            review.bank_id,
            review.text,
            review.rating,
            review.date.to_rfc3339(),
            review.user_name,
            review.thumbs_up,
            review.sentiment_label.map(|l| l.as_str()),
            review.sentiment_score,
            review.primary_theme,
            review.word_count,
        ],
    )
}

/// Upsert a batch in one transaction.
///
/// `review_id` is the dedup key. A record rejected by a constraint is
/// reported and skipped; any other failure rolls the batch back and escalates.
pub fn upsert_reviews(conn: &mut Connection, reviews: &[Review]) -> Result<BatchOutcome> {
    let tx = conn.transaction()?;
    let mut outcome = BatchOutcome::default();

    for review in reviews {
        let existed = review_exists(&tx, &review.review_id)?;

        match write_review(&tx, review, true) {
            Ok(_) if existed => outcome.updated += 1,
            Ok(_) => outcome.inserted += 1,
            Err(e) if is_constraint_violation(&e) => {
                warn!(review_id = %review.review_id, error = %e, "review rejected by store");
                outcome.rejected.push(RejectedReview {
                    review_id: review.review_id.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit()?;
    info!(
        inserted = outcome.inserted,
        updated = outcome.updated,
        rejected = outcome.rejected.len(),
        "review batch committed"
    );
    Ok(outcome)
}

/// Insert a single new review; a constraint failure is an error
pub fn insert_review_strict(conn: &Connection, review: &Review) -> Result<()> {
    write_review(conn, review, false).map_err(|e| {
        if is_constraint_violation(&e) {
            ReviewError::ConstraintViolation {
                review_id: review.review_id.clone(),
                reason: e.to_string(),
            }
        } else {
            ReviewError::Database(e)
        }
    })?;
    debug!(review_id = %review.review_id, "review inserted");
    Ok(())
}

fn review_from_row(row: &Row) -> rusqlite::Result<Review> {
    let date_str: String = row.get(4)?;
    let date = DateTime::parse_from_rfc3339(&date_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    let label: Option<String> = row.get(7)?;
    let word_count: Option<i64> = row.get(10)?;

    Ok(Review {
        review_id: row.get(0)?,
        bank_id: row.get(1)?,
        text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        rating: row.get(3)?,
        date,
        user_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        thumbs_up: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        sentiment_label: label.and_then(|l| l.parse::<SentimentLabel>().ok()),
        sentiment_score: row.get(8)?,
        primary_theme: row.get(9)?,
        word_count: u32::try_from(word_count.unwrap_or(0).max(0)).unwrap_or(u32::MAX),
    })
}

pub fn get_review(conn: &Connection, review_id: &str) -> Result<Option<Review>> {
    let sql = format!("SELECT {} FROM reviews WHERE review_id = ?1", REVIEW_COLUMNS);
    let review = conn.query_row(&sql, [review_id], review_from_row).optional()?;
    Ok(review)
}

pub fn get_reviews_by_bank(conn: &Connection, bank_id: &str) -> Result<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE bank_id = ?1 ORDER BY review_id",
        REVIEW_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let reviews = stmt
        .query_map([bank_id], review_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(reviews)
}

/// Full corpus snapshot, ordered by review_id
pub fn get_all_reviews(conn: &Connection) -> Result<Vec<Review>> {
    let sql = format!("SELECT {} FROM reviews ORDER BY review_id", REVIEW_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let reviews = stmt
        .query_map([], review_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(reviews)
}

pub fn count_reviews(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummaryRow {
    pub bank_id: String,
    pub label: String,
    pub count: i64,
    pub average_score: f64,
}

/// Review counts and mean score per bank and sentiment label
pub fn sentiment_summary(conn: &Connection) -> Result<Vec<SentimentSummaryRow>> {
    let mut stmt = conn.prepare(
        "SELECT bank_id, COALESCE(sentiment_label, 'UNSCORED'), COUNT(*),
                COALESCE(AVG(sentiment_score), 0.0)
         FROM reviews
         GROUP BY bank_id, sentiment_label
         ORDER BY bank_id, sentiment_label",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SentimentSummaryRow {
                bank_id: row.get(0)?,
                label: row.get(1)?,
                count: row.get(2)?,
                average_score: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSummaryRow {
    pub bank_id: String,
    pub theme: String,
    pub count: i64,
}

/// Review counts per bank and primary theme, most frequent first
pub fn theme_summary(conn: &Connection) -> Result<Vec<ThemeSummaryRow>> {
    let mut stmt = conn.prepare(
        "SELECT bank_id, primary_theme, COUNT(*) AS n
         FROM reviews
         WHERE primary_theme IS NOT NULL
         GROUP BY bank_id, primary_theme
         ORDER BY bank_id, n DESC, primary_theme",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ThemeSummaryRow {
                bank_id: row.get(0)?,
                theme: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use chrono::TimeZone;

    fn setup() -> Connection {
        let mut conn = open_database(":memory:").unwrap();
        setup_database(&conn).unwrap();
        let registry = BankRegistry::from_config(&AppConfig::default().banks);
        insert_banks(&mut conn, &registry).unwrap();
        conn
    }

    fn review(id: &str, bank: &str, rating: i64) -> Review {
        let date = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        Review::new(id, bank, "Transfers are fast and easy", rating, date, "Hana", 3)
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = open_database(":memory:").unwrap();

        let first = setup_database(&conn).unwrap();
        assert_eq!(first.created, vec!["banks", "reviews"]);
        assert!(first.existing.is_empty());

        let second = setup_database(&conn).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing, vec!["banks", "reviews"]);
    }

    #[test]
    fn test_insert_banks_twice() {
        let mut conn = setup();
        let registry = BankRegistry::from_config(&AppConfig::default().banks);

        assert_eq!(insert_banks(&mut conn, &registry).unwrap(), 3);

        let banks = get_all_banks(&conn).unwrap();
        assert_eq!(banks.len(), 3);
        let cbe = get_bank(&conn, "CBE").unwrap().unwrap();
        assert_eq!(cbe.bank_name, "Commercial Bank of Ethiopia");
        assert_eq!(cbe.app_name.as_deref(), Some("CBE"));
        assert_eq!(cbe.app_id.as_deref(), Some("com.cbe.mobile"));
    }

    #[test]
    fn test_review_round_trip() {
        let mut conn = setup();
        let mut original = review("r-1", "CBE", 5);
        original.set_sentiment(SentimentLabel::Positive, 0.8123);
        original.set_theme("Transaction Performance");

        upsert_reviews(&mut conn, &[original.clone()]).unwrap();
        let stored = get_review(&conn, "r-1").unwrap().unwrap();

        assert_eq!(stored, original);
    }

    #[test]
    fn test_rating_out_of_range_rejected() {
        let conn = setup();
        let result = insert_review_strict(&conn, &review("r-6", "CBE", 6));

        assert!(matches!(
            result,
            Err(ReviewError::ConstraintViolation { ref review_id, .. }) if review_id == "r-6"
        ));
        assert_eq!(count_reviews(&conn).unwrap(), 0);
    }

    #[test]
    fn test_unknown_bank_rejected() {
        let conn = setup();
        let result = insert_review_strict(&conn, &review("r-x", "NOPE", 4));
        assert!(matches!(result, Err(ReviewError::ConstraintViolation { .. })));
    }

    #[test]
    fn test_batch_isolates_bad_records() {
        let mut conn = setup();
        let batch = vec![
            review("r-1", "CBE", 4),
            review("r-2", "BOA", 0),
            review("r-3", "GHOST", 3),
            review("r-4", "DASHEN", 2),
        ];

        let outcome = upsert_reviews(&mut conn, &batch).unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.updated, 0);
        let rejected: Vec<&str> = outcome.rejected.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(rejected, vec!["r-2", "r-3"]);
        assert_eq!(count_reviews(&conn).unwrap(), 2);
    }

    #[test]
    fn test_reingestion_updates_instead_of_duplicating() {
        let mut conn = setup();
        upsert_reviews(&mut conn, &[review("r-1", "CBE", 4)]).unwrap();

        let mut again = review("r-1", "CBE", 4);
        again.set_sentiment(SentimentLabel::Negative, 0.4);
        let outcome = upsert_reviews(&mut conn, &[again]).unwrap();

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.updated, 1);
        assert_eq!(count_reviews(&conn).unwrap(), 1);
        let stored = get_review(&conn, "r-1").unwrap().unwrap();
        assert_eq!(stored.sentiment_label, Some(SentimentLabel::Negative));
    }

    #[test]
    fn test_update_without_theme_keeps_stored_theme() {
        let mut conn = setup();
        let mut themed = review("r-1", "CBE", 2);
        themed.set_theme("Transaction Performance");
        upsert_reviews(&mut conn, &[themed]).unwrap();

        // Theme stage skipped on the later run
        let mut unthemed = review("r-1", "CBE", 2);
        unthemed.set_sentiment(SentimentLabel::Negative, 0.8);
        upsert_reviews(&mut conn, &[unthemed]).unwrap();

        let stored = get_review(&conn, "r-1").unwrap().unwrap();
        assert_eq!(stored.primary_theme.as_deref(), Some("Transaction Performance"));
        assert_eq!(stored.sentiment_label, Some(SentimentLabel::Negative));
    }

    #[test]
    fn test_oversized_word_count_saturates() {
        let mut conn = setup();
        upsert_reviews(&mut conn, &[review("r-1", "CBE", 4)]).unwrap();
        conn.execute(
            "UPDATE reviews SET word_count = 5000000000 WHERE review_id = 'r-1'",
            [],
        )
        .unwrap();

        let stored = get_review(&conn, "r-1").unwrap().unwrap();
        assert_eq!(stored.word_count, u32::MAX);
    }

    #[test]
    fn test_queries_and_summaries() {
        let mut conn = setup();
        let mut a = review("a", "CBE", 5);
        a.set_sentiment(SentimentLabel::Positive, 0.9);
        a.set_theme("User Interface & Experience");
        let mut b = review("b", "CBE", 1);
        b.set_sentiment(SentimentLabel::Negative, 0.7);
        b.set_theme("Reliability & Bugs");
        let mut c = review("c", "BOA", 1);
        c.set_sentiment(SentimentLabel::Negative, 0.5);
        c.set_theme("Reliability & Bugs");
        upsert_reviews(&mut conn, &[a, b, c]).unwrap();

        assert_eq!(get_reviews_by_bank(&conn, "CBE").unwrap().len(), 2);
        let all: Vec<String> = get_all_reviews(&conn)
            .unwrap()
            .into_iter()
            .map(|r| r.review_id)
            .collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let summary = sentiment_summary(&conn).unwrap();
        assert_eq!(summary.len(), 3);
        let cbe_negative = summary
            .iter()
            .find(|r| r.bank_id == "CBE" && r.label == "NEGATIVE")
            .unwrap();
        assert_eq!(cbe_negative.count, 1);
        assert!((cbe_negative.average_score - 0.7).abs() < 1e-9);

        let themes = theme_summary(&conn).unwrap();
        assert_eq!(themes.len(), 3);
    }

    #[test]
    fn test_open_bad_path_is_connection_error() {
        let result = open_database("/nonexistent-dir/sub/reviews.db");
        assert!(matches!(result, Err(ReviewError::StorageConnection(_))));
    }
}
