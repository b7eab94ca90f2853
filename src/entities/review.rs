// 📝 Review Entity - one app-store review plus the signals computed for it
//
// `review_id` is the natural key (dedup key across re-ingestion).
// Source fields are immutable; the analysis fields are filled in by the
// sentiment and theme stages.

use crate::error::{Result, ReviewError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SENTIMENT LABEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POSITIVE",
            SentimentLabel::Negative => "NEGATIVE",
            SentimentLabel::Neutral => "NEUTRAL",
        }
    }

    pub fn all() -> [SentimentLabel; 3] {
        [
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Neutral,
        ]
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "POSITIVE" | "POS" | "LABEL_1" => Ok(SentimentLabel::Positive),
            "NEGATIVE" | "NEG" | "LABEL_0" => Ok(SentimentLabel::Negative),
            "NEUTRAL" | "NEU" => Ok(SentimentLabel::Neutral),
            other => Err(ReviewError::InvalidRecord(format!(
                "unknown sentiment label: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// RAW REVIEW (as delivered by a data source)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub review_id: String,
    pub bank_id: String,
    pub text: String,
    pub rating: i64,
    pub date: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub thumbs_up: i64,
}

// ============================================================================
// REVIEW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub bank_id: String,
    pub text: String,
    /// 1-5 stars; the store rejects anything else
    pub rating: i64,
    pub date: DateTime<Utc>,
    pub user_name: String,
    pub thumbs_up: i64,

    // Analysis fields
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub primary_theme: Option<String>,
    pub word_count: u32,
}

impl Review {
    pub fn new(
        review_id: &str,
        bank_id: &str,
        text: &str,
        rating: i64,
        date: DateTime<Utc>,
        user_name: &str,
        thumbs_up: i64,
    ) -> Self {
        Review {
            review_id: review_id.to_string(),
            bank_id: bank_id.to_string(),
            text: text.to_string(),
            rating,
            date,
            user_name: user_name.to_string(),
            thumbs_up,
            sentiment_label: None,
            sentiment_score: None,
            primary_theme: None,
            word_count: word_count(text),
        }
    }

    /// Convert a source record; the date must parse
    pub fn from_raw(raw: &RawReview) -> Result<Self> {
        let date = parse_review_date(&raw.date)?;
        Ok(Review::new(
            &raw.review_id,
            &raw.bank_id,
            &raw.text,
            raw.rating,
            date,
            &raw.user_name,
            raw.thumbs_up.max(0),
        ))
    }

    pub fn set_sentiment(&mut self, label: SentimentLabel, score: f64) {
        self.sentiment_label = Some(label);
        self.sentiment_score = Some(score.clamp(0.0, 1.0));
    }

    pub fn set_theme(&mut self, theme: &str) {
        self.primary_theme = Some(theme.to_string());
    }

    pub fn is_analyzed(&self) -> bool {
        self.sentiment_label.is_some() && self.sentiment_score.is_some()
    }
}

/// Whitespace-separated token count
pub fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Accepts RFC 3339, "YYYY-MM-DD HH:MM:SS" and plain "YYYY-MM-DD"
pub fn parse_review_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(ReviewError::InvalidRecord(format!(
        "unparseable review date: {:?}",
        value
    )))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_label_round_trip_strings() {
        for label in SentimentLabel::all() {
            assert_eq!(label.as_str().parse::<SentimentLabel>().unwrap(), label);
        }
        assert_eq!("negative".parse::<SentimentLabel>().unwrap(), SentimentLabel::Negative);
        assert!(matches!(
            "MIXED".parse::<SentimentLabel>(),
            Err(ReviewError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   "), 0);
        assert_eq!(word_count("Great app,  very fast\n transfers"), 5);
    }

    #[test]
    fn test_parse_review_date_formats() {
        let rfc = parse_review_date("2024-03-05T10:20:30Z").unwrap();
        assert_eq!(rfc.hour(), 10);

        let sql = parse_review_date("2024-03-05 10:20:30").unwrap();
        assert_eq!(sql, rfc);

        let day = parse_review_date("2024-03-05").unwrap();
        assert_eq!(day.day(), 5);
        assert_eq!(day.hour(), 0);

        assert!(matches!(
            parse_review_date("05/03/2024"),
            Err(ReviewError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_from_raw() {
        let raw = RawReview {
            review_id: "r1".to_string(),
            bank_id: "CBE".to_string(),
            text: "Works well most of the time".to_string(),
            rating: 4,
            date: "2024-01-02".to_string(),
            user_name: "Abebe".to_string(),
            thumbs_up: -3,
        };

        let review = Review::from_raw(&raw).unwrap();
        assert_eq!(review.word_count, 6);
        assert_eq!(review.thumbs_up, 0);
        assert!(!review.is_analyzed());
    }

    #[test]
    fn test_set_sentiment_clamps_score() {
        let mut review = Review::new("r1", "CBE", "ok", 3, Utc::now(), "u", 0);
        review.set_sentiment(SentimentLabel::Positive, 1.7);

        assert_eq!(review.sentiment_score, Some(1.0));
        assert!(review.is_analyzed());
    }
}
