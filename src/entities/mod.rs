// Entity Models
//
// Banks are immutable reference data created once at setup.
// Reviews carry their source fields plus the analysis results.

pub mod bank;
pub mod review;

pub use bank::{Bank, BankRegistry};
pub use review::{parse_review_date, word_count, RawReview, Review, SentimentLabel};
