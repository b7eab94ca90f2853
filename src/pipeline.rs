// 🔄 Pipeline - source → scorers → aggregator → themes → store
//
// Per-review scoring is independent, so it may be spread over worker
// threads. Theming needs the complete corpus: it runs on a snapshot taken
// after scoring, ordered by review_id so the same corpus always clusters
// the same way.

use crate::config::AnalysisConfig;
use crate::db::{self, BatchOutcome};
use crate::entities::{BankRegistry, Review, SentimentLabel};
use crate::error::Result;
use crate::logging::component_span;
use crate::sentiment::{
    AggregateSentiment, LexiconScorer, NeuralFirstMajority, NeuralScorer, PolarityScorer, Scorer,
    ScorerKind, ScorerResult, SentimentAggregator,
};
use crate::source::ReviewSource;
use crate::themes::{ThematicExtractor, ThemeModel};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{info, warn, Span};
use uuid::Uuid;

// ============================================================================
// ANALYZER
// ============================================================================

/// Every scorer's output for one text plus the reconciled decision
#[derive(Debug, Clone, Serialize)]
pub struct SentimentBreakdown {
    pub results: Vec<ScorerResult>,
    pub aggregate: AggregateSentiment,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub reviews: usize,
    pub labels: BTreeMap<SentimentLabel, usize>,
    pub themes: Vec<String>,
    /// Set when theming failed; sentiment results are still valid
    pub theme_error: Option<String>,
}

pub struct ReviewAnalyzer {
    scorers: Vec<Box<dyn Scorer>>,
    aggregator: SentimentAggregator,
    extractor: ThematicExtractor,
    workers: usize,
    span: Span,
}

impl ReviewAnalyzer {
    pub fn new(
        scorers: Vec<Box<dyn Scorer>>,
        aggregator: SentimentAggregator,
        extractor: ThematicExtractor,
    ) -> Self {
        ReviewAnalyzer {
            scorers,
            aggregator,
            extractor,
            workers: 1,
            span: component_span("review_analyzer"),
        }
    }

    /// Full ensemble. A missing or broken neural model only disables that scorer.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let neural = NeuralScorer::load(config.neural_model_path.as_deref().map(Path::new))
            .with_max_chars(config.max_neural_chars)
            .with_timeout(config.neural_timeout());

        let scorers: Vec<Box<dyn Scorer>> = vec![
            Box::new(neural),
            Box::new(LexiconScorer::new()),
            Box::new(PolarityScorer::new()),
        ];
        let aggregator = SentimentAggregator::new(Box::new(NeuralFirstMajority::new(
            config.neural_confidence_floor,
        )));

        ReviewAnalyzer::new(scorers, aggregator, ThematicExtractor::new(config.theme_clusters))
            .with_workers(config.workers)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Kinds of the scorers that loaded successfully
    pub fn available_scorers(&self) -> Vec<ScorerKind> {
        self.scorers
            .iter()
            .filter(|s| s.is_available())
            .map(|s| s.kind())
            .collect()
    }

    pub fn score_text(&self, text: &str) -> SentimentBreakdown {
        // All scorers finish (or fall back) before reconciliation
        let results: Vec<ScorerResult> = self.scorers.iter().map(|s| s.score(text)).collect();
        let aggregate = self.aggregator.aggregate(&results);
        SentimentBreakdown { results, aggregate }
    }

    pub fn analyze_review(&self, review: &mut Review) {
        let decision = self.score_text(&review.text).aggregate;
        review.set_sentiment(decision.label, decision.score);
    }

    /// Score every review; results do not depend on the worker count
    pub fn analyze_sentiment(&self, reviews: &mut [Review]) {
        let _guard = self.span.enter();
        if reviews.is_empty() {
            return;
        }

        if self.workers <= 1 || reviews.len() < 2 {
            reviews.iter_mut().for_each(|r| self.analyze_review(r));
        } else {
            let chunk_size = reviews.len().div_ceil(self.workers);
            thread::scope(|scope| {
                for chunk in reviews.chunks_mut(chunk_size) {
                    scope.spawn(move || chunk.iter_mut().for_each(|r| self.analyze_review(r)));
                }
            });
        }

        info!(reviews = reviews.len(), workers = self.workers, "sentiment scored");
    }

    /// Cluster the corpus and set each review's primary theme.
    /// On error no review is touched.
    pub fn assign_themes(&self, reviews: &mut [Review]) -> Result<ThemeModel> {
        let mut order: Vec<usize> = (0..reviews.len()).collect();
        order.sort_by(|&a, &b| reviews[a].review_id.cmp(&reviews[b].review_id));

        let snapshot: Vec<String> = order.iter().map(|&i| reviews[i].text.clone()).collect();
        let documents: Vec<&str> = snapshot.iter().map(String::as_str).collect();
        let model = self.extractor.extract(&documents)?;

        for (position, &index) in order.iter().enumerate() {
            if let Some(label) = model.label_for(position) {
                reviews[index].set_theme(label);
            }
        }
        Ok(model)
    }

    /// Sentiment for every review, then themes over the whole batch.
    /// A theming failure is reported but does not undo sentiment.
    pub fn analyze_all(&self, reviews: &mut [Review]) -> AnalysisReport {
        self.analyze_sentiment(reviews);

        let mut report = AnalysisReport {
            reviews: reviews.len(),
            ..AnalysisReport::default()
        };
        for review in reviews.iter() {
            if let Some(label) = review.sentiment_label {
                *report.labels.entry(label).or_insert(0) += 1;
            }
        }

        match self.assign_themes(reviews) {
            Ok(model) => report.themes = model.labels(),
            Err(e) => {
                let _guard = self.span.enter();
                warn!(error = %e, "theme extraction skipped");
                report.theme_error = Some(e.to_string());
            }
        }
        report
    }
}

// ============================================================================
// INGESTION RUN
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct BankIngestion {
    pub bank_id: String,
    pub fetched: usize,
    /// Records dropped before storage (unparseable date)
    pub skipped: usize,
    pub fetch_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionSummary {
    pub run_id: String,
    pub banks: Vec<BankIngestion>,
    pub analysis: AnalysisReport,
    pub stored: BatchOutcome,
}

/// One pass over the configured banks: fetch, analyze, store
pub struct IngestionRun<'a> {
    registry: &'a BankRegistry,
    source: &'a dyn ReviewSource,
    analyzer: &'a ReviewAnalyzer,
    max_per_bank: usize,
    delay: Duration,
}

impl<'a> IngestionRun<'a> {
    pub fn new(
        registry: &'a BankRegistry,
        source: &'a dyn ReviewSource,
        analyzer: &'a ReviewAnalyzer,
    ) -> Self {
        IngestionRun {
            registry,
            source,
            analyzer,
            max_per_bank: 400,
            delay: Duration::from_secs(1),
        }
    }

    pub fn with_limits(mut self, max_per_bank: usize, delay: Duration) -> Self {
        self.max_per_bank = max_per_bank;
        self.delay = delay;
        self
    }

    /// A failed fetch skips that bank; a storage failure ends the run.
    pub fn run(&self, conn: &mut Connection) -> Result<IngestionSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("ingestion", run_id = %run_id);
        let _guard = span.enter();

        info!(source = %self.source.describe(), banks = self.registry.count(), "ingestion started");

        let mut summary = IngestionSummary {
            run_id,
            ..IngestionSummary::default()
        };
        let mut batches: Vec<(String, Vec<Review>)> = Vec::new();

        for (i, bank) in self.registry.all_banks().into_iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }

            let mut status = BankIngestion {
                bank_id: bank.bank_id.clone(),
                ..BankIngestion::default()
            };

            let raw = match self.source.fetch(bank, self.max_per_bank) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        bank = %bank.bank_id,
                        error = %e,
                        "fetch failed, continuing with next bank"
                    );
                    status.fetch_error = Some(e.to_string());
                    summary.banks.push(status);
                    continue;
                }
            };
            status.fetched = raw.len();

            let mut reviews = Vec::with_capacity(raw.len());
            for record in raw.iter().take(self.max_per_bank) {
                match Review::from_raw(record) {
                    Ok(review) => reviews.push(review),
                    Err(e) => {
                        warn!(review_id = %record.review_id, error = %e, "review skipped");
                        status.skipped += 1;
                    }
                }
            }

            summary.banks.push(status);
            batches.push((bank.bank_id.clone(), reviews));
        }

        // Theming needs the whole corpus, so analyze across banks at once
        let mut corpus: Vec<Review> = Vec::new();
        let mut bounds: Vec<(String, usize, usize)> = Vec::new();
        for (bank_id, reviews) in batches {
            let start = corpus.len();
            corpus.extend(reviews);
            bounds.push((bank_id, start, corpus.len()));
        }
        summary.analysis = self.analyzer.analyze_all(&mut corpus);

        // One committed batch per bank
        for (bank_id, start, end) in bounds {
            let outcome = db::upsert_reviews(conn, &corpus[start..end])?;
            info!(
                bank = %bank_id,
                written = outcome.written(),
                rejected = outcome.rejected.len(),
                "bank stored"
            );
            summary.stored.merge(outcome);
        }

        info!(
            reviews = corpus.len(),
            inserted = summary.stored.inserted,
            updated = summary.stored.updated,
            rejected = summary.stored.rejected.len(),
            "ingestion finished"
        );
        Ok(summary)
    }
}

/// Re-score and re-theme everything already in the store
pub fn reanalyze_store(
    conn: &mut Connection,
    analyzer: &ReviewAnalyzer,
) -> Result<(AnalysisReport, BatchOutcome)> {
    let mut snapshot = db::get_all_reviews(conn)?;
    let report = analyzer.analyze_all(&mut snapshot);
    let outcome = db::upsert_reviews(conn, &snapshot)?;
    Ok((report, outcome))
}

// ============================================================================
// TESTS
// ============================================================================
