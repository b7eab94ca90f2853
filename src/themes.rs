// 🗂️ Thematic Extractor - TF-IDF + K-means over the review corpus
//
// Batch only: the extractor needs the complete corpus snapshot before it
// starts. Steps:
//   1. tokenize, drop stop words, build a TF-IDF matrix (L2-normalized rows)
//   2. K-means with deterministic farthest-point seeding
//   3. name every cluster from its top-weighted centroid terms
//   4. every review gets the name of the cluster it belongs to
//
// A corpus smaller than K is an error (InsufficientData), never a set of
// empty clusters.

use crate::error::{Result, ReviewError};
use crate::logging::component_span;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, Span};

/// Width of the `primary_theme` column
pub const MAX_THEME_LABEL_CHARS: usize = 50;
const FALLBACK_THEME: &str = "General Feedback";

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "been", "this", "that", "with", "they", "from", "your",
    "what", "when", "will", "would", "there", "their", "them", "then", "than", "these", "those",
    "its", "it's", "into", "just", "also", "very", "really", "more", "most", "some", "such",
    "only", "own", "same", "too", "can't", "don't", "didn't", "doesn't", "isn't", "why", "how",
    "who", "which", "while", "where", "again", "about", "after", "before", "because", "being",
    "both", "each", "few", "other", "over", "under", "until", "does", "did", "doing", "should",
    "could", "were", "him", "his", "she", "yours", "ours", "here", "off", "once", "now", "get",
    "got", "even", "still", "every", "app", "application", "bank", "use", "using", "used",
];

// ============================================================================
// THEME CATALOG
// ============================================================================

/// Named domain theme and the terms that point to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeDefinition {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Maps cluster vocabularies onto human-readable theme names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeCatalog {
    pub themes: Vec<ThemeDefinition>,
}

impl ThemeCatalog {
    pub fn empty() -> Self {
        ThemeCatalog { themes: Vec::new() }
    }

    /// Mobile-banking themes
    pub fn banking() -> Self {
        let theme = |name: &str, keywords: &[&str]| ThemeDefinition {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };

        ThemeCatalog {
            themes: vec![
                theme(
                    "Account Access Issues",
                    &[
                        "login",
                        "password",
                        "pin",
                        "otp",
                        "account",
                        "access",
                        "register",
                        "verification",
                        "blocked",
                        "sign",
                    ],
                ),
                theme(
                    "Transaction Performance",
                    &[
                        "transfer",
                        "transaction",
                        "payment",
                        "money",
                        "send",
                        "balance",
                        "slow",
                        "fast",
                        "speed",
                        "pending",
                    ],
                ),
                theme(
                    "User Interface & Experience",
                    &[
                        "interface",
                        "design",
                        "easy",
                        "simple",
                        "ui",
                        "navigation",
                        "look",
                        "friendly",
                        "beautiful",
                        "layout",
                    ],
                ),
                theme(
                    "Customer Support",
                    &[
                        "support",
                        "service",
                        "customer",
                        "help",
                        "call",
                        "branch",
                        "staff",
                        "response",
                        "contact",
                    ],
                ),
                theme(
                    "Reliability & Bugs",
                    &[
                        "crash",
                        "crashes",
                        "bug",
                        "bugs",
                        "error",
                        "update",
                        "network",
                        "connection",
                        "working",
                        "freeze",
                        "server",
                    ],
                ),
                theme(
                    "Feature Requests",
                    &[
                        "feature",
                        "add",
                        "option",
                        "need",
                        "wish",
                        "should",
                        "please",
                        "airtime",
                        "statement",
                        "notification",
                    ],
                ),
            ],
        }
    }

    /// Best theme for weighted terms, if any term hits a keyword
    fn best_match(&self, weighted_terms: &[(String, f64)]) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for theme in &self.themes {
            let score: f64 = weighted_terms
                .iter()
                .filter(|(term, _)| theme.keywords.iter().any(|k| k == term))
                .map(|(_, weight)| weight)
                .sum();
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((theme.name.as_str(), score));
            }
        }
        best.map(|(name, _)| name)
    }
}

impl Default for ThemeCatalog {
    fn default() -> Self {
        ThemeCatalog::banking()
    }
}

// ============================================================================
// TF-IDF
// ============================================================================

/// Sparse row: (term index, weight), sorted by index
pub type SparseVector = Vec<(usize, f64)>;

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    pub max_features: usize,
}

#[derive(Debug, Clone)]
pub struct TfIdfMatrix {
    pub vocabulary: Vec<String>,
    pub rows: Vec<SparseVector>,
}

impl TfIdfVectorizer {
    pub fn new(max_features: usize) -> Self {
        TfIdfVectorizer { max_features }
    }

    /// Vocabulary = most frequent terms by document frequency (ties alphabetical)
    pub fn fit_transform(&self, documents: &[&str]) -> TfIdfMatrix {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = document_frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);
        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        let n = documents.len() as f64;
        let vocabulary: Vec<String> = ranked.iter().map(|(t, _)| t.to_string()).collect();
        let index: HashMap<&str, usize> =
            ranked.iter().enumerate().map(|(i, (t, _))| (*t, i)).collect();
        let idf: Vec<f64> = ranked
            .iter()
            .map(|(_, df)| ((1.0 + n) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();

        let rows = tokenized
            .iter()
            .map(|tokens| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for token in tokens {
                    if let Some(&i) = index.get(token.as_str()) {
                        *counts.entry(i).or_insert(0.0) += 1.0;
                    }
                }
                let mut row: SparseVector =
                    counts.into_iter().map(|(i, tf)| (i, tf * idf[i])).collect();
                let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, w) in row.iter_mut() {
                        *w /= norm;
                    }
                }
                row
            })
            .collect();

        TfIdfMatrix { vocabulary, rows }
    }
}

// ============================================================================
// K-MEANS
// ============================================================================

fn squared_norm(row: &SparseVector) -> f64 {
    row.iter().map(|(_, w)| w * w).sum()
}

fn squared_distance(
    row: &SparseVector,
    row_norm: f64,
    centroid: &[f64],
    centroid_norm: f64,
) -> f64 {
    let dot: f64 = row.iter().map(|(i, w)| w * centroid[*i]).sum();
    (row_norm - 2.0 * dot + centroid_norm).max(0.0)
}

fn densify(row: &SparseVector, dim: usize) -> Vec<f64> {
    let mut dense = vec![0.0; dim];
    for (i, w) in row {
        dense[*i] = *w;
    }
    dense
}

/// Deterministic K-means; every cluster ends with at least one member
pub struct KMeans {
    pub clusters: usize,
    pub max_iterations: usize,
}

pub struct KMeansResult {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
}

impl KMeans {
    pub fn fit(&self, rows: &[SparseVector], dim: usize) -> Result<KMeansResult> {
        let k = self.clusters;
        if k == 0 || rows.len() < k {
            return Err(ReviewError::InsufficientData {
                corpus: rows.len(),
                clusters: k,
            });
        }

        let norms: Vec<f64> = rows.iter().map(squared_norm).collect();
        let mut centroids = self.seed(rows, &norms, dim);
        let mut assignments = vec![usize::MAX; rows.len()];
        let max_iterations = self.max_iterations.max(1);
        let mut iterations = 0;

        while iterations < max_iterations {
            iterations += 1;
            let centroid_norms: Vec<f64> =
                centroids.iter().map(|c| c.iter().map(|x| x * x).sum()).collect();

            let mut changed = false;
            for (i, row) in rows.iter().enumerate() {
                let nearest = nearest_centroid(row, norms[i], &centroids, &centroid_norms);
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }

            if !changed {
                break;
            }

            for (c, centroid) in centroids.iter_mut().enumerate() {
                if let Some(mean) = mean_of(rows, &assignments, c, dim) {
                    *centroid = mean;
                }
            }
        }

        repair_empty_clusters(rows, &norms, &mut assignments, &mut centroids, dim);

        Ok(KMeansResult {
            assignments,
            centroids,
            iterations,
        })
    }

    /// First row, then repeatedly the row farthest from all chosen seeds
    fn seed(&self, rows: &[SparseVector], norms: &[f64], dim: usize) -> Vec<Vec<f64>> {
        let mut chosen = vec![0usize];
        let mut centroids = vec![densify(&rows[0], dim)];
        let mut closest: Vec<f64> = vec![f64::INFINITY; rows.len()];

        while centroids.len() < self.clusters {
            let Some(last) = centroids.last() else { break };
            let last_norm: f64 = last.iter().map(|x| x * x).sum();
            for (i, row) in rows.iter().enumerate() {
                let d = squared_distance(row, norms[i], last, last_norm);
                if d < closest[i] {
                    closest[i] = d;
                }
            }

            let mut next: Option<(usize, f64)> = None;
            for (i, &d) in closest.iter().enumerate() {
                if chosen.contains(&i) {
                    continue;
                }
                if next.map_or(true, |(_, best)| d > best) {
                    next = Some((i, d));
                }
            }

            let Some((index, _)) = next else { break };
            chosen.push(index);
            centroids.push(densify(&rows[index], dim));
        }

        centroids
    }
}

fn nearest_centroid(
    row: &SparseVector,
    row_norm: f64,
    centroids: &[Vec<f64>],
    centroid_norms: &[f64],
) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(row, row_norm, centroid, centroid_norms[c]);
        if d < best_distance {
            best = c;
            best_distance = d;
        }
    }
    best
}

fn mean_of(
    rows: &[SparseVector],
    assignments: &[usize],
    cluster: usize,
    dim: usize,
) -> Option<Vec<f64>> {
    let mut sum = vec![0.0; dim];
    let mut count = 0usize;
    for (row, _) in rows.iter().zip(assignments).filter(|(_, a)| **a == cluster) {
        for (i, w) in row {
            sum[*i] += w;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for x in sum.iter_mut() {
        *x /= count as f64;
    }
    Some(sum)
}

/// Move the worst-fitting member of the largest cluster into each empty one
fn repair_empty_clusters(
    rows: &[SparseVector],
    norms: &[f64],
    assignments: &mut [usize],
    centroids: &mut [Vec<f64>],
    dim: usize,
) {
    loop {
        let mut sizes = vec![0usize; centroids.len()];
        for &a in assignments.iter() {
            sizes[a] += 1;
        }

        let Some(empty) = sizes.iter().position(|&s| s == 0) else {
            return;
        };
        let donor = (0..sizes.len())
            .max_by(|&a, &b| sizes[a].cmp(&sizes[b]).then(b.cmp(&a)))
            .unwrap_or(0);
        if sizes[donor] < 2 {
            return;
        }

        let donor_norm: f64 = centroids[donor].iter().map(|x| x * x).sum();
        let mut moved: Option<(usize, f64)> = None;
        for (i, row) in rows.iter().enumerate() {
            if assignments[i] != donor {
                continue;
            }
            let d = squared_distance(row, norms[i], &centroids[donor], donor_norm);
            if moved.map_or(true, |(_, best)| d > best) {
                moved = Some((i, d));
            }
        }
        let Some((index, _)) = moved else { return };

        assignments[index] = empty;
        centroids[empty] = densify(&rows[index], dim);
        if let Some(mean) = mean_of(rows, assignments, donor, dim) {
            centroids[donor] = mean;
        }
    }
}

// ============================================================================
// THEME MODEL
// ============================================================================

/// One derived cluster; recomputed every analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeCluster {
    pub id: usize,
    pub name: String,
    pub top_terms: Vec<String>,
    pub centroid: Vec<f64>,
    /// Indices into the corpus passed to `extract`
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeModel {
    pub clusters: Vec<ThemeCluster>,
    /// Cluster id per document, in corpus order
    pub assignments: Vec<usize>,
    pub vocabulary: Vec<String>,
}

impl ThemeModel {
    pub fn label_for(&self, document: usize) -> Option<&str> {
        self.assignments
            .get(document)
            .and_then(|&c| self.clusters.get(c))
            .map(|cluster| cluster.name.as_str())
    }

    pub fn labels(&self) -> Vec<String> {
        self.clusters.iter().map(|c| c.name.clone()).collect()
    }
}

// ============================================================================
// THEMATIC EXTRACTOR
// ============================================================================

pub struct ThematicExtractor {
    pub clusters: usize,
    pub max_features: usize,
    pub max_iterations: usize,
    pub top_terms: usize,
    pub catalog: ThemeCatalog,
    span: Span,
}

impl ThematicExtractor {
    pub fn new(clusters: usize) -> Self {
        ThematicExtractor {
            clusters,
            max_features: 1000,
            max_iterations: 100,
            top_terms: 10,
            catalog: ThemeCatalog::banking(),
            span: component_span("thematic_extractor"),
        }
    }

    pub fn with_catalog(mut self, catalog: ThemeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Cluster the corpus and name the clusters
    pub fn extract(&self, documents: &[&str]) -> Result<ThemeModel> {
        let _guard = self.span.enter();

        if documents.len() < self.clusters || self.clusters == 0 {
            return Err(ReviewError::InsufficientData {
                corpus: documents.len(),
                clusters: self.clusters,
            });
        }

        let matrix = TfIdfVectorizer::new(self.max_features).fit_transform(documents);
        let dim = matrix.vocabulary.len();

        let kmeans = KMeans {
            clusters: self.clusters,
            max_iterations: self.max_iterations,
        };
        let fitted = kmeans.fit(&matrix.rows, dim)?;

        let mut used_names: HashSet<String> = HashSet::new();
        let mut clusters = Vec::with_capacity(self.clusters);
        for (id, centroid) in fitted.centroids.into_iter().enumerate() {
            let weighted = top_weighted_terms(&centroid, &matrix.vocabulary, self.top_terms);
            let name = unique_name(self.name_cluster(&weighted), &mut used_names);
            let members = fitted
                .assignments
                .iter()
                .enumerate()
                .filter(|(_, a)| **a == id)
                .map(|(i, _)| i)
                .collect();

            clusters.push(ThemeCluster {
                id,
                name,
                top_terms: weighted.into_iter().map(|(t, _)| t).collect(),
                centroid,
                members,
            });
        }

        info!(
            documents = documents.len(),
            clusters = clusters.len(),
            vocabulary = dim,
            iterations = fitted.iterations,
            "extracted themes"
        );

        Ok(ThemeModel {
            clusters,
            assignments: fitted.assignments,
            vocabulary: matrix.vocabulary,
        })
    }

    fn name_cluster(&self, weighted: &[(String, f64)]) -> String {
        if let Some(name) = self.catalog.best_match(weighted) {
            return name.to_string();
        }
        if weighted.is_empty() {
            return FALLBACK_THEME.to_string();
        }
        weighted
            .iter()
            .take(3)
            .map(|(t, _)| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn top_weighted_terms(centroid: &[f64], vocabulary: &[String], n: usize) -> Vec<(String, f64)> {
    let mut weighted: Vec<(usize, f64)> = centroid
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0.0)
        .map(|(i, w)| (i, *w))
        .collect();
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    weighted
        .into_iter()
        .take(n)
        .map(|(i, w)| (vocabulary[i].clone(), w))
        .collect()
}

fn truncate_label(label: &str, max_chars: usize) -> String {
    label.chars().take(max_chars).collect()
}

/// Keeps the K labels distinct and within the column width
fn unique_name(base: String, used: &mut HashSet<String>) -> String {
    let mut candidate = truncate_label(&base, MAX_THEME_LABEL_CHARS);
    let mut n = 2;
    while used.contains(&candidate) {
        let suffix = format!(" ({})", n);
        let room = MAX_THEME_LABEL_CHARS.saturating_sub(suffix.chars().count());
        candidate = format!("{}{}", truncate_label(&base, room), suffix);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "Cannot login, password reset and OTP never arrive",
            "Login fails every time, my account is blocked after the OTP",
            "Transfer is slow, money transfer pending for hours",
            "Every transaction takes forever, transfer speed is terrible",
            "The app crashes after the update, constant crashes",
            "Crashes on startup since the last update, full of bugs",
        ]
    }

    #[test]
    fn test_tokenize_filters_noise() {
        let tokens = tokenize("The APP is great!! 2024 ok it's fast");
        assert_eq!(tokens, vec!["great", "fast"]);
    }

    #[test]
    fn test_tfidf_rows_are_normalized() {
        let matrix = TfIdfVectorizer::new(1000).fit_transform(&corpus());

        assert_eq!(matrix.rows.len(), 6);
        for row in &matrix.rows {
            let norm = squared_norm(row).sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
        assert!(matrix.vocabulary.contains(&"transfer".to_string()));
        assert!(!matrix.vocabulary.contains(&"the".to_string()));
    }

    #[test]
    fn test_vocabulary_cap() {
        let matrix = TfIdfVectorizer::new(3).fit_transform(&corpus());
        assert_eq!(matrix.vocabulary.len(), 3);
    }

    #[test]
    fn test_insufficient_data() {
        let extractor = ThematicExtractor::new(5);
        let result = extractor.extract(&["one review", "another review"]);
        assert!(matches!(
            result,
            Err(ReviewError::InsufficientData { corpus: 2, clusters: 5 })
        ));

        assert!(matches!(
            extractor.extract(&[]),
            Err(ReviewError::InsufficientData { corpus: 0, .. })
        ));
    }

    #[test]
    fn test_every_review_gets_one_theme_and_no_cluster_is_empty() {
        let docs = corpus();
        let model = ThematicExtractor::new(3).extract(&docs).unwrap();

        assert_eq!(model.assignments.len(), docs.len());
        assert_eq!(model.clusters.len(), 3);
        for cluster in &model.clusters {
            assert!(!cluster.members.is_empty(), "empty cluster {}", cluster.name);
        }
        for i in 0..docs.len() {
            assert!(model.label_for(i).is_some());
        }
    }

    #[test]
    fn test_separable_corpus_groups_by_topic() {
        let model = ThematicExtractor::new(3).extract(&corpus()).unwrap();

        assert_eq!(model.assignments[0], model.assignments[1]);
        assert_eq!(model.assignments[2], model.assignments[3]);
        assert_eq!(model.assignments[4], model.assignments[5]);
        assert_ne!(model.assignments[0], model.assignments[2]);
        assert_ne!(model.assignments[2], model.assignments[4]);

        assert_eq!(model.label_for(0), Some("Account Access Issues"));
        assert_eq!(model.label_for(2), Some("Transaction Performance"));
        assert_eq!(model.label_for(4), Some("Reliability & Bugs"));
    }

    #[test]
    fn test_identical_documents_still_fill_all_clusters() {
        let docs = vec!["same text here"; 4];
        let model = ThematicExtractor::new(3).extract(&docs).unwrap();

        for cluster in &model.clusters {
            assert!(!cluster.members.is_empty());
        }
        let labels: HashSet<String> = model.labels().into_iter().collect();
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_empty_documents_use_fallback_theme() {
        let docs = vec!["", "!!", "ok"];
        let model = ThematicExtractor::new(1).extract(&docs).unwrap();
        assert_eq!(model.label_for(0), Some(FALLBACK_THEME));
    }

    #[test]
    fn test_unmatched_cluster_uses_top_terms() {
        let docs = vec!["zebra giraffe lion", "zebra giraffe tiger"];
        let model = ThematicExtractor::new(1)
            .with_catalog(ThemeCatalog::empty())
            .extract(&docs)
            .unwrap();

        let label = model.label_for(0).unwrap();
        assert!(label.starts_with("giraffe, zebra"));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let docs = corpus();
        let first = ThematicExtractor::new(3).extract(&docs).unwrap();
        let second = ThematicExtractor::new(3).extract(&docs).unwrap();

        assert_eq!(first.assignments, second.assignments);
        assert_eq!(first.labels(), second.labels());
    }

    #[test]
    fn test_unique_name_truncates_and_suffixes() {
        let mut used = HashSet::new();
        let long = "x".repeat(80);

        let first = unique_name(long.clone(), &mut used);
        let second = unique_name(long, &mut used);

        assert_eq!(first.chars().count(), MAX_THEME_LABEL_CHARS);
        assert!(second.ends_with(" (2)"));
        assert_eq!(second.chars().count(), MAX_THEME_LABEL_CHARS);
    }
}
