// ⚙️ Configuration - bank registry, storage, scraping and analysis settings
//
// Loaded from an optional TOML file, then overridden from the environment.
// Every section has defaults so a missing file still yields a usable config.

use crate::error::{Result, ReviewError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// SECTIONS
// ============================================================================

/// One entry of the static bank registry (keyed by bank code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankEntry {
    pub name: String,
    pub app_id: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path, or ":memory:"
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "reviews.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub max_reviews_per_bank: usize,
    /// Seconds to wait between two source requests
    pub delay_between_requests: u64,
    pub language: String,
    pub country: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        ScrapingConfig {
            max_reviews_per_bank: 400,
            delay_between_requests: 1,
            language: "en".to_string(),
            country: "et".to_string(),
        }
    }
}

impl ScrapingConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.delay_between_requests)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of theme clusters (K)
    pub theme_clusters: usize,
    /// JSON classifier artifact or ONNX model directory; disabled when unset
    pub neural_model_path: Option<String>,
    pub neural_confidence_floor: f64,
    pub neural_timeout_ms: u64,
    pub max_neural_chars: usize,
    /// Worker threads used for per-review scoring
    pub workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            theme_clusters: 5,
            neural_model_path: None,
            neural_confidence_floor: 0.6,
            neural_timeout_ms: 2000,
            max_neural_chars: 512,
            workers: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn neural_timeout(&self) -> Duration {
        Duration::from_millis(self.neural_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub banks: BTreeMap<String, BankEntry>,
    pub database: DatabaseConfig,
    pub scraping: ScrapingConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            banks: default_banks(),
            database: DatabaseConfig::default(),
            scraping: ScrapingConfig::default(),
            analysis: AnalysisConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_banks() -> BTreeMap<String, BankEntry> {
    let mut banks = BTreeMap::new();
    banks.insert(
        "CBE".to_string(),
        BankEntry {
            name: "Commercial Bank of Ethiopia".to_string(),
            app_id: "com.cbe.mobile".to_string(),
            full_name: "CBE Mobile Banking".to_string(),
        },
    );
    banks.insert(
        "BOA".to_string(),
        BankEntry {
            name: "Bank of Abyssinia".to_string(),
            app_id: "com.boa.mobile".to_string(),
            full_name: "BOA Mobile Banking".to_string(),
        },
    );
    banks.insert(
        "DASHEN".to_string(),
        BankEntry {
            name: "Dashen Bank".to_string(),
            app_id: "com.dashen.mobile".to_string(),
            full_name: "Dashen Mobile Banking".to_string(),
        },
    );
    banks
}

impl AppConfig {
    /// Load from `path` if it exists, apply environment overrides, validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            Self::from_toml(&raw)?
        } else {
            AppConfig::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(raw)?;
        if config.banks.is_empty() {
            config.banks = default_banks();
        }
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("REVIEWS_DB_PATH") {
            self.database.path = path;
        }
        if let Some(value) = lookup("MAX_REVIEWS_PER_BANK") {
            self.scraping.max_reviews_per_bank = parse_number("MAX_REVIEWS_PER_BANK", &value)?;
        }
        if let Some(value) = lookup("DELAY_BETWEEN_REQUESTS") {
            self.scraping.delay_between_requests =
                parse_number("DELAY_BETWEEN_REQUESTS", &value)?;
        }
        if let Some(value) = lookup("THEME_CLUSTERS") {
            self.analysis.theme_clusters = parse_number("THEME_CLUSTERS", &value)?;
        }
        if let Some(path) = lookup("NEURAL_MODEL_PATH") {
            self.analysis.neural_model_path = Some(path);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.banks.is_empty() {
            return Err(ReviewError::Config("bank registry is empty".to_string()));
        }
        if self.analysis.theme_clusters == 0 {
            return Err(ReviewError::Config(
                "theme_clusters must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.neural_confidence_floor) {
            return Err(ReviewError::Config(format!(
                "neural_confidence_floor must be within [0, 1], got {}",
                self.analysis.neural_confidence_floor
            )));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ReviewError::Config(format!("{} is not a valid number: {:?}", key, value)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.banks.len(), 3);
        assert_eq!(config.banks["CBE"].app_id, "com.cbe.mobile");
        assert_eq!(config.scraping.max_reviews_per_bank, 400);
        assert_eq!(config.scraping.delay_between_requests, 1);
        assert_eq!(config.scraping.language, "en");
        assert_eq!(config.scraping.country, "et");
        assert_eq!(config.analysis.theme_clusters, 5);
        assert_eq!(config.analysis.max_neural_chars, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [scraping]
            max_reviews_per_bank = 50

            [analysis]
            theme_clusters = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.scraping.max_reviews_per_bank, 50);
        assert_eq!(config.scraping.delay_between_requests, 1);
        assert_eq!(config.analysis.theme_clusters, 3);
        assert_eq!(config.banks.len(), 3);
        assert_eq!(config.database.path, "reviews.db");
    }

    #[test]
    fn test_custom_bank_registry() {
        let config = AppConfig::from_toml(
            r#"
            [banks.AWASH]
            name = "Awash Bank"
            app_id = "com.awash.mobile"
            full_name = "Awash Mobile Banking"
            "#,
        )
        .unwrap();

        assert_eq!(config.banks.len(), 1);
        assert_eq!(config.banks["AWASH"].name, "Awash Bank");
    }

    #[test]
    fn test_env_overrides() {
        let mut env = HashMap::new();
        env.insert("MAX_REVIEWS_PER_BANK", "25");
        env.insert("DELAY_BETWEEN_REQUESTS", "0");
        env.insert("REVIEWS_DB_PATH", ":memory:");

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.scraping.max_reviews_per_bank, 25);
        assert_eq!(config.scraping.delay_between_requests, 0);
        assert_eq!(config.database.path, ":memory:");
    }

    #[test]
    fn test_invalid_env_number() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "THEME_CLUSTERS").then(|| "many".to_string())
        });

        assert!(matches!(result, Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_clusters() {
        let mut config = AppConfig::default();
        config.analysis.theme_clusters = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"bank_reviews.db\"").unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert!(config.database.path.ends_with(".db"));
        assert_eq!(config.banks.len(), 3);
    }
}
