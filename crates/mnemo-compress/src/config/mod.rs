use serde::Deserialize;
use std::path::{Path, PathBuf};

use tracing::info;

/// Configuration errors, always raised before any scoring work starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Main configuration structure for the compression engine
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Tier capacities, ratios and batching
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Importance scoring weights and markers
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Generative summarization backend
    #[serde(default)]
    pub backend: BackendConfig,
}

impl EngineConfig {
    /// Parse a TOML document; missing sections and fields fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the first default location that exists, or use defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        for path in default_config_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compression.validate()?;
        self.scoring.validate()
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("mnemo-compress.toml")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".mnemo").join("compress.toml"));
    }
    paths
}

/// Tier capacities, compression ratios and batching limits
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CompressionConfig {
    /// Number of newest memories kept verbatim
    #[serde(default = "default_raw_capacity")]
    pub raw_capacity: usize,
    /// Maximum number of memories held in the recent tier
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
    /// Share of the recent overflow summarized per run (0.0-1.0)
    #[serde(default = "default_recent_compress_ratio")]
    pub recent_compress_ratio: f32,
    /// Target output/input size for archive summaries (0.0-1.0)
    #[serde(default = "default_archive_compress_ratio")]
    pub archive_compress_ratio: f32,
    /// Timeout for a single generative summarization call
    #[serde(default = "default_generative_timeout_ms")]
    pub generative_timeout_ms: u64,
    /// Maximum memories per summarizer call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Maximum batches summarized at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Recent-tier memories scoring at or above this are never compressed
    #[serde(default)]
    pub preserve_score_threshold: Option<f32>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            raw_capacity: default_raw_capacity(),
            recent_capacity: default_recent_capacity(),
            recent_compress_ratio: default_recent_compress_ratio(),
            archive_compress_ratio: default_archive_compress_ratio(),
            generative_timeout_ms: default_generative_timeout_ms(),
            max_batch_size: default_max_batch_size(),
            max_concurrency: default_max_concurrency(),
            preserve_score_threshold: None,
        }
    }
}

impl CompressionConfig {
    /// Set tier capacities
    pub fn with_capacities(mut self, raw: usize, recent: usize) -> Self {
        self.raw_capacity = raw;
        self.recent_capacity = recent;
        self
    }

    /// Set compression ratios
    pub fn with_ratios(mut self, recent: f32, archive: f32) -> Self {
        self.recent_compress_ratio = recent;
        self.archive_compress_ratio = archive;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.generative_timeout_ms = timeout_ms;
        self
    }

    pub fn with_preserve_threshold(mut self, threshold: f32) -> Self {
        self.preserve_score_threshold = Some(threshold);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.raw_capacity == 0 {
            return Err(ConfigError::invalid("raw_capacity", "must be positive"));
        }
        if self.recent_capacity == 0 {
            return Err(ConfigError::invalid("recent_capacity", "must be positive"));
        }
        check_unit("recent_compress_ratio", self.recent_compress_ratio)?;
        check_unit("archive_compress_ratio", self.archive_compress_ratio)?;
        if self.generative_timeout_ms == 0 {
            return Err(ConfigError::invalid("generative_timeout_ms", "must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::invalid("max_batch_size", "must be positive"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be positive"));
        }
        if let Some(threshold) = self.preserve_score_threshold {
            check_unit("preserve_score_threshold", threshold)?;
        }
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("{value} is outside [0, 1]"),
        ));
    }
    Ok(())
}

fn default_raw_capacity() -> usize {
    20
}

fn default_recent_capacity() -> usize {
    100
}

fn default_recent_compress_ratio() -> f32 {
    0.3
}

fn default_archive_compress_ratio() -> f32 {
    0.1
}

fn default_generative_timeout_ms() -> u64 {
    10_000
}

fn default_max_batch_size() -> usize {
    50
}

fn default_max_concurrency() -> usize {
    4
}

/// Importance scoring configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Age at which the recency sub-score halves
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,
    /// Content length (chars) at which the length sub-score saturates
    #[serde(default = "default_length_saturation_chars")]
    pub length_saturation_chars: usize,
    /// Case-insensitive phrases that mark a memory as significant
    #[serde(default = "default_significance_markers")]
    pub significance_markers: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            half_life_hours: default_half_life_hours(),
            length_saturation_chars: default_length_saturation_chars(),
            significance_markers: default_significance_markers(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if !self.half_life_hours.is_finite() || self.half_life_hours <= 0.0 {
            return Err(ConfigError::invalid("half_life_hours", "must be positive"));
        }
        if self.length_saturation_chars == 0 {
            return Err(ConfigError::invalid(
                "length_saturation_chars",
                "must be positive",
            ));
        }
        Ok(())
    }
}

fn default_half_life_hours() -> f64 {
    24.0
}

fn default_length_saturation_chars() -> usize {
    400
}

fn default_significance_markers() -> Vec<String> {
    [
        "mistake",
        "failed",
        "error",
        "lesson",
        "learned",
        "remember",
        "important",
        "prefers",
        "preference",
        "always",
        "never",
        "decided",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Weights of the four importance sub-scores; must sum to 1
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ScoringWeights {
    #[serde(default = "default_recency_weight")]
    pub recency: f32,
    #[serde(default = "default_category_weight")]
    pub category: f32,
    #[serde(default = "default_length_weight")]
    pub length: f32,
    #[serde(default = "default_significance_weight")]
    pub significance: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: default_recency_weight(),
            category: default_category_weight(),
            length: default_length_weight(),
            significance: default_significance_weight(),
        }
    }
}

impl ScoringWeights {
    pub fn new(recency: f32, category: f32, length: f32, significance: f32) -> Self {
        Self {
            recency,
            category,
            length,
            significance,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parts = [self.recency, self.category, self.length, self.significance];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "scoring.weights",
                "weights must be non-negative",
            ));
        }
        let sum: f32 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::invalid(
                "scoring.weights",
                format!("weights sum to {sum}, expected 1.0"),
            ));
        }
        Ok(())
    }
}

fn default_recency_weight() -> f32 {
    0.35
}

fn default_category_weight() -> f32 {
    0.25
}

fn default_length_weight() -> f32 {
    0.15
}

fn default_significance_weight() -> f32 {
    0.25
}

/// Remote generative backend configuration (OpenAI-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Use the remote backend for summarization
    #[serde(default)]
    pub enabled: bool,
    /// API base URL, `/chat/completions` is appended
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_backend_api_key_env")]
    pub api_key_env: String,
    /// Model identifier for remote API
    #[serde(default = "default_backend_model")]
    pub model: String,
    /// Maximum tokens in a generated summary
    #[serde(default = "default_backend_max_tokens")]
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            api_key_env: default_backend_api_key_env(),
            model: default_backend_model(),
            max_tokens: default_backend_max_tokens(),
        }
    }
}

fn default_backend_api_key_env() -> String {
    "MNEMO_COMPRESS_API_KEY".to_string()
}

fn default_backend_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_backend_max_tokens() -> u32 {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.compression.raw_capacity, 20);
        assert_eq!(config.compression.recent_capacity, 100);
        assert!((config.compression.recent_compress_ratio - 0.3).abs() < f32::EPSILON);
        assert!((config.compression.archive_compress_ratio - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.compression.generative_timeout_ms, 10_000);
        assert_eq!(config.compression.max_batch_size, 50);
        assert_eq!(config.compression.max_concurrency, 4);
        assert!(config.compression.preserve_score_threshold.is_none());
        assert_eq!(config.scoring.half_life_hours, 24.0);
        assert!(!config.backend.enabled);
        assert_eq!(config.backend.api_key_env, "MNEMO_COMPRESS_API_KEY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[compression]
raw_capacity = 10
recent_capacity = 40
recent_compress_ratio = 0.5
archive_compress_ratio = 0.05
generative_timeout_ms = 2500
max_batch_size = 8
max_concurrency = 2
preserve_score_threshold = 0.9

[scoring]
half_life_hours = 12.0
length_saturation_chars = 200
significance_markers = ["oops"]

[scoring.weights]
recency = 0.4
category = 0.3
length = 0.1
significance = 0.2

[backend]
enabled = true
api_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
model = "gpt-4o"
max_tokens = 256
"#;

        let config = EngineConfig::from_toml_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.compression.raw_capacity, 10);
        assert_eq!(config.compression.recent_capacity, 40);
        assert_eq!(config.compression.max_batch_size, 8);
        assert_eq!(config.compression.max_concurrency, 2);
        assert_eq!(config.compression.preserve_score_threshold, Some(0.9));
        assert_eq!(config.scoring.length_saturation_chars, 200);
        assert_eq!(config.scoring.significance_markers, vec!["oops".to_string()]);
        assert!((config.scoring.weights.recency - 0.4).abs() < f32::EPSILON);
        assert!(config.backend.enabled);
        assert_eq!(config.backend.model, "gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[compression]
raw_capacity = 5
"#;

        let config = EngineConfig::from_toml_str(toml_str).expect("Failed to parse partial TOML");
        assert_eq!(config.compression.raw_capacity, 5);
        assert_eq!(config.compression.recent_capacity, 100);
        assert_eq!(config.scoring, ScoringConfig::default());
        assert_eq!(config.backend.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("[compression\nraw_capacity = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CompressionConfig::default().with_capacities(0, 100);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("raw_capacity"));

        let config = CompressionConfig::default().with_capacities(20, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ratio_out_of_range_rejected() {
        assert!(CompressionConfig::default().with_ratios(1.2, 0.1).validate().is_err());
        assert!(CompressionConfig::default().with_ratios(0.3, -0.1).validate().is_err());
        assert!(CompressionConfig::default().with_ratios(f32::NAN, 0.1).validate().is_err());
        assert!(CompressionConfig::default().with_ratios(0.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_zero_batch_and_timeout_rejected() {
        assert!(CompressionConfig::default().with_max_batch_size(0).validate().is_err());
        assert!(CompressionConfig::default().with_timeout_ms(0).validate().is_err());
        let config = CompressionConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preserve_threshold_validated() {
        assert!(CompressionConfig::default().with_preserve_threshold(1.5).validate().is_err());
        assert!(CompressionConfig::default().with_preserve_threshold(0.8).validate().is_ok());
    }

    #[test]
    fn test_scoring_weights_must_sum_to_one() {
        assert!(ScoringWeights::default().validate().is_ok());
        assert!(ScoringWeights::new(0.5, 0.5, 0.5, 0.5).validate().is_err());
        assert!(ScoringWeights::new(1.2, -0.2, 0.0, 0.0).validate().is_err());
        assert!(ScoringWeights::new(1.0, 0.0, 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn test_scoring_half_life_must_be_positive() {
        let config = ScoringConfig {
            half_life_hours: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compress.toml");
        std::fs::write(&path, "[compression]\nrecent_capacity = 64\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.compression.recent_capacity, 64);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
