use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::ExtractionError;

/// Application-level constants
pub const APP_NAME: &str = "treasury-extract";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment overrides for the model endpoint.
pub const ENV_MODEL_URL: &str = "TREASURY_MODEL_URL";
pub const ENV_MODEL_NAME: &str = "TREASURY_MODEL_NAME";
pub const ENV_MODEL_TIMEOUT: &str = "TREASURY_MODEL_TIMEOUT_SECS";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "treasury_lib=info,warn"
}

/// Configuration directory (`~/.config/treasury-extract` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Default location of the engine config file, if a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("engine.json"))
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Full engine configuration. Every section has defaults tuned for
/// bitcoin treasury disclosures in US periodic/current reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub keywords: KeywordConfig,
    pub bounds: BoundsConfig,
    pub selector: SelectorConfig,
    pub model: ModelConfig,
}

/// Vocabulary driving selection and classification. All matching is
/// case-insensitive; terms are stored lowercase after `normalized()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeywordConfig {
    /// Asset names, plurals and tickers ("bitcoin", "btc").
    pub asset_terms: Vec<String>,
    /// Completed purchase/sale verbs.
    pub action_terms: Vec<String>,
    /// Debt/equity issuance vocabulary.
    pub financing_terms: Vec<String>,
    /// Forward-looking modal phrasing.
    pub intent_terms: Vec<String>,
    /// Date-range markers signalling a period total.
    pub cumulative_terms: Vec<String>,
    /// Holdings-snapshot language.
    pub holdings_terms: Vec<String>,
    /// Verbs that mark a disposal rather than a purchase.
    pub sale_terms: Vec<String>,
    /// Phrases that disqualify a share figure from being "outstanding".
    pub share_exclusion_terms: Vec<String>,
}

/// Plausibility bands. Tuned to one issuer's historical scale; re-tune
/// for assets or companies of very different size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoundsConfig {
    pub min_unit_price: f64,
    pub max_unit_price: f64,
    pub min_share_count: f64,
    pub max_share_count: f64,
    /// Asset amounts at or above this look like holdings, not a purchase.
    pub snapshot_amount_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorConfig {
    /// Spans shorter than this (characters) are discarded.
    pub min_paragraph_len: usize,
    /// Upper bound on text sent to the external model (characters).
    pub max_model_input_chars: usize,
}

/// When the external model is consulted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    Disabled,
    /// Only when pattern extraction produced nothing.
    OnEmpty,
    /// Always, for cross-checking pattern output.
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model_name: String,
    pub timeout_secs: u64,
    pub mode: FallbackMode,
}

// ═══════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            asset_terms: strings(&["bitcoin", "bitcoins", "btc"]),
            action_terms: strings(&[
                "purchased", "acquired", "bought", "sold", "disposed of",
            ]),
            financing_terms: strings(&[
                "convertible senior notes",
                "convertible notes",
                "senior secured notes",
                "aggregate principal amount",
                "offering",
                "net proceeds",
                "proceeds from",
                "issuance",
                "at-the-market",
                "credit facility",
                "term loan",
            ]),
            intent_terms: strings(&[
                "intends to",
                "intend to",
                "plans to",
                "plan to",
                "may purchase",
                "may acquire",
                "expects to",
                "will be used to",
                "to be used to",
                "anticipates",
            ]),
            cumulative_terms: strings(&[
                "during the period between",
                "during the period from",
                "during the quarter",
                "during the three months ended",
                "during the six months ended",
                "during the nine months ended",
                "during the year ended",
                "during the fiscal year",
                "since the end of",
                "year-to-date",
                "in the aggregate since",
            ]),
            holdings_terms: strings(&["as of", "held", "holds", "holding"]),
            sale_terms: strings(&["sold", "disposed of", "sale of"]),
            share_exclusion_terms: strings(&[
                "authorized",
                "weighted average",
                "weighted-average",
                "reserved for",
                "issuable",
                "underlying",
                "options to purchase",
                "warrants",
            ]),
        }
    }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            min_unit_price: 100.0,
            max_unit_price: 1_000_000.0,
            min_share_count: 1_000.0,
            max_share_count: 50_000_000_000.0,
            snapshot_amount_threshold: 100_000.0,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_paragraph_len: 50,
            max_model_input_chars: 24_000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".into(),
            model_name: "llama3.1".into(),
            timeout_secs: 120,
            mode: FallbackMode::OnEmpty,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl EngineConfig {
    /// Parse a (possibly partial) JSON config. Missing sections take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ExtractionError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ExtractionError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Load the file at `default_config_path()` when present, defaults otherwise.
    pub fn load_or_default() -> Result<Self, ExtractionError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply `TREASURY_MODEL_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_MODEL_URL).filter(|v| !v.trim().is_empty()) {
            self.model.endpoint = url.trim().to_string();
        }
        if let Some(name) = lookup(ENV_MODEL_NAME).filter(|v| !v.trim().is_empty()) {
            self.model.model_name = name.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_MODEL_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.model.timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "Ignoring invalid {ENV_MODEL_TIMEOUT}"),
            }
        }
        self
    }

    /// Lowercase and trim every keyword; drop empties.
    pub fn normalized(mut self) -> Self {
        let k = &mut self.keywords;
        for list in [
            &mut k.asset_terms,
            &mut k.action_terms,
            &mut k.financing_terms,
            &mut k.intent_terms,
            &mut k.cumulative_terms,
            &mut k.holdings_terms,
            &mut k.sale_terms,
            &mut k.share_exclusion_terms,
        ] {
            *list = list
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.keywords.asset_terms.is_empty() {
            return Err(ExtractionError::Config("asset_terms must not be empty".into()));
        }
        if self.keywords.action_terms.is_empty() {
            return Err(ExtractionError::Config("action_terms must not be empty".into()));
        }
        let b = &self.bounds;
        if !(b.min_unit_price > 0.0 && b.min_unit_price < b.max_unit_price) {
            return Err(ExtractionError::Config(format!(
                "unit price band is invalid: {}..={}",
                b.min_unit_price, b.max_unit_price
            )));
        }
        if !(b.min_share_count > 0.0 && b.min_share_count < b.max_share_count) {
            return Err(ExtractionError::Config(format!(
                "share count band is invalid: {}..={}",
                b.min_share_count, b.max_share_count
            )));
        }
        if self.model.timeout_secs == 0 {
            return Err(ExtractionError::Config("model timeout must be positive".into()));
        }
        Ok(())
    }
}
