// config.rs — Engine configuration.
//
// Loaded from a TOML file (conventionally `automod.toml`). Every field has a
// serde default, so an empty file or a missing file gives a working engine:
//
//   match_threshold = 0.7
//
//   [dispatch]
//   default_timeout_secs = 600
//   default_reason = "Auto-moderation rule triggered"
//
//   [escalation]
//   window_hours = 24
//   retention_days = 30
//
//   [escalation.thresholds]
//   harassment = 0.7
//
//   [[escalation.rules]]
//   id = "repeat-hate"
//   ...

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::escalation::EscalationRule;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Confidence a policy needs to count as matched.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            dispatch: DispatchConfig::default(),
            escalation: EscalationConfig::default(),
            scheduler: SchedulerConfig::default(),
            analyzer: AnalyzerConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a file, or fall back to defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no engine config found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold {} outside 0..=1",
                self.match_threshold
            )));
        }
        if self.escalation.window_hours == 0 {
            return Err(ConfigError::Invalid("escalation.window_hours must be > 0".to_string()));
        }
        if self.escalation.retention_days * 24 < self.escalation.window_hours {
            return Err(ConfigError::Invalid(
                "escalation.retention_days is shorter than escalation.window_hours".to_string(),
            ));
        }
        Ok(())
    }
}

/// Defaults applied when an action omits a parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_quarantine_secs")]
    pub default_quarantine_secs: u64,

    #[serde(default = "default_reason")]
    pub default_reason: String,

    #[serde(default = "default_warning")]
    pub default_warning: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            default_quarantine_secs: default_quarantine_secs(),
            default_reason: default_reason(),
            default_warning: default_warning(),
        }
    }
}

/// Severity thresholds, violation windows, and escalation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Look-back window for "recent" violations.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// How long violation history is kept at all.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,

    #[serde(default)]
    pub thresholds: SeverityThresholds,

    #[serde(default)]
    pub critical: CriticalCutoffs,

    /// Rules that override the default severity ladder.
    #[serde(default)]
    pub rules: Vec<EscalationRule>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            retention_days: default_retention_days(),
            prune_interval_secs: default_prune_interval_secs(),
            thresholds: SeverityThresholds::default(),
            critical: CriticalCutoffs::default(),
            rules: Vec::new(),
        }
    }
}

/// Per-category score thresholds. A score must *exceed* the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityThresholds {
    #[serde(default = "default_harassment")]
    pub harassment: f64,
    #[serde(default = "default_hate")]
    pub hate: f64,
    #[serde(default = "default_violence")]
    pub violence: f64,
    #[serde(default = "default_sexual")]
    pub sexual: f64,
    #[serde(default = "default_self_harm")]
    pub self_harm: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            harassment: default_harassment(),
            hate: default_hate(),
            violence: default_violence(),
            sexual: default_sexual(),
            self_harm: default_self_harm(),
        }
    }
}

/// Cutoffs for the extreme-risk categories that make a judgment critical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalCutoffs {
    #[serde(default = "default_self_harm_intent")]
    pub self_harm_intent: f64,
    /// Applies to both `harassment/threatening` and `hate/threatening`.
    #[serde(default = "default_threatening")]
    pub threatening: f64,
    #[serde(default = "default_graphic_violence")]
    pub graphic_violence: f64,
    #[serde(default = "default_sexual_minors")]
    pub sexual_minors: f64,
}

impl Default for CriticalCutoffs {
    fn default() -> Self {
        Self {
            self_harm_intent: default_self_harm_intent(),
            threatening: default_threatening(),
            graphic_violence: default_graphic_violence(),
            sexual_minors: default_sexual_minors(),
        }
    }
}

/// Scheduled-policy sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Remote content analyzer. No endpoint means every `ai.*` field is unresolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub endpoint: Option<String>,
    #[serde(default = "default_analyzer_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_analyzer_timeout_ms(),
        }
    }
}

/// Where per-server audit logs go. No directory disables auditing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    pub dir: Option<PathBuf>,
}

// Serde default functions
fn default_match_threshold() -> f64 {
    automod_policy::DEFAULT_MATCH_THRESHOLD
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_quarantine_secs() -> u64 {
    3600
}

fn default_reason() -> String {
    "Auto-moderation rule triggered".to_string()
}

fn default_warning() -> String {
    "Your message was flagged by the server's moderation rules.".to_string()
}

fn default_window_hours() -> u64 {
    24
}

fn default_retention_days() -> u64 {
    30
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_harassment() -> f64 {
    0.7
}

fn default_hate() -> f64 {
    0.8
}

fn default_violence() -> f64 {
    0.8
}

fn default_sexual() -> f64 {
    0.8
}

fn default_self_harm() -> f64 {
    0.9
}

fn default_self_harm_intent() -> f64 {
    0.8
}

fn default_threatening() -> f64 {
    0.9
}

fn default_graphic_violence() -> f64 {
    0.9
}

fn default_sexual_minors() -> f64 {
    0.5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_analyzer_timeout_ms() -> u64 {
    5000
}
