//! Engine configuration: recursion depth limits and optimizer pass toggles,
//! loaded the way the teacher engine's `config.rs` layers `figment` over
//! `config.toml` + environment overrides (SPEC_FULL.md §A "Config"). Scoped
//! down from the teacher's storage/auth sections to what a rule engine
//! actually needs.
//!
//! ```toml
//! # cube_rules.toml
//! [evaluation]
//! max_recursion_depth = 64
//!
//! [optimizer]
//! enable_stet_rewrite = true
//! enable_linearity_check = true
//! ```
//!
//! Environment overrides use a `CUBE_RULES_` prefix with `__` as the nesting
//! separator, e.g. `CUBE_RULES_EVALUATION__MAX_RECURSION_DEPTH=128`.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Recursion-guard tuning (spec.md §5 "Recursion and termination"). The
/// exact-pair `ruleHistory` set (spec.md §4.5) already prevents infinite
/// loops; `max_recursion_depth` is a defense-in-depth cap on call-stack
/// depth for long acyclic chains that never repeat an exact `(rule, coords)`
/// pair but still spiral unreasonably deep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
}

/// Optimizer pass toggles (spec.md §4.6 C6). Disabling a pass leaves the
/// rule on its unoptimized `ruleAST` — correctness does not depend on either
/// pass running, only performance does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub enable_stet_rewrite: bool,
    #[serde(default = "default_true")]
    pub enable_linearity_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_recursion_depth() -> usize {
    64
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            max_recursion_depth: default_max_recursion_depth(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            enable_stet_rewrite: true,
            enable_linearity_check: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            evaluation: EvaluationConfig::default(),
            optimizer: OptimizerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `cube_rules.toml`, then `cube_rules.local.toml`
    /// (git-ignored overrides), then `CUBE_RULES_*` environment variables,
    /// in that precedence order.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("cube_rules.toml"))
            .merge(Toml::file("cube_rules.local.toml"))
            .merge(Env::prefixed("CUBE_RULES_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CUBE_RULES_").split("__"))
            .extract()
    }
}
