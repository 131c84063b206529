//! Configuration for the question handlers.
//!
//! Loads settings from a TOML file or uses defaults. Every field has a
//! default so a partial file (or none at all) is valid.

use crate::agent::PackingMode;
use crate::credential::ProofFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_INFERENCE_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/HuggingFaceH4/starchat-beta";
pub const DEFAULT_MODEL: &str = "HuggingFaceH4/starchat-beta";
pub const DEFAULT_TOKEN_ENV: &str = "HF_TOKEN";

/// End-of-turn marker of the starchat prompt format
pub const END_MARKER: &str = "<|end|>";
/// Assistant-turn marker of the starchat prompt format
pub const ASSISTANT_MARKER: &str = "<|assistant|>";

const MAX_ITERATIONS_LIMIT: u32 = 1000;

/// Bearer token for the inference endpoint
///
/// Read-only once loaded. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Remote text-generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier recorded in issued credentials
    #[serde(default = "default_model")]
    pub model: String,

    /// Inline token; takes precedence over `token_env`
    #[serde(default)]
    pub token: Option<AccessToken>,

    /// Environment variable holding the token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Timeout for a single generation call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for the whole polling loop
    #[serde(default = "default_retrieval_deadline")]
    pub retrieval_deadline_secs: u64,

    /// Follow-up calls allowed after the first one
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    #[serde(default = "default_assistant_marker")]
    pub assistant_marker: String,
}

fn default_endpoint() -> String {
    DEFAULT_INFERENCE_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retrieval_deadline() -> u64 {
    300 // 5 minutes for up to 101 calls
}

fn default_max_iterations() -> u32 {
    100
}

fn default_end_marker() -> String {
    END_MARKER.to_string()
}

fn default_assistant_marker() -> String {
    ASSISTANT_MARKER.to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            token: None,
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout(),
            retrieval_deadline_secs: default_retrieval_deadline(),
            max_iterations: default_max_iterations(),
            end_marker: default_end_marker(),
            assistant_marker: default_assistant_marker(),
        }
    }
}

impl InferenceConfig {
    /// Inline token if set, otherwise the configured environment variable
    pub fn resolve_token(&self) -> Option<AccessToken> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.as_str().is_empty()) {
            return Some(token.clone());
        }
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .map(AccessToken::new)
    }

    pub fn effective_max_iterations(&self) -> u32 {
        self.max_iterations.clamp(1, MAX_ITERATIONS_LIMIT)
    }

    /// Configured end marker, or the default when blank
    pub fn effective_end_marker(&self) -> &str {
        if self.end_marker.is_empty() {
            END_MARKER
        } else {
            &self.end_marker
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retrieval_deadline(&self) -> Duration {
        Duration::from_secs(self.retrieval_deadline_secs.max(1))
    }
}

/// Handler behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSettings {
    #[serde(default)]
    pub packing: PackingMode,

    #[serde(default)]
    pub proof_format: ProofFormat,

    /// Send a problem report back when a question cannot be answered
    #[serde(default)]
    pub problem_reports: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            packing: PackingMode::Authcrypt,
            proof_format: ProofFormat::Jwt,
            problem_reports: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub handler: HandlerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PluginConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PluginConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML file, falling back to defaults if missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PluginConfig::default();
        assert_eq!(config.inference.endpoint, DEFAULT_INFERENCE_ENDPOINT);
        assert_eq!(config.inference.max_iterations, 100);
        assert_eq!(config.inference.end_marker, "<|end|>");
        assert_eq!(config.handler.packing, PackingMode::Authcrypt);
        assert_eq!(config.handler.proof_format, ProofFormat::Jwt);
        assert!(!config.handler.problem_reports);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: PluginConfig = toml::from_str(
            r#"
            [inference]
            max_iterations = 5
            token = "hf_inline"

            [handler]
            packing = "anoncrypt"
            "#,
        )
        .unwrap();

        assert_eq!(config.inference.max_iterations, 5);
        assert_eq!(config.inference.request_timeout_secs, 30);
        assert_eq!(config.handler.packing, PackingMode::Anoncrypt);
        assert_eq!(config.handler.proof_format, ProofFormat::Jwt);
        assert_eq!(config.inference.resolve_token().unwrap().as_str(), "hf_inline");
    }

    #[test]
    fn test_effective_values_are_clamped() {
        let config = InferenceConfig {
            max_iterations: 0,
            request_timeout_secs: 0,
            retrieval_deadline_secs: 0,
            ..InferenceConfig::default()
        };
        assert_eq!(config.effective_max_iterations(), 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
        assert_eq!(config.retrieval_deadline(), Duration::from_secs(1));

        let config = InferenceConfig {
            max_iterations: 50_000,
            ..InferenceConfig::default()
        };
        assert_eq!(config.effective_max_iterations(), MAX_ITERATIONS_LIMIT);
    }

    #[test]
    fn test_empty_end_marker_falls_back_to_default() {
        let config: PluginConfig = toml::from_str(
            r#"
            [inference]
            end_marker = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.inference.effective_end_marker(), END_MARKER);

        let config = InferenceConfig {
            end_marker: "</s>".to_string(),
            ..InferenceConfig::default()
        };
        assert_eq!(config.effective_end_marker(), "</s>");
    }

    #[test]
    fn test_inline_token_not_printed_by_debug() {
        let config: PluginConfig = toml::from_str(
            r#"
            [inference]
            token = "hf_very_secret"
            "#,
        )
        .unwrap();

        let printed = format!("{:?}", config);
        assert!(!printed.contains("hf_very_secret"));
        assert!(printed.contains("AccessToken(***)"));
        assert_eq!(
            config.inference.resolve_token().unwrap().as_str(),
            "hf_very_secret"
        );
    }

    #[test]
    fn test_token_from_env() {
        let config = InferenceConfig {
            token_env: "STARCHAT_TEST_TOKEN_FROM_ENV".to_string(),
            ..InferenceConfig::default()
        };
        std::env::set_var("STARCHAT_TEST_TOKEN_FROM_ENV", "hf_env");
        assert_eq!(config.resolve_token().unwrap().as_str(), "hf_env");
        std::env::remove_var("STARCHAT_TEST_TOKEN_FROM_ENV");
        assert!(config.resolve_token().is_none());
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("hf_secret");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
    }
}
