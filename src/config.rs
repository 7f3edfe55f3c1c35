use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::workflow::checkpoint::Decision;
use crate::workflow::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fallback_branches")]
    pub fallback_branches: Vec<String>,
}

// Manual Debug impl to avoid leaking the token
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("raw_base", &self.raw_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("fallback_branches", &self.fallback_branches)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            timeout_secs: default_timeout_secs(),
            fallback_branches: default_fallback_branches(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.factor,
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(self.jitter)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub interactive: bool,
    #[serde(default = "default_decision")]
    pub default_decision: String,
    #[serde(default = "default_max_readme_chars")]
    pub max_readme_chars: usize,
    #[serde(default = "default_max_edit_attempts")]
    pub max_edit_attempts: u32,
    #[serde(default = "default_top_keywords")]
    pub top_keywords: usize,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            default_decision: default_decision(),
            max_readme_chars: default_max_readme_chars(),
            max_edit_attempts: default_max_edit_attempts(),
            top_keywords: default_top_keywords(),
            max_tags: default_max_tags(),
            output_dir: default_output_dir(),
        }
    }
}

impl PipelineConfig {
    /// Decision substituted at every checkpoint in non-interactive mode.
    pub fn default_decision(&self) -> Result<Decision> {
        match self.default_decision.trim().to_ascii_lowercase().as_str() {
            "approve" | "yes" => Ok(Decision::Approve),
            "skip" | "override_skip" => Ok(Decision::OverrideSkip),
            "abort" | "no" => Ok(Decision::Abort),
            other => Err(AppError::Config(format!(
                "Unsupported default decision '{other}' (expected approve, skip or abort)"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    /// Also append plain-text logs to `<dir>/app.log`.
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            file: true,
            dir: default_log_dir(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_fallback_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_decision() -> String {
    "approve".to_string()
}

fn default_max_readme_chars() -> usize {
    20_000
}

fn default_max_edit_attempts() -> u32 {
    3
}

fn default_top_keywords() -> usize {
    10
}

fn default_max_tags() -> usize {
    8
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("readme-review").required(false));
        }

        // Environment variable overrides with README_REVIEW_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("README_REVIEW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: AppConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.pipeline.output_dir, PathBuf::from("outputs"));
        assert!(config.pipeline.interactive);
        assert_eq!(config.github.fallback_branches, vec!["main", "master"]);
        assert!(config.llm_api_key().is_none());
        assert!(config.logging.file);
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn default_decision_parses_known_values() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.default_decision().unwrap(), Decision::Approve);

        pipeline.default_decision = "Skip".to_string();
        assert_eq!(pipeline.default_decision().unwrap(), Decision::OverrideSkip);

        pipeline.default_decision = "edit".to_string();
        assert!(matches!(
            pipeline.default_decision(),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.github.token = Some("ghp_secret".to_string());
        config.llm.api_key = Some("sk-secret".to_string());

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
