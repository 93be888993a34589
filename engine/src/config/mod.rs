//! Configuration management
//!
//! This module handles loading, validation, and management of the Triptych configuration.
//! Configuration is stored in TOML format at ~/.triptych/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Provider selection and per-provider settings
//! - **orchestration**: Refinement ceiling, step ceiling, call timeout, prompt overrides
//! - **sessions**: Eviction policy for generator conversation sessions
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory for `data_dir` and `prompts_dir`.
//! The data directory is created when missing.
//!
//! # Examples
//!
//! ```no_run
//! use triptych_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Max iterations: {}", config.orchestration.max_iterations);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use crate::conductor::sessions::EvictionPolicy;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Valid values for `core.log_level`
const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Valid values for `llm.default_provider`
const VALID_PROVIDERS: [&str; 2] = ["openai", "ollama"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Orchestration limits
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Generator session retention
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider used by every agent (openai, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    // Note: API keys come from the environment or the OS keychain, never from config
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Orchestration limits and prompt location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Generator cycles after which the editor is forced
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Hard ceiling on node executions per invocation
    #[serde(default = "default_step_limit")]
    pub step_limit: u32,

    /// Per model call timeout in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Run the request-refinement stage before fresh runs
    #[serde(default)]
    pub refine_request: bool,

    /// Directory with prompt template overrides (supports ~ expansion)
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
}

/// Eviction strategy for generator sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionKind {
    /// Sessions live until explicitly dropped
    Unbounded,

    /// Keep the most recently used `max_runs` runs
    Lru,

    /// Drop runs idle for longer than `ttl_secs`
    Ttl,
}

/// Generator session retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Eviction strategy
    #[serde(default = "default_eviction")]
    pub eviction: EvictionKind,

    /// Runs kept by the LRU policy
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,

    /// Idle lifetime of a run under the TTL policy
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl SessionsConfig {
    /// Build the eviction policy injected into the session store
    pub fn eviction_policy(&self) -> EvictionPolicy {
        match self.eviction {
            EvictionKind::Unbounded => EvictionPolicy::Unbounded,
            EvictionKind::Lru => EvictionPolicy::Lru {
                max_runs: self.max_runs,
            },
            EvictionKind::Ttl => EvictionPolicy::Ttl {
                ttl: Duration::from_secs(self.ttl_secs),
            },
        }
    }
}

impl OrchestrationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.triptych")
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_openai_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_iterations() -> u32 {
    3
}

fn default_step_limit() -> u32 {
    25
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("~/.triptych/prompts")
}

fn default_eviction() -> EvictionKind {
    EvictionKind::Lru
}

fn default_max_runs() -> usize {
    64
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            step_limit: default_step_limit(),
            call_timeout_secs: default_call_timeout_secs(),
            refine_request: false,
            prompts_dir: default_prompts_dir(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            eviction: default_eviction(),
            max_runs: default_max_runs(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.triptych/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save it to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Written before path expansion so the file keeps the portable "~" form
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.triptych/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".triptych").join("config.toml"))
    }

    /// Directory holding per-run step logs
    pub fn logs_dir(&self) -> PathBuf {
        self.core.data_dir.join("logs")
    }

    /// Path of the chat database
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("triptych.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated values and numeric ranges
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        if !VALID_LOG_LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if !VALID_PROVIDERS.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                VALID_PROVIDERS.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.openai.temperature) {
            return Err(EngineError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        let orchestration = &self.orchestration;
        if orchestration.max_iterations < 1 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        // Each generator cycle costs two steps and the editor one more
        let minimum_steps = 2 * orchestration.max_iterations + 1;
        if orchestration.step_limit < minimum_steps {
            return Err(EngineError::Config(format!(
                "step_limit {} is too small for max_iterations {} (needs at least {})",
                orchestration.step_limit, orchestration.max_iterations, minimum_steps
            )));
        }

        if orchestration.call_timeout_secs == 0 {
            return Err(EngineError::Config(
                "call_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.sessions.max_runs == 0 {
            return Err(EngineError::Config(
                "sessions.max_runs must be at least 1".to_string(),
            ));
        }
        if self.sessions.ttl_secs == 0 {
            return Err(EngineError::Config(
                "sessions.ttl_secs must be at least 1".to_string(),
            ));
        }

        self.orchestration.prompts_dir = expand_path(&self.orchestration.prompts_dir)?;
        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn toml_with_data_dir(dir: &TempDir, body: &str) -> String {
        format!(
            "[core]\ndata_dir = \"{}\"\n{}",
            dir.path().join("data").display(),
            body
        )
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "openai");
        assert_eq!(config.llm.openai.model, "deepseek-chat");
        assert_eq!(config.orchestration.max_iterations, 3);
        assert_eq!(config.orchestration.step_limit, 25);
        assert_eq!(config.sessions.eviction, EvictionKind::Lru);
        assert!(!config.orchestration.refine_request);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.orchestration.step_limit,
            deserialized.orchestration.step_limit
        );
        assert_eq!(config.sessions.eviction, deserialized.sessions.eviction);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config =
            Config::from_toml_str(&toml_with_data_dir(&dir, "[orchestration]\nmax_iterations = 2\n"))
                .unwrap();

        assert_eq!(config.orchestration.max_iterations, 2);
        assert_eq!(config.orchestration.step_limit, 25);
        assert!(config.core.data_dir.exists());
    }

    #[test]
    fn test_step_limit_must_cover_iterations() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_toml_str(&toml_with_data_dir(
            &dir,
            "[orchestration]\nmax_iterations = 5\nstep_limit = 10\n",
        ));

        match result {
            Err(EngineError::Config(message)) => assert!(message.contains("step_limit")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_toml_str(&toml_with_data_dir(
            &dir,
            "[llm]\ndefault_provider = \"anthropic\"\n",
        ));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_rejects_temperature_out_of_range() {
        let dir = TempDir::new().unwrap();
        let result = Config::from_toml_str(&toml_with_data_dir(
            &dir,
            "[llm.openai]\ntemperature = 3.5\n",
        ));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_eviction_policy_mapping() {
        let mut sessions = SessionsConfig::default();
        assert_eq!(
            sessions.eviction_policy(),
            EvictionPolicy::Lru { max_runs: 64 }
        );

        sessions.eviction = EvictionKind::Ttl;
        sessions.ttl_secs = 30;
        assert_eq!(
            sessions.eviction_policy(),
            EvictionPolicy::Ttl {
                ttl: Duration::from_secs(30)
            }
        );

        sessions.eviction = EvictionKind::Unbounded;
        assert_eq!(sessions.eviction_policy(), EvictionPolicy::Unbounded);
    }
}
