//! Configuration loading, validation, and overrides for keepsake.
//!
//! Loads configuration from `~/.keepsake/config.toml` with environment
//! variable overrides. Validates all settings at startup. Individual keys
//! can be changed afterwards only through the enumerated
//! [`ConfigOverrides`]; unknown keys are rejected.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.keepsake/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Persona text. Read once when the coordinator is built.
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Generation backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Limits for the `execute_code` sandbox
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Connectivity flag reported in the context summary
    #[serde(default = "default_true")]
    pub online: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            persona: PersonaConfig::default(),
            memory: MemoryConfig::default(),
            backend: BackendConfig::default(),
            sandbox: SandboxConfig::default(),
            online: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_persona_name() -> String {
    "Assistant".into()
}

fn default_system_prompt() -> String {
    "You are a friendly assistant that runs entirely on this computer.\n\n\
     Style: natural and concise.\n\
     Rules: Never make up information. Never write the user's side of the conversation. \
     Stop after your own reply. Use tools when they help."
        .into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Database file; defaults to `~/.keepsake/memory.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Conversation entries kept after each turn
    #[serde(default = "default_history_keep_last")]
    pub history_keep_last: usize,

    /// Conversation entries shown in the context summary
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Conversation entries included in a memory export
    #[serde(default = "default_export_limit")]
    pub export_limit: usize,
}

fn default_history_keep_last() -> usize {
    20
}
fn default_context_window() -> usize {
    4
}
fn default_export_limit() -> usize {
    20
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            history_keep_last: default_history_keep_last(),
            context_window: default_context_window(),
            export_limit: default_export_limit(),
        }
    }
}

impl MemoryConfig {
    /// The configured database path, or the default under the config dir.
    pub fn db_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory.db"))
    }
}

/// Which completion server speaks on the other end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    #[serde(alias = "llama.cpp", alias = "llama_cpp")]
    LlamaCpp,
}

impl BackendKind {
    pub fn default_host(self) -> &'static str {
        match self {
            BackendKind::Ollama => "http://localhost:11434",
            BackendKind::LlamaCpp => "http://localhost:8080",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "llamacpp" | "llama.cpp" | "llama_cpp" => Ok(BackendKind::LlamaCpp),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend kind '{other}' (expected ollama or llamacpp)"
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Ollama => f.write_str("ollama"),
            BackendKind::LlamaCpp => f.write_str("llamacpp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL; defaults depend on `kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Model name (ignored by llama.cpp, which serves one model)
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_context_size")]
    pub context_size: u32,

    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Ceiling for one generation request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
}

fn default_model() -> String {
    "qwen2.5:1.5b-instruct".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> u32 {
    200
}
fn default_context_size() -> u32 {
    2048
}
fn default_threads() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_stop() -> Vec<String> {
    vec!["User:".into(), "\n\n".into()]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            host: None,
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            context_size: default_context_size(),
            threads: default_threads(),
            timeout_secs: default_timeout_secs(),
            stop: default_stop(),
        }
    }
}

impl BackendConfig {
    /// The configured host, or the default for the backend kind.
    pub fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| self.kind.default_host().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Wall-clock limit for one `execute_code` call
    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,

    /// Evaluation steps before the sandbox gives up
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Largest list, string or range the sandbox will build
    #[serde(default = "default_max_collection_len")]
    pub max_collection_len: usize,
}

fn default_sandbox_timeout_ms() -> u64 {
    2000
}
fn default_max_steps() -> u64 {
    1_000_000
}
fn default_max_collection_len() -> usize {
    100_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sandbox_timeout_ms(),
            max_steps: default_max_steps(),
            max_collection_len: default_max_collection_len(),
        }
    }
}

/// A partial configuration. Every field names one setting; anything else
/// fails to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub persona_name: Option<String>,
    pub system_prompt: Option<String>,
    pub db_path: Option<PathBuf>,
    pub history_keep_last: Option<usize>,
    pub context_window: Option<usize>,
    pub export_limit: Option<usize>,
    pub backend_kind: Option<BackendKind>,
    pub host: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context_size: Option<u32>,
    pub threads: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub sandbox_timeout_ms: Option<u64>,
    pub sandbox_max_steps: Option<u64>,
    pub sandbox_max_collection_len: Option<usize>,
    pub online: Option<bool>,
}

/// Dotted keys accepted by [`AppConfig::set`].
pub const KNOWN_KEYS: &[&str] = &[
    "persona.name",
    "persona.system_prompt",
    "memory.path",
    "memory.history_keep_last",
    "memory.context_window",
    "memory.export_limit",
    "backend.kind",
    "backend.host",
    "backend.model",
    "backend.temperature",
    "backend.top_p",
    "backend.max_tokens",
    "backend.context_size",
    "backend.threads",
    "backend.timeout_secs",
    "sandbox.timeout_ms",
    "sandbox.max_steps",
    "sandbox.max_collection_len",
    "online",
];

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("invalid value for {key}: '{value}'"))
    })
}

impl ConfigOverrides {
    /// Build a single-key override from a dotted key and its textual value.
    pub fn from_pair(key: &str, value: &str) -> Result<Self, ConfigError> {
        let mut o = Self::default();
        match key {
            "persona.name" => o.persona_name = Some(value.to_string()),
            "persona.system_prompt" => o.system_prompt = Some(value.to_string()),
            "memory.path" => o.db_path = Some(PathBuf::from(value)),
            "memory.history_keep_last" => o.history_keep_last = Some(parse_value(key, value)?),
            "memory.context_window" => o.context_window = Some(parse_value(key, value)?),
            "memory.export_limit" => o.export_limit = Some(parse_value(key, value)?),
            "backend.kind" => o.backend_kind = Some(value.parse()?),
            "backend.host" => o.host = Some(value.to_string()),
            "backend.model" => o.model = Some(value.to_string()),
            "backend.temperature" => o.temperature = Some(parse_value(key, value)?),
            "backend.top_p" => o.top_p = Some(parse_value(key, value)?),
            "backend.max_tokens" => o.max_tokens = Some(parse_value(key, value)?),
            "backend.context_size" => o.context_size = Some(parse_value(key, value)?),
            "backend.threads" => o.threads = Some(parse_value(key, value)?),
            "backend.timeout_secs" => o.timeout_secs = Some(parse_value(key, value)?),
            "sandbox.timeout_ms" => o.sandbox_timeout_ms = Some(parse_value(key, value)?),
            "sandbox.max_steps" => o.sandbox_max_steps = Some(parse_value(key, value)?),
            "sandbox.max_collection_len" => {
                o.sandbox_max_collection_len = Some(parse_value(key, value)?)
            }
            "online" => o.online = Some(parse_value(key, value)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(o)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.keepsake/config.toml).
    ///
    /// Environment variables override the file:
    /// - `KEEPSAKE_BACKEND` — `ollama` or `llamacpp`
    /// - `KEEPSAKE_HOST`
    /// - `KEEPSAKE_MODEL`
    /// - `KEEPSAKE_DB` — database path
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        for (var, key) in [
            ("KEEPSAKE_BACKEND", "backend.kind"),
            ("KEEPSAKE_HOST", "backend.host"),
            ("KEEPSAKE_MODEL", "backend.model"),
            ("KEEPSAKE_DB", "memory.path"),
        ] {
            if let Ok(value) = std::env::var(var) {
                config.set(key, &value)?;
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".keepsake")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(ConfigError::ValidationError(
                "backend.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backend.top_p) {
            return Err(ConfigError::ValidationError(
                "backend.top_p must be between 0.0 and 1.0".into(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backend.timeout_secs must be > 0".into(),
            ));
        }
        if self.sandbox.timeout_ms == 0 || self.sandbox.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "sandbox limits must be > 0".into(),
            ));
        }
        if self.memory.history_keep_last == 0 {
            return Err(ConfigError::ValidationError(
                "memory.history_keep_last must be > 0".into(),
            ));
        }
        if self.memory.context_window > self.memory.history_keep_last {
            return Err(ConfigError::ValidationError(
                "memory.context_window cannot exceed memory.history_keep_last".into(),
            ));
        }
        if self.persona.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "persona.name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply a partial configuration. The result is validated as a whole;
    /// on failure `self` is left untouched.
    pub fn apply_overrides(&mut self, o: &ConfigOverrides) -> Result<(), ConfigError> {
        let mut next = self.clone();

        if let Some(v) = &o.persona_name {
            next.persona.name = v.clone();
        }
        if let Some(v) = &o.system_prompt {
            next.persona.system_prompt = v.clone();
        }
        if let Some(v) = &o.db_path {
            next.memory.path = Some(v.clone());
        }
        if let Some(v) = o.history_keep_last {
            next.memory.history_keep_last = v;
        }
        if let Some(v) = o.context_window {
            next.memory.context_window = v;
        }
        if let Some(v) = o.export_limit {
            next.memory.export_limit = v;
        }
        if let Some(v) = o.backend_kind {
            next.backend.kind = v;
        }
        if let Some(v) = &o.host {
            next.backend.host = Some(v.clone());
        }
        if let Some(v) = &o.model {
            next.backend.model = v.clone();
        }
        if let Some(v) = o.temperature {
            next.backend.temperature = v;
        }
        if let Some(v) = o.top_p {
            next.backend.top_p = v;
        }
        if let Some(v) = o.max_tokens {
            next.backend.max_tokens = v;
        }
        if let Some(v) = o.context_size {
            next.backend.context_size = v;
        }
        if let Some(v) = o.threads {
            next.backend.threads = v;
        }
        if let Some(v) = o.timeout_secs {
            next.backend.timeout_secs = v;
        }
        if let Some(v) = o.sandbox_timeout_ms {
            next.sandbox.timeout_ms = v;
        }
        if let Some(v) = o.sandbox_max_steps {
            next.sandbox.max_steps = v;
        }
        if let Some(v) = o.sandbox_max_collection_len {
            next.sandbox.max_collection_len = v;
        }
        if let Some(v) = o.online {
            next.online = v;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Set one setting by dotted key, e.g. `backend.model`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let overrides = ConfigOverrides::from_pair(key, value)?;
        self.apply_overrides(&overrides)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.kind, BackendKind::Ollama);
        assert_eq!(config.backend.timeout_secs, 120);
        assert_eq!(config.memory.history_keep_last, 20);
        assert_eq!(config.memory.context_window, 4);
        assert!(config.online);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.backend.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
online = false

[backend]
kind = "llamacpp"
timeout_secs = 30

[persona]
name = "Gena"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(!config.online);
        assert_eq!(config.backend.kind, BackendKind::LlamaCpp);
        assert_eq!(config.backend.host(), "http://localhost:8080");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.backend.max_tokens, 200);
        assert_eq!(config.persona.name, "Gena");
        assert!(!config.persona.system_prompt.is_empty());
    }

    #[test]
    fn unknown_file_key_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nmodle = \"typo\"\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn set_known_keys() {
        let mut config = AppConfig::default();
        config.set("backend.model", "llama3.2:3b").unwrap();
        config.set("backend.kind", "llama.cpp").unwrap();
        config.set("sandbox.timeout_ms", "500").unwrap();
        config.set("online", "false").unwrap();
        assert_eq!(config.backend.model, "llama3.2:3b");
        assert_eq!(config.backend.kind, BackendKind::LlamaCpp);
        assert_eq!(config.sandbox.timeout_ms, 500);
        assert!(!config.online);
    }

    #[test]
    fn every_known_key_is_settable() {
        for key in KNOWN_KEYS {
            let err = ConfigOverrides::from_pair(key, "");
            assert!(
                !matches!(err, Err(ConfigError::UnknownKey(_))),
                "{key} should be recognised"
            );
        }
    }

    #[test]
    fn set_unknown_key_is_rejected() {
        let mut config = AppConfig::default();
        let err = config.set("backend.colour", "blue").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(ref k) if k == "backend.colour"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn set_unparsable_value_is_rejected() {
        let mut config = AppConfig::default();
        let err = config.set("backend.max_tokens", "lots").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn failed_override_leaves_config_untouched() {
        let mut config = AppConfig::default();
        let overrides = ConfigOverrides {
            model: Some("other".into()),
            temperature: Some(9.0),
            ..ConfigOverrides::default()
        };
        assert!(config.apply_overrides(&overrides).is_err());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn overrides_reject_unknown_fields() {
        let parsed: Result<ConfigOverrides, _> = toml::from_str("modle = \"x\"");
        assert!(parsed.is_err());
        let parsed: ConfigOverrides = toml::from_str("model = \"x\"").unwrap();
        assert_eq!(parsed.model.as_deref(), Some("x"));
    }

    #[test]
    fn context_window_bounded_by_history() {
        let mut config = AppConfig::default();
        assert!(config.set("memory.context_window", "50").is_err());
        assert!(config.set("memory.history_keep_last", "0").is_err());
    }

    #[test]
    fn explicit_db_path_wins() {
        let mut config = AppConfig::default();
        assert!(config.memory.db_path().ends_with("memory.db"));
        config.set("memory.path", "/tmp/other.db").unwrap();
        assert_eq!(config.memory.db_path(), PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("ollama"));
        assert!(toml_str.contains("timeout_secs = 120"));
    }
}
