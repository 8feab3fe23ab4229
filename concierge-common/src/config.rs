//! Configuration management for the concierge services.
//!
//! The service reads a single configuration file at `~/.concierge/config.json`
//! (or the path in `CONCIERGE_CONFIG`).
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Server
//! - `CONCIERGE_HOST` → server.host
//! - `CONCIERGE_PORT` → server.port
//!
//! ## Storage
//! - `CONCIERGE_APARTMENTS_DIR` → storage.apartments_dir
//! - `CONCIERGE_HISTORY_DIR` → storage.history_dir
//! - `CONCIERGE_PHONE_REGISTRY` → storage.phone_registry_path
//!
//! ## LLM
//! - `ANTHROPIC_API_KEY` → llm.api_key
//! - `CONCIERGE_MODEL` → llm.model
//!
//! ## WhatsApp
//! - `WHATSAPP_VERIFY_TOKEN` → whatsapp.verify_token
//! - `WHATSAPP_ACCESS_TOKEN` → whatsapp.access_token
//! - `WHATSAPP_PHONE_NUMBER_ID` → whatsapp.phone_number_id
//! - `WHATSAPP_APP_SECRET` → whatsapp.app_secret
//!
//! ## Logging
//! - `CONCIERGE_LOG_LEVEL` → observability.log_level
//! - `CONCIERGE_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".concierge"),
        |dirs| dirs.home_dir().join(".concierge"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var("CONCIERGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Language-model responder
    #[serde(default)]
    pub llm: LlmConfig,

    /// Assistant persona
    #[serde(default)]
    pub concierge: ConciergeConfig,

    /// WhatsApp Business API
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CONCIERGE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CONCIERGE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Some(dir) = lookup("CONCIERGE_APARTMENTS_DIR") {
            self.storage.apartments_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CONCIERGE_HISTORY_DIR") {
            self.storage.history_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("CONCIERGE_PHONE_REGISTRY") {
            self.storage.phone_registry_path = PathBuf::from(path);
        }

        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("CONCIERGE_MODEL") {
            self.llm.model = model;
        }

        if let Some(token) = lookup("WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = token;
        }
        if let Some(token) = lookup("WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(token);
        }
        if let Some(id) = lookup("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(id);
        }
        if let Some(secret) = lookup("WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret);
        }

        if let Some(level) = lookup("CONCIERGE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("CONCIERGE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request body cap, mostly relevant for document uploads
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

/// File-based storage layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// One sub-directory per apartment holding its raw documents
    #[serde(default = "default_apartments_dir")]
    pub apartments_dir: PathBuf,
    /// Per-guest history and link records
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    /// Phone number → apartment registry file
    #[serde(default = "default_phone_registry_path")]
    pub phone_registry_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            apartments_dir: default_apartments_dir(),
            history_dir: default_history_dir(),
            phone_registry_path: default_phone_registry_path(),
        }
    }
}

fn default_apartments_dir() -> PathBuf {
    PathBuf::from("apartments_data")
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("chat_history")
}

fn default_phone_registry_path() -> PathBuf {
    PathBuf::from("guest_phone_registry.json")
}

/// Language-model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    /// Upper bound for one responder round trip
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.anthropic.com".into()
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_max_tokens() -> i64 {
    1000
}

fn default_llm_timeout() -> u64 {
    30
}

/// Persona embedded in the system instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    #[serde(default = "default_brand")]
    pub brand: String,
    #[serde(default = "default_city")]
    pub city: String,
    /// Language every reply must be written in
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ConciergeConfig {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            city: default_city(),
            language: default_language(),
        }
    }
}

fn default_brand() -> String {
    "MyRentalHost".into()
}

fn default_city() -> String {
    "Barcelona".into()
}

fn default_language() -> String {
    "Spanish".into()
}

/// WhatsApp channel configuration (via WhatsApp Business Cloud API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Webhook verify token
    #[serde(default = "default_verify_token")]
    pub verify_token: String,
    /// WhatsApp Business API access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// WhatsApp Business API phone number ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,
    /// App secret for `X-Hub-Signature-256` verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
    #[serde(default = "default_unsupported_reply")]
    pub unsupported_reply: String,
    #[serde(default = "default_unregistered_reply")]
    pub unregistered_reply: String,
    #[serde(default = "default_error_reply")]
    pub error_reply: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            verify_token: default_verify_token(),
            access_token: None,
            phone_number_id: None,
            app_secret: None,
            api_base: default_graph_api_base(),
            unsupported_reply: default_unsupported_reply(),
            unregistered_reply: default_unregistered_reply(),
            error_reply: default_error_reply(),
        }
    }
}

fn default_verify_token() -> String {
    "myrentalhost_verify_token".into()
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v18.0".into()
}

fn default_unsupported_reply() -> String {
    "Lo siento, solo puedo procesar mensajes de texto por el momento.".into()
}

fn default_unregistered_reply() -> String {
    "¡Hola! 👋 Para poder ayudarte, necesito saber en qué apartamento te alojas. \
     Por favor, contacta con nuestro equipo de soporte para completar tu registro."
        .into()
}

fn default_error_reply() -> String {
    "Disculpa, estoy teniendo problemas técnicos. \
     Por favor, intenta de nuevo en unos momentos o contacta con nuestro equipo."
        .into()
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.storage.apartments_dir, PathBuf::from("apartments_data"));
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.whatsapp.verify_token, "myrentalhost_verify_token");
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{ "server": { "port": 8080 }, "concierge": { "city": "Madrid" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.concierge.city, "Madrid");
        assert_eq!(config.concierge.brand, "MyRentalHost");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "llm": { "model": "claude-3-5-haiku-20241022" } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.llm.model, "claude-3-5-haiku-20241022");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONCIERGE_PORT", "9000"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("WHATSAPP_VERIFY_TOKEN", "s3cret"),
            ("CONCIERGE_APARTMENTS_DIR", "/srv/apartments"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(config.whatsapp.verify_token, "s3cret");
        assert_eq!(config.storage.apartments_dir, PathBuf::from("/srv/apartments"));
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_override_ignores_bad_port() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "CONCIERGE_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 5000);
    }
}
