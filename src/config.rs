//! Service configuration.
//!
//! Loaded from a TOML file (`gemrelay.toml` by default, overridable as the
//! first CLI argument). Secrets can also come from the environment:
//! `SLACK_BOT_TOKEN`, `GEMINI_API_KEY` and `GOOGLE_SERVICE_ACCOUNT_JSON`
//! override their file counterparts when set.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Inbound request body cap. Slack event payloads are small; anything
    /// larger is noise.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Our own user ID, used to ignore our own messages. Resolved via
    /// `auth.test` at startup when left empty.
    #[serde(default)]
    pub bot_user_id: String,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// When true, an inbound image also triggers generation of a new image
    /// that is uploaded back to the channel.
    #[serde(default)]
    pub image_generation: bool,
    #[serde(default = "default_narrative_prompt")]
    pub narrative_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// When true, plain-text messages search Drive folders instead of
    /// chatting with Gemini.
    #[serde(default)]
    pub enabled: bool,
    /// Service-account credential blob (the JSON key file contents).
    #[serde(default)]
    pub service_account_json: String,
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    256 * 1024
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_text_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_narrative_prompt() -> String {
    "Describe this image, then tell a short story inspired by it.".to_string()
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_dedup_capacity() -> usize {
    10_000
}

fn default_dedup_ttl_secs() -> u64 {
    86_400
}

fn default_queue_capacity() -> usize {
    64
}

fn default_pool_size() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            bot_user_id: String::new(),
            api_base: default_slack_api_base(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_gemini_api_base(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            max_output_tokens: default_max_output_tokens(),
            image_generation: false,
            narrative_prompt: default_narrative_prompt(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_account_json: String::new(),
            api_base: default_drive_api_base(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
            ttl_secs: default_dedup_ttl_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            pool_size: default_pool_size(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist, then apply environment overrides for secrets.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply environment overrides for secret values. The lookup is injected
    /// so tests never have to mutate process-wide environment state.
    pub fn apply_env<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = get("SLACK_BOT_TOKEN") {
            self.slack.bot_token = token;
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Some(blob) = get("GOOGLE_SERVICE_ACCOUNT_JSON") {
            self.drive.service_account_json = blob;
        }
    }

    /// Reject configurations that cannot possibly serve traffic.
    pub fn validate(&self) -> Result<()> {
        if self.slack.bot_token.is_empty() {
            bail!("slack.bot_token is not set (config file or SLACK_BOT_TOKEN)");
        }
        if self.gemini.api_key.is_empty() {
            bail!("gemini.api_key is not set (config file or GEMINI_API_KEY)");
        }
        if self.drive.enabled && self.drive.service_account_json.is_empty() {
            bail!(
                "drive.enabled is set but no service account credential is configured \
                 (config file or GOOGLE_SERVICE_ACCOUNT_JSON)"
            );
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
