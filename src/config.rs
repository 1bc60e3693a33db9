use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_TRANSLATE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Top-level runtime configuration.
///
/// Layering: built-in defaults, then the optional YAML file, then environment.
/// CLI flags are applied by the binary on top of the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SwarmConfig {
    #[serde(default)]
    pub model: ModelConfig,

    /// Directory agent state files are written under.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            state_dir: default_state_dir(),
            install: InstallConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    #[serde(alias = "open_ai")]
    OpenAi,
    Http,
    Ollama,
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(ProviderKind::OpenAi),
            "http" => Ok(ProviderKind::Http),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(anyhow!(
                "unsupported provider kind '{other}' (supported: openai, http, ollama)"
            )),
        }
    }
}

/// Which surface a model call is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Agents,
    Chat,
    Translate,
    Analysis,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable the credential is read from.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Chat override. Unset means `gpt-4.1` on OpenAI, `name` elsewhere.
    #[serde(default)]
    pub chat_model: Option<String>,

    /// Translation override. Unset means `gpt-4o-mini` on OpenAI, `name` elsewhere.
    #[serde(default)]
    pub translate_model: Option<String>,

    #[serde(default)]
    pub analysis_model: Option<String>,

    /// Credential resolved at configuration time. Never serialised.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            name: default_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            chat_model: None,
            translate_model: None,
            analysis_model: None,
            api_key: None,
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.api_key_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("chat_model", &self.chat_model)
            .field("translate_model", &self.translate_model)
            .field("analysis_model", &self.analysis_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ModelConfig {
    /// Model name to use for a given surface.
    ///
    /// An explicit override wins. Without one, OpenAI gets its per-feature
    /// defaults and every other backend uses `name`, since those model names
    /// only exist on OpenAI.
    pub fn model_for(&self, feature: Feature) -> &str {
        let (over, openai_default) = match feature {
            Feature::Agents => (None, None),
            Feature::Chat => (self.chat_model.as_deref(), Some(DEFAULT_CHAT_MODEL)),
            Feature::Translate => (
                self.translate_model.as_deref(),
                Some(DEFAULT_TRANSLATE_MODEL),
            ),
            Feature::Analysis => (self.analysis_model.as_deref(), None),
        };
        let fallback = match self.provider {
            ProviderKind::OpenAi => openai_default,
            ProviderKind::Http | ProviderKind::Ollama => None,
        };
        over.or(fallback).unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
    /// Human-readable name used in status lines.
    #[serde(default = "default_install_label")]
    pub label: String,

    /// Program followed by its arguments.
    #[serde(default = "default_install_command")]
    pub command: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            label: default_install_label(),
            command: default_install_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl SwarmConfig {
    /// Load configuration: defaults, then `path` (if any), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("read config file: {}", p.display()))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("parse config file: {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: SwarmConfig = serde_yaml::from_str(text).context("invalid config yaml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay `LEGAL_SWARM_*` variables and resolve the credential.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = non_empty_env("LEGAL_SWARM_PROVIDER") {
            self.model.provider = v.parse()?;
        }
        if let Some(v) = non_empty_env("LEGAL_SWARM_MODEL") {
            self.model.name = v;
        }
        if let Some(v) = non_empty_env("LEGAL_SWARM_BASE_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = non_empty_env("LEGAL_SWARM_STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env("LEGAL_SWARM_TIMEOUT_SECS") {
            self.model.timeout_secs = parse_timeout_secs(&v)?;
        }
        self.model.api_key = non_empty_env(&self.model.api_key_env);
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.name.trim().is_empty() {
            return Err(anyhow!("model.name must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(anyhow!(
                "model.temperature must be within [0, 2] (got {})",
                self.model.temperature
            ));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be a positive integer"));
        }
        if self.install.command.is_empty() || self.install.command[0].trim().is_empty() {
            return Err(anyhow!("install.command must name a program"));
        }
        Ok(())
    }
}

fn parse_timeout_secs(raw: &str) -> Result<u64> {
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        anyhow!("invalid LEGAL_SWARM_TIMEOUT_SECS: '{raw}' (must be a positive integer)")
    })?;
    if parsed == 0 {
        return Err(anyhow!(
            "invalid LEGAL_SWARM_TIMEOUT_SECS: '{raw}' (must be a positive integer)"
        ));
    }
    Ok(parsed)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_install_label() -> String {
    "llama3.1:8b model".to_string()
}

fn default_install_command() -> Vec<String> {
    ["ollama", "pull", "llama3.1:8b"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
