use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Environment variable pointing at a TOML config file.
pub const CONFIG_ENV: &str = "SITE_ASSISTANT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub site: SiteConfig,
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route the assistant handler is mounted on.
    pub path: String,
    /// Answers CORS preflights. OPTIONS requests then no longer reach the
    /// handler's JSON 405.
    pub cors: bool,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            path: "/api/assistant".to_string(),
            cors: false,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    /// Inline key, only used when `api_key_env` is unset in the environment.
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            model: "openai/gpt-oss-20b".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub enabled: bool,
    pub url: String,
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://jbceramicaa.netlify.app/".to_string(),
            max_chars: 20_000,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    pub language: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "JB Cerámica Assistant".to_string(),
            language: "Spanish".to_string(),
        }
    }
}

impl Config {
    pub fn load_auto() -> Result<Self> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load(&path.to_string_lossy());
            } else {
                tracing::warn!("{} points to non-existent file: {}", CONFIG_ENV, path.display());
            }
        }

        tracing::info!("No config file given, using built-in defaults");
        Ok(Self::default())
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse TOML from {}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            );
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be greater than 0");
        }
        if self.site.max_chars == 0 {
            bail!("site.max_chars must be greater than 0");
        }
        if self.server.max_body_bytes == 0 {
            bail!("server.max_body_bytes must be greater than 0");
        }
        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/', got '{}'", self.server.path);
        }
        Ok(())
    }

    /// Picks the API key: the variable named by `llm.api_key_env` wins over
    /// the inline `llm.api_key`. Blank values count as missing.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.llm.api_key_env)
            .or_else(|| self.llm.api_key.clone())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "Missing API key: set {} or llm.api_key in the config file",
                    self.llm.api_key_env
                )
            })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
