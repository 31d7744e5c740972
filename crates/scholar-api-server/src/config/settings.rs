use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub upload: UploadConfig,
    pub session: SessionConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    /// Provider credential. Expected via APP__LLM__API_KEY or an untracked
    /// settings file; an empty value is a startup failure.
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    /// Model used for image-mode turns. Absent = image questions disabled.
    #[serde(default)]
    pub vision_model: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Maximum stored user/assistant pairs before the oldest pair is dropped.
    pub max_turns: usize,
    pub ttl_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    /// System instruction used when a document has been uploaded.
    /// `{{CONTEXT}}` is replaced with the current context blob.
    pub context_instruction: String,
    /// System instruction used when no document context exists
    /// (and for every image-mode turn).
    pub advisory_instruction: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// The credential check that must pass before the server binds its
    /// listener. Missing credential is the only fatal startup error class.
    pub fn validate_credential(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!(
                "LLM API key is missing. Set APP__LLM__API_KEY in the environment \
                 (or llm.api_key in config/settings.toml) and restart."
            );
        }
        Ok(())
    }

    pub fn vision_enabled(&self) -> bool {
        self.llm
            .vision_model
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
    }
}
