pub mod settings;

pub use settings::{
    LlmConfig, PromptsConfig, RetryConfig, ServerConfig, SessionConfig, Settings, UploadConfig,
};
