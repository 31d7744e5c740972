pub mod conversation;
pub mod llm_service;

pub use conversation::ConversationService;
pub use llm_service::{ChatProvider, LlmService, ProviderError};
