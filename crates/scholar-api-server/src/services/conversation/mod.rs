pub mod cache;
pub mod manager;
pub mod types;

pub use cache::SessionStore;
pub use manager::ConversationService;
pub use types::{ContextBlob, Session, NO_READABLE_TEXT_SENTINEL};
