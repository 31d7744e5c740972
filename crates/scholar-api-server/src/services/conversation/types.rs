use std::time::{Duration, Instant};

use crate::models::chat::{ChatMessage, SessionId};

/// Blob value when extraction succeeded but produced no text. Downstream
/// prompt construction always has a defined value to inject.
pub const NO_READABLE_TEXT_SENTINEL: &str =
    "No readable text could be extracted from the uploaded document.";

/// The single piece of extracted document text injected into every
/// subsequent request's system instruction. At most one per session;
/// each new upload replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContextBlob {
    /// No document uploaded yet; the advisory instruction is used instead.
    #[default]
    None,
    Text(String),
    /// Upload was accepted but nothing readable came out of it.
    NoReadableText,
}

impl ContextBlob {
    pub fn from_extracted(text: String) -> Self {
        if text.trim().is_empty() {
            Self::NoReadableText
        } else {
            Self::Text(text)
        }
    }

    /// The text to splice into the context instruction, when one applies.
    pub fn as_context_text(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Text(text) => Some(text),
            Self::NoReadableText => Some(NO_READABLE_TEXT_SENTINEL),
        }
    }
}

/// One user's conversation: ordered message history plus the current context
/// blob. System messages are never stored here; they are synthesized fresh
/// per request so a new upload can never leave stale context behind.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub messages: Vec<ChatMessage>,
    pub context: ContextBlob,
    pub created_at: Instant,
    pub last_activity: Instant,
    /// Completed turns (one turn = user + assistant pair).
    pub total_turns: usize,
}

impl Session {
    pub fn new(session_id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            messages: Vec::new(),
            context: ContextBlob::None,
            created_at: now,
            last_activity: now,
            total_turns: 0,
        }
    }

    /// Replaces the context blob unconditionally.
    pub fn set_context(&mut self, extracted: String) {
        self.context = ContextBlob::from_extracted(extracted);
        self.touch();
    }

    /// Messages in insertion order. Callers may reverse for presentation.
    pub fn history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }

    pub fn pair_count(&self) -> usize {
        self.messages.len() / 2
    }

    /// Drop oldest pairs until at most `max_turns` pairs remain.
    pub fn enforce_window(&mut self, max_turns: usize) {
        let max_turns = max_turns.max(1);
        while self.pair_count() > max_turns {
            self.messages.drain(0..2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_extraction_becomes_the_sentinel() {
        assert_eq!(
            ContextBlob::from_extracted("   \n ".to_string()),
            ContextBlob::NoReadableText
        );
        assert_eq!(
            ContextBlob::NoReadableText.as_context_text(),
            Some(NO_READABLE_TEXT_SENTINEL)
        );
    }

    #[test]
    fn new_upload_replaces_prior_blob() {
        let mut session = Session::new("s1".to_string());
        session.set_context("First draft.".to_string());
        session.set_context("Second draft.".to_string());

        assert_eq!(session.context, ContextBlob::Text("Second draft.".to_string()));
    }

    #[test]
    fn window_drops_oldest_pairs_first() {
        let mut session = Session::new("s1".to_string());
        for i in 0..4 {
            session.messages.push(ChatMessage::user(format!("q{}", i)));
            session.messages.push(ChatMessage::assistant(format!("a{}", i)));
        }

        session.enforce_window(2);

        assert_eq!(session.pair_count(), 2);
        assert_eq!(session.messages[0].text(), Some("q2"));
        assert_eq!(session.messages[3].text(), Some("a3"));
    }

    #[test]
    fn ttl_expiry() {
        let session = Session::new("s1".to_string());
        assert!(!session.is_expired(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(2));
        assert!(session.is_expired(Duration::from_millis(1)));
    }
}
