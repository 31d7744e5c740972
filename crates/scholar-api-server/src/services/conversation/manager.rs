use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{PromptsConfig, SessionConfig};
use crate::models::chat::ChatMessage;
use crate::services::llm_service::{ChatProvider, ProviderError};
use crate::utils::RetryPolicy;

use super::cache::SessionStore;
use super::types::ContextBlob;

/// Placeholder in the context instruction replaced with the blob text.
const CONTEXT_PLACEHOLDER: &str = "{{CONTEXT}}";

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub reply: String,
    pub total_turns: usize,
}

/// Mediates every exchange with the chat provider: owns the session store,
/// synthesizes the system instruction per request, and applies the bounded
/// retry policy at the single provider call site.
pub struct ConversationService {
    store: SessionStore,
    provider: Box<dyn ChatProvider>,
    prompts: PromptsConfig,
    retry: RetryPolicy,
    max_turns: usize,
}

impl ConversationService {
    pub fn new(
        provider: Box<dyn ChatProvider>,
        prompts: PromptsConfig,
        retry: RetryPolicy,
        session: &SessionConfig,
    ) -> Self {
        Self {
            store: SessionStore::new(Duration::from_secs(session.ttl_hours * 60 * 60)),
            provider,
            prompts,
            retry,
            max_turns: session.max_turns,
        }
    }

    /// Replaces the session's context blob with freshly extracted text.
    pub async fn set_context(&self, session_id: &str, extracted: String) {
        let session = self.store.get_or_create(session_id);
        let mut session = session.lock().await;
        session.set_context(extracted);
        info!("Session {}: context blob replaced", session_id);
    }

    /// Runs one conversation turn. The session lock is held across the
    /// provider call, so a session is either idle or awaiting exactly one
    /// response; concurrent asks on the same session queue behind it.
    ///
    /// History is mutated only on full success, user turn then assistant
    /// turn, never partially.
    pub async fn ask(
        &self,
        session_id: &str,
        message: &str,
        image_data_uri: Option<String>,
    ) -> Result<AskOutcome, ProviderError> {
        let session = self.store.get_or_create(session_id);
        let mut session = session.lock().await;

        let system = self.system_message(&session.context, image_data_uri.is_some());
        let user_turn = match image_data_uri {
            Some(uri) => ChatMessage::user_with_image(message, uri),
            None => ChatMessage::user(message),
        };

        let mut outbound = Vec::with_capacity(session.messages.len() + 2);
        outbound.push(system);
        outbound.extend(session.messages.iter().cloned());
        outbound.push(user_turn.clone());

        let reply = self.call_provider_with_retry(&outbound).await?;

        session.messages.push(user_turn);
        session.messages.push(ChatMessage::assistant(&reply));
        session.total_turns += 1;
        session.enforce_window(self.max_turns);
        session.touch();

        debug!(
            "Session {}: turn complete ({} messages stored)",
            session_id,
            session.messages.len()
        );

        Ok(AskOutcome {
            reply,
            total_turns: session.total_turns,
        })
    }

    /// Stored messages in insertion order; None for an unknown session.
    pub async fn history(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        let session = self.store.get(session_id)?;
        let session = session.lock().await;
        Some(session.history().cloned().collect())
    }

    /// Explicit session teardown.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.store.remove(session_id)
    }

    pub fn cleanup_expired_sessions(&self) -> usize {
        self.store.cleanup_expired()
    }

    /// The system message is synthesized fresh from the current blob on
    /// every request; it is never part of stored history. Image-mode turns
    /// always use the advisory instruction, never the text blob.
    fn system_message(&self, context: &ContextBlob, image_mode: bool) -> ChatMessage {
        if image_mode {
            return ChatMessage::system(&self.prompts.advisory_instruction);
        }

        match context.as_context_text() {
            Some(text) => ChatMessage::system(
                self.prompts
                    .context_instruction
                    .replace(CONTEXT_PLACEHOLDER, text),
            ),
            None => ChatMessage::system(&self.prompts.advisory_instruction),
        }
    }

    async fn call_provider_with_retry(
        &self,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.provider.complete(messages).await {
                Ok(reply) => return Ok(reply),
                Err(err) if self.retry.should_retry(attempt, err.is_rate_limit()) => {
                    warn!(
                        "Provider rate-limited (attempt {}), retrying in {:?}",
                        attempt,
                        self.retry.backoff()
                    );
                    tokio::time::sleep(self.retry.backoff()).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!("Provider call failed after {} attempt(s): {}", attempt, err);
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{MessageContent, Role};
    use crate::services::llm_service::MockChatProvider;
    use mockall::Sequence;

    fn prompts() -> PromptsConfig {
        PromptsConfig {
            context_instruction:
                "You are an academic assistant. Use the following content to answer questions:\n{{CONTEXT}}"
                    .to_string(),
            advisory_instruction:
                "You are an academic assistant. No document has been uploaded; answer from general knowledge."
                    .to_string(),
        }
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            max_turns: 20,
            ttl_hours: 6,
        }
    }

    fn service(provider: MockChatProvider) -> ConversationService {
        ConversationService::new(
            Box::new(provider),
            prompts(),
            RetryPolicy::new(2, Duration::ZERO),
            &session_config(),
        )
    }

    fn system_text(messages: &[ChatMessage]) -> String {
        assert_eq!(messages[0].role, Role::System);
        messages[0].text().expect("system message is text").to_string()
    }

    #[tokio::test]
    async fn history_grows_two_per_successful_ask() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .times(3)
            .returning(|_| Ok("reply".to_string()));

        let svc = service(provider);
        for i in 0..3 {
            svc.ask("s1", &format!("question {}", i), None).await.unwrap();
        }

        let history = svc.history("s1").await.unwrap();
        assert_eq!(history.len(), 6);
        for (i, msg) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(msg.role, expected, "position {}", i);
        }
    }

    #[tokio::test]
    async fn system_message_reflects_latest_blob_only() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .withf(|messages| {
                let system = messages[0].text().unwrap();
                system.contains("Second draft.") && !system.contains("First draft.")
            })
            .times(1)
            .returning(|_| Ok("reply".to_string()));

        let svc = service(provider);
        svc.set_context("s1", "First draft.".to_string()).await;
        svc.set_context("s1", "Second draft.".to_string()).await;
        svc.ask("s1", "Summarize", None).await.unwrap();
    }

    #[tokio::test]
    async fn advisory_instruction_used_without_context() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .withf(|messages| {
                let system = system_text(messages);
                system.contains("No document has been uploaded")
                    && !system.contains("{{CONTEXT}}")
                    && !system.is_empty()
            })
            .times(1)
            .returning(|_| Ok("hi".to_string()));

        let svc = service(provider);
        svc.ask("s1", "Hello", None).await.unwrap();
    }

    #[tokio::test]
    async fn empty_extraction_injects_the_sentinel() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .withf(|messages| {
                system_text(messages).contains("No readable text could be extracted")
            })
            .times(1)
            .returning(|_| Ok("reply".to_string()));

        let svc = service(provider);
        svc.set_context("s1", "  \n".to_string()).await;
        svc.ask("s1", "What does it say?", None).await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_then_success_retries_exactly_once() {
        let mut seq = Sequence::new();
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::RateLimited));
        provider
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("recovered".to_string()));

        let svc = service(provider);
        let outcome = svc.ask("s1", "Improve clarity", None).await.unwrap();

        assert_eq!(outcome.reply, "recovered");
        // One appended pair, no duplicates from the retried call.
        assert_eq!(svc.history("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn two_rate_limits_surface_failure_without_history_mutation() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .times(2)
            .returning(|_| Err(ProviderError::RateLimited));

        let svc = service(provider);
        let err = svc.ask("s1", "Improve clarity", None).await.unwrap_err();

        assert!(err.is_rate_limit());
        assert!(svc.history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_rate_limit_errors_are_never_retried() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_| {
                Err(ProviderError::Api {
                    status: 500,
                    body: "boom".to_string(),
                })
            });

        let svc = service(provider);
        assert!(svc.ask("s1", "Hello", None).await.is_err());
        assert!(svc.history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_mode_system_message_never_carries_the_text_blob() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .withf(|messages| {
                let system = system_text(messages);
                let user = messages.last().unwrap();
                !system.contains("Thesis draft.")
                    && matches!(user.content, MessageContent::Parts(_))
            })
            .times(1)
            .returning(|_| Ok("a chart".to_string()));

        let svc = service(provider);
        svc.set_context("s1", "Thesis draft.".to_string()).await;
        svc.ask(
            "s1",
            "What is in this figure?",
            Some("data:image/png;base64,AAAA".to_string()),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn uploaded_text_reaches_the_provider_system_message() {
        // spec'd end-to-end example: "Thesis draft." upload then one ask.
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .withf(|messages| system_text(messages).contains("Thesis draft."))
            .times(1)
            .returning(|_| Ok("Here is a clearer version.".to_string()));

        let svc = service(provider);
        svc.set_context("s1", "Thesis draft.".to_string()).await;
        let outcome = svc.ask("s1", "Improve clarity", None).await.unwrap();

        assert_eq!(outcome.reply, "Here is a clearer version.");
        let history = svc.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), Some("Improve clarity"));
        assert_eq!(history[1].text(), Some("Here is a clearer version."));
    }

    #[tokio::test]
    async fn stored_history_is_capped_by_the_sliding_window() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .times(3)
            .returning(|_| Ok("reply".to_string()));

        let svc = ConversationService::new(
            Box::new(provider),
            prompts(),
            RetryPolicy::new(2, Duration::ZERO),
            &SessionConfig {
                max_turns: 1,
                ttl_hours: 6,
            },
        );

        for i in 0..3 {
            svc.ask("s1", &format!("q{}", i), None).await.unwrap();
        }

        let history = svc.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), Some("q2"));
    }

    #[tokio::test]
    async fn ended_sessions_are_gone() {
        let mut provider = MockChatProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_| Ok("reply".to_string()));

        let svc = service(provider);
        svc.ask("s1", "Hello", None).await.unwrap();

        assert!(svc.end_session("s1"));
        assert!(svc.history("s1").await.is_none());
    }
}
