//! Conversation store with optimistic updates
//!
//! The ConversationStore is the only writer of the conversation log. A submit:
//! 1. Validates the prompt (blank prompts are ignored)
//! 2. Appends the question and a pending answer in one atomic log update
//! 3. Sends the prompt to the answer service
//! 4. Resolves the captured placeholder slot with the reply
//!
//! Steps 1 and 2 are [`ConversationStore::begin`], which is synchronous so a
//! caller can admit prompts in order. Steps 3 and 4 are
//! [`ConversationStore::complete`].
//!
//! Readers subscribe to a `watch` channel and re-derive their view on every
//! change. Each published change bumps the log revision by one. A failed call
//! never surfaces as an error to the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;

use crate::conversation::{ConversationError, ConversationLog, EntryId};
use crate::providers::AnswerService;

/// What a failed answer call does to its placeholder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Leave the placeholder pending forever
    #[default]
    Silent,
    /// Move the placeholder to a failed entry
    MarkFailed,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "mark-failed" | "mark_failed" | "failed" => Ok(Self::MarkFailed),
            other => Err(format!("Unknown failure policy '{}'", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => f.write_str("silent"),
            Self::MarkFailed => f.write_str("mark-failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Refuse a new submit while an answer is still pending
    pub single_pending: bool,
    pub on_failure: FailurePolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            single_pending: true,
            on_failure: FailurePolicy::Silent,
        }
    }
}

/// Result of one submit, for the caller's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank prompt, nothing happened
    Ignored,
    /// An answer is still pending and admission control is on
    Busy,
    /// The placeholder was resolved with the reply
    Answered(EntryId),
    /// The call failed and the placeholder stays pending
    Unanswered(EntryId),
    /// The call failed and the placeholder was marked failed
    Failed(EntryId),
}

pub struct ConversationStore {
    log: watch::Sender<ConversationLog>,
    service: Arc<dyn AnswerService>,
    options: StoreOptions,
}

impl ConversationStore {
    pub fn new(service: Arc<dyn AnswerService>, options: StoreOptions) -> Self {
        let (log, _) = watch::channel(ConversationLog::new());
        Self {
            log,
            service,
            options,
        }
    }

    /// Whether a new submit would be accepted right now
    pub fn can_submit(&self) -> bool {
        !self.options.single_pending || !self.log.borrow().has_pending()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationLog> {
        self.log.subscribe()
    }

    pub fn snapshot(&self) -> ConversationLog {
        self.log.borrow().clone()
    }

    /// Submit a prompt and wait for its answer
    #[cfg(test)]
    pub async fn submit(&self, prompt: &str) -> SubmitOutcome {
        match self.begin(prompt) {
            Ok(slot) => self.complete(slot, prompt).await,
            Err(outcome) => outcome,
        }
    }

    /// Admit a prompt, appending its question and placeholder.
    ///
    /// Returns the placeholder slot, or `Ignored`/`Busy` when nothing was
    /// appended.
    pub fn begin(&self, prompt: &str) -> Result<EntryId, SubmitOutcome> {
        if prompt.trim().is_empty() {
            return Err(SubmitOutcome::Ignored);
        }

        // Admission check and both appends share one update so no reader
        // sees a question without its placeholder.
        let single_pending = self.options.single_pending;
        let mut slot = None;
        self.log.send_if_modified(|log| {
            if single_pending && log.has_pending() {
                return false;
            }
            slot = Some(log.begin_exchange(prompt));
            log.bump_revision();
            true
        });

        slot.ok_or_else(|| {
            tracing::debug!("Answer still pending, submit refused");
            SubmitOutcome::Busy
        })
    }

    /// Ask the service and resolve `slot` with the reply
    pub async fn complete(&self, slot: EntryId, prompt: &str) -> SubmitOutcome {
        let conversation = self.log.borrow().id;
        let span = tracing::info_span!("submit", %conversation, %slot);

        async move {
            tracing::info!("Question sent");

            match self.service.ask(prompt).await {
                Ok(answer) => {
                    tracing::info!(has_url = answer.url.is_some(), "Answer received");
                    self.update(|log| log.resolve(slot, answer));
                    SubmitOutcome::Answered(slot)
                }
                Err(e) => {
                    tracing::warn!(error = %e, policy = %self.options.on_failure, "Answer call failed");
                    match self.options.on_failure {
                        FailurePolicy::Silent => SubmitOutcome::Unanswered(slot),
                        FailurePolicy::MarkFailed => {
                            self.update(|log| log.fail(slot, e.to_string()));
                            SubmitOutcome::Failed(slot)
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn update(&self, f: impl FnOnce(&mut ConversationLog) -> Result<(), ConversationError>) {
        self.log.send_if_modified(|log| match f(log) {
            Ok(()) => {
                log.bump_revision();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Conversation update rejected");
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    use crate::conversation::{Role, Status};
    use crate::providers::{Answer, AnswerError};

    /// Replies after a per-prompt delay, echoing the prompt
    struct EchoService {
        url: Option<String>,
    }

    #[async_trait]
    impl AnswerService for EchoService {
        async fn ask(&self, prompt: &str) -> Result<Answer, AnswerError> {
            if let Some(ms) = prompt.strip_prefix("sleep:").and_then(|s| s.parse().ok()) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            Ok(Answer {
                text: format!("re: {}", prompt),
                url: self.url.clone(),
            })
        }
    }

    struct FailingService;

    #[async_trait]
    impl AnswerService for FailingService {
        async fn ask(&self, _prompt: &str) -> Result<Answer, AnswerError> {
            Err(AnswerError::InvalidResponse("boom".to_string()))
        }
    }

    /// Holds every call until released
    struct GatedService {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl AnswerService for GatedService {
        async fn ask(&self, prompt: &str) -> Result<Answer, AnswerError> {
            self.gate.notified().await;
            Ok(Answer {
                text: prompt.to_uppercase(),
                url: None,
            })
        }
    }

    fn store(service: impl AnswerService + 'static, options: StoreOptions) -> ConversationStore {
        ConversationStore::new(Arc::new(service), options)
    }

    #[tokio::test]
    async fn test_submit_resolves_placeholder() {
        let store = store(
            EchoService {
                url: Some("https://x".to_string()),
            },
            StoreOptions::default(),
        );

        let outcome = store.submit("What is Igbo?").await;
        let log = store.snapshot();

        let SubmitOutcome::Answered(slot) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(slot.index(), 1);
        assert_eq!(log.len(), 2);

        let question = &log.entries()[0];
        assert_eq!(question.role, Role::Question);
        assert_eq!(question.text(), Some("What is Igbo?"));

        let answer = log.get(slot).unwrap();
        assert_eq!(answer.role, Role::Answer);
        assert_eq!(answer.status(), Status::Resolved);
        assert_eq!(answer.text(), Some("re: What is Igbo?"));
        assert_eq!(answer.attachment_url(), Some("https://x"));
    }

    #[tokio::test]
    async fn test_blank_prompts_are_ignored() {
        let store = store(EchoService { url: None }, StoreOptions::default());
        let rx = store.subscribe();

        assert_eq!(store.submit("").await, SubmitOutcome::Ignored);
        assert_eq!(store.submit("   ").await, SubmitOutcome::Ignored);
        assert_eq!(store.submit("\n\t").await, SubmitOutcome::Ignored);

        assert!(store.snapshot().is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_prompt_kept_verbatim() {
        let store = store(EchoService { url: None }, StoreOptions::default());
        store.submit("  Kedu?  ").await;

        let log = store.snapshot();
        assert_eq!(log.entries()[0].text(), Some("  Kedu?  "));
        assert_eq!(log.entries()[1].text(), Some("re:   Kedu?  "));
    }

    #[tokio::test]
    async fn test_round_trips_alternate() {
        let store = store(EchoService { url: None }, StoreOptions::default());
        for i in 0..4 {
            store.submit(&format!("question {}", i)).await;
        }

        let log = store.snapshot();
        assert_eq!(log.len(), 8);
        for (i, entry) in log.entries().iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Question } else { Role::Answer };
            assert_eq!(entry.role, expected);
            assert_eq!(entry.status(), Status::Resolved);
        }
    }

    #[tokio::test]
    async fn test_failure_leaves_placeholder_pending() {
        let store = store(FailingService, StoreOptions::default());

        let outcome = store.submit("What is Igbo?").await;
        assert!(matches!(outcome, SubmitOutcome::Unanswered(_)));

        let log = store.snapshot();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].status(), Status::Resolved);
        assert_eq!(log.entries()[1].status(), Status::Pending);
        assert_eq!(log.entries()[1].text(), None);

        // The stuck placeholder keeps admission closed
        assert!(!store.can_submit());
        assert_eq!(store.submit("again").await, SubmitOutcome::Busy);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_marked_failed() {
        let store = store(
            FailingService,
            StoreOptions {
                on_failure: FailurePolicy::MarkFailed,
                ..StoreOptions::default()
            },
        );

        let outcome = store.submit("hello").await;
        let SubmitOutcome::Failed(slot) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };

        let entry = store.snapshot().get(slot).cloned().unwrap();
        assert_eq!(entry.status(), Status::Failed);
        assert!(store.can_submit());
    }

    #[tokio::test]
    async fn test_busy_while_pending() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(store(
            GatedService {
                gate: Arc::clone(&gate),
            },
            StoreOptions::default(),
        ));
        let mut rx = store.subscribe();

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.submit("first").await }
        });

        rx.changed().await.unwrap();
        assert!(!store.can_submit());
        assert_eq!(store.submit("second").await, SubmitOutcome::Busy);
        assert_eq!(store.snapshot().len(), 2);

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Answered(_)));
        assert!(store.can_submit());
        assert_eq!(store.snapshot().entries()[1].text(), Some("FIRST"));
    }

    #[tokio::test]
    async fn test_concurrent_submits_resolve_own_slot() {
        let store = store(
            EchoService { url: None },
            StoreOptions {
                single_pending: false,
                ..StoreOptions::default()
            },
        );
        assert!(store.can_submit());

        // The slower first answer arrives after the second one
        let (a, b) = tokio::join!(store.submit("sleep:80"), store.submit("sleep:10"));

        let (SubmitOutcome::Answered(a), SubmitOutcome::Answered(b)) = (a, b) else {
            panic!("unexpected outcomes: {a:?} {b:?}");
        };
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 3);

        let log = store.snapshot();
        assert_eq!(log.len(), 4);
        assert_eq!(log.get(a).unwrap().text(), Some("re: sleep:80"));
        assert_eq!(log.get(b).unwrap().text(), Some("re: sleep:10"));
    }

    #[tokio::test]
    async fn test_exchange_published_once() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(store(
            GatedService {
                gate: Arc::clone(&gate),
            },
            StoreOptions::default(),
        ));
        let mut rx = store.subscribe();

        let task = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.submit("hello").await }
        });

        rx.changed().await.unwrap();
        {
            let log = rx.borrow_and_update();
            assert_eq!(log.len(), 2);
            assert!(log.entries()[1].is_pending());
            assert_eq!(log.revision(), 1);
        }
        tokio::task::yield_now().await;
        assert!(!rx.has_changed().unwrap());

        gate.notify_one();
        assert!(matches!(task.await.unwrap(), SubmitOutcome::Answered(_)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().revision(), 2);
    }

    #[tokio::test]
    async fn test_rejected_update_not_published() {
        let store = store(EchoService { url: None }, StoreOptions::default());
        let slot = assert_ok!(store.begin("hello"));
        let rx = store.subscribe();

        store.update(|log| log.fail(slot, "gave up"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(store.snapshot().revision(), 2);

        let mut rx = store.subscribe();
        rx.borrow_and_update();
        store.update(|log| log.fail(slot, "again"));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.snapshot().revision(), 2);
    }

    #[tokio::test]
    async fn test_begin_admits_in_call_order() {
        let gate = Arc::new(Notify::new());
        let store = store(
            GatedService {
                gate: Arc::clone(&gate),
            },
            StoreOptions::default(),
        );

        // Two lines arriving together: the second is refused before either
        // answer call starts.
        let first = assert_ok!(store.begin("first"));
        assert_eq!(assert_err!(store.begin("second")), SubmitOutcome::Busy);
        assert_eq!(assert_err!(store.begin("  ")), SubmitOutcome::Ignored);
        assert_eq!(store.snapshot().len(), 2);

        let (outcome, ()) = tokio::join!(store.complete(first, "first"), async {
            gate.notify_one()
        });
        assert_eq!(outcome, SubmitOutcome::Answered(first));
        assert!(store.can_submit());
    }

    #[tokio::test]
    async fn test_concurrent_submits_one_admitted() {
        let gate = Arc::new(Notify::new());
        let store = store(
            GatedService {
                gate: Arc::clone(&gate),
            },
            StoreOptions::default(),
        );

        let (a, b, ()) = tokio::join!(store.submit("a"), store.submit("b"), async {
            tokio::task::yield_now().await;
            gate.notify_one();
        });

        let outcomes = [a, b];
        assert_eq!(
            outcomes.iter().filter(|o| **o == SubmitOutcome::Busy).count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, SubmitOutcome::Answered(_)))
                .count(),
            1
        );
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("silent".parse::<FailurePolicy>(), Ok(FailurePolicy::Silent));
        assert_eq!(
            "Mark-Failed".parse::<FailurePolicy>(),
            Ok(FailurePolicy::MarkFailed)
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::MarkFailed.to_string(), "mark-failed");
    }
}
