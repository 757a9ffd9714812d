//! Forgotten-PIN recovery.
//!
//! Four steps: an email address (accepted without verification), two
//! security questions with answers, then a new PIN and its confirmation.
//! The email and questions steps each wait out a fixed delay before
//! advancing; a flow that is cancelled or restarted during that wait is
//! left alone.
//!
//! Answers are registered the first time a recovery runs and checked on
//! every recovery after that. Only a SHA-256 digest of the normalized answer
//! (trimmed, lowercased) is stored.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::error::{GateError, RecoveryError};
use crate::gate::{GateOutcome, GatePhase, GateState, PinGate};

/// Long-lived partition key for the registered answers.
pub const SECURITY_QUESTIONS_KEY: &str = "security_questions";

/// How many questions a recovery asks.
pub const REQUIRED_ANSWERS: usize = 2;

/// The fixed catalog questions are chosen from.
pub const SECURITY_QUESTIONS: [&str; 6] = [
    "What was your childhood nickname?",
    "What is the name of your first pet?",
    "In what city were you born?",
    "What is your mother's maiden name?",
    "What was your favorite food as a child?",
    "What was the name of your elementary school?",
];

/// Step of the recovery sub-flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryStep {
    Email,
    Questions,
    NewPin,
    ConfirmPin,
}

/// A question from [`SECURITY_QUESTIONS`] with the user's answer.
#[derive(Clone, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

impl QuestionAnswer {
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

impl fmt::Debug for QuestionAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionAnswer")
            .field("question", &self.question)
            .field("answer", &"[REDACTED]")
            .finish()
    }
}

/// Stored form of one registered answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegisteredAnswer {
    question: String,
    answer_digest: String,
}

impl RegisteredAnswer {
    fn from_answer(qa: &QuestionAnswer) -> Self {
        Self {
            question: qa.question.clone(),
            answer_digest: digest_answer(&qa.answer),
        }
    }
}

/// Transient recovery bookkeeping held inside the gate state.
#[derive(Debug, Default)]
pub(crate) struct RecoveryProgress {
    /// Bumped whenever a flow starts or ends, so a delayed step can tell
    /// whether it still belongs to the live flow.
    generation: u64,
    /// First-time registration, persisted only with the confirmed new PIN.
    pending_answers: Option<Vec<RegisteredAnswer>>,
}

impl RecoveryProgress {
    pub(crate) fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending_answers = None;
    }
}

impl PinGate {
    /// Enter the recovery flow from the lock screen.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidTransition`] unless locked.
    pub async fn begin_recovery(&self) -> Result<GateOutcome, GateError> {
        let mut state = self.state.lock().await;
        if state.phase != GatePhase::Locked {
            return Err(GateError::InvalidTransition {
                action: "start recovery",
                phase: state.phase,
            });
        }
        state.recovery.reset();
        state.pending_pin = None;
        info!("PIN recovery started");
        Ok(state.transition(
            GatePhase::Recovery(RecoveryStep::Email),
            "Enter your email address",
        ))
    }

    /// Submit the recovery email address.
    ///
    /// Any non-blank address is accepted after the recovery delay.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::MissingEmail`] for a blank address.
    /// - [`RecoveryError::Cancelled`] if the flow changed during the delay.
    /// - [`GateError::InvalidTransition`] outside the email step.
    pub async fn submit_email(&self, email: &str) -> Result<GateOutcome, GateError> {
        let generation = {
            let mut state = self.state.lock().await;
            expect_step(&state, RecoveryStep::Email, "submit an email")?;
            if email.trim().is_empty() {
                return Err(state.fail(RecoveryError::MissingEmail.into()));
            }
            state.recovery.generation
        };

        tokio::time::sleep(self.config.recovery_delay).await;

        let mut state = self.state.lock().await;
        still_current(&state, generation, RecoveryStep::Email)?;
        Ok(state.transition(
            GatePhase::Recovery(RecoveryStep::Questions),
            "Answer your security questions",
        ))
    }

    /// Submit answers to two distinct catalog questions.
    ///
    /// If answers are already registered, both must match; otherwise these
    /// become the registration once the new PIN is confirmed.
    ///
    /// # Errors
    ///
    /// - [`RecoveryError::InvalidQuestions`] for a malformed submission.
    /// - [`RecoveryError::AnswersRejected`] if registered answers differ.
    /// - [`RecoveryError::Cancelled`] if the flow changed during the delay.
    /// - [`GateError::InvalidTransition`] outside the questions step.
    /// - [`GateError::Storage`] if the registration cannot be read.
    pub async fn submit_answers(&self, answers: &[QuestionAnswer]) -> Result<GateOutcome, GateError> {
        let generation = {
            let mut state = self.state.lock().await;
            expect_step(&state, RecoveryStep::Questions, "submit security answers")?;
            if let Err(e) = validate_answers(answers) {
                return Err(state.fail(e.into()));
            }
            state.recovery.generation
        };

        tokio::time::sleep(self.config.recovery_delay).await;

        let mut state = self.state.lock().await;
        still_current(&state, generation, RecoveryStep::Questions)?;

        match self.registered_answers().await? {
            Some(registered) => {
                if !answers_match(&registered, answers) {
                    warn!("security answers rejected");
                    return Err(state.fail(RecoveryError::AnswersRejected.into()));
                }
            }
            None => {
                state.recovery.pending_answers =
                    Some(answers.iter().map(RegisteredAnswer::from_answer).collect());
            }
        }

        Ok(state.transition(
            GatePhase::Recovery(RecoveryStep::NewPin),
            "Enter a new PIN",
        ))
    }

    /// Replace the registered security answers. Requires a granted session.
    ///
    /// # Errors
    ///
    /// - [`GateError::Locked`] without a granted session.
    /// - [`RecoveryError::InvalidQuestions`] for a malformed submission.
    /// - [`GateError::Storage`] if the write fails.
    pub async fn register_security_questions(
        &self,
        answers: &[QuestionAnswer],
    ) -> Result<(), GateError> {
        self.authorize().await?;
        validate_answers(answers)?;
        let registered: Vec<_> = answers.iter().map(RegisteredAnswer::from_answer).collect();
        self.write_registered_answers(&registered).await?;
        info!("security questions registered");
        Ok(())
    }

    /// Whether security answers have been registered.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Storage`] if the partition cannot be read.
    pub async fn has_security_questions(&self) -> Result<bool, GateError> {
        Ok(self.registered_answers().await?.is_some())
    }

    /// Final recovery step: persist the confirmed PIN and any first-time
    /// registration, then go back to the lock screen.
    pub(crate) async fn complete_recovery(
        &self,
        state: &mut GateState,
        pin: &str,
    ) -> Result<GateOutcome, GateError> {
        if let Some(pending) = state.recovery.pending_answers.take() {
            self.write_registered_answers(&pending).await?;
            info!("security questions registered during recovery");
        }
        self.commit_pin(state, pin).await?;
        state.pending_pin = None;
        state.recovery.reset();
        info!("PIN reset through recovery");
        Ok(state.transition(GatePhase::Locked, "PIN reset successful"))
    }

    async fn registered_answers(&self) -> Result<Option<Vec<RegisteredAnswer>>, GateError> {
        let Some(bytes) = self.long.get(SECURITY_QUESTIONS_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Vec<RegisteredAnswer>>(&bytes) {
            Ok(registered) if registered.len() == REQUIRED_ANSWERS => Ok(Some(registered)),
            _ => {
                warn!("stored security questions are malformed; treating them as unregistered");
                Ok(None)
            }
        }
    }

    async fn write_registered_answers(&self, registered: &[RegisteredAnswer]) -> Result<(), GateError> {
        let bytes = serde_json::to_vec(registered).map_err(|e| GateError::Serialization {
            reason: e.to_string(),
        })?;
        self.long.put(SECURITY_QUESTIONS_KEY, &bytes).await?;
        Ok(())
    }
}

fn expect_step(state: &GateState, step: RecoveryStep, action: &'static str) -> Result<(), GateError> {
    if state.phase == GatePhase::Recovery(step) {
        Ok(())
    } else {
        Err(GateError::InvalidTransition {
            action,
            phase: state.phase,
        })
    }
}

fn still_current(state: &GateState, generation: u64, step: RecoveryStep) -> Result<(), GateError> {
    if state.recovery.generation == generation && state.phase == GatePhase::Recovery(step) {
        Ok(())
    } else {
        Err(RecoveryError::Cancelled.into())
    }
}

fn validate_answers(answers: &[QuestionAnswer]) -> Result<(), RecoveryError> {
    let invalid = |reason: &str| RecoveryError::InvalidQuestions {
        reason: reason.to_owned(),
    };

    if answers.len() != REQUIRED_ANSWERS {
        return Err(invalid("exactly two questions must be answered"));
    }
    let mut seen = HashSet::new();
    for qa in answers {
        if !SECURITY_QUESTIONS.contains(&qa.question.as_str()) {
            return Err(invalid("unknown question"));
        }
        if !seen.insert(qa.question.as_str()) {
            return Err(invalid("questions must be distinct"));
        }
        if qa.answer.trim().is_empty() {
            return Err(invalid("answers must not be empty"));
        }
    }
    Ok(())
}

fn digest_answer(answer: &str) -> String {
    let normalized = answer.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Every registered question must be answered, and every answer must match.
fn answers_match(registered: &[RegisteredAnswer], answers: &[QuestionAnswer]) -> bool {
    let mut ok = registered.len() == answers.len();
    for reg in registered {
        let matched = answers
            .iter()
            .find(|qa| qa.question == reg.question)
            .is_some_and(|qa| {
                bool::from(
                    digest_answer(&qa.answer)
                        .as_bytes()
                        .ct_eq(reg.answer_digest.as_bytes()),
                )
            });
        ok &= matched;
    }
    ok
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pinvault_storage::StorageBackend;

    use super::*;
    use crate::gate::tests::{locked_with, stored_pin};

    fn answers(first: &str, second: &str) -> Vec<QuestionAnswer> {
        vec![
            QuestionAnswer::new(SECURITY_QUESTIONS[1], first),
            QuestionAnswer::new(SECURITY_QUESTIONS[2], second),
        ]
    }

    async fn run_to_new_pin(gate: &PinGate, given: &[QuestionAnswer]) -> Result<GateOutcome, GateError> {
        gate.begin_recovery().await?;
        gate.submit_email("me@example.com").await?;
        gate.submit_answers(given).await
    }

    #[tokio::test(start_paused = true)]
    async fn full_recovery_resets_pin_and_stays_locked() {
        let h = locked_with("246").await;
        let out = run_to_new_pin(&h.gate, &answers("Rex", "Lisbon")).await.unwrap();
        assert_eq!(out.phase, GatePhase::Recovery(RecoveryStep::NewPin));

        h.gate.submit_pin("456").await.unwrap();
        let out = h.gate.submit_pin("456").await.unwrap();
        assert_eq!(out.phase, GatePhase::Locked);
        assert_eq!(stored_pin(&h.long).await, "456");
        assert!(matches!(h.gate.authorize().await, Err(GateError::Locked)));
        assert!(h.gate.has_security_questions().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn registered_answers_are_verified_next_time() {
        let h = locked_with("246").await;
        run_to_new_pin(&h.gate, &answers("Rex", "Lisbon")).await.unwrap();
        h.gate.submit_pin("456").await.unwrap();
        h.gate.submit_pin("456").await.unwrap();

        // Wrong answer: stays on the questions step.
        let err = run_to_new_pin(&h.gate, &answers("Fido", "Lisbon")).await.unwrap_err();
        assert!(matches!(err, GateError::Recovery(RecoveryError::AnswersRejected)));
        assert_eq!(
            h.gate.status().await.unwrap().phase,
            GatePhase::Recovery(RecoveryStep::Questions)
        );

        // Normalization tolerates case and surrounding whitespace.
        let out = h.gate.submit_answers(&answers("  rEX ", "lisbon")).await.unwrap();
        assert_eq!(out.phase, GatePhase::Recovery(RecoveryStep::NewPin));
    }

    #[tokio::test(start_paused = true)]
    async fn different_questions_are_rejected_once_registered() {
        let h = locked_with("246").await;
        run_to_new_pin(&h.gate, &answers("Rex", "Lisbon")).await.unwrap();
        h.gate.submit_pin("456").await.unwrap();
        h.gate.submit_pin("456").await.unwrap();

        let other = vec![
            QuestionAnswer::new(SECURITY_QUESTIONS[0], "Rex"),
            QuestionAnswer::new(SECURITY_QUESTIONS[2], "Lisbon"),
        ];
        let err = run_to_new_pin(&h.gate, &other).await.unwrap_err();
        assert!(matches!(err, GateError::Recovery(RecoveryError::AnswersRejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn registration_is_not_persisted_until_pin_confirmed() {
        let h = locked_with("246").await;
        run_to_new_pin(&h.gate, &answers("Rex", "Lisbon")).await.unwrap();
        h.gate.cancel().await.unwrap();
        assert!(!h.long.exists(SECURITY_QUESTIONS_KEY).await.unwrap());
        assert_eq!(stored_pin(&h.long).await, "246");
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_mismatch_returns_to_new_pin() {
        let h = locked_with("246").await;
        run_to_new_pin(&h.gate, &answers("Rex", "Lisbon")).await.unwrap();
        h.gate.submit_pin("456").await.unwrap();
        let err = h.gate.submit_pin("457").await.unwrap_err();
        assert!(matches!(err, GateError::PinMismatch));
        assert_eq!(
            h.gate.status().await.unwrap().phase,
            GatePhase::Recovery(RecoveryStep::NewPin)
        );
        assert_eq!(stored_pin(&h.long).await, "246");
    }

    #[tokio::test(start_paused = true)]
    async fn blank_email_is_rejected_immediately() {
        let h = locked_with("246").await;
        h.gate.begin_recovery().await.unwrap();
        let err = h.gate.submit_email("   ").await.unwrap_err();
        assert!(matches!(err, GateError::Recovery(RecoveryError::MissingEmail)));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_answers_are_rejected() {
        let h = locked_with("246").await;
        h.gate.begin_recovery().await.unwrap();
        h.gate.submit_email("me@example.com").await.unwrap();

        let same_twice = vec![
            QuestionAnswer::new(SECURITY_QUESTIONS[0], "a"),
            QuestionAnswer::new(SECURITY_QUESTIONS[0], "b"),
        ];
        let unknown = vec![
            QuestionAnswer::new("Favourite colour?", "a"),
            QuestionAnswer::new(SECURITY_QUESTIONS[0], "b"),
        ];
        let blank = answers("", "x");
        let one = vec![QuestionAnswer::new(SECURITY_QUESTIONS[0], "a")];

        for bad in [same_twice, unknown, blank, one] {
            let err = h.gate.submit_answers(&bad).await.unwrap_err();
            assert!(matches!(
                err,
                GateError::Recovery(RecoveryError::InvalidQuestions { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_delay_discards_pending_step() {
        let h = Arc::new(locked_with("246").await);
        h.gate.begin_recovery().await.unwrap();

        let task = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.gate.submit_email("me@example.com").await })
        };
        tokio::task::yield_now().await;
        h.gate.cancel().await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, GateError::Recovery(RecoveryError::Cancelled)));
        assert_eq!(h.gate.status().await.unwrap().phase, GatePhase::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_during_delay_does_not_skip_ahead() {
        let h = Arc::new(locked_with("246").await);
        h.gate.begin_recovery().await.unwrap();

        let task = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.gate.submit_email("me@example.com").await })
        };
        tokio::task::yield_now().await;
        h.gate.cancel().await.unwrap();
        h.gate.begin_recovery().await.unwrap();

        assert!(task.await.unwrap().is_err());
        assert_eq!(
            h.gate.status().await.unwrap().phase,
            GatePhase::Recovery(RecoveryStep::Email)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn email_step_waits_for_delay() {
        let h = Arc::new(locked_with("246").await);
        h.gate.begin_recovery().await.unwrap();
        let task = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.gate.submit_email("me@example.com").await })
        };
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            h.gate.status().await.unwrap().phase,
            GatePhase::Recovery(RecoveryStep::Email)
        );
        task.await.unwrap().unwrap();
        assert_eq!(
            h.gate.status().await.unwrap().phase,
            GatePhase::Recovery(RecoveryStep::Questions)
        );
    }

    #[tokio::test]
    async fn register_requires_granted_session() {
        let h = locked_with("246").await;
        let err = h
            .gate
            .register_security_questions(&answers("Rex", "Lisbon"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Locked));

        h.gate.submit_pin("246").await.unwrap();
        h.gate
            .register_security_questions(&answers("Rex", "Lisbon"))
            .await
            .unwrap();
        let raw = h.long.get(SECURITY_QUESTIONS_KEY).await.unwrap().unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(!text.contains("Rex"));
        assert!(!text.contains("rex"));
    }

    #[tokio::test]
    async fn recovery_only_from_locked() {
        let h = locked_with("246").await;
        h.gate.submit_pin("246").await.unwrap();
        assert!(matches!(
            h.gate.begin_recovery().await,
            Err(GateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn debug_redacts_answer() {
        let qa = QuestionAnswer::new(SECURITY_QUESTIONS[0], "Sparky");
        assert!(!format!("{qa:?}").contains("Sparky"));
    }
}
