//! PIN gate for `PinVault`.
//!
//! A single [`PinGate`] owns everything about access: the stored PIN in the
//! long-lived partition, the session flag in the session partition, and the
//! transient state of whichever multi-step flow is in progress. Callers feed
//! it PIN entries through [`PinGate::submit_pin`]; what an entry means
//! depends on the current [`GatePhase`].
//!
//! ```text
//!   AwaitingFirstPin ──pin──▶ AwaitingPinConfirm ──match──▶ Granted
//!          ▲                          │                       │
//!          └────────mismatch──────────┘             logout / timeout
//!                                                             ▼
//!   ChangingPin{Current,New,Confirm} ◀──change── Locked ──pin──▶ Granted
//!   Recovery{Email,Questions,NewPin,ConfirmPin} ◀──recover──┘
//! ```
//!
//! The stored PIN is only ever written at the final confirmed step of a
//! flow. A mismatch anywhere resets the fields of that step and raises a
//! transient [`Notice`], nothing more.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pinvault_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::GateError;
use crate::recovery::{RecoveryProgress, RecoveryStep};

/// Long-lived partition key holding the PIN as a JSON string.
pub const PIN_KEY: &str = "pin";

/// Session partition key holding the session flag.
pub const SESSION_KEY: &str = "session";

/// Where the gate is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Storage has not been read yet.
    Uninitialized,
    /// First run: a real PIN must be chosen.
    AwaitingFirstPin,
    /// First run: the chosen PIN must be entered again.
    AwaitingPinConfirm,
    /// A PIN exists and the session is not granted.
    Locked,
    /// The credential store is reachable.
    Granted,
    /// PIN change: the current PIN must be entered first.
    ChangingPinAwaitingCurrent,
    /// PIN change: the replacement PIN must be chosen.
    ChangingPinAwaitingNew,
    /// PIN change: the replacement must be entered again.
    ChangingPinAwaitingConfirm,
    /// Inside the forgotten-PIN flow.
    Recovery(RecoveryStep),
}

impl GatePhase {
    /// Stable `snake_case` name used in logs and on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingFirstPin => "awaiting_first_pin",
            Self::AwaitingPinConfirm => "awaiting_pin_confirm",
            Self::Locked => "locked",
            Self::Granted => "granted",
            Self::ChangingPinAwaitingCurrent => "changing_pin_awaiting_current",
            Self::ChangingPinAwaitingNew => "changing_pin_awaiting_new",
            Self::ChangingPinAwaitingConfirm => "changing_pin_awaiting_confirm",
            Self::Recovery(RecoveryStep::Email) => "recovery_email",
            Self::Recovery(RecoveryStep::Questions) => "recovery_questions",
            Self::Recovery(RecoveryStep::NewPin) => "recovery_new_pin",
            Self::Recovery(RecoveryStep::ConfirmPin) => "recovery_confirm_pin",
        }
    }

    /// Whether this phase is part of the change-PIN flow.
    #[must_use]
    pub fn is_changing_pin(self) -> bool {
        matches!(
            self,
            Self::ChangingPinAwaitingCurrent
                | Self::ChangingPinAwaitingNew
                | Self::ChangingPinAwaitingConfirm
        )
    }
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GatePhase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Tunables for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Exact number of digits in a PIN.
    pub pin_length: usize,
    /// PIN written on first run, before the user picks one.
    pub default_pin: String,
    /// Idle time after which a granted session is revoked.
    pub inactivity_timeout: Duration,
    /// How long a notice stays visible.
    pub notice_duration: Duration,
    /// Simulated latency of the recovery email and questions steps.
    pub recovery_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            pin_length: 3,
            default_pin: "123".to_owned(),
            inactivity_timeout: Duration::from_secs(5 * 60),
            notice_duration: Duration::from_secs(3),
            recovery_delay: Duration::from_secs(1),
        }
    }
}

impl GateConfig {
    /// Check that `pin` is exactly `pin_length` ASCII digits.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidPin`] describing the problem.
    pub fn check_pin(&self, pin: &str) -> Result<(), GateError> {
        if pin.len() != self.pin_length {
            return Err(GateError::InvalidPin {
                reason: format!("PIN must be {} digits", self.pin_length),
            });
        }
        if !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GateError::InvalidPin {
                reason: "PIN must contain only digits".to_owned(),
            });
        }
        Ok(())
    }
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Info,
    Error,
}

/// A transient, user-visible message.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    #[serde(skip)]
    pub raised_at: Instant,
}

/// Snapshot returned by [`PinGate::status`].
#[derive(Debug, Clone)]
pub struct GateStatus {
    pub phase: GatePhase,
    /// The latest notice, if it is still within its display window.
    pub notice: Option<Notice>,
    /// Time left before the inactivity watchdog revokes the session.
    pub session_expires_in: Option<Duration>,
}

/// Result of a successful gate transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    pub phase: GatePhase,
    pub message: &'static str,
}

#[derive(Serialize, Deserialize)]
struct SessionFlag {
    session_granted: bool,
}

pub(crate) struct GateState {
    pub(crate) phase: GatePhase,
    /// Cached copy of the persisted PIN. Only updated after a write lands.
    pub(crate) stored_pin: String,
    /// First entry of a new PIN awaiting its confirmation.
    pub(crate) pending_pin: Option<String>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) notice: Option<Notice>,
    pub(crate) recovery: RecoveryProgress,
}

impl GateState {
    pub(crate) fn notify(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some(Notice {
            kind,
            message: message.into(),
            raised_at: Instant::now(),
        });
    }

    /// Record `err` as an error notice and hand it back.
    pub(crate) fn fail(&mut self, err: GateError) -> GateError {
        self.notify(NoticeKind::Error, err.to_string());
        err
    }

    pub(crate) fn transition(&mut self, to: GatePhase, message: &'static str) -> GateOutcome {
        debug!(from = %self.phase, to = %to, "gate transition");
        self.phase = to;
        self.notify(NoticeKind::Info, message);
        GateOutcome { phase: to, message }
    }
}

/// The PIN gate service.
///
/// Thread-safe via an internal `Mutex`; share it behind an `Arc`. Every
/// method that reads the session first revokes it if the inactivity
/// deadline has already passed, so expiry holds even without the
/// background watchdog.
pub struct PinGate {
    pub(crate) long: Arc<dyn StorageBackend>,
    session: Arc<dyn StorageBackend>,
    pub(crate) config: GateConfig,
    pub(crate) state: Mutex<GateState>,
    /// Signalled whenever a session is granted.
    pub(crate) armed: Notify,
}

impl PinGate {
    /// Read the stored PIN and session flag and settle into the first phase.
    ///
    /// With no usable stored PIN, `config.default_pin` is persisted and the
    /// gate waits for the user to choose a real one. A stored PIN plus a
    /// live session flag resumes the session; otherwise the gate is locked.
    ///
    /// # Errors
    ///
    /// - [`GateError::InvalidPin`] if `config.default_pin` is not a valid PIN.
    /// - [`GateError::Storage`] if either partition cannot be read or written.
    pub async fn open(
        long: Arc<dyn StorageBackend>,
        session: Arc<dyn StorageBackend>,
        config: GateConfig,
    ) -> Result<Self, GateError> {
        config.check_pin(&config.default_pin)?;

        let mut state = GateState {
            phase: GatePhase::Uninitialized,
            stored_pin: String::new(),
            pending_pin: None,
            deadline: None,
            notice: None,
            recovery: RecoveryProgress::default(),
        };

        match read_stored_pin(long.as_ref(), &config).await? {
            Some(pin) => {
                state.stored_pin = pin;
                state.phase = if read_session_flag(session.as_ref()).await? {
                    state.deadline = Some(Instant::now() + config.inactivity_timeout);
                    GatePhase::Granted
                } else {
                    GatePhase::Locked
                };
            }
            None => {
                write_pin(long.as_ref(), &config.default_pin).await?;
                state.stored_pin.clone_from(&config.default_pin);
                state.phase = GatePhase::AwaitingFirstPin;
            }
        }

        info!(phase = %state.phase, "PIN gate opened");
        Ok(Self {
            long,
            session,
            config,
            state: Mutex::new(state),
            armed: Notify::new(),
        })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Feed one PIN entry to the state machine.
    ///
    /// The format is checked first; a malformed entry is rejected without
    /// touching state. What a well-formed entry does depends on the phase:
    /// setup, unlock, each step of a PIN change, or the new-PIN steps of
    /// recovery.
    ///
    /// # Errors
    ///
    /// - [`GateError::InvalidPin`] for a malformed entry.
    /// - [`GateError::IncorrectPin`] if an unlock or current-PIN check fails.
    /// - [`GateError::PinMismatch`] if a confirmation differs.
    /// - [`GateError::InvalidTransition`] if the phase takes no PIN.
    /// - [`GateError::Storage`] if persisting fails.
    pub async fn submit_pin(&self, pin: &str) -> Result<GateOutcome, GateError> {
        self.config.check_pin(pin)?;

        let mut state = self.state.lock().await;
        self.expire_if_due(&mut state).await?;

        match state.phase {
            GatePhase::AwaitingFirstPin => {
                state.pending_pin = Some(pin.to_owned());
                Ok(state.transition(GatePhase::AwaitingPinConfirm, "Please confirm your PIN"))
            }
            GatePhase::AwaitingPinConfirm => {
                if !pending_matches(&state, pin) {
                    state.pending_pin = None;
                    state.phase = GatePhase::AwaitingFirstPin;
                    return Err(state.fail(GateError::PinMismatch));
                }
                self.commit_pin(&mut state, pin).await?;
                self.grant(&mut state).await?;
                info!("PIN created");
                Ok(state.transition(GatePhase::Granted, "PIN created successfully"))
            }
            GatePhase::Locked => {
                if !pins_equal(pin, &state.stored_pin) {
                    warn!("incorrect PIN entered");
                    return Err(state.fail(GateError::IncorrectPin));
                }
                self.grant(&mut state).await?;
                info!("session granted");
                Ok(state.transition(GatePhase::Granted, "Login successful"))
            }
            GatePhase::ChangingPinAwaitingCurrent => {
                if !pins_equal(pin, &state.stored_pin) {
                    warn!("incorrect current PIN during PIN change");
                    state.phase = GatePhase::Locked;
                    return Err(state.fail(GateError::IncorrectPin));
                }
                Ok(state.transition(
                    GatePhase::ChangingPinAwaitingNew,
                    "Current PIN verified, enter your new PIN",
                ))
            }
            GatePhase::ChangingPinAwaitingNew => {
                state.pending_pin = Some(pin.to_owned());
                Ok(state.transition(
                    GatePhase::ChangingPinAwaitingConfirm,
                    "Please confirm your new PIN",
                ))
            }
            GatePhase::ChangingPinAwaitingConfirm => {
                let confirmed = pending_matches(&state, pin);
                state.pending_pin = None;
                if !confirmed {
                    state.phase = GatePhase::Locked;
                    return Err(state.fail(GateError::PinMismatch));
                }
                self.commit_pin(&mut state, pin).await?;
                info!("PIN changed");
                Ok(state.transition(GatePhase::Locked, "PIN changed successfully"))
            }
            GatePhase::Recovery(RecoveryStep::NewPin) => {
                state.pending_pin = Some(pin.to_owned());
                Ok(state.transition(
                    GatePhase::Recovery(RecoveryStep::ConfirmPin),
                    "Please confirm your new PIN",
                ))
            }
            GatePhase::Recovery(RecoveryStep::ConfirmPin) => {
                if !pending_matches(&state, pin) {
                    state.pending_pin = None;
                    state.phase = GatePhase::Recovery(RecoveryStep::NewPin);
                    return Err(state.fail(GateError::PinMismatch));
                }
                self.complete_recovery(&mut state, pin).await
            }
            phase @ (GatePhase::Uninitialized
            | GatePhase::Granted
            | GatePhase::Recovery(RecoveryStep::Email | RecoveryStep::Questions)) => {
                Err(GateError::InvalidTransition {
                    action: "submit a PIN",
                    phase,
                })
            }
        }
    }

    /// Start changing the PIN. Only available while locked.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidTransition`] from any other phase.
    pub async fn begin_pin_change(&self) -> Result<GateOutcome, GateError> {
        let mut state = self.state.lock().await;
        self.expire_if_due(&mut state).await?;
        if state.phase != GatePhase::Locked {
            return Err(GateError::InvalidTransition {
                action: "change the PIN",
                phase: state.phase,
            });
        }
        state.pending_pin = None;
        Ok(state.transition(
            GatePhase::ChangingPinAwaitingCurrent,
            "Enter your current PIN",
        ))
    }

    /// Abandon a PIN change or recovery and return to the lock screen.
    ///
    /// Any recovery step still waiting out its delay will find the flow
    /// gone and report [`RecoveryError::Cancelled`](crate::error::RecoveryError::Cancelled).
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidTransition`] outside those flows.
    pub async fn cancel(&self) -> Result<GateOutcome, GateError> {
        let mut state = self.state.lock().await;
        if !state.phase.is_changing_pin() && !matches!(state.phase, GatePhase::Recovery(_)) {
            return Err(GateError::InvalidTransition {
                action: "cancel",
                phase: state.phase,
            });
        }
        state.pending_pin = None;
        state.recovery.reset();
        Ok(state.transition(GatePhase::Locked, "Cancelled"))
    }

    /// End the granted session.
    ///
    /// # Errors
    ///
    /// - [`GateError::InvalidTransition`] if no session is granted.
    /// - [`GateError::Storage`] if the session flag cannot be cleared.
    pub async fn logout(&self) -> Result<GateOutcome, GateError> {
        let mut state = self.state.lock().await;
        self.expire_if_due(&mut state).await?;
        if state.phase != GatePhase::Granted {
            return Err(GateError::InvalidTransition {
                action: "log out",
                phase: state.phase,
            });
        }
        self.revoke(&mut state).await?;
        info!("session ended by logout");
        Ok(state.transition(GatePhase::Locked, "Logged out"))
    }

    /// Count a user interaction. Returns `true` if it rearmed a live session.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Storage`] if an expired session cannot be cleared.
    pub async fn record_activity(&self) -> Result<bool, GateError> {
        let mut state = self.state.lock().await;
        self.expire_if_due(&mut state).await?;
        if state.phase != GatePhase::Granted {
            return Ok(false);
        }
        state.deadline = Some(Instant::now() + self.config.inactivity_timeout);
        Ok(true)
    }

    /// Gate access to the credential store.
    ///
    /// Succeeds only while granted, and counts as activity when it does.
    ///
    /// # Errors
    ///
    /// - [`GateError::Locked`] if the session is not granted or has expired.
    /// - [`GateError::Storage`] if an expired session cannot be cleared.
    pub async fn authorize(&self) -> Result<(), GateError> {
        if self.record_activity().await? {
            Ok(())
        } else {
            Err(GateError::Locked)
        }
    }

    /// Revoke the session if its inactivity deadline has passed.
    ///
    /// Returns `true` if a session was revoked by this call.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Storage`] if the session flag cannot be cleared.
    pub async fn enforce_timeout(&self) -> Result<bool, GateError> {
        let mut state = self.state.lock().await;
        self.expire_if_due(&mut state).await
    }

    /// Current phase, live notice and remaining session time.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Storage`] if an expired session cannot be cleared.
    pub async fn status(&self) -> Result<GateStatus, GateError> {
        let mut state = self.state.lock().await;
        self.expire_if_due(&mut state).await?;

        let now = Instant::now();
        let notice = state
            .notice
            .as_ref()
            .filter(|n| now.duration_since(n.raised_at) < self.config.notice_duration)
            .cloned();
        let session_expires_in = state
            .deadline
            .filter(|_| state.phase == GatePhase::Granted)
            .map(|d| d.saturating_duration_since(now));

        Ok(GateStatus {
            phase: state.phase,
            notice,
            session_expires_in,
        })
    }

    /// The current inactivity deadline, if a session is granted.
    pub(crate) async fn deadline(&self) -> Option<Instant> {
        let state = self.state.lock().await;
        state.deadline.filter(|_| state.phase == GatePhase::Granted)
    }

    /// Persist `pin` and, once that lands, adopt it as the stored PIN.
    pub(crate) async fn commit_pin(&self, state: &mut GateState, pin: &str) -> Result<(), GateError> {
        write_pin(self.long.as_ref(), pin).await?;
        pin.clone_into(&mut state.stored_pin);
        Ok(())
    }

    async fn grant(&self, state: &mut GateState) -> Result<(), GateError> {
        write_session_flag(self.session.as_ref()).await?;
        state.deadline = Some(Instant::now() + self.config.inactivity_timeout);
        state.pending_pin = None;
        self.armed.notify_one();
        Ok(())
    }

    async fn revoke(&self, state: &mut GateState) -> Result<(), GateError> {
        self.session.delete(SESSION_KEY).await?;
        state.deadline = None;
        state.phase = GatePhase::Locked;
        Ok(())
    }

    async fn expire_if_due(&self, state: &mut GateState) -> Result<bool, GateError> {
        let due = state.phase == GatePhase::Granted
            && state.deadline.is_some_and(|d| d <= Instant::now());
        if !due {
            return Ok(false);
        }
        self.revoke(state).await?;
        state.notify(NoticeKind::Info, "Session expired due to inactivity");
        info!("session revoked after inactivity");
        Ok(true)
    }
}

impl fmt::Debug for PinGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn pins_equal(entered: &str, expected: &str) -> bool {
    entered.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn pending_matches(state: &GateState, pin: &str) -> bool {
    state
        .pending_pin
        .as_deref()
        .is_some_and(|first| pins_equal(pin, first))
}

async fn read_stored_pin(
    long: &dyn StorageBackend,
    config: &GateConfig,
) -> Result<Option<String>, GateError> {
    let Some(bytes) = long.get(PIN_KEY).await? else {
        return Ok(None);
    };
    match serde_json::from_slice::<String>(&bytes) {
        Ok(pin) if config.check_pin(&pin).is_ok() => Ok(Some(pin)),
        _ => {
            warn!("stored PIN is malformed; treating it as absent");
            Ok(None)
        }
    }
}

async fn write_pin(long: &dyn StorageBackend, pin: &str) -> Result<(), GateError> {
    let bytes = serde_json::to_vec(pin).map_err(|e| GateError::Serialization {
        reason: e.to_string(),
    })?;
    long.put(PIN_KEY, &bytes).await?;
    Ok(())
}

async fn read_session_flag(session: &dyn StorageBackend) -> Result<bool, GateError> {
    let Some(bytes) = session.get(SESSION_KEY).await? else {
        return Ok(false);
    };
    Ok(serde_json::from_slice::<SessionFlag>(&bytes).is_ok_and(|f| f.session_granted))
}

async fn write_session_flag(session: &dyn StorageBackend) -> Result<(), GateError> {
    let bytes = serde_json::to_vec(&SessionFlag {
        session_granted: true,
    })
    .map_err(|e| GateError::Serialization {
        reason: e.to_string(),
    })?;
    session.put(SESSION_KEY, &bytes).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use pinvault_storage::MemoryBackend;

    use super::*;

    pub(crate) struct Harness {
        pub long: MemoryBackend,
        pub session: MemoryBackend,
        pub gate: PinGate,
    }

    pub(crate) async fn open_with(long: MemoryBackend, session: MemoryBackend) -> Harness {
        let gate = PinGate::open(
            Arc::new(long.clone()),
            Arc::new(session.clone()),
            GateConfig::default(),
        )
        .await
        .unwrap();
        Harness {
            long,
            session,
            gate,
        }
    }

    pub(crate) async fn fresh() -> Harness {
        open_with(MemoryBackend::new(), MemoryBackend::new()).await
    }

    /// A gate with PIN `pin` already set up, then logged out.
    pub(crate) async fn locked_with(pin: &str) -> Harness {
        let h = fresh().await;
        h.gate.submit_pin(pin).await.unwrap();
        h.gate.submit_pin(pin).await.unwrap();
        h.gate.logout().await.unwrap();
        h
    }

    pub(crate) async fn stored_pin(long: &MemoryBackend) -> String {
        let raw = long.get(PIN_KEY).await.unwrap().unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    async fn phase(gate: &PinGate) -> GatePhase {
        gate.status().await.unwrap().phase
    }

    // ── first run ────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_run_persists_default_pin() {
        let h = fresh().await;
        assert_eq!(phase(&h.gate).await, GatePhase::AwaitingFirstPin);
        assert_eq!(stored_pin(&h.long).await, "123");
    }

    #[tokio::test]
    async fn setup_with_matching_confirmation_grants() {
        let h = fresh().await;
        let out = h.gate.submit_pin("123").await.unwrap();
        assert_eq!(out.phase, GatePhase::AwaitingPinConfirm);
        let out = h.gate.submit_pin("123").await.unwrap();
        assert_eq!(out.phase, GatePhase::Granted);
        assert_eq!(stored_pin(&h.long).await, "123");
        assert!(h.session.exists(SESSION_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn setup_mismatch_returns_to_first_entry() {
        let h = fresh().await;
        h.gate.submit_pin("789").await.unwrap();
        let err = h.gate.submit_pin("788").await.unwrap_err();
        assert!(matches!(err, GateError::PinMismatch));

        let status = h.gate.status().await.unwrap();
        assert_eq!(status.phase, GatePhase::AwaitingFirstPin);
        assert_eq!(status.notice.unwrap().kind, NoticeKind::Error);
        // Only the default written at open.
        assert_eq!(stored_pin(&h.long).await, "123");
        assert!(!h.session.exists(SESSION_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_pin_is_rejected_without_state_change() {
        let h = fresh().await;
        for bad in ["12", "1234", "12a", ""] {
            let err = h.gate.submit_pin(bad).await.unwrap_err();
            assert!(matches!(err, GateError::InvalidPin { .. }), "{bad}");
        }
        assert_eq!(phase(&h.gate).await, GatePhase::AwaitingFirstPin);
    }

    #[tokio::test]
    async fn malformed_stored_pin_is_treated_as_absent() {
        let long = MemoryBackend::new();
        long.put(PIN_KEY, b"not json").await.unwrap();
        let h = open_with(long, MemoryBackend::new()).await;
        assert_eq!(phase(&h.gate).await, GatePhase::AwaitingFirstPin);
        assert_eq!(stored_pin(&h.long).await, "123");
    }

    #[tokio::test]
    async fn invalid_default_pin_is_a_config_error() {
        let config = GateConfig {
            default_pin: "12345".to_owned(),
            ..GateConfig::default()
        };
        let err = PinGate::open(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GateError::InvalidPin { .. }));
    }

    // ── unlock and session ───────────────────────────────────────────

    #[tokio::test]
    async fn unlock_with_correct_pin() {
        let h = locked_with("246").await;
        assert_eq!(phase(&h.gate).await, GatePhase::Locked);
        assert!(matches!(h.gate.authorize().await, Err(GateError::Locked)));

        let out = h.gate.submit_pin("246").await.unwrap();
        assert_eq!(out.phase, GatePhase::Granted);
        h.gate.authorize().await.unwrap();
    }

    #[tokio::test]
    async fn wrong_pin_stays_locked_with_notice() {
        let h = locked_with("246").await;
        let err = h.gate.submit_pin("999").await.unwrap_err();
        assert!(matches!(err, GateError::IncorrectPin));
        let status = h.gate.status().await.unwrap();
        assert_eq!(status.phase, GatePhase::Locked);
        assert_eq!(status.notice.unwrap().message, "incorrect PIN");
    }

    #[tokio::test(start_paused = true)]
    async fn notice_expires_after_display_window() {
        let h = locked_with("246").await;
        let _ = h.gate.submit_pin("999").await;
        tokio::time::advance(Duration::from_millis(2900)).await;
        assert!(h.gate.status().await.unwrap().notice.is_some());
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(h.gate.status().await.unwrap().notice.is_none());
    }

    #[tokio::test]
    async fn session_flag_survives_reopen_but_not_new_session() {
        let h = locked_with("246").await;
        h.gate.submit_pin("246").await.unwrap();

        let same_session = open_with(h.long.clone(), h.session.clone()).await;
        assert_eq!(phase(&same_session.gate).await, GatePhase::Granted);

        let new_session = open_with(h.long.clone(), MemoryBackend::new()).await;
        assert_eq!(phase(&new_session.gate).await, GatePhase::Locked);
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let h = locked_with("246").await;
        h.gate.submit_pin("246").await.unwrap();
        h.gate.logout().await.unwrap();
        assert_eq!(phase(&h.gate).await, GatePhase::Locked);
        assert!(!h.session.exists(SESSION_KEY).await.unwrap());
        assert!(matches!(
            h.gate.logout().await,
            Err(GateError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_expires_session_lazily() {
        let h = locked_with("246").await;
        h.gate.submit_pin("246").await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        h.gate.authorize().await.unwrap();

        // Activity rearmed the deadline.
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(phase(&h.gate).await, GatePhase::Granted);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(h.gate.authorize().await, Err(GateError::Locked)));
        let status = h.gate.status().await.unwrap();
        assert_eq!(status.phase, GatePhase::Locked);
        assert!(status.session_expires_in.is_none());
        assert!(!h.session.exists(SESSION_KEY).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn enforce_timeout_reports_revocation_once() {
        let h = locked_with("246").await;
        h.gate.submit_pin("246").await.unwrap();
        assert!(!h.gate.enforce_timeout().await.unwrap());
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(h.gate.enforce_timeout().await.unwrap());
        assert!(!h.gate.enforce_timeout().await.unwrap());
    }

    #[tokio::test]
    async fn record_activity_outside_session_is_ignored() {
        let h = locked_with("246").await;
        assert!(!h.gate.record_activity().await.unwrap());
    }

    // ── change PIN ───────────────────────────────────────────────────

    #[tokio::test]
    async fn change_pin_happy_path() {
        let h = locked_with("246").await;
        h.gate.begin_pin_change().await.unwrap();
        assert_eq!(
            h.gate.submit_pin("246").await.unwrap().phase,
            GatePhase::ChangingPinAwaitingNew
        );
        assert_eq!(
            h.gate.submit_pin("135").await.unwrap().phase,
            GatePhase::ChangingPinAwaitingConfirm
        );
        assert_eq!(
            h.gate.submit_pin("135").await.unwrap().phase,
            GatePhase::Locked
        );
        assert_eq!(stored_pin(&h.long).await, "135");

        assert!(h.gate.submit_pin("246").await.is_err());
        h.gate.submit_pin("135").await.unwrap();
    }

    #[tokio::test]
    async fn change_pin_wrong_current_returns_to_locked() {
        let h = locked_with("246").await;
        h.gate.begin_pin_change().await.unwrap();
        let err = h.gate.submit_pin("000").await.unwrap_err();
        assert!(matches!(err, GateError::IncorrectPin));
        assert_eq!(phase(&h.gate).await, GatePhase::Locked);
    }

    #[tokio::test]
    async fn change_pin_confirm_mismatch_discards_attempt() {
        let h = locked_with("246").await;
        h.gate.begin_pin_change().await.unwrap();
        h.gate.submit_pin("246").await.unwrap();
        h.gate.submit_pin("135").await.unwrap();
        let err = h.gate.submit_pin("136").await.unwrap_err();
        assert!(matches!(err, GateError::PinMismatch));
        assert_eq!(phase(&h.gate).await, GatePhase::Locked);
        assert_eq!(stored_pin(&h.long).await, "246");
    }

    #[tokio::test]
    async fn change_pin_requires_locked_and_can_be_cancelled() {
        let h = fresh().await;
        assert!(matches!(
            h.gate.begin_pin_change().await,
            Err(GateError::InvalidTransition { .. })
        ));

        let h = locked_with("246").await;
        h.gate.begin_pin_change().await.unwrap();
        h.gate.submit_pin("246").await.unwrap();
        assert_eq!(h.gate.cancel().await.unwrap().phase, GatePhase::Locked);
        assert!(matches!(
            h.gate.cancel().await,
            Err(GateError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn granted_phase_takes_no_pin() {
        let h = locked_with("246").await;
        h.gate.submit_pin("246").await.unwrap();
        let err = h.gate.submit_pin("246").await.unwrap_err();
        assert!(matches!(
            err,
            GateError::InvalidTransition {
                phase: GatePhase::Granted,
                ..
            }
        ));
    }
}
