//! Background inactivity watchdog.
//!
//! Sleeps until the gate's current deadline and then asks the gate to
//! enforce it. Activity only ever pushes the deadline later, so waking up
//! early is harmless: the task re-reads the deadline and sleeps again. With
//! no session granted it parks until the gate signals a new grant.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::gate::PinGate;

/// Spawn the watchdog for `gate`. The task exits when `shutdown` changes
/// or its sender is dropped.
pub fn spawn_watchdog(gate: Arc<PinGate>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("inactivity watchdog started");
        loop {
            let deadline = gate.deadline().await;
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("inactivity watchdog shutting down");
                    return;
                }
                () = gate.armed.notified() => {}
                () = sleep_until(deadline) => {
                    if let Err(e) = gate.enforce_timeout().await {
                        warn!(error = %e, "failed to revoke idle session");
                    }
                }
            }
        }
    })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pinvault_storage::MemoryBackend;

    use super::*;
    use crate::gate::{GateConfig, GatePhase};

    async fn granted_gate() -> Arc<PinGate> {
        let gate = PinGate::open(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            GateConfig::default(),
        )
        .await
        .unwrap();
        gate.submit_pin("321").await.unwrap();
        gate.submit_pin("321").await.unwrap();
        Arc::new(gate)
    }

    async fn phase(gate: &PinGate) -> GatePhase {
        gate.state.lock().await.phase
    }

    #[tokio::test(start_paused = true)]
    async fn revokes_idle_session() {
        let gate = granted_gate().await;
        let (_tx, rx) = watch::channel(false);
        let _handle = spawn_watchdog(Arc::clone(&gate), rx);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(phase(&gate).await, GatePhase::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_keeps_session_alive() {
        let gate = granted_gate().await;
        let (_tx, rx) = watch::channel(false);
        let _handle = spawn_watchdog(Arc::clone(&gate), rx);

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(200)).await;
            assert!(gate.record_activity().await.unwrap());
        }
        assert_eq!(phase(&gate).await, GatePhase::Granted);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(phase(&gate).await, GatePhase::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_after_new_grant() {
        let gate = granted_gate().await;
        let (_tx, rx) = watch::channel(false);
        let _handle = spawn_watchdog(Arc::clone(&gate), rx);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(phase(&gate).await, GatePhase::Locked);

        gate.submit_pin("321").await.unwrap();
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(phase(&gate).await, GatePhase::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown() {
        let gate = granted_gate().await;
        let (tx, rx) = watch::channel(false);
        let handle = spawn_watchdog(gate, rx);
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
