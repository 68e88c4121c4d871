// Single-slot pause/resume signal shared between the loop and the front end.
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::agent_engine::state::PauseState;

#[derive(Debug, Default)]
pub struct PauseGate {
    state: Mutex<PauseState>,
    release: Notify,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PauseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pause(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        state.is_paused = true;
        state.reason = reason.into();
        tracing::info!(reason = %state.reason, "gate closed");
    }

    /// Releases a paused loop. Returns false (and stores nothing) when the
    /// loop is not paused, so a stray release can never pre-empt a later pause.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        if !state.is_paused {
            tracing::debug!("release ignored, gate not paused");
            return false;
        }
        state.is_paused = false;
        state.reason.clear();
        drop(state);
        // notify_one keeps a permit if the loop has not started waiting yet.
        self.release.notify_one();
        tracing::info!("gate released");
        true
    }

    /// Waits until [`release`](Self::release) fires. Returns immediately when
    /// the gate was already released.
    pub async fn wait_for_release(&self) {
        loop {
            let notified = self.release.notified();
            if !self.is_paused() {
                // Consume a permit left by a release that raced ahead of us.
                let _ = futures_util::FutureExt::now_or_never(notified);
                return;
            }
            notified.await;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.lock().is_paused
    }

    pub fn snapshot(&self) -> PauseState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn release_wakes_a_waiting_loop() {
        let gate = Arc::new(PauseGate::new());
        gate.pause("login");
        assert_eq!(gate.snapshot().reason, "login");

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_for_release().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(gate.release());
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(gate.snapshot(), PauseState::default());
    }

    #[tokio::test]
    async fn release_before_wait_is_not_lost() {
        let gate = PauseGate::new();
        gate.pause("payment");
        assert!(gate.release());
        tokio::time::timeout(Duration::from_secs(1), gate.wait_for_release())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gate_is_reusable_without_residual_state() {
        let gate = Arc::new(PauseGate::new());
        for reason in ["captcha", "login"] {
            gate.pause(reason);
            let waiter = {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait_for_release().await })
            };
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(!waiter.is_finished(), "stale release leaked into pause {reason}");
            gate.release();
            tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        }
    }

    #[test]
    fn release_without_pause_is_ignored() {
        let gate = PauseGate::new();
        assert!(!gate.release());
        assert!(!gate.is_paused());
    }
}
