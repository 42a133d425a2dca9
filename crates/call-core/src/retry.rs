//! Reconnection orchestration
//!
//! The [`RetryOrchestrator`] is the sole authority on what happens after a
//! connection loss: retry with a visible countdown, or give up. It is invoked
//! once per detected loss by the connection controller and drives the session
//! through `retrying -> connecting -> connected`, or to `disconnected` once
//! the attempt cap is reached.
//!
//! At most one countdown timer is ever live. Ending the call cancels the
//! timer and bumps an epoch counter so an in-flight reconnection that
//! completes afterwards cannot resurrect the session.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::ConnectionController;
use crate::session::{
    CallStatus, SessionEvent, SessionStore, COUNTDOWN_START, MAX_RETRY_ATTEMPTS,
};

/// Policy for the bounded reconnection loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Cap on automatic attempts per loss streak; checked before incrementing
    pub max_attempts: u32,
    /// Countdown seconds published at the start of every attempt
    pub countdown_start: u32,
    /// Cadence of countdown decrements
    pub tick: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            countdown_start: COUNTDOWN_START,
            tick: Duration::from_secs(1),
        }
    }
}

/// Countdown-driven reconnection state machine
pub struct RetryOrchestrator {
    store: Arc<SessionStore>,
    policy: RetryPolicy,
    controller: OnceLock<Weak<ConnectionController>>,
    weak_self: OnceLock<Weak<RetryOrchestrator>>,
    attempt: AtomicU32,
    timer: Mutex<Option<JoinHandle<()>>>,
    epoch: AtomicU64,
}

impl RetryOrchestrator {
    pub fn new(store: Arc<SessionStore>, policy: RetryPolicy) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            store,
            policy,
            controller: OnceLock::new(),
            weak_self: OnceLock::new(),
            attempt: AtomicU32::new(0),
            timer: Mutex::new(None),
            epoch: AtomicU64::new(0),
        });
        orchestrator
            .weak_self
            .set(Arc::downgrade(&orchestrator))
            .expect("weak self set once at construction");
        orchestrator
    }

    /// Wire the controller this orchestrator reconnects through. Called once
    /// during client assembly.
    pub(crate) fn bind(&self, controller: Weak<ConnectionController>) {
        let _ = self.controller.set(controller);
    }

    /// React to a detected connection loss - organic or injected, the two are
    /// indistinguishable here. Decides retry vs. give-up and, when retrying,
    /// starts the countdown.
    pub async fn connection_lost(&self) {
        let status = self.store.status();
        if matches!(status, CallStatus::Idle | CallStatus::Disconnected) {
            // the call is already gone; a late loss signal changes nothing
            debug!(%status, "ignoring connection loss outside an active call");
            return;
        }

        // at most one timer is ever live
        self.cancel_timer();

        let attempts_so_far = self.attempt.load(Ordering::SeqCst);
        if attempts_so_far >= self.policy.max_attempts {
            warn!(
                attempts = attempts_so_far,
                "reconnection attempts exhausted, giving up"
            );
            self.attempt.store(0, Ordering::SeqCst);
            // release the dead connection before the terminal status becomes
            // observable, so a manual restart never races the teardown
            if let Some(controller) = self.controller.get().and_then(Weak::upgrade) {
                controller.release_transport().await;
            }
            self.store.dispatch(SessionEvent::RetryCleared);
            self.store.dispatch(SessionEvent::StatusChanged(CallStatus::Disconnected));
            return;
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            attempt,
            max_attempts = self.policy.max_attempts,
            "connection lost, scheduling reconnection"
        );
        self.store.dispatch(SessionEvent::RetryBegan {
            attempt,
            countdown: self.policy.countdown_start,
        });
        self.store.dispatch(SessionEvent::StatusChanged(CallStatus::Retrying));
        self.start_countdown();
    }

    /// The call reached `connected`; clear all retry bookkeeping
    pub(crate) fn on_connected(&self) {
        if self.attempt.swap(0, Ordering::SeqCst) > 0 {
            info!("reconnected");
        }
        self.cancel_timer();
        self.store.dispatch(SessionEvent::RetryCleared);
    }

    /// The call is being ended; cancel any pending countdown and make sure an
    /// in-flight reconnection cannot touch the session afterwards
    pub(crate) fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_timer();
        self.attempt.store(0, Ordering::SeqCst);
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().expect("retry timer lock poisoned").take() {
            handle.abort();
        }
    }

    fn start_countdown(&self) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let weak = self
            .weak_self
            .get()
            .cloned()
            .expect("weak self set at construction");
        let policy = self.policy.clone();

        let handle = tokio::spawn(async move {
            let mut remaining = policy.countdown_start;
            while remaining > 0 {
                tokio::time::sleep(policy.tick).await;
                let Some(retry) = weak.upgrade() else { return };
                if retry.epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                remaining -= 1;
                retry.store.dispatch(SessionEvent::RetryCountdownTick { remaining });
            }

            let Some(retry) = weak.upgrade() else { return };
            if retry.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            // this task is done counting; drop our own handle so a re-entry
            // does not abort the reconnection it is part of
            retry.timer.lock().expect("retry timer lock poisoned").take();
            retry.attempt_reconnection(epoch).await;
        });

        *self.timer.lock().expect("retry timer lock poisoned") = Some(handle);
    }

    async fn attempt_reconnection(&self, epoch: u64) {
        let Some(controller) = self.controller.get().and_then(Weak::upgrade) else {
            return;
        };

        match controller.reconnect().await {
            Ok(()) => {
                debug!("reconnection handshake completed");
            }
            Err(crate::error::CallError::Cancelled) => {
                debug!("reconnection cancelled by call teardown");
            }
            Err(error) => {
                warn!(error = %error, "reconnection attempt failed");
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                // acquisition failures already logged their own entry
                if !error.is_acquisition_error() {
                    self.store
                        .log_error(error.kind(), format!("reconnection failed: {error}"));
                }
                // a failed handshake counts as another connection loss
                self.connection_lost().await;
            }
        }
    }
}

impl std::fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("policy", &self.policy)
            .field("attempt", &self.attempt.load(Ordering::SeqCst))
            .finish()
    }
}
