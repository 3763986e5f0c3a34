//! Supervision for the long-running loops.
//!
//! Each loop is a [`Role`]. [`Supervised::spawn`] runs it on the tokio runtime, restarts it
//! with its state intact when it returns an error, and publishes its [`RoleState`] so the
//! gateway can tell a dead loop from a healthy one.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;

#[async_trait]
pub trait Role: Send + 'static {
    fn name(&self) -> &'static str;

    /// Run until cancelled or until there is nothing left to do.
    ///
    /// `Ok` is a clean stop. `Err` asks the supervisor for a restart unless the error is
    /// [permanent](CoreError::is_permanent).
    async fn run(&mut self, cancel: &CancellationToken) -> Result<(), CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed after the first failure before the role is declared failed.
    pub max_restarts: u32,
    pub backoff: Duration,
    /// A run that lasted at least this long resets the restart count.
    pub reset_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            backoff: Duration::from_secs(1),
            reset_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleState {
    Starting,
    Running,
    Restarting { attempt: u32 },
    Stopped,
    Failed { reason: String },
}

impl RoleState {
    pub fn is_running(&self) -> bool {
        matches!(self, RoleState::Running)
    }
}

impl std::fmt::Display for RoleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleState::Starting => f.write_str("starting"),
            RoleState::Running => f.write_str("running"),
            RoleState::Restarting { attempt } => write!(f, "restarting (attempt {attempt})"),
            RoleState::Stopped => f.write_str("stopped"),
            RoleState::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Handle on a spawned role.
pub struct Supervised {
    name: &'static str,
    state: watch::Receiver<RoleState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervised {
    pub fn spawn<R: Role>(mut role: R, policy: RestartPolicy, cancel: CancellationToken) -> Self {
        let name = role.name();
        let (tx, rx) = watch::channel(RoleState::Starting);

        let handle = tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                tx.send_replace(RoleState::Running);
                debug!(target: "jobpack.core.supervisor", role = name, attempt, "role running");

                let started = Instant::now();
                let err = match role.run(&cancel).await {
                    Ok(()) => {
                        info!(target: "jobpack.core.supervisor", role = name, "role stopped");
                        tx.send_replace(RoleState::Stopped);
                        return;
                    }
                    Err(e) => e,
                };
                if cancel.is_cancelled() {
                    tx.send_replace(RoleState::Stopped);
                    return;
                }
                if err.is_permanent() {
                    error!(target: "jobpack.core.supervisor", role = name, error = %err, "role failed permanently");
                    tx.send_replace(RoleState::Failed {
                        reason: err.to_string(),
                    });
                    return;
                }
                if started.elapsed() >= policy.reset_after {
                    attempt = 0;
                }
                if attempt >= policy.max_restarts {
                    error!(target: "jobpack.core.supervisor", role = name, error = %err, "role failed; restart budget exhausted");
                    tx.send_replace(RoleState::Failed {
                        reason: err.to_string(),
                    });
                    return;
                }

                attempt += 1;
                warn!(target: "jobpack.core.supervisor", role = name, attempt, error = %err, "role failed; restarting");
                tx.send_replace(RoleState::Restarting { attempt });

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tx.send_replace(RoleState::Stopped);
                        return;
                    }
                    _ = tokio::time::sleep(policy.backoff) => {}
                }
            }
        });

        Self {
            name,
            state: rx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state. A role whose task ended without reporting (a panic) is `Failed`.
    pub fn state(&self) -> RoleState {
        let state = self.state.borrow().clone();
        let gone = self.state.has_changed().is_err();
        match state {
            RoleState::Starting | RoleState::Running | RoleState::Restarting { .. } if gone => {
                RoleState::Failed {
                    reason: "panicked".to_string(),
                }
            }
            other => other,
        }
    }

    /// Wait for the role's task to end. Later calls return immediately.
    pub async fn join(&self) {
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        let Some(handle) = handle else {
            return;
        };
        if let Err(e) = handle.await
            && e.is_panic()
        {
            error!(target: "jobpack.core.supervisor", role = self.name, "role panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    struct Flaky {
        runs: Arc<AtomicU32>,
        fail_first: u32,
        /// How long each failing run lasts.
        uptime: Duration,
    }

    #[async_trait]
    impl Role for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn run(&mut self, _cancel: &CancellationToken) -> Result<(), CoreError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                tokio::time::sleep(self.uptime).await;
                Err(CoreError::Abandoned)
            } else {
                Ok(())
            }
        }
    }

    struct Orphaned {
        runs: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Role for Orphaned {
        fn name(&self) -> &'static str {
            "orphaned"
        }

        async fn run(&mut self, _cancel: &CancellationToken) -> Result<(), CoreError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::HandoffClosed)
        }
    }

    struct Forever;

    #[async_trait]
    impl Role for Forever {
        fn name(&self) -> &'static str {
            "forever"
        }

        async fn run(&mut self, cancel: &CancellationToken) -> Result<(), CoreError> {
            cancel.cancelled().await;
            Ok(())
        }
    }

    struct Explodes;

    #[async_trait]
    impl Role for Explodes {
        fn name(&self) -> &'static str {
            "explodes"
        }

        async fn run(&mut self, _cancel: &CancellationToken) -> Result<(), CoreError> {
            panic!("boom");
        }
    }

    fn policy(max_restarts: u32) -> RestartPolicy {
        RestartPolicy {
            max_restarts,
            backoff: Duration::from_millis(100),
            reset_after: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_until_role_succeeds() {
        let runs = Arc::new(AtomicU32::new(0));
        let role = Flaky {
            runs: Arc::clone(&runs),
            fail_first: 2,
            uptime: Duration::ZERO,
        };

        let sup = Supervised::spawn(role, policy(3), CancellationToken::new());
        sup.join().await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(sup.state(), RoleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_restart_budget() {
        let runs = Arc::new(AtomicU32::new(0));
        let role = Flaky {
            runs: Arc::clone(&runs),
            fail_first: u32::MAX,
            uptime: Duration::ZERO,
        };

        let sup = Supervised::spawn(role, policy(1), CancellationToken::new());
        sup.join().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(matches!(sup.state(), RoleState::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn long_healthy_runs_reset_the_restart_budget() {
        let runs = Arc::new(AtomicU32::new(0));
        let role = Flaky {
            runs: Arc::clone(&runs),
            fail_first: 4,
            uptime: Duration::from_secs(30),
        };

        let sup = Supervised::spawn(role, policy(1), CancellationToken::new());
        sup.join().await;

        assert_eq!(runs.load(Ordering::SeqCst), 5);
        assert_eq!(sup.state(), RoleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_restarted() {
        let runs = Arc::new(AtomicU32::new(0));
        let role = Orphaned {
            runs: Arc::clone(&runs),
        };

        let sup = Supervised::spawn(role, policy(3), CancellationToken::new());
        sup.join().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(matches!(sup.state(), RoleState::Failed { reason } if reason.contains("reaper is gone")));
    }

    #[tokio::test]
    async fn cancellation_stops_role() {
        let cancel = CancellationToken::new();
        let sup = Supervised::spawn(Forever, policy(0), cancel.clone());

        tokio::task::yield_now().await;
        assert_eq!(sup.state(), RoleState::Running);

        cancel.cancel();
        sup.join().await;
        assert_eq!(sup.state(), RoleState::Stopped);
    }

    #[tokio::test]
    async fn panic_is_reported_as_failure() {
        let sup = Supervised::spawn(Explodes, policy(3), CancellationToken::new());
        sup.join().await;

        assert_eq!(
            sup.state(),
            RoleState::Failed {
                reason: "panicked".to_string()
            }
        );
    }
}
