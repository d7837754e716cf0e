//! Termination supervisor
//!
//! [`Reaper::kill_and_confirm`] answers two different questions, and keeps
//! them in different types:
//!
//! - [`PendingTermination::was_running`] is a best-effort snapshot taken
//!   from the process table before anything is signalled.
//! - [`PendingTermination::confirmed`] resolves once, and only after a fresh
//!   lookup reports the application absent. Signal delivery is never taken
//!   as proof of exit.
//!
//! Once a strategy has started it runs on a detached task, so dropping the
//! pending handle does not leave the application half torn down.

use crate::{Error, Result};
use host_control::{AppSpec, ProcessControl, QuitChannel, SupervisedProcess};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timing bounds for termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Interval between process table polls
    pub poll_interval: Duration,
    /// How long a cooperative quit may take before forced termination
    pub graceful_quit: Duration,
    /// How long to wait for absence after each round of forced kills
    pub kill: Duration,
    /// Extra rounds of forced kills before reporting a timeout
    pub forced_retries: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            graceful_quit: Duration::from_secs(10),
            kill: Duration::from_secs(5),
            forced_retries: 1,
        }
    }
}

/// How to bring the application down
#[derive(Clone, Default)]
pub enum TerminationStrategy {
    /// SIGKILL every live instance
    #[default]
    Forced,
    /// Ask through `channel`, wait up to `grace`, then fall back to [`TerminationStrategy::Forced`]
    Cooperative {
        /// Channel the application listens on
        channel: Arc<dyn QuitChannel>,
        /// How long the application may take to quit
        grace: Duration,
    },
}

impl fmt::Debug for TerminationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationStrategy::Forced => write!(f, "Forced"),
            TerminationStrategy::Cooperative { grace, .. } => {
                f.debug_struct("Cooperative").field("grace", grace).finish()
            }
        }
    }
}

/// OS-confirmed outcome of a termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedTermination {
    /// Whether an instance was running when termination began
    pub was_running: bool,
    /// Whether a cooperative quit had to be escalated to forced kills
    pub escalated: bool,
    /// Time from the first signal to confirmed absence
    pub elapsed: Duration,
}

impl ConfirmedTermination {
    fn not_running() -> Self {
        Self {
            was_running: false,
            escalated: false,
            elapsed: Duration::ZERO,
        }
    }
}

/// A termination in flight
#[must_use = "the confirmed result is the only proof that the application exited"]
pub struct PendingTermination {
    snapshot: SupervisedProcess,
    outcome: async_channel::Receiver<Result<ConfirmedTermination>>,
}

impl PendingTermination {
    /// Best-effort: whether the application was running when the call was made
    pub fn was_running(&self) -> bool {
        self.snapshot.running
    }

    /// The process table entry observed before any strategy ran
    pub fn snapshot(&self) -> &SupervisedProcess {
        &self.snapshot
    }

    /// Wait until the OS reports the application gone
    pub async fn confirmed(self) -> Result<ConfirmedTermination> {
        self.outcome
            .recv()
            .await
            .unwrap_or_else(|_| {
                Err(Error::TerminationInterrupted {
                    bundle_id: self.snapshot.bundle_id.clone(),
                })
            })
    }
}

/// Kills the supervised application and confirms its exit
#[derive(Clone)]
pub struct Reaper {
    control: Arc<dyn ProcessControl>,
    timeouts: Timeouts,
}

impl Reaper {
    /// Create a reaper over `control`
    pub fn new(control: Arc<dyn ProcessControl>, timeouts: Timeouts) -> Self {
        Self { control, timeouts }
    }

    /// Timing bounds in use
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Terminate `app` with `strategy` (default [`TerminationStrategy::Forced`])
    ///
    /// If the application is not running, the result is already confirmed
    /// and no strategy is invoked.
    pub async fn kill_and_confirm(
        &self,
        app: &AppSpec,
        strategy: Option<TerminationStrategy>,
    ) -> Result<PendingTermination> {
        let snapshot = self
            .control
            .lookup(app)
            .await
            .map_err(|e| Error::from_host(&app.bundle_id, e))?;
        let (sender, outcome) = async_channel::bounded(1);

        if !snapshot.running {
            debug!("{} is not running, nothing to terminate", app.bundle_id);
            let _ = sender.try_send(Ok(ConfirmedTermination::not_running()));
            return Ok(PendingTermination { snapshot, outcome });
        }

        let strategy = strategy.unwrap_or_default();
        info!(
            "Terminating {} (pid {:?}) with {:?}",
            app.bundle_id, snapshot.pid, strategy
        );

        let reaper = self.clone();
        let app = app.clone();
        let first = snapshot.clone();
        smol::spawn(async move {
            let result = reaper.run(&app, strategy, &first).await;
            match &result {
                Ok(confirmed) => info!(
                    "{} confirmed gone after {:?}",
                    app.bundle_id, confirmed.elapsed
                ),
                Err(e) => warn!("Termination of {} failed: {}", app.bundle_id, e),
            }
            let _ = sender.send(result).await;
        })
        .detach();

        Ok(PendingTermination { snapshot, outcome })
    }

    async fn run(
        &self,
        app: &AppSpec,
        strategy: TerminationStrategy,
        first: &SupervisedProcess,
    ) -> Result<ConfirmedTermination> {
        let started = Instant::now();
        let mut escalated = false;

        if let TerminationStrategy::Cooperative { channel, grace } = strategy {
            match channel.request_quit(app, first).await {
                Ok(()) => {
                    if self.wait_until_absent(app, grace).await? {
                        return Ok(ConfirmedTermination {
                            was_running: true,
                            escalated: false,
                            elapsed: started.elapsed(),
                        });
                    }
                    warn!(
                        "{} did not quit within {:?}, escalating to forced kill",
                        app.bundle_id, grace
                    );
                }
                Err(host_control::Error::PermissionDenied { .. }) => {
                    return Err(Error::PermissionDenied {
                        bundle_id: app.bundle_id.clone(),
                    });
                }
                Err(e) => warn!(
                    "Quit request to {} failed: {}, escalating to forced kill",
                    app.bundle_id, e
                ),
            }
            escalated = true;
        }

        for round in 0..=self.timeouts.forced_retries {
            if round > 0 {
                warn!(
                    "{} still present after forced kill, retrying ({}/{})",
                    app.bundle_id, round, self.timeouts.forced_retries
                );
            }
            if self.kill_until_absent(app).await? {
                return Ok(ConfirmedTermination {
                    was_running: true,
                    escalated,
                    elapsed: started.elapsed(),
                });
            }
        }

        Err(Error::TerminationTimeout {
            bundle_id: app.bundle_id.clone(),
            waited: started.elapsed(),
        })
    }

    /// Poll until no instance is listed, or `timeout` passes
    async fn wait_until_absent(&self, app: &AppSpec, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.lookup(app).await?;
            let Some(pid) = current.pid else {
                return Ok(true);
            };
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.pause(pid, deadline).await;
        }
    }

    /// SIGKILL every instance that shows up until none is listed, for one kill timeout
    ///
    /// Each pid is signalled once per round; instances that appear while
    /// waiting (a second copy, or one restarted by an outside supervisor)
    /// are killed as they are seen.
    async fn kill_until_absent(&self, app: &AppSpec) -> Result<bool> {
        let deadline = Instant::now() + self.timeouts.kill;
        let mut signalled = HashSet::new();
        loop {
            let current = self.lookup(app).await?;
            let Some(pid) = current.pid else {
                return Ok(true);
            };
            if signalled.insert(pid) {
                self.control
                    .terminate(pid, true)
                    .await
                    .map_err(|e| Error::from_host(&app.bundle_id, e))?;
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.pause(pid, deadline).await;
        }
    }

    async fn lookup(&self, app: &AppSpec) -> Result<SupervisedProcess> {
        self.control
            .lookup(app)
            .await
            .map_err(|e| Error::from_host(&app.bundle_id, e))
    }

    /// Sleep one poll interval, waking early if `pid` reports its exit
    async fn pause(&self, pid: u32, deadline: Instant) {
        let wait = self
            .timeouts
            .poll_interval
            .min(deadline.saturating_duration_since(Instant::now()));

        match self.control.exit_notifier(pid) {
            Some(notifier) if !notifier.has_exited() => {
                smol::future::or(notifier.exited(), async {
                    smol::Timer::after(wait).await;
                })
                .await
            }
            _ => {
                smol::Timer::after(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_timeouts, test_app, FakeHost, QuitBehaviour, Step};

    #[test]
    fn test_not_running_confirms_without_strategy() {
        smol::block_on(async {
            let host = FakeHost::new();
            let reaper = Reaper::new(Arc::new(host.clone()), fast_timeouts());

            let started = Instant::now();
            let pending = reaper.kill_and_confirm(&test_app(), None).await.unwrap();
            assert!(!pending.was_running());

            let confirmed = pending.confirmed().await.unwrap();
            assert!(!confirmed.was_running);
            assert!(started.elapsed() < Duration::from_millis(50));
            assert!(host.journal().signals().is_empty());
        });
    }

    #[test]
    fn test_forced_is_the_default_strategy() {
        smol::block_on(async {
            let host = FakeHost::new();
            let app = test_app();
            let pid = host.spawn(&app);
            let reaper = Reaper::new(Arc::new(host.clone()), fast_timeouts());

            let pending = reaper.kill_and_confirm(&app, None).await.unwrap();
            assert!(pending.was_running());
            assert_eq!(pending.snapshot().pid, Some(pid));

            let confirmed = pending.confirmed().await.unwrap();
            assert!(confirmed.was_running);
            assert!(!confirmed.escalated);
            assert_eq!(
                host.journal().signals(),
                vec![Step::Signalled { pid, forced: true }]
            );
        });
    }

    #[test]
    fn test_cooperative_quit_without_escalation() {
        smol::block_on(async {
            let host = FakeHost::new();
            let app = test_app();
            host.spawn(&app);
            host.set_quit_behaviour(QuitBehaviour::Honour {
                delay: Duration::from_millis(10),
            });
            let reaper = Reaper::new(Arc::new(host.clone()), fast_timeouts());

            let strategy = TerminationStrategy::Cooperative {
                channel: Arc::new(host.clone()),
                grace: Duration::from_millis(500),
            };
            let confirmed = reaper
                .kill_and_confirm(&app, Some(strategy))
                .await
                .unwrap()
                .confirmed()
                .await
                .unwrap();

            assert!(confirmed.was_running);
            assert!(!confirmed.escalated);
            assert!(host.journal().signals().is_empty());
        });
    }

    #[test]
    fn test_cooperative_quit_escalates_when_ignored() {
        smol::block_on(async {
            let host = FakeHost::new();
            let app = test_app();
            let pid = host.spawn(&app);
            host.set_quit_behaviour(QuitBehaviour::Ignore);
            let reaper = Reaper::new(Arc::new(host.clone()), fast_timeouts());

            let strategy = TerminationStrategy::Cooperative {
                channel: Arc::new(host.clone()),
                grace: Duration::from_millis(30),
            };
            let confirmed = reaper
                .kill_and_confirm(&app, Some(strategy))
                .await
                .unwrap()
                .confirmed()
                .await
                .unwrap();

            assert!(confirmed.escalated);
            assert_eq!(
                host.journal().signals(),
                vec![Step::Signalled { pid, forced: true }]
            );
        });
    }

    #[test]
    fn test_unkillable_process_times_out_after_one_retry() {
        smol::block_on(async {
            let host = FakeHost::new();
            let app = test_app();
            let pid = host.spawn(&app);
            host.set_unkillable(true);
            let reaper = Reaper::new(Arc::new(host.clone()), fast_timeouts());

            let err = reaper
                .kill_and_confirm(&app, None)
                .await
                .unwrap()
                .confirmed()
                .await
                .unwrap_err();

            assert!(matches!(err, Error::TerminationTimeout { .. }));
            assert_eq!(
                host.journal().signals(),
                vec![
                    Step::Signalled { pid, forced: true },
                    Step::Signalled { pid, forced: true },
                ]
            );
        });
    }

    #[test]
    fn test_dropping_pending_does_not_cancel() {
        smol::block_on(async {
            let host = FakeHost::new();
            let app = test_app();
            host.spawn(&app);
            let reaper = Reaper::new(Arc::new(host.clone()), fast_timeouts());

            drop(reaper.kill_and_confirm(&app, None).await.unwrap());

            let deadline = Instant::now() + Duration::from_secs(2);
            while host.is_running(&app) && Instant::now() < deadline {
                smol::Timer::after(Duration::from_millis(5)).await;
            }
            assert!(!host.is_running(&app));
        });
    }
}
