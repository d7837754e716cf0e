//! Test doubles for the supervisor
//!
//! [`FakeHost`] stands in for every OS collaborator at once: process table,
//! signals, launcher, quit channel, permission gate and interface catalog.
//! It and [`RecordingStore`] write to a shared [`Journal`], so tests can
//! check the order in which the protocol touched the world.

use crate::binder::{Collaborators, InterfaceBinder};
use crate::catalog::InterfaceCatalog;
use crate::permission::PermissionGate;
use crate::reaper::Timeouts;
use async_trait::async_trait;
use binding_store::{keys, KeyValueStore, MemoryStore};
use host_control::{AppSpec, ExitNotifier, Interface, ProcessControl, QuitChannel, SupervisedProcess};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Something the supervisor did, or observed, to the outside world
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A cooperative quit was requested
    QuitRequested {
        /// Target pid
        pid: u32,
    },
    /// A signal was delivered
    Signalled {
        /// Target pid
        pid: u32,
        /// SIGKILL rather than SIGTERM
        forced: bool,
    },
    /// A lookup found the process gone
    ObservedAbsent {
        /// Pid that disappeared
        pid: u32,
    },
    /// The store was committed with these values
    StoreCommitted {
        /// Committed target
        target: Option<String>,
        /// Committed last applied interface
        last_applied: Option<String>,
    },
    /// The application was launched
    Launched {
        /// Pid of the new instance
        pid: u32,
    },
    /// A launch was attempted and failed
    LaunchFailed,
}

/// Timestamped, shared record of [`Step`]s
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(Instant, Step)>>>,
}

impl Journal {
    /// Append a step
    pub fn record(&self, step: Step) {
        lock(&self.entries).push((Instant::now(), step));
    }

    /// Every step in order
    pub fn steps(&self) -> Vec<Step> {
        lock(&self.entries).iter().map(|(_, step)| step.clone()).collect()
    }

    /// Every step with the time it was recorded
    pub fn timed(&self) -> Vec<(Instant, Step)> {
        lock(&self.entries).clone()
    }

    /// Only the signals
    pub fn signals(&self) -> Vec<Step> {
        self.steps()
            .into_iter()
            .filter(|step| matches!(step, Step::Signalled { .. }))
            .collect()
    }

    /// Only the commits
    pub fn commits(&self) -> Vec<Step> {
        self.steps()
            .into_iter()
            .filter(|step| matches!(step, Step::StoreCommitted { .. }))
            .collect()
    }

    /// Only the launches, successful or not
    pub fn launches(&self) -> Vec<Step> {
        self.steps()
            .into_iter()
            .filter(|step| matches!(step, Step::Launched { .. } | Step::LaunchFailed))
            .collect()
    }

    /// Index of the first occurrence of `step`
    pub fn position(&self, step: &Step) -> Option<usize> {
        lock(&self.entries).iter().position(|(_, s)| s == step)
    }

    /// Index of the first step matching `predicate`
    pub fn position_where(&self, predicate: impl Fn(&Step) -> bool) -> Option<usize> {
        lock(&self.entries).iter().position(|(_, s)| predicate(s))
    }

    /// When `step` was first recorded
    pub fn time_of(&self, step: &Step) -> Option<Instant> {
        lock(&self.entries)
            .iter()
            .find(|(_, s)| s == step)
            .map(|(at, _)| *at)
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// How the fake application reacts to a cooperative quit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitBehaviour {
    /// Exit after `delay`
    Honour {
        /// Time between the request and the process leaving the table
        delay: Duration,
    },
    /// Keep running
    Ignore,
}

impl Default for QuitBehaviour {
    fn default() -> Self {
        QuitBehaviour::Honour {
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct FakeProcess {
    process_name: String,
    exits_at: Option<Instant>,
}

#[derive(Debug)]
struct HostState {
    next_pid: u32,
    processes: BTreeMap<u32, FakeProcess>,
    signal_permitted: bool,
    permission: bool,
    removal_delay: Duration,
    quit_behaviour: QuitBehaviour,
    unkillable: bool,
    fail_launch: bool,
    interfaces: Vec<Interface>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            next_pid: 1000,
            processes: BTreeMap::new(),
            signal_permitted: true,
            permission: true,
            removal_delay: Duration::ZERO,
            quit_behaviour: QuitBehaviour::default(),
            unkillable: false,
            fail_launch: false,
            interfaces: default_interfaces(),
        }
    }
}

/// In-process stand-in for the OS
///
/// Killed processes leave the table only once `removal_delay` has passed,
/// and that is noticed lazily by the next lookup, which is also when
/// [`Step::ObservedAbsent`] is recorded.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
    journal: Journal,
}

impl FakeHost {
    /// An empty host with the default interfaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal shared with this host
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Start an instance of `app` outside the supervisor
    pub fn spawn(&self, app: &AppSpec) -> u32 {
        let mut state = lock(&self.state);
        let pid = state.next_pid;
        state.next_pid += 1;
        state.processes.insert(
            pid,
            FakeProcess {
                process_name: app.process_name.clone(),
                exits_at: None,
            },
        );
        pid
    }

    /// Whether any instance of `app` is listed
    pub fn is_running(&self, app: &AppSpec) -> bool {
        self.sweep(app).pid.is_some()
    }

    /// Every live pid of `app`
    pub fn pids(&self, app: &AppSpec) -> Vec<u32> {
        self.sweep(app);
        lock(&self.state)
            .processes
            .iter()
            .filter(|(_, p)| p.process_name == app.process_name)
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Whether signals are permitted (`EPERM` otherwise)
    pub fn set_signal_permitted(&self, permitted: bool) {
        lock(&self.state).signal_permitted = permitted;
    }

    /// Answer of the permission gate
    pub fn set_permission(&self, granted: bool) {
        lock(&self.state).permission = granted;
    }

    /// Delay between SIGKILL and the process leaving the table
    pub fn set_removal_delay(&self, delay: Duration) {
        lock(&self.state).removal_delay = delay;
    }

    /// Reaction to cooperative quit requests and SIGTERM
    pub fn set_quit_behaviour(&self, behaviour: QuitBehaviour) {
        lock(&self.state).quit_behaviour = behaviour;
    }

    /// Make every signal a no-op
    pub fn set_unkillable(&self, unkillable: bool) {
        lock(&self.state).unkillable = unkillable;
    }

    /// Make launches fail
    pub fn set_fail_launch(&self, fail: bool) {
        lock(&self.state).fail_launch = fail;
    }

    /// Replace the interface list
    pub fn set_interfaces(&self, interfaces: Vec<Interface>) {
        lock(&self.state).interfaces = interfaces;
    }

    /// Drop exited processes of `app` and report what is left
    fn sweep(&self, app: &AppSpec) -> SupervisedProcess {
        let now = Instant::now();
        let mut state = lock(&self.state);

        let exited: Vec<u32> = state
            .processes
            .iter()
            .filter(|(_, p)| p.process_name == app.process_name)
            .filter(|(_, p)| p.exits_at.is_some_and(|at| at <= now))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in exited {
            state.processes.remove(&pid);
            self.journal.record(Step::ObservedAbsent { pid });
        }

        state
            .processes
            .iter()
            .find(|(_, p)| p.process_name == app.process_name)
            .map(|(pid, _)| SupervisedProcess::running(&app.bundle_id, *pid))
            .unwrap_or_else(|| SupervisedProcess::absent(&app.bundle_id))
    }

    fn schedule_exit(state: &mut HostState, pid: u32, delay: Duration) {
        let at = Instant::now() + delay;
        if let Some(process) = state.processes.get_mut(&pid) {
            process.exits_at = Some(process.exits_at.map_or(at, |existing| existing.min(at)));
        }
    }
}

#[async_trait]
impl ProcessControl for FakeHost {
    async fn lookup(&self, app: &AppSpec) -> host_control::Result<SupervisedProcess> {
        Ok(self.sweep(app))
    }

    async fn terminate(&self, pid: u32, forced: bool) -> host_control::Result<()> {
        let mut state = lock(&self.state);
        if !state.signal_permitted {
            return Err(host_control::Error::PermissionDenied { pid });
        }
        self.journal.record(Step::Signalled { pid, forced });

        if state.unkillable {
            return Ok(());
        }
        if forced {
            let delay = state.removal_delay;
            Self::schedule_exit(&mut state, pid, delay);
        } else if let QuitBehaviour::Honour { delay } = state.quit_behaviour {
            Self::schedule_exit(&mut state, pid, delay);
        }
        Ok(())
    }

    async fn launch(&self, app: &AppSpec) -> host_control::Result<u32> {
        if lock(&self.state).fail_launch {
            self.journal.record(Step::LaunchFailed);
            return Err(host_control::Error::spawn_failed(format!(
                "{} failed to start",
                app.launch.program
            )));
        }
        let pid = self.spawn(app);
        self.journal.record(Step::Launched { pid });
        Ok(pid)
    }

    fn exit_notifier(&self, _pid: u32) -> Option<ExitNotifier> {
        None
    }

    async fn can_signal(&self, _pid: u32) -> host_control::Result<bool> {
        Ok(lock(&self.state).signal_permitted)
    }
}

#[async_trait]
impl QuitChannel for FakeHost {
    async fn request_quit(
        &self,
        _app: &AppSpec,
        process: &SupervisedProcess,
    ) -> host_control::Result<()> {
        let Some(pid) = process.pid else {
            return Ok(());
        };
        let mut state = lock(&self.state);
        if !state.signal_permitted {
            return Err(host_control::Error::PermissionDenied { pid });
        }
        self.journal.record(Step::QuitRequested { pid });

        if let (QuitBehaviour::Honour { delay }, false) = (state.quit_behaviour, state.unkillable) {
            Self::schedule_exit(&mut state, pid, delay);
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionGate for FakeHost {
    async fn has_permissions(&self) -> bool {
        lock(&self.state).permission
    }
}

#[async_trait]
impl InterfaceCatalog for FakeHost {
    async fn interfaces(&self) -> crate::Result<Vec<Interface>> {
        Ok(lock(&self.state).interfaces.clone())
    }
}

/// In-memory store that journals its commits and can be made to fail them
pub struct RecordingStore {
    inner: MemoryStore,
    journal: Journal,
    /// Commits left to succeed before every further one fails
    commits_until_failure: AtomicUsize,
}

impl RecordingStore {
    /// Create a store writing to `journal`
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: MemoryStore::new(),
            journal,
            commits_until_failure: AtomicUsize::new(usize::MAX),
        }
    }

    /// Make every following commit fail
    pub fn set_fail_commits(&self, fail: bool) {
        let remaining = if fail { 0 } else { usize::MAX };
        self.commits_until_failure.store(remaining, Ordering::SeqCst);
    }

    /// Let `successes` more commits through, then fail every following one
    pub fn fail_commits_after(&self, successes: usize) {
        self.commits_until_failure.store(successes, Ordering::SeqCst);
    }

    /// Value as a freshly started application would read it
    pub fn committed(&self, key: &str) -> Option<String> {
        self.inner.committed(key)
    }

    /// Committed target interface
    pub fn committed_target(&self) -> Option<String> {
        self.committed(keys::TARGET_INTERFACE)
    }

    /// Committed last applied interface
    pub fn committed_last_applied(&self) -> Option<String> {
        self.committed(keys::LAST_APPLIED_INTERFACE)
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> binding_store::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> binding_store::Result<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> binding_store::Result<()> {
        self.inner.remove(key).await
    }

    async fn commit(&self) -> binding_store::Result<()> {
        let allowed = self
            .commits_until_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| match remaining {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if !allowed {
            return Err(binding_store::Error::Io(std::io::Error::other(
                "disk full",
            )));
        }
        self.inner.commit().await?;
        self.journal.record(Step::StoreCommitted {
            target: self.committed_target(),
            last_applied: self.committed_last_applied(),
        });
        Ok(())
    }
}

/// A binder wired to a [`FakeHost`] and a [`RecordingStore`]
pub struct Harness {
    /// The fake OS
    pub host: FakeHost,
    /// The fake preference store
    pub store: Arc<RecordingStore>,
    /// The binder under test
    pub binder: InterfaceBinder,
}

impl Harness {
    /// Wire a binder for [`test_app`] with [`fast_timeouts`]
    pub fn new() -> Self {
        let host = FakeHost::new();
        let store = Arc::new(RecordingStore::new(host.journal()));
        let shared = Arc::new(host.clone());
        let binder = InterfaceBinder::new(
            test_app(),
            Collaborators {
                control: shared.clone(),
                catalog: shared.clone(),
                permissions: shared.clone(),
                quit: shared,
                store: store.clone(),
            },
            fast_timeouts(),
        );
        Self {
            host,
            store,
            binder,
        }
    }

    /// Journal shared by the host and the store
    pub fn journal(&self) -> Journal {
        self.host.journal()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// The application used throughout the tests
pub fn test_app() -> AppSpec {
    AppSpec::new("com.example.app", "example-app")
}

/// Timeouts short enough for tests
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        poll_interval: Duration::from_millis(5),
        graceful_quit: Duration::from_millis(200),
        kill: Duration::from_millis(50),
        forced_retries: 1,
    }
}

/// Loopback, a wired and a wireless interface, and a VPN tunnel
pub fn default_interfaces() -> Vec<Interface> {
    [
        ("lo0", "127.0.0.1"),
        ("lo0", "::1"),
        ("en0", "192.168.1.20"),
        ("en1", "fe80::1c2d:3eff:fe4f:5a6b"),
        ("en1", "10.0.0.5"),
        ("utun3", "10.8.0.2"),
    ]
    .into_iter()
    .filter_map(|(name, address)| Some(Interface::new(name, address.parse().ok()?)))
    .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
