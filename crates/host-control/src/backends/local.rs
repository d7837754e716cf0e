//! Local process control backend

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::{ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::app::{AppSpec, SupervisedProcess};
use crate::error::{Error, Result};
use crate::process::{ExitNotifier, ProcessControl};

/// Process control for applications on the local host
///
/// The process table is read through `sysinfo`, signals go through `nix`,
/// and launches use `async-process`. Every child launched here is reaped by
/// a detached watcher, which also drives its [`ExitNotifier`].
#[derive(Debug, Clone, Default)]
pub struct LocalProcessControl {
    watched: Arc<Mutex<HashMap<u32, ExitNotifier>>>,
}

impl LocalProcessControl {
    /// Create a new local process controller
    pub fn new() -> Self {
        Self::default()
    }

    fn watched(&self) -> MutexGuard<'_, HashMap<u32, ExitNotifier>> {
        self.watched.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcessControl for LocalProcessControl {
    async fn lookup(&self, app: &AppSpec) -> Result<SupervisedProcess> {
        let name = app.process_name.clone();
        let pids = smol::unblock(move || live_pids(&name)).await;

        debug!(bundle_id = %app.bundle_id, ?pids, "process table lookup");

        Ok(match pids.first() {
            Some(&pid) => SupervisedProcess::running(&app.bundle_id, pid),
            None => SupervisedProcess::absent(&app.bundle_id),
        })
    }

    async fn terminate(&self, pid: u32, forced: bool) -> Result<()> {
        let signal = if forced { Signal::SIGKILL } else { Signal::SIGTERM };
        let target = nix_pid(pid, signal)?;

        match signal::kill(target, signal) {
            Ok(()) => {
                debug!(pid, ?signal, "signal sent");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(pid, ?signal, "process already gone");
                Ok(())
            }
            Err(Errno::EPERM) => Err(Error::PermissionDenied { pid }),
            Err(e) => Err(Error::signal_failed(pid, signal as i32, e.to_string())),
        }
    }

    async fn launch(&self, app: &AppSpec) -> Result<u32> {
        let command = app.launch.command();
        let mut child = command.prepare().spawn().map_err(|e| {
            Error::spawn_failed(format!("failed to launch `{}`: {}", command.display(), e))
        })?;

        let pid = child.id();
        info!(bundle_id = %app.bundle_id, pid, "launched `{}`", command.display());

        let (sender, notifier) = ExitNotifier::channel();
        self.watched().insert(pid, notifier);

        let watched = Arc::clone(&self.watched);
        smol::spawn(async move {
            match child.status().await {
                Ok(status) => debug!(pid, %status, "supervised process exited"),
                Err(e) => warn!(pid, "failed to wait for supervised process: {}", e),
            }
            watched
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&pid);
            drop(sender);
        })
        .detach();

        Ok(pid)
    }

    fn exit_notifier(&self, pid: u32) -> Option<ExitNotifier> {
        self.watched().get(&pid).cloned()
    }

    async fn can_signal(&self, pid: u32) -> Result<bool> {
        let target = nix_pid(pid, Signal::SIGKILL)?;
        match signal::kill(target, None) {
            Ok(()) | Err(Errno::ESRCH) => Ok(true),
            Err(Errno::EPERM) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pids of every live instance named `name`, lowest first
///
/// Zombies and dead entries are excluded: they hold no sockets. Threads are
/// listed by sysinfo under their process name and are skipped too.
fn live_pids(name: &str) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut pids: Vec<u32> = system
        .processes_by_exact_name(OsStr::new(name))
        .filter(|process| process.thread_kind().is_none())
        .filter(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
        .map(|process| process.pid().as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

/// Convert to a nix pid, refusing values that would address a process group
fn nix_pid(pid: u32, signal: Signal) -> Result<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(Error::signal_failed(pid, signal as i32, "invalid pid")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nix_pid_rejects_group_addresses() {
        assert!(nix_pid(0, Signal::SIGKILL).is_err());
        assert!(nix_pid(u32::MAX, Signal::SIGKILL).is_err());
        assert_eq!(nix_pid(42, Signal::SIGTERM).unwrap(), Pid::from_raw(42));
    }

    #[test]
    fn test_unknown_process_is_absent() {
        smol::block_on(async {
            let control = LocalProcessControl::new();
            let app = AppSpec::new("com.example.missing", "clutch-no-such-process");

            let process = control.lookup(&app).await.unwrap();
            assert!(!process.running);
            assert_eq!(process.pid, None);
        });
    }

    #[test]
    fn test_terminate_missing_pid_is_ok() {
        smol::block_on(async {
            let control = LocalProcessControl::new();
            // pid_max on Linux is at most 2^22, so this pid cannot exist.
            control.terminate(i32::MAX as u32, true).await.unwrap();
            assert!(control.can_signal(i32::MAX as u32).await.unwrap());
        });
    }

    #[test]
    fn test_no_notifier_for_foreign_pid() {
        let control = LocalProcessControl::new();
        assert!(control.exit_notifier(1).is_none());
    }
}
