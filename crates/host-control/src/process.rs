//! Process control traits and types

use crate::app::{AppSpec, SupervisedProcess};
use crate::error::Result;
use async_trait::async_trait;

/// Control over the processes of the supervised application
///
/// Every query goes back to the OS; implementations must not cache
/// snapshots across calls.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Look up the application in the process table
    async fn lookup(&self, app: &AppSpec) -> Result<SupervisedProcess>;

    /// Send SIGTERM, or SIGKILL when `forced`
    ///
    /// A process that is already gone is not an error.
    async fn terminate(&self, pid: u32, forced: bool) -> Result<()>;

    /// Start a fresh instance of the application, returning its pid
    async fn launch(&self, app: &AppSpec) -> Result<u32>;

    /// Subscribe to the exit of a process, when the platform can report it
    ///
    /// Returns `None` for processes this controller cannot wait on; callers
    /// then fall back to polling [`ProcessControl::lookup`].
    fn exit_notifier(&self, pid: u32) -> Option<ExitNotifier>;

    /// Whether the caller may signal `pid`
    async fn can_signal(&self, pid: u32) -> Result<bool>;
}

/// Resolves once a watched process has been reaped
///
/// The watcher holds the sending half and drops it on exit, so any number of
/// notifiers for the same pid wake together.
#[derive(Debug, Clone)]
pub struct ExitNotifier {
    receiver: async_channel::Receiver<()>,
}

impl ExitNotifier {
    /// Create a notifier/sender pair; dropping the sender signals exit
    pub fn channel() -> (async_channel::Sender<()>, Self) {
        let (sender, receiver) = async_channel::bounded(1);
        (sender, Self { receiver })
    }

    /// Whether the watched process has already exited
    pub fn has_exited(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Wait for the watched process to exit
    pub async fn exited(self) {
        // Nothing is ever sent; recv returns once the sender is dropped.
        let _ = self.receiver.recv().await;
    }
}
