//! Shared execution context handed to every unit's registration call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::session::Session;
use crate::watcher::WatchError;

/// Control surface of the change watcher as seen by command units.
pub trait WatcherControl: Send + Sync {
    /// Ask the watcher to stop. Returns immediately.
    fn stop(&self) -> Result<(), WatchError>;

    /// Wait for the watcher thread to terminate.
    fn join(&self) -> Result<(), WatchError>;
}

/// Process lifecycle flag: running until the shutdown path clears it.
///
/// Clones share the same state. Once stopped the flag cannot be restarted.
#[derive(Clone, Debug, Default)]
pub struct RunningFlag {
    stopped: CancellationToken,
}

impl RunningFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.is_cancelled()
    }

    pub fn set(&self, running: bool) {
        if !running {
            if !self.stopped.is_cancelled() {
                crate::debug_event!("lifecycle", "running flag cleared");
            }
            self.stopped.cancel();
        } else if self.stopped.is_cancelled() {
            tracing::warn!("[lifecycle] ignoring restart request after shutdown");
        }
    }

    /// Resolves once the flag has been cleared.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await
    }
}

/// How the shutdown command ends the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Call `std::process::exit(0)` after teardown.
    pub exit_process: bool,
    /// How long teardown waits for in-flight session actions.
    pub session_lock_timeout: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            exit_process: false,
            session_lock_timeout: Duration::from_secs(2),
        }
    }
}

/// Resources and lifecycle controls shared by all units across reloads.
pub struct Context {
    session: Arc<dyn Session>,
    watcher: Arc<dyn WatcherControl>,
    running: RunningFlag,
    session_lock: Mutex<()>,
    torn_down: Mutex<bool>,
    shutdown: ShutdownPolicy,
}

impl Context {
    pub fn new(session: Arc<dyn Session>, watcher: Arc<dyn WatcherControl>) -> Self {
        Self {
            session,
            watcher,
            running: RunningFlag::new(),
            session_lock: Mutex::new(()),
            torn_down: Mutex::new(false),
            shutdown: ShutdownPolicy::default(),
        }
    }

    /// Share an existing running flag, e.g. the one the main loop waits on.
    pub fn with_running_flag(mut self, running: RunningFlag) -> Self {
        self.running = running;
        self
    }

    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown = policy;
        self
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn watcher(&self) -> &Arc<dyn WatcherControl> {
        &self.watcher
    }

    pub fn running(&self) -> &RunningFlag {
        &self.running
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown
    }

    /// Run `f` against the session while holding the session lock, so actions
    /// from concurrently dispatched commands do not interleave.
    pub fn with_session<R>(&self, f: impl FnOnce(&dyn Session) -> R) -> R {
        let _guard = self.session_lock.lock();
        f(self.session.as_ref())
    }

    /// Acquire the session lock, giving up after `timeout`.
    pub(crate) fn try_session_lock(&self, timeout: Duration) -> Option<MutexGuard<'_, ()>> {
        self.session_lock.try_lock_for(timeout)
    }

    /// Run `f` unless teardown already ran on this context.
    ///
    /// A concurrent caller waits for the first one to finish and gets `None`.
    pub(crate) fn teardown_once<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let mut torn_down = self.torn_down.lock();
        if *torn_down {
            return None;
        }
        let result = f();
        *torn_down = true;
        Some(result)
    }

    /// End the process if the shutdown policy asks for it.
    pub fn terminate(&self) {
        if self.shutdown.exit_process {
            crate::log_event!("lifecycle", "exiting");
            std::process::exit(0);
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("session", &self.session.name())
            .field("running", &self.running.is_running())
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}
