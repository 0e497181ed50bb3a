//! Stop/join control for the watcher thread.

use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use super::error::WatchError;
use crate::context::WatcherControl;

/// Handle to the watcher thread, created before the thread exists.
///
/// The [`crate::context::Context`] holds this handle from startup, and the
/// watcher is attached to it once spawned. Stopping or joining a handle that
/// never had a thread attached is a no-op.
#[derive(Debug)]
pub struct WatcherHandle {
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
}

impl WatcherHandle {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            stop_tx,
            stop_rx,
            thread: Mutex::new(None),
            thread_id: Mutex::new(None),
        }
    }

    /// Whether a watcher thread has been attached and not yet joined.
    pub fn is_attached(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Receiver the watcher loop polls for the stop signal.
    pub(crate) fn stop_signal(&self) -> Receiver<()> {
        self.stop_rx.clone()
    }

    /// Attach a spawned watcher thread.
    pub(crate) fn attach(&self, thread: JoinHandle<()>) -> Result<(), WatchError> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Err(WatchError::AlreadyStarted);
        }
        *self.thread_id.lock() = Some(thread.thread().id());
        *slot = Some(thread);
        Ok(())
    }
}

impl Default for WatcherHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherControl for WatcherHandle {
    fn stop(&self) -> Result<(), WatchError> {
        if !self.is_attached() {
            return Ok(());
        }

        match self.stop_tx.try_send(()) {
            // A full channel means a stop is already pending
            Ok(()) | Err(TrySendError::Full(())) => {
                crate::debug_event!("watcher", "stop requested");
                Ok(())
            }
            Err(TrySendError::Disconnected(())) => Err(WatchError::ChannelClosed),
        }
    }

    fn join(&self) -> Result<(), WatchError> {
        if *self.thread_id.lock() == Some(thread::current().id()) {
            return Err(WatchError::JoinFromWatcher);
        }

        // Held until the thread ends so a concurrent join waits for it too
        let mut slot = self.thread.lock();
        let Some(thread) = slot.take() else {
            return Ok(());
        };

        thread.join().map_err(|payload| WatchError::ThreadPanicked {
            reason: crate::dispatch::panic_message(payload.as_ref()),
        })?;
        drop(slot);

        crate::log_event!("watcher", "stopped");
        Ok(())
    }
}
