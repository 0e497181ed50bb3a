//! External session collaborator.
//!
//! The host never drives a browser itself; it only needs a handle it can
//! start and stop. [`DetachedSession`] is the stand-in used when no real
//! automation backend is attached.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Errors reported by a session backend.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session '{name}' is already running")]
    AlreadyRunning { name: String },

    #[error("Session '{name}' is not running")]
    NotRunning { name: String },

    #[error("Session backend failed: {reason}")]
    Backend { reason: String },
}

/// Opaque handle to an automation session.
pub trait Session: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self) -> Result<(), SessionError>;

    fn stop(&self) -> Result<(), SessionError>;

    fn is_active(&self) -> bool;
}

/// Session that only tracks its lifecycle and logs transitions.
#[derive(Debug)]
pub struct DetachedSession {
    name: String,
    active: AtomicBool,
}

impl DetachedSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: AtomicBool::new(false),
        }
    }
}

impl Session for DetachedSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), SessionError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyRunning {
                name: self.name.clone(),
            });
        }
        crate::log_event!("session", "started", "{}", self.name);
        Ok(())
    }

    fn stop(&self) -> Result<(), SessionError> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Err(SessionError::NotRunning {
                name: self.name.clone(),
            });
        }
        crate::log_event!("session", "stopped", "{}", self.name);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
