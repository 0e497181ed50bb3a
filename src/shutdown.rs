//! The shutdown path and the builtin `close_session` unit that exposes it.
//!
//! Teardown stops the session and the watcher independently (a failure in one
//! never skips the other), then clears the running flag. It takes neither the
//! dispatcher lock nor the reload cycle lock, so it is safe to run from a
//! handler task while reloads or lookups are in progress. Teardown runs at
//! most once per context.

use std::sync::Arc;

use crate::context::Context;
use crate::session::SessionError;
use crate::units::{Command, CommandMap, CommandUnit, RegisterError, UnitId};
use crate::watcher::WatchError;

/// Identifier of the builtin shutdown unit.
pub const SHUTDOWN_UNIT: &str = "close_session";

/// Command registered by the shutdown unit.
pub const QUIT_COMMAND: &str = "quit";

/// What happened during teardown.
#[derive(Debug)]
pub struct ShutdownReport {
    pub session: Result<(), SessionError>,
    pub watcher: Result<(), WatchError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.session.is_ok() && self.watcher.is_ok()
    }
}

/// Release external resources and clear the running flag.
///
/// Returns `None` when the context was already torn down, e.g. by `quit`
/// racing end of input.
pub fn teardown(ctx: &Context) -> Option<ShutdownReport> {
    let report = ctx.teardown_once(|| release(ctx));
    if report.is_none() {
        crate::debug_event!(SHUTDOWN_UNIT, "teardown already done");
    }
    report
}

fn release(ctx: &Context) -> ShutdownReport {
    crate::log_event!(SHUTDOWN_UNIT, "shutting down session");

    let session = stop_session(ctx);
    if let Err(e) = &session {
        tracing::error!("[{SHUTDOWN_UNIT}] error while closing session: {e}");
    }

    let watcher = ctx
        .watcher()
        .stop()
        .and_then(|()| ctx.watcher().join());
    if let Err(e) = &watcher {
        tracing::error!("[{SHUTDOWN_UNIT}] error while stopping watcher: {e}");
    }

    ctx.set_running(false);
    crate::log_event!(SHUTDOWN_UNIT, "teardown complete");

    ShutdownReport { session, watcher }
}

/// Teardown, then end the process if the context's policy says so.
pub fn run(ctx: &Context) -> Option<ShutdownReport> {
    let report = teardown(ctx);
    ctx.terminate();
    report
}

/// Stop the session, waiting a bounded time for in-flight session actions.
fn stop_session(ctx: &Context) -> Result<(), SessionError> {
    let timeout = ctx.shutdown_policy().session_lock_timeout;
    match ctx.try_session_lock(timeout) {
        Some(_guard) => ctx.session().stop(),
        None => {
            tracing::warn!(
                "[{SHUTDOWN_UNIT}] session busy after {timeout:?}, stopping without its lock"
            );
            ctx.session().stop()
        }
    }
}

/// Builtin unit registering the `quit` command.
#[derive(Debug)]
pub struct CloseSessionUnit {
    id: UnitId,
}

impl CloseSessionUnit {
    pub fn new(id: UnitId) -> Self {
        Self { id }
    }

    /// Factory for [`crate::units::ManifestLoader::with_builtin`].
    pub fn factory(id: UnitId) -> Arc<dyn CommandUnit> {
        Arc::new(Self::new(id))
    }
}

impl CommandUnit for CloseSessionUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn register(&self, ctx: &Arc<Context>) -> Option<Result<CommandMap, RegisterError>> {
        let ctx = Arc::clone(ctx);
        let quit = Command::new(move || {
            run(&ctx);
            Ok(())
        })
        .with_description("Close the session, stop the watcher and exit");

        Some(Ok(CommandMap::from([(QUIT_COMMAND.to_string(), quit)])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WatcherControl;
    use crate::session::{DetachedSession, Session};
    use crate::watcher::WatcherHandle;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FailingSession;

    impl Session for FailingSession {
        fn name(&self) -> &str {
            "failing"
        }

        fn start(&self) -> Result<(), SessionError> {
            Ok(())
        }

        fn stop(&self) -> Result<(), SessionError> {
            Err(SessionError::Backend {
                reason: "browser already gone".into(),
            })
        }

        fn is_active(&self) -> bool {
            true
        }
    }

    /// Session whose stop takes a while and counts calls.
    #[derive(Default)]
    struct SlowSession {
        stops: AtomicUsize,
    }

    impl Session for SlowSession {
        fn name(&self) -> &str {
            "slow"
        }

        fn start(&self) -> Result<(), SessionError> {
            Ok(())
        }

        fn stop(&self) -> Result<(), SessionError> {
            std::thread::sleep(Duration::from_millis(50));
            if self.stops.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(SessionError::NotRunning {
                    name: "slow".into(),
                });
            }
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.stops.load(Ordering::SeqCst) == 0
        }
    }

    #[derive(Default)]
    struct RecordingWatcher {
        stopped: AtomicBool,
        joined: AtomicBool,
        fail_stop: bool,
    }

    impl WatcherControl for RecordingWatcher {
        fn stop(&self) -> Result<(), WatchError> {
            self.stopped.store(true, Ordering::SeqCst);
            if self.fail_stop {
                Err(WatchError::ChannelClosed)
            } else {
                Ok(())
            }
        }

        fn join(&self) -> Result<(), WatchError> {
            self.joined.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_teardown_stops_everything() {
        let session = Arc::new(DetachedSession::new("main"));
        session.start().unwrap();
        let watcher = Arc::new(RecordingWatcher::default());
        let ctx = Context::new(session.clone(), watcher.clone());

        let report = teardown(&ctx).unwrap();

        assert!(report.is_clean());
        assert!(!session.is_active());
        assert!(watcher.stopped.load(Ordering::SeqCst));
        assert!(watcher.joined.load(Ordering::SeqCst));
        assert!(!ctx.is_running());
    }

    #[test]
    fn test_session_failure_does_not_skip_watcher() {
        let watcher = Arc::new(RecordingWatcher::default());
        let ctx = Context::new(Arc::new(FailingSession), watcher.clone());

        let report = teardown(&ctx).unwrap();

        assert!(report.session.is_err());
        assert!(report.watcher.is_ok());
        assert!(watcher.stopped.load(Ordering::SeqCst));
        assert!(!ctx.is_running());
    }

    #[test]
    fn test_watcher_failure_still_clears_running_flag() {
        let watcher = Arc::new(RecordingWatcher {
            fail_stop: true,
            ..Default::default()
        });
        let ctx = Context::new(Arc::new(FailingSession), watcher.clone());

        let report = teardown(&ctx).unwrap();

        assert!(report.session.is_err());
        assert!(report.watcher.is_err());
        // join is skipped when stop fails
        assert!(!watcher.joined.load(Ordering::SeqCst));
        assert!(!ctx.is_running());
    }

    #[test]
    fn test_concurrent_teardown_runs_once() {
        let session = Arc::new(SlowSession::default());
        let watcher = Arc::new(RecordingWatcher::default());
        let ctx = Context::new(session.clone(), watcher);

        let reports: Vec<_> = std::thread::scope(|scope| {
            let first = scope.spawn(|| teardown(&ctx));
            let second = scope.spawn(|| teardown(&ctx));
            vec![first.join().unwrap(), second.join().unwrap()]
        });

        let ran: Vec<_> = reports.into_iter().flatten().collect();
        assert_eq!(ran.len(), 1);
        assert!(ran[0].is_clean());
        assert_eq!(session.stops.load(Ordering::SeqCst), 1);
        assert!(!ctx.is_running());

        // Later calls are no-ops too
        assert!(teardown(&ctx).is_none());
        assert_eq!(session.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_proceeds_when_session_lock_is_held() {
        let session = Arc::new(DetachedSession::new("main"));
        session.start().unwrap();
        let ctx = Context::new(session.clone(), Arc::new(WatcherHandle::new()))
            .with_shutdown_policy(crate::context::ShutdownPolicy {
                exit_process: false,
                session_lock_timeout: Duration::from_millis(20),
            });

        let report = ctx.with_session(|_| teardown(&ctx)).unwrap();

        assert!(report.is_clean());
        assert!(!session.is_active());
    }

    #[test]
    fn test_close_session_unit_registers_quit() {
        let session = Arc::new(DetachedSession::new("main"));
        session.start().unwrap();
        let watcher = Arc::new(WatcherHandle::new());
        let ctx = Arc::new(Context::new(session.clone(), watcher));
        let unit = CloseSessionUnit::new(UnitId::parse(SHUTDOWN_UNIT).unwrap());

        let commands = unit.register(&ctx).unwrap().unwrap();
        assert_eq!(commands.keys().collect::<Vec<_>>(), vec![QUIT_COMMAND]);

        commands[QUIT_COMMAND].call().unwrap();
        assert!(!ctx.is_running());
        assert!(!session.is_active());
    }
}
