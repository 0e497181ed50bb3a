//! Run command: the interactive console with hot reload.

use tokio::runtime::Handle;

use crate::config::Settings;
use crate::console::{Console, ConsoleExit, spawn_stdin_reader};
use crate::host::Host;

use super::report_load_failures;

/// Run the console until `quit`, end of input or Ctrl+C.
///
/// Returns the process exit code. The caller exits with it without waiting
/// for handlers that are still running.
pub async fn run(settings: &Settings, units: &[String], no_watch: bool) -> i32 {
    let (host, report) = match Host::build(settings, Handle::current(), units) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return 1;
        }
    };
    report_load_failures(&report);

    if settings.session.autostart
        && let Err(e) = host.session().start()
    {
        eprintln!("Error: failed to start session: {e}");
        return 1;
    }

    let watch = &settings.watch;
    if watch.enabled
        && !no_watch
        && let Err(e) = host.start_watching(&settings.units.extension, watch.debounce_ms, None)
    {
        // Commands still work without hot reload
        tracing::error!("[watcher] failed to start: {e}");
        eprintln!("Warning: hot reload disabled: {e}");
    }

    let console = Console::new(host.coordinator().clone(), &settings.console.prompt);
    match console.run(spawn_stdin_reader()).await {
        ConsoleExit::Stopped => crate::log_event!("console", "closed"),
        ConsoleExit::EndOfInput => crate::log_event!("console", "closed", "end of input"),
        ConsoleExit::Interrupted => crate::log_event!("console", "closed", "interrupted"),
    }

    0
}
