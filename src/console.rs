//! Interactive command console.
//!
//! Reads one command per line and hands it to the dispatcher. The loop ends
//! when the running flag clears (a `quit` handler ran), on end of input, or on
//! Ctrl+C; the last two run teardown themselves.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::{CommandInfo, Dispatch, HandlerOutcome};
use crate::reload::{ReloadCoordinator, ReloadCycle};
use crate::shutdown::{self, ShutdownReport};

/// Shows the command list when no unit registers a `help` command.
pub const HELP_COMMAND: &str = "help";

/// Reloads every unit and republishes the table.
pub const RELOAD_COMMAND: &str = ":reload";

/// Why the console stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The running flag was cleared, normally by `quit`.
    Stopped,
    /// Input closed.
    EndOfInput,
    /// Ctrl+C.
    Interrupted,
}

/// Response to one input line.
#[derive(Debug)]
pub enum Reply {
    Nothing,
    Launched {
        command: String,
        task: JoinHandle<HandlerOutcome>,
    },
    Unknown {
        name: String,
        known: Vec<String>,
    },
    Help(Vec<CommandInfo>),
    Reloaded(ReloadCycle),
}

impl Reply {
    /// Text shown to the user, if any.
    pub fn render(&self) -> Option<String> {
        match self {
            Reply::Nothing | Reply::Launched { .. } => None,
            Reply::Unknown { name, known } => Some(format!(
                "Unknown command: {name}\nAvailable commands: {}",
                known.join(", ")
            )),
            Reply::Help(commands) => {
                let mut out = String::from("Available commands:");
                for info in commands {
                    out.push_str(&format!("\n  {:<12} {}", info.name, info.origin));
                    if let Some(description) = &info.description {
                        out.push_str(&format!("  {description}"));
                    }
                }
                Some(out)
            }
            Reply::Reloaded(ReloadCycle::Published { commands, .. }) => {
                Some(format!("Reloaded: {commands} commands available"))
            }
            Reply::Reloaded(ReloadCycle::Skipped(outcome)) => {
                Some(format!(
                    "Reload failed, keeping current commands ({outcome:?})"
                ))
            }
        }
    }
}

/// The read-dispatch loop.
pub struct Console {
    coordinator: Arc<ReloadCoordinator>,
    prompt: String,
}

impl Console {
    pub fn new(coordinator: Arc<ReloadCoordinator>, prompt: impl Into<String>) -> Self {
        Self {
            coordinator,
            prompt: prompt.into(),
        }
    }

    /// Handle a single input line.
    pub async fn handle_line(&self, line: &str) -> Reply {
        let dispatcher = self.coordinator.dispatcher();
        let input = line.trim();

        if input == RELOAD_COMMAND {
            let coordinator = Arc::clone(&self.coordinator);
            return match tokio::task::spawn_blocking(move || coordinator.reload_all()).await {
                Ok(cycle) => Reply::Reloaded(cycle),
                Err(e) => {
                    tracing::error!("[console] reload task failed: {e}");
                    Reply::Nothing
                }
            };
        }

        match dispatcher.invoke(input) {
            Dispatch::Empty => Reply::Nothing,
            Dispatch::Launched { command, task, .. } => Reply::Launched { command, task },
            Dispatch::Unknown { name, .. } if name == HELP_COMMAND => {
                Reply::Help(dispatcher.describe())
            }
            Dispatch::Unknown { name, known } => Reply::Unknown { name, known },
        }
    }

    /// Run until stopped, reading lines from `lines`.
    pub async fn run(&self, mut lines: mpsc::Receiver<String>) -> ConsoleExit {
        let running = self.coordinator.context().running().clone();
        println!("\nType a command (e.g., '{}'):", shutdown::QUIT_COMMAND);

        loop {
            self.show_prompt();

            tokio::select! {
                _ = running.stopped() => return ConsoleExit::Stopped,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    self.teardown().await;
                    return ConsoleExit::Interrupted;
                }
                line = lines.recv() => match line {
                    Some(line) => {
                        if let Some(text) = self.handle_line(&line).await.render() {
                            println!("{text}");
                        }
                    }
                    None => {
                        self.teardown().await;
                        return ConsoleExit::EndOfInput;
                    }
                },
            }
        }
    }

    fn show_prompt(&self) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}", self.prompt);
        let _ = stdout.flush();
    }

    async fn teardown(&self) -> Option<ShutdownReport> {
        let context = Arc::clone(self.coordinator.context());
        if !context.is_running() {
            return None;
        }

        match tokio::task::spawn_blocking(move || shutdown::teardown(&context)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("[console] teardown task failed: {e}");
                None
            }
        }
    }
}

/// Read lines from `input` on a dedicated thread.
///
/// The channel closes at end of input or on a read error. The thread is not
/// joined; it ends with the process if input never closes.
pub fn spawn_line_reader<R>(input: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    let spawned = thread::Builder::new()
        .name("hotcmd-input".into())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("[console] failed to read input: {e}");
                        break;
                    }
                }
            }
        });

    // Without a reader the receiver sees a closed channel, i.e. end of input
    if let Err(e) = spawned {
        tracing::error!("[console] failed to start input reader: {e}");
    }

    rx
}

/// [`spawn_line_reader`] over stdin.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::dispatch::Dispatcher;
    use crate::session::{DetachedSession, Session};
    use crate::shutdown::CloseSessionUnit;
    use crate::units::{ManifestLoader, UnitId, UnitRegistry};
    use crate::watcher::WatcherHandle;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::runtime::Handle;

    fn console(dir: &TempDir, session: Arc<DetachedSession>) -> Console {
        std::fs::write(
            dir.path().join("greet.toml"),
            "[[commands]]\nname = \"hi\"\nactions = [{ log = \"hello\" }]\n",
        )
        .unwrap();

        let loader = ManifestLoader::new(dir.path(), "toml").with_builtin(
            UnitId::parse(shutdown::SHUTDOWN_UNIT).unwrap(),
            CloseSessionUnit::factory,
        );
        let registry = Arc::new(UnitRegistry::new(Arc::new(loader)));
        registry.load([
            UnitId::parse("greet").unwrap(),
            UnitId::parse(shutdown::SHUTDOWN_UNIT).unwrap(),
        ]);

        let context = Arc::new(Context::new(session, Arc::new(WatcherHandle::new())));
        let dispatcher = Arc::new(Dispatcher::new(Handle::current()));
        let coordinator = Arc::new(ReloadCoordinator::new(registry, dispatcher, context));
        coordinator.rebuild();
        Console::new(coordinator, "> ")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_command_lists_available() {
        let dir = TempDir::new().unwrap();
        let console = console(&dir, Arc::new(DetachedSession::new("test")));

        let reply = console.handle_line("dance").await;
        assert_eq!(
            reply.render().unwrap(),
            "Unknown command: dance\nAvailable commands: hi, quit"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_help_falls_back_to_command_list() {
        let dir = TempDir::new().unwrap();
        let console = console(&dir, Arc::new(DetachedSession::new("test")));

        match console.handle_line("  HELP ").await {
            Reply::Help(commands) => {
                let names: Vec<_> = commands.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["hi", "quit"]);
            }
            other => panic!("expected help, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_command_is_launched() {
        let dir = TempDir::new().unwrap();
        let console = console(&dir, Arc::new(DetachedSession::new("test")));

        match console.handle_line("Hi").await {
            Reply::Launched { command, task } => {
                assert_eq!(command, "hi");
                assert_eq!(task.await.unwrap(), HandlerOutcome::Completed);
            }
            other => panic!("expected launch, got {other:?}"),
        }
        assert!(console.handle_line("   ").await.render().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reload_command_picks_up_new_commands() {
        let dir = TempDir::new().unwrap();
        let console = console(&dir, Arc::new(DetachedSession::new("test")));

        std::fs::write(
            dir.path().join("greet.toml"),
            r#"
[[commands]]
name = "hi"
actions = []

[[commands]]
name = "bye"
actions = []
"#,
        )
        .unwrap();

        let reply = console.handle_line(":reload").await;
        assert!(matches!(
            reply,
            Reply::Reloaded(ReloadCycle::Published { .. })
        ));
        assert!(console.coordinator.dispatcher().table().contains("bye"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_quit_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(DetachedSession::new("test"));
        session.start().unwrap();
        let console = console(&dir, session.clone());

        let lines = spawn_line_reader(Cursor::new("hi\nquit\n"));
        // Input stays open after quit in a real terminal; here EOF races the
        // quit handler, and either way the session ends up stopped.
        let exit = tokio::time::timeout(Duration::from_secs(5), console.run(lines))
            .await
            .unwrap();

        assert!(matches!(
            exit,
            ConsoleExit::Stopped | ConsoleExit::EndOfInput
        ));
        assert!(!session.is_active());
        assert!(!console.coordinator.context().is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_end_of_input_runs_teardown() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(DetachedSession::new("test"));
        session.start().unwrap();
        let console = console(&dir, session.clone());

        let lines = spawn_line_reader(Cursor::new(""));
        let exit = tokio::time::timeout(Duration::from_secs(5), console.run(lines))
            .await
            .unwrap();

        assert_eq!(exit, ConsoleExit::EndOfInput);
        assert!(!session.is_active());
    }
}
