//! The dispatcher: publishes command tables and launches handlers.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::units::UnitId;

use super::normalize_command_name;
use super::table::{CommandEntry, CommandInfo, CommandTable, panic_message};

/// Result of a finished handler task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed,
    Failed(String),
    Panicked(String),
}

/// What [`Dispatcher::invoke`] did with the input.
#[derive(Debug)]
pub enum Dispatch {
    /// Input was blank.
    Empty,
    /// No such command. `known` lists the names in the current table.
    Unknown { name: String, known: Vec<String> },
    /// Handler launched on its own task.
    Launched {
        command: String,
        origin: UnitId,
        generation: u64,
        task: JoinHandle<HandlerOutcome>,
    },
}

struct Published {
    generation: u64,
    table: Arc<CommandTable>,
}

/// Owns the current command table under a single lock.
///
/// The lock is held only to swap or read the table, never while a handler
/// runs.
pub struct Dispatcher {
    current: Mutex<Published>,
    runtime: Handle,
}

impl Dispatcher {
    /// Create a dispatcher with an empty table; handlers run on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            current: Mutex::new(Published {
                generation: 0,
                table: Arc::new(CommandTable::new()),
            }),
            runtime,
        }
    }

    /// Atomically replace the visible table. Returns the new generation.
    pub fn publish(&self, table: CommandTable) -> u64 {
        let table = Arc::new(table);
        let count = table.len();

        let generation = {
            let mut current = self.current.lock();
            current.generation += 1;
            current.table = table;
            current.generation
        };

        crate::debug_event!(
            "dispatch",
            "published",
            "generation {generation}, {count} commands"
        );
        generation
    }

    /// Generation of the most recently published table (0 before any publish).
    pub fn generation(&self) -> u64 {
        self.current.lock().generation
    }

    /// The table currently in force.
    pub fn table(&self) -> Arc<CommandTable> {
        Arc::clone(&self.current.lock().table)
    }

    pub fn known_commands(&self) -> Vec<String> {
        self.current.lock().table.names()
    }

    pub fn describe(&self) -> Vec<CommandInfo> {
        self.table().describe()
    }

    /// Look up `input` and launch its handler without waiting for it.
    pub fn invoke(&self, input: &str) -> Dispatch {
        let name = normalize_command_name(input);
        if name.is_empty() {
            return Dispatch::Empty;
        }

        let (entry, generation) = {
            let current = self.current.lock();
            match current.table.get(&name) {
                Some(entry) => (entry.clone(), current.generation),
                None => {
                    return Dispatch::Unknown {
                        name,
                        known: current.table.names(),
                    };
                }
            }
        };

        let origin = entry.origin().clone();
        let task = self.launch(name.clone(), entry);

        Dispatch::Launched {
            command: name,
            origin,
            generation,
            task,
        }
    }

    /// Run the handler on the blocking pool, supervised by a task that logs
    /// its outcome. There is no timeout: a hung handler is a leaked task.
    fn launch(&self, name: String, entry: CommandEntry) -> JoinHandle<HandlerOutcome> {
        let handler = entry.command().handler();
        let origin = entry.origin().clone();

        crate::debug_event!(
            "dispatch",
            "launch",
            "{name} ({origin} v{})",
            entry.version()
        );

        self.runtime.spawn(async move {
            match tokio::task::spawn_blocking(move || handler()).await {
                Ok(Ok(())) => {
                    crate::debug_event!("dispatch", "completed", "{name}");
                    HandlerOutcome::Completed
                }
                Ok(Err(e)) => {
                    tracing::error!("[dispatch] command '{name}' from {origin} failed: {e:#}");
                    HandlerOutcome::Failed(format!("{e:#}"))
                }
                Err(e) => {
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        e.to_string()
                    };
                    tracing::error!(
                        "[dispatch] command '{name}' from {origin} panicked: {reason}"
                    );
                    HandlerOutcome::Panicked(reason)
                }
            }
        })
    }
}
