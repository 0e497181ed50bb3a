//! Command table and the builder that assembles it from loaded units.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use crate::context::Context;
use crate::units::{Command, RegisterError, UnitId, UnitSnapshot};

use super::{is_valid_command_name, normalize_command_name};

/// A command bound to the unit version that registered it.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    command: Command,
    origin: UnitId,
    version: u64,
}

impl CommandEntry {
    pub fn new(command: Command, origin: UnitId, version: u64) -> Self {
        Self {
            command,
            origin,
            version,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Unit that registered this command.
    pub fn origin(&self) -> &UnitId {
        &self.origin
    }

    /// Version of the origin unit at registration time.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Row used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub origin: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Normalized command name -> entry. Always the result of one full build.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: BTreeMap<String, CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Known command names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// name -> origin unit, the identity of a build result.
    pub fn origins(&self) -> BTreeMap<String, UnitId> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.origin.clone()))
            .collect()
    }

    pub fn describe(&self) -> Vec<CommandInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| CommandInfo {
                name: name.clone(),
                origin: entry.origin.to_string(),
                version: entry.version,
                description: entry.command.description().map(str::to_string),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert, replacing any earlier binding of `name`.
    pub fn insert(&mut self, name: String, entry: CommandEntry) -> Option<CommandEntry> {
        self.entries.insert(name, entry)
    }
}

/// Build a fresh table from `units`.
///
/// Units are visited in ascending id order. Later units win name collisions.
/// A unit whose registration fails or panics contributes nothing to this
/// build; the rest of the build proceeds.
pub fn build_table(units: &UnitSnapshot, ctx: &Arc<Context>) -> CommandTable {
    let mut table = CommandTable::new();

    for (id, unit) in units {
        let registered = panic::catch_unwind(AssertUnwindSafe(|| unit.instance().register(ctx)));

        let commands = match registered {
            Ok(None) => {
                crate::debug_event!("table", "passive unit", "{id}");
                continue;
            }
            Ok(Some(Ok(commands))) => commands,
            Ok(Some(Err(e))) => {
                tracing::error!("[table] {e}");
                continue;
            }
            Err(payload) => {
                let err = RegisterError::Panicked {
                    unit: id.to_string(),
                    reason: panic_message(payload.as_ref()),
                };
                tracing::error!("[table] {err}");
                continue;
            }
        };

        for (raw_name, command) in commands {
            let name = normalize_command_name(&raw_name);
            if !is_valid_command_name(&name) {
                tracing::warn!(
                    "[table] {id} registered invalid command name '{raw_name}', skipped"
                );
                continue;
            }

            let entry = CommandEntry::new(command, id.clone(), unit.version());
            if let Some(previous) = table.insert(name.clone(), entry) {
                crate::debug_event!(
                    "table",
                    "override",
                    "'{name}' from {} replaced by {id}",
                    previous.origin
                );
            }
        }
    }

    crate::debug_event!(
        "table",
        "built",
        "{} commands from {} units",
        table.len(),
        units.len()
    );
    table
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
