//! TOML unit manifests.
//!
//! A file-backed unit is a small TOML document listing the commands it
//! contributes and the actions each command runs:
//!
//! ```toml
//! description = "Greetings"
//!
//! [[commands]]
//! name = "hi"
//! description = "Say hello"
//! actions = [{ say = "hello" }, { sleep_ms = 200 }]
//! ```
//!
//! A manifest without a `commands` key describes a passive unit: it loads and
//! reloads like any other, but has no registration entry point.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::dispatch::{is_valid_command_name, normalize_command_name};

use super::error::UnitResult;
use super::{Command, CommandMap, CommandUnit, RegisterError, UnitError, UnitId};

/// Parsed contents of a unit definition file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UnitManifest {
    /// Human readable summary of the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared commands. `None` marks a passive unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<CommandDecl>>,
}

/// One `[[commands]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDecl {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A step executed by a manifest command, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Print a line to stdout.
    Say(String),
    /// Emit an info-level log event.
    Log(String),
    /// Block the handler for the given number of milliseconds.
    SleepMs(u64),
    /// Start or stop the session, serialized through the session lock.
    Session(SessionOp),
    /// End the handler with an error.
    Fail(String),
    /// Run the shutdown sequence.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOp {
    Start,
    Stop,
}

impl fmt::Display for SessionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

impl UnitManifest {
    /// Parse the TOML definition of unit `id`.
    pub fn parse(id: &UnitId, source: &str) -> UnitResult<Self> {
        toml::from_str(source).map_err(|e| UnitError::InvalidDefinition {
            id: id.to_string(),
            reason: e.message().to_string(),
        })
    }

    /// Whether the manifest exposes a registration entry point.
    pub fn is_passive(&self) -> bool {
        self.commands.is_none()
    }
}

/// Unit instance produced from a manifest.
#[derive(Debug)]
pub struct ManifestUnit {
    id: UnitId,
    manifest: UnitManifest,
}

impl ManifestUnit {
    pub fn new(id: UnitId, manifest: UnitManifest) -> Self {
        Self { id, manifest }
    }

    pub fn manifest(&self) -> &UnitManifest {
        &self.manifest
    }

    fn build_commands(
        &self,
        decls: &[CommandDecl],
        ctx: &Arc<Context>,
    ) -> Result<CommandMap, RegisterError> {
        let mut commands = CommandMap::new();

        for decl in decls {
            let name = normalize_command_name(&decl.name);
            if !is_valid_command_name(&name) {
                return Err(RegisterError::InvalidCommandName {
                    unit: self.id.to_string(),
                    name: decl.name.clone(),
                });
            }
            if commands.contains_key(&name) {
                return Err(RegisterError::DuplicateCommand {
                    unit: self.id.to_string(),
                    name,
                });
            }

            let ctx = Arc::clone(ctx);
            let unit = self.id.clone();
            let command_name = name.clone();
            let actions: Arc<[Action]> = decl.actions.clone().into();

            let mut command =
                Command::new(move || run_actions(&ctx, &unit, &command_name, &actions));
            if let Some(description) = &decl.description {
                command = command.with_description(description.clone());
            }

            commands.insert(name, command);
        }

        Ok(commands)
    }
}

impl CommandUnit for ManifestUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    fn register(&self, ctx: &Arc<Context>) -> Option<Result<CommandMap, RegisterError>> {
        let decls = self.manifest.commands.as_deref()?;
        Some(self.build_commands(decls, ctx))
    }
}

fn run_actions(
    ctx: &Context,
    unit: &UnitId,
    command: &str,
    actions: &[Action],
) -> anyhow::Result<()> {
    for action in actions {
        match action {
            Action::Say(message) => println!("{message}"),
            Action::Log(message) => crate::log_event!(unit, command, "{message}"),
            Action::SleepMs(millis) => std::thread::sleep(Duration::from_millis(*millis)),
            Action::Session(op) => {
                ctx.with_session(|session| match op {
                    SessionOp::Start => session.start(),
                    SessionOp::Stop => session.stop(),
                })
                .with_context(|| format!("session {op} failed"))?;
            }
            Action::Fail(message) => anyhow::bail!("{message}"),
            Action::Shutdown => {
                crate::shutdown::run(ctx);
            }
        }
    }

    Ok(())
}
