//! Command units: the loadable pieces that contribute commands to the host.
//!
//! A unit is identified by a dotted [`UnitId`] and produced by a
//! [`UnitLoader`]. Every load or reload executes the unit's definition again
//! and yields a fresh, immutable instance; the [`UnitRegistry`] swaps instances
//! in whole and never mutates one in place.
//!
//! # Architecture
//!
//! ```text
//! UnitLoader (manifest files, builtins)
//!     |
//!     v
//! UnitRegistry  id -> LoadedUnit { version, instance }
//!     |
//!     v  snapshot()
//! build_table(snapshot, context) -> CommandTable
//! ```

mod error;
pub mod loader;
pub mod manifest;
mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::Context;

pub use error::{RegisterError, UnitError};
pub use loader::{BuiltinFactory, ManifestLoader, UnitLoader};
pub use manifest::{Action, ManifestUnit, SessionOp, UnitManifest};
pub use registry::{LoadReport, LoadedUnit, ReloadOutcome, UnitRegistry, UnitSnapshot};

/// Identifier of a loadable unit, e.g. `greet` or `commands.close_session`.
///
/// Segments are separated by `.` and contain only ASCII alphanumerics,
/// `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(String);

impl UnitId {
    /// Parse and validate an identifier.
    pub fn parse(raw: &str) -> Result<Self, UnitError> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(UnitError::InvalidId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the identifier. File stems are matched against it.
    pub fn stem(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Whether this identifier ends with `stem` on a segment boundary.
    pub fn ends_with_stem(&self, stem: &str) -> bool {
        self.stem() == stem
    }

    /// Relative path of the unit's definition: `a.b.c` -> `a/b/c.<ext>`.
    pub fn relative_path(&self, extension: &str) -> PathBuf {
        let mut path: PathBuf = self.0.split('.').collect();
        path.set_extension(extension);
        path
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UnitId {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Zero-argument operation bound to a command name at registration time.
pub type Handler = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A command contributed by a unit.
#[derive(Clone)]
pub struct Command {
    handler: Handler,
    description: Option<String>,
}

impl Command {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Run the handler on the current thread.
    pub fn call(&self) -> anyhow::Result<()> {
        (self.handler)()
    }

    pub fn handler(&self) -> Handler {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Commands returned by one registration call, keyed by name.
pub type CommandMap = BTreeMap<String, Command>;

/// A loaded command unit.
///
/// The registration entry point is optional: the default `register` returns
/// `None`, which marks a passive unit that contributes no commands.
pub trait CommandUnit: Send + Sync {
    /// Identifier this instance was loaded for.
    fn id(&self) -> &UnitId;

    /// Contribute commands bound to `ctx`.
    fn register(&self, ctx: &Arc<Context>) -> Option<Result<CommandMap, RegisterError>> {
        let _ = ctx;
        None
    }
}
