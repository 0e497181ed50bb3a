//! Live command-unit host.
//!
//! Command units are loaded from definition files, reloaded when those files
//! change, and contribute named commands to a table the console dispatches
//! into. A failed reload leaves the last working commands in place.

pub mod cli;
pub mod config;
pub mod console;
pub mod context;
pub mod dispatch;
pub mod host;
pub mod logging;
pub mod reload;
pub mod session;
pub mod shutdown;
pub mod units;
pub mod watcher;

pub use config::Settings;
pub use context::{Context, RunningFlag, ShutdownPolicy, WatcherControl};
pub use dispatch::{Dispatch, Dispatcher, HandlerOutcome};
pub use host::Host;
pub use reload::{ReloadCoordinator, ReloadCycle};
pub use session::{DetachedSession, Session, SessionError};
pub use units::{CommandUnit, ManifestLoader, UnitId, UnitLoader, UnitRegistry};
pub use watcher::{ChangeWatcher, WatchError, WatcherHandle};
