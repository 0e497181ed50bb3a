//! File watcher that reloads units when their definitions change.
//!
//! # Architecture
//!
//! ```text
//! ChangeWatcher (own thread)
//!   - Single notify::RecommendedWatcher
//!   - WatchPaths (parent dirs of definitions + loader roots)
//!   - Debouncer keyed by unit id
//!         |
//!         v
//! ReloadCoordinator::on_unit_changed(id)
//! ```
//!
//! The thread is controlled through a [`WatcherHandle`], which the shared
//! context exposes to command units.

mod change;
mod debouncer;
mod error;
mod handle;
mod paths;

pub use change::{ChangeWatcher, ChangeWatcherBuilder};
pub use debouncer::Debouncer;
pub use error::WatchError;
pub use handle::WatcherHandle;
pub use paths::{WatchPaths, resolve_unit};
