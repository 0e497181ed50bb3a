//! Command table construction and dispatch.
//!
//! The [`Dispatcher`] owns the published [`CommandTable`] behind a single
//! lock. Tables are always built whole by [`build_table`] and swapped in by
//! [`Dispatcher::publish`]; lookups clone the matching entry and release the
//! lock before the handler runs.

mod dispatcher;
mod table;

pub use dispatcher::{Dispatch, Dispatcher, HandlerOutcome};
pub use table::{CommandEntry, CommandInfo, CommandTable, build_table};

pub(crate) use table::panic_message;

/// Normalize user input or a declared name: trimmed and lowercased.
pub fn normalize_command_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Command names are single non-empty tokens.
pub fn is_valid_command_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}
