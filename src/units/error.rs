//! Error types for unit loading and registration.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or reloading a unit definition.
#[derive(Error, Debug)]
pub enum UnitError {
    #[error("Invalid unit identifier '{0}'")]
    InvalidId(String),

    #[error("No definition for unit '{id}' at {}", path.display())]
    NotFound { id: String, path: PathBuf },

    #[error("Cannot read definition of unit '{id}': {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid definition for unit '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    #[error("Unit '{id}' has the same stem '{stem}' as loaded unit '{existing}'")]
    DuplicateStem {
        id: String,
        stem: String,
        existing: String,
    },
}

/// Errors raised by a unit's registration entry point.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Unit '{unit}' declares an invalid command name '{name}'")]
    InvalidCommandName { unit: String, name: String },

    #[error("Unit '{unit}' declares command '{name}' more than once")]
    DuplicateCommand { unit: String, name: String },

    #[error("Registration of unit '{unit}' failed: {reason}")]
    Failed { unit: String, reason: String },

    #[error("Registration of unit '{unit}' panicked: {reason}")]
    Panicked { unit: String, reason: String },
}

pub type UnitResult<T> = Result<T, UnitError>;
