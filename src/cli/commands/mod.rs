//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod init;
pub mod list;
pub mod run;

use crate::units::LoadReport;

/// Print units that failed to load. Returns true when any did.
pub(crate) fn report_load_failures(report: &LoadReport) -> bool {
    for (id, error) in &report.failed {
        eprintln!("Failed to load unit '{id}': {error}");
    }
    !report.is_complete()
}
