//! List command: load units once and print the command table.

use crate::config::Settings;
use crate::dispatch::CommandInfo;
use crate::host::Host;

use super::report_load_failures;

/// Run list command.
pub fn run(settings: &Settings, units: &[String], json: bool) {
    let (host, report) = match Host::build(settings, tokio::runtime::Handle::current(), units) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    let failed = report_load_failures(&report);

    let commands = host.coordinator().dispatcher().describe();
    if json {
        match serde_json::to_string_pretty(&commands) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print!("{}", format_table(&commands));
    }

    if failed {
        std::process::exit(1);
    }
}

/// One row per command: name, origin@version, description.
pub fn format_table(commands: &[CommandInfo]) -> String {
    if commands.is_empty() {
        return "No commands registered.\n".to_string();
    }

    let name_width = commands.iter().map(|c| c.name.len()).max().unwrap_or(0);
    let origin_width = commands
        .iter()
        .map(|c| c.origin.len() + c.version.to_string().len() + 2)
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for info in commands {
        let origin = format!("{} v{}", info.origin, info.version);
        let line = format!(
            "{:<name_width$}  {:<origin_width$}  {}",
            info.name,
            origin,
            info.description.as_deref().unwrap_or("")
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
