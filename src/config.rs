//! Layered configuration for the host.
//!
//! Sources, later ones winning:
//! - Built-in defaults
//! - `.hotcmd/settings.toml` (found by walking up from the current directory)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `HOTCMD_` and use double
//! underscores to separate nested levels:
//! - `HOTCMD_WATCH__DEBOUNCE_MS=0` sets `watch.debounce_ms`
//! - `HOTCMD_CONSOLE__PROMPT="> "` sets `console.prompt`
//! - `HOTCMD_SHUTDOWN__EXIT_PROCESS=false` sets `shutdown.exit_process`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::{Uncased, UncasedStr},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::ShutdownPolicy;

/// Directory holding the settings file, relative to the workspace root.
pub const CONFIG_DIR: &str = ".hotcmd";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

const ENV_PREFIX: &str = "HOTCMD_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .hotcmd is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub units: UnitsConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UnitsConfig {
    /// Directory holding unit definitions, relative to the workspace root
    #[serde(default = "default_units_dir")]
    pub dir: PathBuf,

    /// Units loaded at startup
    #[serde(default = "default_enabled_units")]
    pub enabled: Vec<String>,

    /// Extension of definition files
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Reload units when their definitions change
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period before a changed unit is reloaded (0 disables)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Name reported by the session in logs
    #[serde(default = "default_session_name")]
    pub name: String,

    /// Start the session before the console opens
    #[serde(default = "default_true")]
    pub autostart: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ShutdownConfig {
    /// End the process once `quit` has torn everything down
    #[serde(default = "default_true")]
    pub exit_process: bool,

    /// How long shutdown waits for in-flight session actions
    #[serde(default = "default_session_lock_timeout_ms")]
    pub session_lock_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `"hotcmd::watcher" = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_units_dir() -> PathBuf {
    PathBuf::from("units")
}
fn default_enabled_units() -> Vec<String> {
    vec![
        "greet".to_string(),
        crate::shutdown::SHUTDOWN_UNIT.to_string(),
    ]
}
fn default_extension() -> String {
    "toml".to_string()
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_prompt() -> String {
    "hotcmd> ".to_string()
}
fn default_session_name() -> String {
    "main".to_string()
}
fn default_session_lock_timeout_ms() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            units: UnitsConfig::default(),
            watch: WatchConfig::default(),
            console: ConsoleConfig::default(),
            session: SessionConfig::default(),
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            dir: default_units_dir(),
            enabled: default_enabled_units(),
            extension: default_extension(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            autostart: true,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            exit_process: true,
            session_lock_timeout_ms: default_session_lock_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl ShutdownConfig {
    pub fn policy(&self) -> ShutdownPolicy {
        ShutdownPolicy {
            exit_process: self.exit_process,
            session_lock_timeout: Duration::from_millis(self.session_lock_timeout_ms),
        }
    }
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(nested_key)
}

// Double underscore becomes a dot; single underscores stay inside field names
fn nested_key(key: &UncasedStr) -> Uncased<'_> {
    key.as_str().to_lowercase().replace("__", ".").into()
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file. Environment overrides still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.as_ref();
        Self::figment(path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = workspace_of(path);
                }
                settings
            })
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(env_provider())
    }

    /// Find the settings file by looking for a .hotcmd directory from the
    /// current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .hotcmd is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        find_workspace_root(&current)
    }

    /// Directory holding unit definitions, resolved against the workspace root.
    pub fn units_dir(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.units.dir.is_relative() => root.join(&self.units.dir),
            _ => self.units.dir.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file and sample units in the current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let root = std::env::current_dir()?;
        Self::init_in(&root, force)
    }

    /// Create a default settings file and sample units under `root`.
    pub fn init_in(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);
        let existed = config_path.exists();

        if !force && existed {
            return Err(
                "Configuration file already exists. Use --force to overwrite".into(),
            );
        }

        let settings = Settings {
            workspace_root: Some(root.to_path_buf()),
            ..Settings::default()
        };

        settings.save(&config_path)?;
        if existed {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        settings.write_sample_units(force)?;

        Ok(config_path)
    }

    /// Write the sample `greet` unit unless one already exists.
    fn write_sample_units(&self, force: bool) -> Result<(), Box<dyn std::error::Error>> {
        let dir = self.units_dir();
        std::fs::create_dir_all(&dir)?;

        let greet = dir.join(format!("greet.{}", self.units.extension));
        if !force && greet.exists() {
            println!("Found existing unit: {}", greet.display());
            return Ok(());
        }

        std::fs::write(&greet, SAMPLE_GREET_UNIT)?;
        println!("Created sample unit: {}", greet.display());
        Ok(())
    }
}

/// Walk up from `start` looking for a directory containing `.hotcmd`.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Workspace root for a settings file at `<root>/.hotcmd/settings.toml`.
fn workspace_of(config_path: &Path) -> Option<PathBuf> {
    let dir = config_path.parent()?;
    if dir.file_name()? == CONFIG_DIR {
        dir.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

const SAMPLE_GREET_UNIT: &str = r#"# Edit while hotcmd runs; commands update on save.
description = "Greetings"

[[commands]]
name = "hi"
description = "Say hello"
actions = [{ say = "hello" }]

[[commands]]
name = "open"
description = "Start the session"
actions = [{ session = "start" }, { log = "session opened" }]
"#;
