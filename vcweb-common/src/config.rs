//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `VCWEB_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable config file is never fatal: it is logged and the
//! compiled defaults apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::prefs::VenueName;
use crate::{Error, Result};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "VCWEB_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "vcweb.db";

/// Default HTTP port of the preferences service
pub const DEFAULT_PORT: u16 = 5780;

/// Venues offered when the config file does not list any
pub const DEFAULT_VENUES: &[&str] = &["home", "work", "school"];

/// Built-in defaults used when nothing else is configured
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        // ~/Library/Application Support/vcweb
        dirs::data_dir()
            .map(|d| d.join("vcweb"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vcweb"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\vcweb
        dirs::data_local_dir()
            .map(|d| d.join("vcweb"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vcweb"))
    } else {
        // ~/.local/share/vcweb
        dirs::data_local_dir()
            .map(|d| d.join("vcweb"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vcweb"))
    }
}

/// `[logging]` table of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    /// Venue names users may attach separate preferences to
    pub venues: Option<Vec<String>>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Configured venues, or the defaults when the list is absent
    ///
    /// Names that are not valid venue names are skipped with a warning.
    pub fn venue_names(&self) -> Vec<VenueName> {
        let names: Vec<&str> = match &self.venues {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => DEFAULT_VENUES.to_vec(),
        };
        names
            .into_iter()
            .filter_map(|name| match name.parse::<VenueName>() {
                Ok(venue) => Some(venue),
                Err(e) => {
                    warn!("Ignoring configured venue: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Location of the config file, if one exists
///
/// `~/.config/vcweb/config.toml` is preferred over `/etc/vcweb/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("vcweb").join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    let system_config = PathBuf::from("/etc/vcweb/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Resolves the root folder and loads the config file
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl RootFolderResolver {
    /// Resolver using the standard config file locations
    pub fn new() -> Self {
        Self {
            cli_arg: None,
            config_file: config_file_path(),
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Read this config file instead of the standard locations
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Parsed config file; defaults if there is none or it cannot be read
    pub fn load_config(&self) -> TomlConfig {
        let Some(path) = &self.config_file else {
            debug!("No config file found, using compiled defaults");
            return TomlConfig::default();
        };
        match TomlConfig::load(path) {
            Ok(config) => {
                debug!("Loaded config file {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                TomlConfig::default()
            }
        }
    }

    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(&self.load_config())
    }

    /// Resolve against an already loaded config
    pub fn resolve_with(&self, config: &TomlConfig) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &config.root_folder {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder (and parents); safe to call repeatedly
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
