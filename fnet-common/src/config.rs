//! Configuration loading and root folder resolution
//!
//! Resolution priority for the root folder:
//! 1. Command-line argument (highest priority)
//! 2. `FNET_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable config file is never fatal; it is logged and the
//! next priority level is used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "FNET_ROOT_FOLDER";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "fnet.db";

/// Contents of `config.toml`
///
/// All fields are optional so that partial files remain valid.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub log_level: Option<String>,
    pub database_file: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Read and parse a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub database_file: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }
}

/// Resolves the root folder following the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_path: None,
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use an explicit config file instead of the platform search path
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Resolve the root folder; never fails
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                debug!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(config) = self.load_toml() {
            if let Some(root) = config.root_folder {
                debug!(module = %self.module_name, "Root folder from config file");
                return root;
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }

    /// Load the TOML config, logging (not failing) on problems
    pub fn load_toml(&self) -> Option<TomlConfig> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => find_config_file()?,
        };

        match TomlConfig::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Creates the root folder and derives file locations inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
    database_file: String,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self {
            root_folder,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }

    /// Override the database file name (relative to the root folder)
    pub fn with_database_file(mut self, file: Option<String>) -> Self {
        if let Some(file) = file {
            self.database_file = file;
        }
        self
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(&self.database_file)
    }
}

/// Locate the platform config file, if one exists
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("fnet").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/fnet/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("fnet"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/fnet"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("fnet"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/fnet"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("fnet"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\fnet"))
    } else {
        PathBuf::from("./fnet_data")
    }
}
