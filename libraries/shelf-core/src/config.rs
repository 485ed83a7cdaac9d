/// Shelf configuration
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default external tool program
pub const DEFAULT_TOOL: &str = "beet";

/// Default timeout for one external tool run (3 hours)
///
/// Batches against network-mounted libraries routinely take over an hour.
pub const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 3 * 60 * 60;

const LOCK_FILE: &str = "lock";
const DATABASE_FILE: &str = "db.sqlite";
const SCRATCH_DIR: &str = "tmp";

/// Configuration passed to every Shelf component
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShelfConfig {
    /// Holds the lock file, the database and the scratch log
    pub data_dir: PathBuf,

    /// Directory whose direct subdirectories are albums
    pub albums_dir: PathBuf,

    /// External tagging tool, resolved through `PATH` when not absolute
    #[serde(default = "default_tool")]
    pub tool: String,

    /// Upper bound for one external tool run
    #[serde(default = "default_import_timeout_secs")]
    pub import_timeout_secs: u64,
}

impl ShelfConfig {
    /// Build a configuration for explicit directories with default tool settings
    pub fn new(data_dir: impl Into<PathBuf>, albums_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            albums_dir: albums_dir.into(),
            tool: default_tool(),
            import_timeout_secs: default_import_timeout_secs(),
        }
    }

    /// Platform defaults: `<data_local_dir>/shelf` and `~/Music`
    pub fn defaults() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("shelf"))
            .ok_or_else(|| CoreError::config("Could not determine data directory"))?;
        let albums_dir = dirs::home_dir()
            .map(|d| d.join("Music"))
            .ok_or_else(|| CoreError::config("Could not determine home directory"))?;

        Ok(Self::new(data_dir, albums_dir))
    }

    /// Default configuration file location (`<config_dir>/shelf/config.toml`)
    pub fn default_config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("shelf").join("config.toml"))
    }

    /// Load configuration
    ///
    /// Sources, lowest priority first: platform defaults, the TOML file
    /// (`config_file` if given and then required, otherwise the default
    /// location if it exists), `SHELF_*` environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let defaults = Self::defaults()?;

        let mut settings = config::Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().into_owned())?
            .set_default("albums_dir", defaults.albums_dir.to_string_lossy().into_owned())?
            .set_default("tool", defaults.tool.as_str())?
            .set_default(
                "import_timeout_secs",
                i64::try_from(defaults.import_timeout_secs).unwrap_or(i64::MAX),
            )?;

        match config_file {
            Some(path) => {
                settings = settings.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = Self::default_config_file() {
                    settings = settings.add_source(config::File::from(path).required(false));
                }
            }
        }

        settings = settings.add_source(config::Environment::with_prefix("SHELF").try_parsing(true));

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::config("data_dir must not be empty"));
        }
        if self.albums_dir.as_os_str().is_empty() {
            return Err(CoreError::config("albums_dir must not be empty"));
        }
        if self.tool.trim().is_empty() {
            return Err(CoreError::config("tool must not be empty"));
        }
        if self.import_timeout_secs == 0 {
            return Err(CoreError::config("import_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Path of the single-writer lock file
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    /// Path of the status database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Directory for the external tool's per-run log
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join(SCRATCH_DIR)
    }

    /// Timeout for one external tool run
    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }
}

fn default_tool() -> String {
    DEFAULT_TOOL.to_string()
}

fn default_import_timeout_secs() -> u64 {
    DEFAULT_IMPORT_TIMEOUT_SECS
}
