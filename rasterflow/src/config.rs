//! Writer configuration and the INI configuration file.
//!
//! [`WriterConfig`] is what the pipeline consumes. [`ConfigFile`] is the
//! on-disk form, stored at `<config dir>/rasterflow/config.ini`:
//!
//! ```ini
//! [render]
//! threads = 8
//! max_in_flight = 16
//! block_size = 256x256
//! sequential = false
//! ```
//!
//! Every key is optional. Missing keys fall back to [`WriterConfig`]
//! defaults; command-line flags override file values.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::geometry::Extent;

/// Section holding all render settings.
const RENDER_SECTION: &str = "render";

/// Block size used when neither the resource nor the config picks one.
pub const DEFAULT_BLOCK_SIZE: u32 = 256;

/// Errors loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The file could not be written.
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key holds a value of the wrong form.
    #[error("Invalid value for '{key}': '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    /// The platform has no per-user configuration directory.
    #[error("Could not determine the user configuration directory")]
    NoConfigDir,
}

/// Number of threads the platform suggests, or 1 if unknown.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Parses `"256"` (square) or `"256x128"` (width × height).
pub fn parse_block_size(value: &str) -> Option<Extent> {
    let value = value.trim();
    let (width, height) = match value.split_once(['x', 'X', '×']) {
        Some((width, height)) => (width.trim().parse().ok()?, height.trim().parse().ok()?),
        None => {
            let side = value.parse().ok()?;
            (side, side)
        }
    };
    let extent = Extent::new(width, height);
    (!extent.is_empty()).then_some(extent)
}

/// Settings for one [`ThreadedBlockWriter`](crate::writer::ThreadedBlockWriter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    threads: usize,
    max_in_flight: Option<usize>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            max_in_flight: None,
        }
    }
}

impl WriterConfig {
    /// Platform defaults: one rasterize worker per core.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of rasterize workers. Zero is treated as one.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the admission gate's soft maximum of blocks in flight.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = Some(max_in_flight.max(1));
        self
    }

    /// Number of rasterize workers.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Soft maximum of rasterized-but-unwritten blocks. Defaults to the
    /// thread count.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.unwrap_or(self.threads)
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub threads: Option<usize>,
    pub max_in_flight: Option<usize>,
    pub block_size: Option<Extent>,
    pub sequential: Option<bool>,
}

impl ConfigFile {
    /// Default location: `<config dir>/rasterflow/config.ini`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("rasterflow").join("config.ini"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Loads `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or a value is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini(&ini)?;
        tracing::debug!(path = %path.display(), ?config, "Loaded config file");
        Ok(config)
    }

    /// Loads `path`, or returns defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            Ok(Self::default())
        }
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let Some(section) = ini.section(Some(RENDER_SECTION)) else {
            return Ok(Self::default());
        };

        let count = |key: &'static str| -> Result<Option<usize>, ConfigError> {
            section
                .get(key)
                .map(|value| match value.trim().parse::<usize>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::InvalidValue {
                        key,
                        value: value.to_string(),
                        reason: "expected a positive integer",
                    }),
                })
                .transpose()
        };

        let block_size = section
            .get("block_size")
            .map(|value| {
                parse_block_size(value).ok_or_else(|| ConfigError::InvalidValue {
                    key: "block_size",
                    value: value.to_string(),
                    reason: "expected N or WxH with non-zero sides",
                })
            })
            .transpose()?;

        let sequential = section
            .get("sequential")
            .map(|value| match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: "sequential",
                    value: value.to_string(),
                    reason: "expected true or false",
                }),
            })
            .transpose()?;

        Ok(Self {
            threads: count("threads")?,
            max_in_flight: count("max_in_flight")?,
            block_size,
            sequential,
        })
    }

    /// Writes the file, creating parent directories. Unset keys are omitted.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut ini = Ini::new();
        {
            let mut section = ini.with_section(Some(RENDER_SECTION));
            if let Some(threads) = self.threads {
                section.set("threads", threads.to_string());
            }
            if let Some(max_in_flight) = self.max_in_flight {
                section.set("max_in_flight", max_in_flight.to_string());
            }
            if let Some(block_size) = self.block_size {
                section.set(
                    "block_size",
                    format!("{}x{}", block_size.width, block_size.height),
                );
            }
            if let Some(sequential) = self.sequential {
                section.set("sequential", sequential.to_string());
            }
        }
        ini.write_to_file(path).map_err(write_error)?;
        tracing::debug!(path = %path.display(), "Saved config file");
        Ok(())
    }

    /// Writer settings from this file, with defaults for unset keys.
    pub fn to_writer_config(&self) -> WriterConfig {
        let mut config = WriterConfig::new();
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config = config.with_max_in_flight(max_in_flight);
        }
        config
    }

    /// Configured block size, or the default square block.
    pub fn block_size_or_default(&self) -> Extent {
        self.block_size
            .unwrap_or_else(|| Extent::square(DEFAULT_BLOCK_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.ini");
        std::fs::write(&path, contents).unwrap();
        path
    }

    // =========================================================================
    // WriterConfig
    // =========================================================================

    #[test]
    fn test_writer_config_defaults() {
        let config = WriterConfig::new();
        assert!(config.threads() >= 1);
        assert_eq!(config.max_in_flight(), config.threads());
    }

    #[test]
    fn test_writer_config_overrides() {
        let config = WriterConfig::new().with_threads(3).with_max_in_flight(7);
        assert_eq!(config.threads(), 3);
        assert_eq!(config.max_in_flight(), 7);
    }

    #[test]
    fn test_writer_config_clamps_zero() {
        let config = WriterConfig::new().with_threads(0).with_max_in_flight(0);
        assert_eq!(config.threads(), 1);
        assert_eq!(config.max_in_flight(), 1);
    }

    #[test]
    fn test_parse_block_size() {
        assert_eq!(parse_block_size("256"), Some(Extent::square(256)));
        assert_eq!(parse_block_size("64x32"), Some(Extent::new(64, 32)));
        assert_eq!(parse_block_size(" 8 X 4 "), Some(Extent::new(8, 4)));
        assert_eq!(parse_block_size("0"), None);
        assert_eq!(parse_block_size("16x0"), None);
        assert_eq!(parse_block_size("big"), None);
    }

    // =========================================================================
    // ConfigFile
    // =========================================================================

    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "[render]\nthreads = 6\nmax_in_flight = 12\nblock_size = 128x64\nsequential = yes\n",
        );

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.threads, Some(6));
        assert_eq!(config.max_in_flight, Some(12));
        assert_eq!(config.block_size, Some(Extent::new(128, 64)));
        assert_eq!(config.sequential, Some(true));

        let writer = config.to_writer_config();
        assert_eq!(writer.threads(), 6);
        assert_eq!(writer.max_in_flight(), 12);
    }

    #[test]
    fn test_missing_section_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "[other]\nkey = value\n");
        assert_eq!(ConfigFile::load(&path).unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_or_default(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.block_size_or_default(), Extent::square(DEFAULT_BLOCK_SIZE));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        for (contents, bad_key) in [
            ("[render]\nthreads = 0\n", "threads"),
            ("[render]\nmax_in_flight = lots\n", "max_in_flight"),
            ("[render]\nblock_size = 0x8\n", "block_size"),
            ("[render]\nsequential = maybe\n", "sequential"),
        ] {
            let path = write_file(&dir, contents);
            match ConfigFile::load(&path) {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, bad_key),
                other => panic!("expected InvalidValue for {}, got {:?}", bad_key, other),
            }
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");
        let config = ConfigFile {
            threads: Some(4),
            max_in_flight: None,
            block_size: Some(Extent::new(32, 16)),
            sequential: Some(false),
        };

        config.save(&path).unwrap();
        assert_eq!(ConfigFile::load(&path).unwrap(), config);
    }
}
