//! On-disk persistence for [`ServerConfig`].
//!
//! The configuration is stored as a single binary snapshot (the format
//! written by [`ServerConfig::serialize`]) in the platform-appropriate
//! directory:
//!
//! - Windows:  `%APPDATA%\RfbServer\server.cfg`
//! - Linux:    `$XDG_CONFIG_HOME/rfbserver/server.cfg` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/RfbServer/server.cfg`
//!
//! A missing file is not an error: the server starts from defaults on first
//! run.  Saving goes through a temporary file followed by a rename, so a
//! crash mid-write never leaves a half-written snapshot behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rfb_core::config::{ConfigIoError, ServerConfig};
use thiserror::Error;
use tracing::{debug, info};

/// File name of the stored snapshot.
pub const CONFIG_FILE_NAME: &str = "server.cfg";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a valid snapshot.
    #[error("invalid configuration snapshot at {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: ConfigIoError,
    },
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`StoreError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, StoreError> {
    platform_config_dir().ok_or(StoreError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, StoreError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RfbServer"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("rfbserver"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RfbServer")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Loads a fresh [`ServerConfig`] from `path`, or defaults if it is absent.
///
/// # Errors
///
/// [`StoreError::Io`] for file-system errors other than "not found",
/// [`StoreError::Codec`] if the snapshot is malformed.
pub fn load_config_from(path: &Path) -> Result<ServerConfig, StoreError> {
    let config = ServerConfig::new();
    if load_into(&config, path)? {
        info!("loaded configuration from {}", path.display());
    } else {
        info!("no configuration at {}; using defaults", path.display());
    }
    Ok(config)
}

/// Replaces the contents of `config` with the snapshot stored at `path`.
///
/// Returns `Ok(false)` without touching `config` when the file does not
/// exist.  On any error `config` keeps its previous state.
pub fn load_into(config: &ServerConfig, path: &Path) -> Result<bool, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    config
        .deserialize(&mut BufReader::new(file))
        .map_err(|source| StoreError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(true)
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config_to(config: &ServerConfig, path: &Path) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
    }

    let tmp = path.with_extension("cfg.tmp");
    {
        let file = File::create(&tmp).map_err(io_err(&tmp))?;
        let mut writer = BufWriter::new(file);
        config.serialize(&mut writer).map_err(|source| match source {
            ConfigIoError::Io(source) => StoreError::Io {
                path: tmp.clone(),
                source,
            },
            other => StoreError::Codec {
                path: tmp.clone(),
                source: other,
            },
        })?;
        writer.flush().map_err(io_err(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_err(path))?;

    debug!("saved configuration to {}", path.display());
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
