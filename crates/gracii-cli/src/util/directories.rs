use std::path::PathBuf;

use thiserror::Error;

use crate::util::CHAT_BINARY_NAME;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("home directory not found")]
    NoHomeDirectory,
    #[error("runtime directory not found: neither XDG_RUNTIME_DIR nor TMPDIR were found")]
    NoRuntimeDirectory,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

type Result<T, E = DirectoryError> = std::result::Result<T, E>;

/// The gracii data directory
///
/// - Linux: `$XDG_DATA_HOME/gracii` or `$HOME/.local/share/gracii`
/// - MacOS: `$HOME/Library/Application Support/gracii`
pub fn data_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or(DirectoryError::NoHomeDirectory)?
        .join(CHAT_BINARY_NAME))
}

/// Runtime dir is used for runtime data that should not be persisted for a long time, e.g. logs
/// and attachment previews.
///
/// Falls back to TMPDIR and then the system temp dir when XDG_RUNTIME_DIR is not set.
#[cfg(unix)]
pub fn runtime_dir() -> Result<PathBuf> {
    let mut dir = dirs::runtime_dir();
    dir = dir.or_else(|| std::env::var_os("TMPDIR").map(PathBuf::from));
    dir = dir.or_else(|| Some(std::env::temp_dir()));
    dir.ok_or(DirectoryError::NoRuntimeDirectory)
}

#[cfg(windows)]
pub fn runtime_dir() -> Result<PathBuf> {
    Ok(std::env::temp_dir().join(CHAT_BINARY_NAME))
}

/// The directory holding the chat logs
/// - Linux: `$XDG_RUNTIME_DIR/gracii/logs`
/// - MacOS: `$TMPDIR/gracii/logs`
/// - Windows: `%TEMP%\gracii\logs`
pub fn logs_dir() -> Result<PathBuf> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            Ok(runtime_dir()?.join(CHAT_BINARY_NAME).join("logs"))
        } else if #[cfg(windows)] {
            Ok(runtime_dir()?.join("logs"))
        }
    }
}

/// Where image previews for attachments are materialized.
pub fn previews_dir() -> Result<PathBuf> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            Ok(runtime_dir()?.join(CHAT_BINARY_NAME).join("previews"))
        } else if #[cfg(windows)] {
            Ok(runtime_dir()?.join("previews"))
        }
    }
}

/// The path to the settings file
pub fn settings_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("settings.json"))
}

/// The path to the REPL history file
pub fn chat_history_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("chat_history"))
}
