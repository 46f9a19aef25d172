pub mod settings;

use settings::Settings;
use thiserror::Error;

use crate::util::directories::DirectoryError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    DirectoryError(#[from] DirectoryError),
    #[error("{} is not a valid setting", .0)]
    InvalidSetting(String),
}

/// Everything the client persists between runs.
///
/// Conversations themselves are never persisted; only user preferences are.
#[derive(Debug, Clone)]
pub struct Database {
    pub settings: Settings,
}

impl Database {
    pub async fn new() -> Result<Self, DatabaseError> {
        Ok(Self {
            settings: Settings::new().await?,
        })
    }
}
