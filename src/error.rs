use crate::game_logic::OwnerId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("wire codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("channel to {0} is closed")]
    ChannelClosed(String),

    #[error("actor directory is full, cannot register {0}")]
    DirectoryFull(OwnerId),
}

pub type Result<T> = std::result::Result<T, SyncError>;
