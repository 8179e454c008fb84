use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("settings file not found: {0} (run 'dockhand init')")]
    SettingsNotFound(PathBuf),

    #[error("invalid action '{0}': expected start, stop or restart")]
    InvalidAction(String),

    #[error("cannot parse {file}: {reason}")]
    ProcParse { file: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
