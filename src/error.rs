use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circular dependency detected at subtask: {subtask_id}")]
    Cycle { subtask_id: String },

    #[error("Internal consistency error: {0}")]
    Internal(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Tracker not found: {0}")]
    TrackerNotFound(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, Error>;
