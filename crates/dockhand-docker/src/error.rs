use dockhand_core::runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse docker output: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("docker process error: {0}")]
    Process(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine API returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl DockerError {
    /// Failure while listing: the runtime as a whole is unreachable.
    pub fn unavailable(self) -> RuntimeError {
        RuntimeError::Unavailable(self.to_string())
    }

    /// Failure of one lifecycle call.
    pub fn rejected(self, op: &'static str, id: &str) -> RuntimeError {
        let reason = match self {
            DockerError::Status { message, .. } => message,
            DockerError::Process(message) => message,
            other => other.to_string(),
        };
        RuntimeError::rejected(op, id, reason)
    }
}

pub type Result<T> = std::result::Result<T, DockerError>;
