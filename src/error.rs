//! Error types for wgtunnel

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunnelError {
    /// Tunnel name rejected by the name validator
    #[error("Invalid tunnel name: {0}")]
    InvalidName(String),
    /// Name already taken by another tunnel
    #[error("Tunnel {0} already exists")]
    AlreadyExists(String),
    /// No tunnel or stored configuration with this name
    #[error("Not found: {0}")]
    NotFound(String),
    /// Malformed configuration text
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    /// Attribute value rejected by validation
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    /// Persistence failure reported by a config store
    #[error("Storage error: {0}")]
    Storage(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Backend refused or failed a state change / config application
    #[error("Backend error: {0}")]
    Backend(String),
    /// Command execution failed
    #[error("Command '{cmd}' failed{}: {stderr}", .code.map(|c| format!(" with code {}", c)).unwrap_or_default())]
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },
    /// Application configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// The tunnel handle outlived the manager that owns it
    #[error("Tunnel manager has shut down")]
    Shutdown,
}

impl TunnelError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        TunnelError::Parse { line, message: message.into() }
    }

    /// Failure of the config store (including raw I/O)
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, TunnelError::Storage(_) | TunnelError::Io(_))
    }

    /// Failure reported by the tunnel backend
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, TunnelError::Backend(_) | TunnelError::CommandFailed { .. })
    }
}

impl From<toml::de::Error> for TunnelError {
    fn from(error: toml::de::Error) -> Self {
        TunnelError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for TunnelError {
    fn from(error: toml::ser::Error) -> Self {
        TunnelError::Config(error.to_string())
    }
}

pub type TunnelResult<T> = Result<T, TunnelError>;
