//! Error taxonomy for the compiler and lifecycle engine
//!
//! Every variant is fatal to the current invocation. The binary prints the
//! `Display` form as a single line and exits non-zero.

use crate::stack::state::RemoteStackState;
use std::path::PathBuf;

/// Result alias used throughout the core crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration layer could not be turned into a mapping
    #[error("Invalid configuration in {source_name}: {message}")]
    ConfigFormat {
        source_name: String,
        message: String,
    },

    /// A placeholder or iteration source referenced a key-path that is not bound
    #[error("Unresolved reference '{path}'")]
    UnresolvedReference { path: String },

    /// The template text itself is malformed
    #[error("Template error in {template} at line {line}: {message}")]
    TemplateSyntax {
        template: String,
        line: usize,
        message: String,
    },

    #[error("Stack '{stack}' already exists (remote state: {state})")]
    StackAlreadyExists {
        stack: String,
        state: RemoteStackState,
    },

    #[error("Stack '{stack}' does not exist (remote state: {state})")]
    StackNotFound {
        stack: String,
        state: RemoteStackState,
    },

    #[error("Stack '{stack}' has an operation in progress (remote state: {state}); retry later")]
    StackBusy {
        stack: String,
        state: RemoteStackState,
    },

    #[error("Stack '{stack}' is in a failed state (remote state: {state}): {reason}")]
    StackInFailedState {
        stack: String,
        state: RemoteStackState,
        reason: String,
    },

    /// A create/update was accepted remotely but finished unsuccessfully
    #[error("Stack '{stack}' operation ended with {status}: {reason}")]
    StackOperationFailed {
        stack: String,
        status: String,
        reason: String,
    },

    /// The poll budget ran out before the remote operation reached a terminal state
    #[error("Timed out waiting for stack '{stack}' (last status: {last})")]
    PollTimeout { stack: String, last: String },

    /// Transport or service-side failure, message passed through verbatim
    #[error("{message}")]
    RemoteGateway { message: String },

    #[error("Failed to package '{unit}': {message}")]
    Package { unit: String, message: String },

    #[error("Engine hook failed: {message}")]
    EngineHook { message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigFormat {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn unresolved(path: impl Into<String>) -> Self {
        Self::UnresolvedReference { path: path.into() }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::RemoteGateway {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn package(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Package {
            unit: unit.into(),
            message: message.into(),
        }
    }
}
