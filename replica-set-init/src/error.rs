//! Errors surfaced by replica-set administrative commands.

use thiserror::Error;

/// Failure of an administrative call against a replica set.
///
/// The variants mirror what the database reports back; the initializer never
/// swallows or converts any of them.
#[derive(Debug, Error)]
pub enum AdminError {
    /// `initiate` was sent to a cluster that already has a configuration.
    #[error("replica set is already initialized")]
    AlreadyInitialized,

    /// `reconfigure` was sent to a node that is not the current primary.
    #[error("connected node is not the primary; rerun against the current primary")]
    NotPrimary,

    /// The cluster has no configuration yet.
    #[error("replica set has not been initialized")]
    NotInitialized,

    /// A node could not be reached.
    #[error("host {host} is unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    /// The configuration was rejected, locally or by the database.
    #[error("invalid replica set configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The database answered with a command error we do not classify.
    #[error("command failed with code {code} ({name}): {message}")]
    Command {
        code: i32,
        name: String,
        message: String,
    },

    /// Any other driver failure.
    #[error("database driver error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// A configuration document could not be converted to or from BSON.
    #[error("failed to convert configuration document: {0}")]
    Serialization(String),
}

impl AdminError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        AdminError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn unreachable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        AdminError::Unreachable {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn is_already_initialized(&self) -> bool {
        matches!(self, AdminError::AlreadyInitialized)
    }

    pub fn is_not_primary(&self) -> bool {
        matches!(self, AdminError::NotPrimary)
    }
}
