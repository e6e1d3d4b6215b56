//! Error type shared by the registry, store, movement processor and session.

use shared::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    #[error("connection {0} already declared its role")]
    AlreadyAssigned(ConnectionId),

    #[error("connection {0} is not registered")]
    NotFound(ConnectionId),

    #[error("connection {0} is not a player")]
    NotAPlayer(ConnectionId),

    #[error("invalid direction {0:?}")]
    InvalidDirection(String),

    #[error("server full ({max} connections)")]
    ServerFull { max: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
