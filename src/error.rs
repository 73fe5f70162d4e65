//! Centralized error types for mailtide.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::message::{FailureStage, MessageId};

/// All errors produced by the mailtide library.
#[derive(Error, Debug)]
pub enum MailError {
    /// The server rejected the account credentials.
    #[error("Authentication rejected by {server}: {reason}")]
    Authentication { server: String, reason: String },

    /// The server could not be reached, or the connection dropped.
    #[error("Connection to {server} failed: {reason}")]
    Connection { server: String, reason: String },

    /// The folder could not be selected.
    #[error("Cannot select folder '{folder}': {reason}")]
    Select { folder: String, reason: String },

    /// The server rejected the search criterion.
    #[error("Search failed: {0}")]
    Search(String),

    /// The server rejected the fetch of a single message.
    #[error("Fetch of message {id} failed: {reason}")]
    Fetch { id: MessageId, reason: String },

    /// Updating the `\Seen` flag failed.
    #[error("Could not mark message {id} as read: {reason}")]
    MarkSeen { id: MessageId, reason: String },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The outgoing message could not be built.
    #[error("Cannot compose message: {0}")]
    Compose(String),

    /// SMTP submission failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

/// Pipeline stage an error belongs to, used for user-facing abort messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Login,
    Connect,
    Select,
    Search,
    Fetch,
    MarkSeen,
    SaveAttachment,
    Compose,
    Send,
    Config,
}

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Authentication { .. } => Stage::Login,
            Self::Connection { .. } => Stage::Connect,
            Self::Select { .. } => Stage::Select,
            Self::Search(_) => Stage::Search,
            Self::Fetch { .. } => Stage::Fetch,
            Self::MarkSeen { .. } => Stage::MarkSeen,
            Self::Io { .. } => Stage::SaveAttachment,
            Self::Compose(_) => Stage::Compose,
            Self::Send(_) => Stage::Send,
            Self::Config(_) => Stage::Config,
        }
    }

    /// Whether this error aborts a retrieval call.
    ///
    /// Fetch, mark-seen and attachment I/O failures only affect a single message.
    pub fn aborts_retrieval(&self) -> bool {
        !matches!(
            self,
            Self::Fetch { .. } | Self::MarkSeen { .. } | Self::Io { .. }
        )
    }
}

impl From<FailureStage> for Stage {
    fn from(stage: FailureStage) -> Self {
        match stage {
            FailureStage::Fetch => Stage::Fetch,
            FailureStage::SaveAttachment => Stage::SaveAttachment,
        }
    }
}
