//! Error types for taskflow operations.
//!
//! Every failure a caller can observe maps onto one [`FailureKind`], so a UI
//! can tell validation problems from connectivity problems from authorization
//! problems through [`Error::kind`] and [`Error::user_message`] without
//! matching on variants.

use crate::domain::{IssueId, ProjectId};
use crate::id_generation::IdGenerationError;
use serde::Serialize;
use std::io;
use thiserror::Error;

/// Input that failed entity validation. State is never mutated when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Issue title is empty after trimming.
    #[error("title cannot be empty")]
    EmptyTitle,

    /// Comment text is empty after trimming.
    #[error("comment text cannot be empty")]
    EmptyComment,

    /// Project name is empty after trimming.
    #[error("project name cannot be empty")]
    EmptyProjectName,

    /// Project key does not match the key format.
    #[error("invalid project key '{key}': {reason}")]
    InvalidProjectKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Another project already uses this key.
    #[error("project key '{0}' is already in use")]
    DuplicateProjectKey(String),

    /// The referenced project does not exist.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// Account name is empty after trimming.
    #[error("user name cannot be empty")]
    EmptyUserName,

    /// Password is empty.
    #[error("password cannot be empty")]
    EmptyPassword,

    /// Another account already uses this name.
    #[error("user '{0}' already exists")]
    DuplicateUser(String),

    /// A text field exceeds its maximum length.
    #[error("{field} cannot exceed {max} characters")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum allowed length in characters.
        max: usize,
    },
}

/// The error type for taskflow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The session lacks the capability for this operation.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// The remote service could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote service answered with a non-success status or an
    /// unreadable body.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code of the response.
        status: u16,
        /// Body or description returned by the server.
        message: String,
    },

    /// The persisted snapshot could not be decoded.
    #[error("Local snapshot is corrupt: {0}")]
    StorageCorruption(String),

    /// Issue not found.
    #[error("Issue not found: {0}")]
    IssueNotFound(IssueId),

    /// Project not found.
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No unique id could be generated.
    #[error("ID generation error: {0}")]
    IdGeneration(#[from] IdGenerationError),
}

/// Coarse category of a failure, for rendering user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The input was rejected.
    Validation,
    /// The session is not allowed to do this.
    Authorization,
    /// The remote service was unreachable or refused the request.
    Connectivity,
    /// The target entity does not exist.
    NotFound,
    /// Local storage, configuration or encoding trouble.
    Internal,
}

impl Error {
    /// Classifies this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Validation(_) => FailureKind::Validation,
            Error::Authorization(_) => FailureKind::Authorization,
            Error::Network(_) | Error::Server { .. } => FailureKind::Connectivity,
            Error::IssueNotFound(_) | Error::ProjectNotFound(_) => FailureKind::NotFound,
            Error::StorageCorruption(_)
            | Error::Config(_)
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::IdGeneration(_) => FailureKind::Internal,
        }
    }

    /// Human-readable reason suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(e) => format!("Invalid input: {e}"),
            Error::Authorization(reason) => format!("Permission denied: {reason}"),
            Error::Network(_) => {
                "Cannot reach the TaskFlow server; your change was not saved remotely".to_string()
            }
            Error::Server { status, .. } => {
                format!("The TaskFlow server rejected the request (status {status})")
            }
            Error::IssueNotFound(id) => format!("Issue {id} no longer exists"),
            Error::ProjectNotFound(id) => format!("Project {id} no longer exists"),
            other => format!("Something went wrong locally: {other}"),
        }
    }

    /// Whether the remote told us the target does not exist.
    pub(crate) fn is_remote_not_found(&self) -> bool {
        matches!(self, Error::Server { status: 404, .. })
    }
}

impl From<taskflow_jsonl::Error> for Error {
    fn from(e: taskflow_jsonl::Error) -> Self {
        match e {
            taskflow_jsonl::Error::Io(io_err) => Error::Io(io_err),
            taskflow_jsonl::Error::Json(json_err) => Error::Json(json_err),
        }
    }
}

/// A specialized Result type for taskflow operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::Validation(ValidationError::EmptyTitle), FailureKind::Validation)]
    #[case(Error::Authorization("admin only".into()), FailureKind::Authorization)]
    #[case(Error::Network("refused".into()), FailureKind::Connectivity)]
    #[case(Error::Server { status: 500, message: "boom".into() }, FailureKind::Connectivity)]
    #[case(Error::IssueNotFound(IssueId::new("iss-1")), FailureKind::NotFound)]
    #[case(Error::StorageCorruption("bad".into()), FailureKind::Internal)]
    fn kinds(#[case] error: Error, #[case] expected: FailureKind) {
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn user_messages_distinguish_categories() {
        let validation = Error::from(ValidationError::EmptyTitle).user_message();
        let network = Error::Network("refused".into()).user_message();
        let auth = Error::Authorization("only admins can delete issues".into()).user_message();

        assert!(validation.starts_with("Invalid input"));
        assert!(network.contains("Cannot reach"));
        assert!(auth.starts_with("Permission denied"));
    }
}
