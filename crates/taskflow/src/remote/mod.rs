//! Remote sync: the optional authoritative service and its change feed.
//!
//! [`RemoteSync`] is the seam between the issue store and whatever is
//! authoritative for ids, issue codes and ordering. Two implementations ship:
//!
//! - [`HttpRemote`]: REST resources plus a WebSocket event channel
//! - [`BroadcastHub`]: an in-process authority that fans events out to every
//!   subscribed store, standing in for a same-machine broadcast channel
//!
//! Every write carries a [`CorrelationToken`]. The authority echoes it on the
//! resulting event so the originating store can recognise its own writes.

use crate::domain::{
    Comment, Issue, IssueId, IssueStatus, IssueUpdate, NewComment, NewIssue, NewProject, Project,
    ProjectId, UserId,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod broadcast;
pub mod http;
pub mod websocket;

pub use broadcast::BroadcastHub;
pub use http::HttpRemote;
pub use websocket::Backoff;

/// Capacity of subscription channels.
pub const CHANNEL_CAPACITY: usize = 256;

/// Client-generated identifier attached to an outgoing write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// A fresh random token.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The token as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Aggregate counts as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatistics {
    /// Number of projects
    #[serde(default)]
    pub total_projects: usize,

    /// Number of issues
    #[serde(default)]
    pub total_issues: usize,

    /// Issue counts keyed by status
    #[serde(default)]
    pub issues_by_status: HashMap<IssueStatus, usize>,

    /// Most recently created issues
    #[serde(default)]
    pub recent_issues: Vec<Issue>,
}

/// Issue body of an event: either the full entity or just a reference that
/// must be re-fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuePayload {
    /// Complete issue
    Full(Box<Issue>),

    /// Only the id is usable
    Reference(IssueId),
}

impl IssuePayload {
    /// Id of the referenced issue.
    pub fn id(&self) -> &IssueId {
        match self {
            Self::Full(issue) => &issue.id,
            Self::Reference(id) => id,
        }
    }
}

/// What changed on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    /// A project was created
    ProjectCreated(Project),

    /// An issue was created
    IssueCreated(IssuePayload),

    /// An issue was changed
    IssueUpdated(IssuePayload),

    /// An issue was deleted
    IssueDeleted(IssueId),

    /// A comment was appended
    CommentCreated(Comment),

    /// Free-form message for the user
    Notification(String),
}

/// An inbound real-time event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    /// Token of the write that caused the event, when the authority echoes it
    pub token: Option<CorrelationToken>,

    /// The change itself
    pub change: RemoteChange,
}

impl RemoteEvent {
    /// An event not tied to any write.
    pub fn untracked(change: RemoteChange) -> Self {
        Self {
            token: None,
            change,
        }
    }
}

/// Item delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel is (again) live
    Connected,

    /// The channel dropped; events may have been missed
    Disconnected {
        /// Why the channel dropped
        reason: String,
    },

    /// A change notification
    Event(RemoteEvent),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, alias = "data")]
    payload: Value,
    #[serde(default)]
    client_token: Option<String>,
    /// Notifications may carry their text beside the payload.
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: IssueId,
}

/// Comment summary some backends send instead of the full comment.
#[derive(Deserialize)]
struct CommentSummary {
    #[serde(alias = "issueId")]
    issue_id: IssueId,
}

#[derive(Deserialize)]
struct MessageOnly {
    message: String,
}

/// Decodes a wire message `{ "type": ..., "payload" | "data": ... }`.
///
/// Returns `Ok(None)` for event types this client does not understand.
///
/// # Errors
///
/// Returns a JSON error if the envelope or a known payload is malformed.
pub fn parse_event(text: &str) -> Result<Option<RemoteEvent>> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let token = envelope
        .client_token
        .clone()
        .or_else(|| {
            envelope
                .payload
                .get("client_token")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .map(CorrelationToken);

    let change = match envelope.kind.as_str() {
        "project_created" => RemoteChange::ProjectCreated(serde_json::from_value(envelope.payload)?),
        "issue_created" => RemoteChange::IssueCreated(issue_payload(envelope.payload)?),
        "issue_updated" => RemoteChange::IssueUpdated(issue_payload(envelope.payload)?),
        "issue_deleted" => {
            RemoteChange::IssueDeleted(serde_json::from_value::<IdOnly>(envelope.payload)?.id)
        }
        "comment_created" => match serde_json::from_value::<Comment>(envelope.payload.clone()) {
            Ok(comment) => RemoteChange::CommentCreated(comment),
            Err(_) => RemoteChange::IssueUpdated(IssuePayload::Reference(
                serde_json::from_value::<CommentSummary>(envelope.payload)?.issue_id,
            )),
        },
        "notification" => RemoteChange::Notification(match (envelope.payload, envelope.message) {
            (Value::String(message), _) | (Value::Null, Some(message)) => message,
            (other, _) => serde_json::from_value::<MessageOnly>(other)?.message,
        }),
        other => {
            tracing::debug!(kind = other, "Ignoring unknown event type");
            return Ok(None);
        }
    };
    Ok(Some(RemoteEvent { token, change }))
}

fn issue_payload(payload: Value) -> Result<IssuePayload> {
    match serde_json::from_value::<Issue>(payload.clone()) {
        Ok(issue) => Ok(IssuePayload::Full(Box::new(issue))),
        Err(_) => Ok(IssuePayload::Reference(
            serde_json::from_value::<IdOnly>(payload)?.id,
        )),
    }
}

/// Authoritative service the issue store synchronises with.
///
/// Read operations fail with `Error::Network` on transport failure and
/// `Error::Server` on a non-success status. Writes return the authoritative
/// entity so the caller can replace its optimistic copy.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// All projects.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Issues, optionally restricted to one project.
    async fn list_issues(&self, project: Option<&ProjectId>) -> Result<Vec<Issue>>;

    /// One issue, `None` if the authority does not know it.
    async fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>>;

    /// Aggregate counts.
    async fn get_statistics(&self) -> Result<ServerStatistics>;

    /// Creates a project.
    async fn create_project(&self, draft: &NewProject, token: &CorrelationToken)
    -> Result<Project>;

    /// Creates an issue; the authority assigns id, code and revision.
    async fn create_issue(
        &self,
        draft: &NewIssue,
        creator: &UserId,
        token: &CorrelationToken,
    ) -> Result<Issue>;

    /// Replaces fields of an issue.
    async fn update_issue(
        &self,
        id: &IssueId,
        update: &IssueUpdate,
        token: &CorrelationToken,
    ) -> Result<Issue>;

    /// Deletes an issue. Deleting an unknown issue succeeds.
    async fn delete_issue(&self, id: &IssueId, token: &CorrelationToken) -> Result<()>;

    /// Appends a comment.
    async fn add_comment(
        &self,
        issue: &IssueId,
        draft: &NewComment,
        token: &CorrelationToken,
    ) -> Result<Comment>;

    /// Opens the change feed. The feed ends when the receiver is dropped.
    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>>;
}
