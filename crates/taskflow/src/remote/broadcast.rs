//! In-process authority with broadcast fan-out.
//!
//! [`BroadcastHub`] holds the authoritative entity set for every store that
//! shares it, the way a same-machine broadcast channel ties several open
//! clients together. It assigns ids, issue codes and revisions under one
//! lock, so concurrent creates in the same project always receive distinct
//! sequence numbers, and it echoes each write's correlation token on the
//! event it publishes.

use super::{
    ChannelEvent, CorrelationToken, IssuePayload, RemoteChange, RemoteEvent, RemoteSync,
    ServerStatistics, CHANNEL_CAPACITY,
};
use crate::domain::{
    self, Comment, CommentId, Issue, IssueId, IssueUpdate, NewComment, NewIssue, NewProject,
    Project, ProjectId, UserId, FIRST_SEQUENCE,
};
use crate::error::{Error, Result};
use crate::id_generation::IdGenerator;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Number of issues reported in `recent_issues`.
const RECENT_LIMIT: usize = 5;

/// Shared in-process authority. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubState>>,
}

struct HubState {
    projects: Vec<Project>,
    issues: Vec<Issue>,
    sequences: HashMap<ProjectId, u64>,
    project_ids: IdGenerator,
    issue_ids: IdGenerator,
    comment_ids: IdGenerator,
    subscribers: Vec<mpsc::Sender<ChannelEvent>>,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            issues: Vec::new(),
            sequences: HashMap::new(),
            project_ids: IdGenerator::new("prj"),
            issue_ids: IdGenerator::new("iss"),
            comment_ids: IdGenerator::new("cmt"),
            subscribers: Vec::new(),
        }
    }
}

impl HubState {
    fn publish(&mut self, event: ChannelEvent) {
        self.subscribers.retain(|subscriber| match subscriber.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Subscriber is not keeping up, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn publish_change(&mut self, token: Option<&CorrelationToken>, change: RemoteChange) {
        self.publish(ChannelEvent::Event(RemoteEvent {
            token: token.cloned(),
            change,
        }));
    }

    fn issue_mut(&mut self, id: &IssueId) -> Result<&mut Issue> {
        self.issues
            .iter_mut()
            .find(|issue| &issue.id == id)
            .ok_or_else(|| not_found(format!("issue {id} not found")))
    }
}

fn not_found(message: String) -> Error {
    Error::Server {
        status: 404,
        message,
    }
}

fn rejected(e: &crate::error::ValidationError) -> Error {
    Error::Server {
        status: 422,
        message: e.to_string(),
    }
}

impl BroadcastHub {
    /// An empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        let mut state = self.inner.lock().await;
        state.subscribers.retain(|s| !s.is_closed());
        state.subscribers.len()
    }

    /// Sends a notification to every subscriber.
    pub async fn notify(&self, message: impl Into<String>) {
        let mut state = self.inner.lock().await;
        state.publish_change(None, RemoteChange::Notification(message.into()));
    }

    /// Tells every subscriber its channel dropped, as a network outage
    /// would.
    pub async fn interrupt(&self, reason: &str) {
        let mut state = self.inner.lock().await;
        state.publish(ChannelEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Tells every subscriber its channel is back.
    pub async fn resume(&self) {
        let mut state = self.inner.lock().await;
        state.publish(ChannelEvent::Connected);
    }

    /// Applies an update as some other client would, publishing the event.
    ///
    /// # Errors
    ///
    /// Fails like [`RemoteSync::update_issue`].
    pub async fn update_as_other(&self, id: &IssueId, update: &IssueUpdate) -> Result<Issue> {
        self.update_issue(id, update, &CorrelationToken::new()).await
    }

    /// Changes an issue without publishing anything, simulating an event
    /// this client missed.
    ///
    /// # Errors
    ///
    /// Fails like [`RemoteSync::update_issue`].
    pub async fn update_silently(&self, id: &IssueId, update: &IssueUpdate) -> Result<Issue> {
        let mut state = self.inner.lock().await;
        update.validate().map_err(|e| rejected(&e))?;
        let issue = state.issue_mut(id)?;
        update.apply_to(issue, Utc::now());
        issue.revision += 1;
        Ok(issue.clone())
    }
}

#[async_trait]
impl RemoteSync for BroadcastHub {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.inner.lock().await.projects.clone())
    }

    async fn list_issues(&self, project: Option<&ProjectId>) -> Result<Vec<Issue>> {
        let state = self.inner.lock().await;
        Ok(state
            .issues
            .iter()
            .filter(|issue| project.is_none_or(|p| &issue.project_id == p))
            .cloned()
            .collect())
    }

    async fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>> {
        let state = self.inner.lock().await;
        Ok(state.issues.iter().find(|issue| &issue.id == id).cloned())
    }

    async fn get_statistics(&self) -> Result<ServerStatistics> {
        let state = self.inner.lock().await;
        let mut issues_by_status = HashMap::new();
        for issue in &state.issues {
            *issues_by_status.entry(issue.status).or_insert(0) += 1;
        }
        let mut recent = state.issues.clone();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_LIMIT);
        Ok(ServerStatistics {
            total_projects: state.projects.len(),
            total_issues: state.issues.len(),
            issues_by_status,
            recent_issues: recent,
        })
    }

    async fn create_project(
        &self,
        draft: &NewProject,
        token: &CorrelationToken,
    ) -> Result<Project> {
        let mut state = self.inner.lock().await;
        let draft = draft.validate(&state.projects).map_err(|e| match e {
            crate::error::ValidationError::DuplicateProjectKey(_) => Error::Server {
                status: 409,
                message: e.to_string(),
            },
            other => rejected(&other),
        })?;
        let id = ProjectId::new(state.project_ids.generate(&draft.key)?);
        let project = draft.into_project(id, Utc::now());
        state.projects.push(project.clone());
        state.publish_change(Some(token), RemoteChange::ProjectCreated(project.clone()));
        debug!(project = %project.id, "Hub created project");
        Ok(project)
    }

    async fn create_issue(
        &self,
        draft: &NewIssue,
        creator: &UserId,
        token: &CorrelationToken,
    ) -> Result<Issue> {
        let mut state = self.inner.lock().await;
        let project = state
            .projects
            .iter()
            .find(|p| p.id == draft.project_id)
            .cloned();
        let id = IssueId::new(state.issue_ids.generate(&draft.title)?);
        let sequence = *state
            .sequences
            .entry(draft.project_id.clone())
            .or_insert(FIRST_SEQUENCE);
        let mut issue = domain::create_issue(
            project.as_ref(),
            draft,
            creator,
            id,
            sequence,
            Utc::now(),
        )
        .map_err(|e| rejected(&e))?;
        issue.revision = 1;
        state.sequences.insert(draft.project_id.clone(), sequence + 1);
        state.issues.push(issue.clone());
        state.publish_change(
            Some(token),
            RemoteChange::IssueCreated(IssuePayload::Full(Box::new(issue.clone()))),
        );
        debug!(issue = %issue.id, code = %issue.human_code, "Hub created issue");
        Ok(issue)
    }

    async fn update_issue(
        &self,
        id: &IssueId,
        update: &IssueUpdate,
        token: &CorrelationToken,
    ) -> Result<Issue> {
        let mut state = self.inner.lock().await;
        update.validate().map_err(|e| rejected(&e))?;
        let issue = state.issue_mut(id)?;
        update.apply_to(issue, Utc::now());
        issue.revision += 1;
        let issue = issue.clone();
        state.publish_change(
            Some(token),
            RemoteChange::IssueUpdated(IssuePayload::Full(Box::new(issue.clone()))),
        );
        Ok(issue)
    }

    async fn delete_issue(&self, id: &IssueId, token: &CorrelationToken) -> Result<()> {
        let mut state = self.inner.lock().await;
        let before = state.issues.len();
        state.issues.retain(|issue| &issue.id != id);
        if state.issues.len() != before {
            state.publish_change(Some(token), RemoteChange::IssueDeleted(id.clone()));
        }
        Ok(())
    }

    async fn add_comment(
        &self,
        issue: &IssueId,
        draft: &NewComment,
        token: &CorrelationToken,
    ) -> Result<Comment> {
        let mut state = self.inner.lock().await;
        let comment_id = CommentId::new(state.comment_ids.generate(&draft.text)?);
        let target = state.issue_mut(issue)?;
        let comment = domain::add_comment(target, &draft.author, &draft.text, comment_id, Utc::now())
            .map_err(|e| rejected(&e))?;
        target.revision += 1;
        state.publish_change(Some(token), RemoteChange::CommentCreated(comment.clone()));
        Ok(comment)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // A fresh channel has room for the greeting.
        let _ = tx.try_send(ChannelEvent::Connected);
        self.inner.lock().await.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueStatus, IssueType, Priority};

    async fn hub_with_project() -> (BroadcastHub, Project) {
        let hub = BroadcastHub::new();
        let project = hub
            .create_project(
                &NewProject {
                    name: "Demo".into(),
                    key: "DMO".into(),
                    description: String::new(),
                },
                &CorrelationToken::new(),
            )
            .await
            .unwrap();
        (hub, project)
    }

    fn draft(project: &Project, title: &str) -> NewIssue {
        NewIssue {
            project_id: project.id.clone(),
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            issue_type: IssueType::Task,
        }
    }

    #[tokio::test]
    async fn sequences_are_per_project_and_monotonic() {
        let (hub, project) = hub_with_project().await;
        let alice = UserId::new("alice");

        let first = hub
            .create_issue(&draft(&project, "a"), &alice, &CorrelationToken::new())
            .await
            .unwrap();
        hub.delete_issue(&first.id, &CorrelationToken::new())
            .await
            .unwrap();
        let second = hub
            .create_issue(&draft(&project, "b"), &alice, &CorrelationToken::new())
            .await
            .unwrap();

        assert_eq!(first.human_code, "DMO-101");
        assert_eq!(second.human_code, "DMO-102");
    }

    #[tokio::test]
    async fn events_echo_the_write_token() {
        let (hub, project) = hub_with_project().await;
        let mut rx = hub.subscribe().await.unwrap();
        assert_eq!(rx.recv().await, Some(ChannelEvent::Connected));

        let token = CorrelationToken::new();
        let issue = hub
            .create_issue(&draft(&project, "a"), &UserId::new("alice"), &token)
            .await
            .unwrap();

        let Some(ChannelEvent::Event(event)) = rx.recv().await else {
            panic!("expected an event");
        };
        assert_eq!(event.token, Some(token));
        assert_eq!(event.change, RemoteChange::IssueCreated(IssuePayload::Full(Box::new(issue))));
    }

    #[tokio::test]
    async fn update_bumps_revision_and_unknown_issue_is_404() {
        let (hub, project) = hub_with_project().await;
        let issue = hub
            .create_issue(&draft(&project, "a"), &UserId::new("alice"), &CorrelationToken::new())
            .await
            .unwrap();

        let updated = hub
            .update_as_other(&issue.id, &IssueUpdate::status(IssueStatus::Done))
            .await
            .unwrap();
        assert_eq!(updated.revision, issue.revision + 1);

        let err = hub
            .update_as_other(&IssueId::new("iss-none"), &IssueUpdate::status(IssueStatus::Done))
            .await
            .unwrap_err();
        assert!(err.is_remote_not_found());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let hub = BroadcastHub::new();
        let rx = hub.subscribe().await.unwrap();
        assert_eq!(hub.subscriber_count().await, 1);
        drop(rx);
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
