//! The issue store: single source of truth for entity state in one process.
//!
//! Every mutation runs in two phases. The synchronous phase validates,
//! applies the change to memory and persists the snapshot while holding the
//! state lock, so these phases complete strictly in call order. The remote
//! phase runs without the lock; its acknowledgment (or failure) is folded
//! back in under the lock again.
//!
//! With a remote configured, creates get a provisional `tmp-` id that is
//! swapped for the authoritative one on acknowledgment. The provisional id
//! stays usable afterwards through an alias, and any operation on it issued
//! while the create is in flight waits for the create to settle.
//!
//! Without a remote the store is its own authority: it mints ids, allocates
//! issue sequences and bumps revisions directly.

mod pending;
mod state;
mod sync;

pub use sync::{SyncHandle, SyncStatus};

use crate::domain::{
    self, Comment, CommentId, Issue, IssueId, IssueStatus, IssueUpdate, NewComment, NewIssue,
    NewProject, Project, ProjectId,
};
use crate::error::{Error, FailureKind, Result, ValidationError};
use crate::id_generation::is_provisional;
use crate::remote::{
    CorrelationToken, IssuePayload, RemoteChange, RemoteEvent, RemoteSync, ServerStatistics,
};
use crate::session::Session;
use crate::storage::LocalPersistence;
use crate::view::{self, Statistics};
use chrono::Utc;
use pending::{CreateOutcome, PendingKind};
use serde::Serialize;
use state::{OrderedMap, StoreState};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Notification delivered to change listeners after the state lock is
/// released.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", content = "data", rename_all = "snake_case")]
pub enum StoreChange {
    /// A project was added or replaced
    ProjectUpserted(Project),
    /// A provisional project id was replaced by the authoritative one
    ProjectRekeyed {
        /// Provisional id
        from: ProjectId,
        /// Authoritative id
        to: ProjectId,
    },
    /// A project disappeared (failed create)
    ProjectRemoved(ProjectId),
    /// An issue was added or replaced
    IssueUpserted(Issue),
    /// A provisional issue id was replaced by the authoritative one
    IssueRekeyed {
        /// Provisional id
        from: IssueId,
        /// Authoritative id
        to: IssueId,
    },
    /// An issue disappeared
    IssueRemoved(IssueId),
    /// Everything may have changed
    Reloaded,
    /// The freshness flag changed
    SyncStatusChanged(SyncStatus),
    /// Message pushed by the remote service
    Notification(String),
    /// A remote write failed and was rolled back or reconciled
    MutationFailed {
        /// Human-readable reason
        reason: String,
        /// Category of the failure
        kind: FailureKind,
    },
}

/// Handle returned by [`IssueStore::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Listener)>,
}

/// Point-in-time copy of the store contents.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    /// Projects in creation order
    pub projects: Vec<Project>,
    /// Issues in creation order
    pub issues: Vec<Issue>,
    /// Freshness relative to the remote
    pub status: SyncStatus,
}

struct Inner {
    state: Mutex<StoreState>,
    persistence: LocalPersistence,
    remote: Option<Arc<dyn RemoteSync>>,
    listeners: std::sync::Mutex<Listeners>,
}

/// Shared handle to the issue store. Clones refer to the same state.
#[derive(Clone)]
pub struct IssueStore {
    inner: Arc<Inner>,
}

impl IssueStore {
    /// Loads the last persisted snapshot and wraps it in a store.
    ///
    /// A store with a remote starts out [`SyncStatus::Stale`] until
    /// [`connect`](Self::connect) or [`refresh`](Self::refresh) succeeds.
    pub async fn open(persistence: LocalPersistence, remote: Option<Arc<dyn RemoteSync>>) -> Self {
        let snapshot = persistence.load().await;
        let status = if remote.is_some() {
            SyncStatus::Stale
        } else {
            SyncStatus::LocalOnly
        };
        debug!(
            projects = snapshot.projects.len(),
            issues = snapshot.issues.len(),
            %status,
            "Opened issue store"
        );

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::from_snapshot(snapshot, status)),
                persistence,
                remote,
                listeners: std::sync::Mutex::new(Listeners::default()),
            }),
        }
    }

    /// Whether a remote authority is configured.
    pub fn has_remote(&self) -> bool {
        self.inner.remote.is_some()
    }

    async fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().await
    }

    /// Saves the snapshot; failures are logged, the in-memory state stays
    /// authoritative for this process.
    async fn persist(&self, state: &StoreState) {
        if let Err(e) = self.inner.persistence.save(&state.to_snapshot()).await {
            warn!(error = %e, "Failed to persist snapshot");
        }
    }

    /// Saves the current snapshot, reporting failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the key-value store rejects the write.
    pub async fn save(&self) -> Result<()> {
        let state = self.lock().await;
        self.inner.persistence.save(&state.to_snapshot()).await
    }

    /// Registers a listener for store changes.
    ///
    /// Listeners run on the task that made the change, after the state lock
    /// is released. They must not block.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.next += 1;
        let id = ListenerId(listeners.next);
        listeners.entries.push((id, Arc::new(listener)));
        id
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        listeners.entries.len() != before
    }

    fn emit(&self, changes: Vec<StoreChange>) {
        if changes.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for change in &changes {
            for listener in &listeners {
                listener(change);
            }
        }
    }

    fn failed(error: &Error) -> StoreChange {
        warn!(error = %error, "Remote write failed");
        StoreChange::MutationFailed {
            reason: error.user_message(),
            kind: error.kind(),
        }
    }

    /// Copy of all projects and issues.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock().await;
        StoreSnapshot {
            projects: state.project_list(),
            issues: state.issues.to_vec(),
            status: state.status,
        }
    }

    /// Statistics over the current issues, computed on demand.
    pub async fn statistics(&self) -> Statistics {
        let state = self.lock().await;
        view::statistics(&state.issues.to_vec())
    }

    /// Current freshness flag.
    pub async fn sync_status(&self) -> SyncStatus {
        self.lock().await.status
    }

    /// Looks an issue up by id, provisional id or human code.
    pub async fn find_issue(&self, needle: &str) -> Option<Issue> {
        self.lock().await.find_issue(needle).cloned()
    }

    /// Looks a project up by id or key.
    pub async fn find_project(&self, needle: &str) -> Option<Project> {
        self.lock().await.find_project(needle).cloned()
    }

    /// Aggregate counts as reported by the remote authority.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without a remote, or the remote failure.
    pub async fn server_statistics(&self) -> Result<ServerStatistics> {
        match &self.inner.remote {
            Some(remote) => remote.get_statistics().await,
            None => Err(Error::Config("no remote configured".to_string())),
        }
    }

    /// Number of writes awaiting acknowledgment.
    pub async fn pending_writes(&self) -> usize {
        self.lock().await.pending.len()
    }

    /// Waits for an in-flight create of `id`. Returns the id to use from
    /// here on, or `None` if the create failed.
    async fn settle(&self, id: &str) -> Option<String> {
        let watcher = self.lock().await.pending.watch_create(id);
        let Some(mut rx) = watcher else {
            return Some(id.to_string());
        };
        debug!(id, "Waiting for in-flight create");
        let outcome = rx
            .wait_for(|outcome| *outcome != CreateOutcome::InFlight)
            .await
            .map(|outcome| CreateOutcome::clone(&outcome));
        match outcome {
            Ok(CreateOutcome::Acked(real)) => Some(real),
            _ => None,
        }
    }

    /// Creates a project.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad draft (including a key already
    /// used by any known project) or the remote failure, after removing
    /// the provisional project.
    pub async fn create_project(&self, session: &Session, draft: NewProject) -> Result<Project> {
        let mut state = self.lock().await;
        let draft = draft.validate(&state.project_list())?;

        let Some(remote) = self.inner.remote.clone() else {
            let id = ProjectId::new(state.ids.project.generate(&draft.key)?);
            let project = draft.into_project(id, Utc::now());
            state.projects.upsert(project.id.clone(), project.clone());
            self.persist(&state).await;
            drop(state);
            info!(key = %project.key, by = %session.user, "Created project");
            self.emit(vec![StoreChange::ProjectUpserted(project.clone())]);
            return Ok(project);
        };

        let provisional = ProjectId::new(state.ids.provisional.generate(&draft.key)?);
        let optimistic = draft.clone().into_project(provisional.clone(), Utc::now());
        let token = CorrelationToken::new();
        state
            .projects
            .upsert(provisional.clone(), optimistic.clone());
        state.pending.begin(
            token.clone(),
            PendingKind::CreateProject {
                provisional: provisional.clone(),
            },
        );
        self.persist(&state).await;
        drop(state);
        self.emit(vec![StoreChange::ProjectUpserted(optimistic)]);

        let result = remote.create_project(&draft, &token).await;

        let mut state = self.lock().await;
        state.pending.finish(&token);
        match result {
            Ok(project) => {
                state
                    .projects
                    .rekey(&provisional, project.id.clone(), project.clone());
                state
                    .project_aliases
                    .insert(provisional.clone(), project.id.clone());
                state.pending.resolve_create(
                    provisional.as_str(),
                    CreateOutcome::Acked(project.id.to_string()),
                );
                self.persist(&state).await;
                drop(state);
                debug!(from = %provisional, to = %project.id, "Project create acknowledged");
                self.emit(vec![
                    StoreChange::ProjectRekeyed {
                        from: provisional,
                        to: project.id.clone(),
                    },
                    StoreChange::ProjectUpserted(project.clone()),
                ]);
                Ok(project)
            }
            Err(e) => {
                state.projects.remove(&provisional);
                state
                    .pending
                    .resolve_create(provisional.as_str(), CreateOutcome::Failed);
                self.persist(&state).await;
                drop(state);
                self.emit(vec![
                    StoreChange::ProjectRemoved(provisional),
                    Self::failed(&e),
                ]);
                Err(e)
            }
        }
    }

    /// Creates an issue in `draft.project_id` on behalf of `session`.
    ///
    /// The issue is visible immediately. With a remote, its code is a guess
    /// until the authority acknowledges it.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown project or bad title, or
    /// the remote failure after removing the provisional issue.
    pub async fn create_issue(&self, session: &Session, draft: NewIssue) -> Result<Issue> {
        let Some(project_id) = self.settle(draft.project_id.as_str()).await else {
            return Err(ValidationError::UnknownProject(draft.project_id.to_string()).into());
        };

        let mut state = self.lock().await;
        let project_id = state.resolve_project(&ProjectId::new(project_id));
        let project = state.projects.get(&project_id).cloned();
        let draft = domain::validate_new_issue(
            project.as_ref(),
            &NewIssue {
                project_id,
                ..draft
            },
        )?;
        let now = Utc::now();

        let Some(remote) = self.inner.remote.clone() else {
            let id = IssueId::new(state.ids.issue.generate(&draft.title)?);
            let sequence = state.allocate_sequence(&draft.project_id);
            let mut issue =
                domain::create_issue(project.as_ref(), &draft, &session.user, id, sequence, now)?;
            issue.revision = 1;
            state.issues.upsert(issue.id.clone(), issue.clone());
            self.persist(&state).await;
            drop(state);
            info!(code = %issue.human_code, "Created issue");
            self.emit(vec![StoreChange::IssueUpserted(issue.clone())]);
            return Ok(issue);
        };

        let provisional = IssueId::new(state.ids.provisional.generate(&draft.title)?);
        let guess = state.guess_sequence(&draft.project_id);
        let optimistic = domain::create_issue(
            project.as_ref(),
            &draft,
            &session.user,
            provisional.clone(),
            guess,
            now,
        )?;
        let token = CorrelationToken::new();
        state
            .issues
            .upsert(provisional.clone(), optimistic.clone());
        state.pending.begin(
            token.clone(),
            PendingKind::CreateIssue {
                provisional: provisional.clone(),
            },
        );
        self.persist(&state).await;
        drop(state);
        self.emit(vec![StoreChange::IssueUpserted(optimistic)]);

        let result = remote.create_issue(&draft, &session.user, &token).await;

        let mut state = self.lock().await;
        state.pending.finish(&token);
        match result {
            Ok(issue) => {
                let id = issue.id.clone();
                let held = state.issues.remove(&provisional);
                let buried = state.is_buried(&id);
                match held {
                    _ if buried => {}
                    Some((position, _)) if !state.issues.contains_key(&id) => {
                        state.issues.insert_at(position, id.clone(), issue.clone());
                    }
                    _ => {
                        state.reconcile_issue(issue.clone());
                    }
                }
                state.issue_aliases.insert(provisional.clone(), id.clone());
                state
                    .pending
                    .resolve_create(provisional.as_str(), CreateOutcome::Acked(id.to_string()));
                let stored = state.issues.get(&id).cloned().unwrap_or(issue);
                self.persist(&state).await;
                drop(state);
                debug!(from = %provisional, to = %id, code = %stored.human_code, buried, "Issue create acknowledged");
                let settled = if buried {
                    StoreChange::IssueRemoved(id.clone())
                } else {
                    StoreChange::IssueUpserted(stored.clone())
                };
                self.emit(vec![
                    StoreChange::IssueRekeyed {
                        from: provisional,
                        to: id,
                    },
                    settled,
                ]);
                Ok(stored)
            }
            Err(e) => {
                state.issues.remove(&provisional);
                state
                    .pending
                    .resolve_create(provisional.as_str(), CreateOutcome::Failed);
                self.persist(&state).await;
                drop(state);
                self.emit(vec![StoreChange::IssueRemoved(provisional), Self::failed(&e)]);
                Err(e)
            }
        }
    }

    /// Moves an issue to another board column.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub async fn update_status(&self, id: &IssueId, status: IssueStatus) -> Result<Issue> {
        self.update(id, IssueUpdate::status(status)).await
    }

    /// Replaces fields of an issue.
    ///
    /// On remote failure the issue is re-fetched and replaced by the
    /// authority's copy (or removed if the authority no longer has it). Only
    /// when that re-fetch also fails is the pre-update copy restored.
    ///
    /// # Errors
    ///
    /// Returns a validation error, [`Error::IssueNotFound`], or the remote
    /// failure after reconciling.
    pub async fn update(&self, id: &IssueId, update: IssueUpdate) -> Result<Issue> {
        update.validate()?;
        let Some(settled) = self.settle(id.as_str()).await else {
            return Err(Error::IssueNotFound(id.clone()));
        };

        let mut state = self.lock().await;
        let id = state.resolve_issue(&IssueId::new(settled));
        let Some(current) = state.issues.get(&id).cloned() else {
            return Err(Error::IssueNotFound(id));
        };
        let mut updated = current.clone();
        update.apply_to(&mut updated, Utc::now());

        let Some(remote) = self.inner.remote.clone() else {
            updated.revision += 1;
            state.issues.upsert(id, updated.clone());
            self.persist(&state).await;
            drop(state);
            self.emit(vec![StoreChange::IssueUpserted(updated.clone())]);
            return Ok(updated);
        };

        let token = CorrelationToken::new();
        state.pending.begin(
            token.clone(),
            PendingKind::Update {
                issue: id.clone(),
                before: Box::new(current),
            },
        );
        state.issues.upsert(id.clone(), updated.clone());
        self.persist(&state).await;
        drop(state);
        self.emit(vec![StoreChange::IssueUpserted(updated)]);

        match remote.update_issue(&id, &update, &token).await {
            Ok(ack) => {
                let mut state = self.lock().await;
                state.pending.finish(&token);
                // A delete may have overtaken the ack; it stays deleted.
                let held = state.issues.contains_key(&id);
                let changed = held && state.reconcile_issue(ack.clone());
                let stored = state.issues.get(&id).cloned().unwrap_or(ack);
                if changed {
                    self.persist(&state).await;
                }
                drop(state);
                debug!(id = %id, revision = stored.revision, changed, held, "Update acknowledged");
                if changed {
                    self.emit(vec![StoreChange::IssueUpserted(stored.clone())]);
                }
                Ok(stored)
            }
            Err(e) => {
                let canonical = remote.get_issue(&id).await;

                let mut state = self.lock().await;
                let before = match state.pending.finish(&token) {
                    Some(PendingKind::Update { before, .. }) => Some(before),
                    _ => None,
                };
                let mut changes = Vec::new();
                match canonical {
                    Ok(Some(_)) if state.is_buried(&id) => {
                        debug!(id = %id, "Issue deleted while its update failed");
                    }
                    Ok(Some(issue)) => {
                        debug!(id = %id, revision = issue.revision, "Reconciled failed update to server copy");
                        state.issues.upsert(id.clone(), issue.clone());
                        changes.push(StoreChange::IssueUpserted(issue));
                    }
                    Ok(None) => {
                        debug!(id = %id, "Issue gone on server after failed update");
                        if state.bury_issue(&id) {
                            changes.push(StoreChange::IssueRemoved(id.clone()));
                        }
                    }
                    Err(fetch_err) => {
                        warn!(id = %id, error = %fetch_err, "Re-fetch failed, rolling back");
                        let newer_known = state.issues.get(&id).is_some_and(|stored| {
                            before
                                .as_ref()
                                .is_some_and(|b| stored.revision > b.revision)
                        });
                        if let Some(before) = before.filter(|_| !newer_known) {
                            state.issues.upsert(id.clone(), (*before).clone());
                            changes.push(StoreChange::IssueUpserted(*before));
                        }
                    }
                }
                self.persist(&state).await;
                drop(state);
                changes.push(Self::failed(&e));
                self.emit(changes);
                Err(e)
            }
        }
    }

    /// Deletes an issue. Requires an admin session.
    ///
    /// Deleting a provisional issue whose create failed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authorization`] for a non-admin session (nothing
    /// changes), [`Error::IssueNotFound`], or the remote failure after
    /// restoring the issue at its former position.
    pub async fn delete(&self, session: &Session, id: &IssueId) -> Result<()> {
        if !session.is_admin() {
            return Err(Error::Authorization(format!(
                "{} is not an admin and cannot delete issues",
                session.user
            )));
        }
        let Some(settled) = self.settle(id.as_str()).await else {
            debug!(id = %id, "Delete of an issue whose create failed");
            return Ok(());
        };

        let mut state = self.lock().await;
        let id = state.resolve_issue(&IssueId::new(settled));
        let Some((position, removed)) = state.issues.remove(&id) else {
            if is_provisional(id.as_str()) {
                return Ok(());
            }
            return Err(Error::IssueNotFound(id));
        };

        let Some(remote) = self.inner.remote.clone() else {
            self.persist(&state).await;
            drop(state);
            info!(code = %removed.human_code, by = %session.user, "Deleted issue");
            self.emit(vec![StoreChange::IssueRemoved(id)]);
            return Ok(());
        };

        let token = CorrelationToken::new();
        state.pending.begin(
            token.clone(),
            PendingKind::Delete {
                removed: Box::new(removed),
                position,
            },
        );
        self.persist(&state).await;
        drop(state);
        self.emit(vec![StoreChange::IssueRemoved(id.clone())]);

        let result = remote.delete_issue(&id, &token).await;

        let mut state = self.lock().await;
        let kind = state.pending.finish(&token);
        match result {
            Ok(()) => {
                state.deleted.insert(id);
                Ok(())
            }
            Err(e) => {
                let mut changes = Vec::new();
                if let Some(PendingKind::Delete { removed, position }) = kind {
                    if !state.issues.contains_key(&removed.id) {
                        state
                            .issues
                            .insert_at(position, removed.id.clone(), (*removed).clone());
                        changes.push(StoreChange::IssueUpserted(*removed));
                    }
                }
                self.persist(&state).await;
                drop(state);
                changes.push(Self::failed(&e));
                self.emit(changes);
                Err(e)
            }
        }
    }

    /// Appends a comment by `session`'s user.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty text, [`Error::IssueNotFound`],
    /// or the remote failure after removing the optimistic comment.
    pub async fn add_comment(&self, session: &Session, id: &IssueId, text: &str) -> Result<Comment> {
        let text = domain::validate_comment_text(text)?;
        let Some(settled) = self.settle(id.as_str()).await else {
            return Err(Error::IssueNotFound(id.clone()));
        };

        let mut state = self.lock().await;
        let id = state.resolve_issue(&IssueId::new(settled));
        if !state.issues.contains_key(&id) {
            return Err(Error::IssueNotFound(id));
        }
        let remote = self.inner.remote.clone();
        let comment_id = if remote.is_some() {
            CommentId::new(state.ids.provisional.generate(&text)?)
        } else {
            CommentId::new(state.ids.comment.generate(&text)?)
        };
        let now = Utc::now();
        let Some(issue) = state.issues.get_mut(&id) else {
            return Err(Error::IssueNotFound(id));
        };
        let comment = domain::add_comment(issue, &session.user, &text, comment_id, now)?;
        if remote.is_none() {
            issue.revision += 1;
            issue.updated_at = now;
        }
        let snapshot = issue.clone();

        let Some(remote) = remote else {
            self.persist(&state).await;
            drop(state);
            self.emit(vec![StoreChange::IssueUpserted(snapshot)]);
            return Ok(comment);
        };

        let token = CorrelationToken::new();
        let provisional = comment.id.clone();
        state.pending.begin(
            token.clone(),
            PendingKind::Comment {
                issue: id.clone(),
                provisional: provisional.clone(),
            },
        );
        self.persist(&state).await;
        drop(state);
        self.emit(vec![StoreChange::IssueUpserted(snapshot)]);

        let draft = NewComment {
            author: session.user.clone(),
            text,
        };
        let result = remote.add_comment(&id, &draft, &token).await;

        let mut state = self.lock().await;
        state.pending.finish(&token);
        let outcome = match &result {
            Ok(acked) => state.issues.get_mut(&id).map(|issue| {
                if let Some(pos) = issue.comments.iter().position(|c| c.id == provisional) {
                    issue.comments[pos] = acked.clone();
                } else if !issue.comments.iter().any(|c| c.id == acked.id) {
                    issue.comments.push(acked.clone());
                }
                issue.clone()
            }),
            Err(_) => state.issues.get_mut(&id).map(|issue| {
                issue.comments.retain(|c| c.id != provisional);
                issue.clone()
            }),
        };
        self.persist(&state).await;
        drop(state);

        let mut changes: Vec<StoreChange> =
            outcome.into_iter().map(StoreChange::IssueUpserted).collect();
        if let Err(e) = &result {
            changes.push(Self::failed(e));
        }
        self.emit(changes);
        result
    }

    pub(crate) async fn set_status(&self, status: SyncStatus) {
        let mut state = self.lock().await;
        if state.status == status {
            return;
        }
        state.status = status;
        drop(state);
        debug!(%status, "Sync status changed");
        self.emit(vec![StoreChange::SyncStatusChanged(status)]);
    }

    /// Merges an inbound real-time event.
    ///
    /// Echoes of this store's own writes are ignored. Otherwise the event
    /// wins over local optimistic state when its revision is at least the
    /// stored one.
    ///
    /// # Errors
    ///
    /// Returns the remote failure when a reference-only payload cannot be
    /// re-fetched.
    pub async fn apply_remote_event(&self, event: RemoteEvent) -> Result<()> {
        if let Some(token) = &event.token {
            if self.lock().await.pending.is_own(token) {
                debug!(%token, "Suppressed echo of own write");
                return Ok(());
            }
        }

        let changes = match event.change {
            RemoteChange::ProjectCreated(project) => {
                let mut state = self.lock().await;
                if state.projects.get(&project.id) == Some(&project) {
                    Vec::new()
                } else {
                    state.projects.upsert(project.id.clone(), project.clone());
                    self.persist(&state).await;
                    vec![StoreChange::ProjectUpserted(project)]
                }
            }
            RemoteChange::IssueCreated(payload) | RemoteChange::IssueUpdated(payload) => {
                self.merge_issue(payload).await?
            }
            RemoteChange::IssueDeleted(id) => {
                let mut state = self.lock().await;
                if state.bury_issue(&id) {
                    self.persist(&state).await;
                    vec![StoreChange::IssueRemoved(id)]
                } else {
                    Vec::new()
                }
            }
            RemoteChange::CommentCreated(comment) => {
                let mut state = self.lock().await;
                let id = state.resolve_issue(&comment.issue_id);
                let updated = state.issues.get_mut(&id).and_then(|issue| {
                    if issue.comments.iter().any(|c| c.id == comment.id) {
                        return None;
                    }
                    issue.comments.push(comment);
                    Some(issue.clone())
                });
                match updated {
                    Some(issue) => {
                        self.persist(&state).await;
                        vec![StoreChange::IssueUpserted(issue)]
                    }
                    None => Vec::new(),
                }
            }
            RemoteChange::Notification(message) => vec![StoreChange::Notification(message)],
        };
        self.emit(changes);
        Ok(())
    }

    async fn merge_issue(&self, payload: IssuePayload) -> Result<Vec<StoreChange>> {
        let issue = match payload {
            IssuePayload::Full(issue) => Some(*issue),
            IssuePayload::Reference(id) => match &self.inner.remote {
                Some(remote) => {
                    let fetched = remote.get_issue(&id).await?;
                    if fetched.is_none() {
                        let mut state = self.lock().await;
                        if state.bury_issue(&id) {
                            self.persist(&state).await;
                            return Ok(vec![StoreChange::IssueRemoved(id)]);
                        }
                    }
                    fetched
                }
                None => None,
            },
        };
        let Some(issue) = issue else {
            return Ok(Vec::new());
        };

        let mut state = self.lock().await;
        if state.pending.deleting().contains(&issue.id) {
            debug!(id = %issue.id, "Ignoring event for an issue being deleted");
            return Ok(Vec::new());
        }
        let id = issue.id.clone();
        let revision = issue.revision;
        if !state.reconcile_issue(issue) {
            debug!(id = %id, revision, "Ignoring stale, duplicate or deleted issue event");
            return Ok(Vec::new());
        }
        let stored = state.issues.get(&id).cloned();
        self.persist(&state).await;
        Ok(stored.into_iter().map(StoreChange::IssueUpserted).collect())
    }

    /// Re-reads all projects and issues from the remote.
    ///
    /// Entities with an unacknowledged local write keep their local copy;
    /// provisional leftovers of earlier sessions are dropped. Without a
    /// remote this does nothing.
    ///
    /// # Errors
    ///
    /// Returns the remote failure; local state is untouched in that case.
    pub async fn refresh(&self) -> Result<()> {
        let Some(remote) = self.inner.remote.clone() else {
            return Ok(());
        };
        let (projects, issues) =
            futures::try_join!(remote.list_projects(), remote.list_issues(None))?;

        let mut state = self.lock().await;
        let dropped = state.stale_provisional_count();
        if dropped > 0 {
            warn!(dropped, "Dropping provisional entities without a pending create");
        }

        let mut next_projects = OrderedMap::default();
        for project in projects {
            next_projects.upsert(project.id.clone(), project);
        }
        for project in state.projects.values() {
            if is_provisional(project.id.as_str()) && state.pending.has_create(project.id.as_str())
            {
                next_projects.upsert(project.id.clone(), project.clone());
            }
        }

        let optimistic = state.pending.optimistic_issues();
        let deleting = state.pending.deleting();
        let mut next_issues = OrderedMap::default();
        for issue in issues {
            if deleting.contains(&issue.id) || state.is_buried(&issue.id) {
                continue;
            }
            let local = optimistic
                .contains(&issue.id)
                .then(|| state.issues.get(&issue.id).cloned())
                .flatten();
            next_issues.upsert(issue.id.clone(), local.unwrap_or(issue));
        }
        for issue in state.issues.values() {
            if is_provisional(issue.id.as_str()) && state.pending.has_create(issue.id.as_str()) {
                next_issues.upsert(issue.id.clone(), issue.clone());
            }
        }

        state.projects = next_projects;
        state.issues = next_issues;
        debug!(
            projects = state.projects.len(),
            issues = state.issues.len(),
            "Refreshed from remote"
        );
        self.persist(&state).await;
        drop(state);
        self.emit(vec![StoreChange::Reloaded]);
        Ok(())
    }

    /// Subscribes to the remote change feed and starts applying events in
    /// the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without a remote, or the subscribe failure
    /// (status is then [`SyncStatus::Stale`]).
    pub async fn connect(&self) -> Result<SyncHandle> {
        let Some(remote) = self.inner.remote.clone() else {
            return Err(Error::Config("no remote configured".to_string()));
        };
        self.set_status(SyncStatus::Connecting).await;
        match remote.subscribe().await {
            Ok(rx) => Ok(sync::spawn_pump(self.clone(), rx)),
            Err(e) => {
                self.set_status(SyncStatus::Stale).await;
                Err(e)
            }
        }
    }
}
