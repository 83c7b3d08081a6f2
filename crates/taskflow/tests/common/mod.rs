//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use taskflow::domain::{
    Comment, Issue, IssueId, IssueUpdate, NewComment, NewIssue, NewProject, Project, ProjectId,
    UserId,
};
use taskflow::error::{Error, Result};
use taskflow::remote::{
    BroadcastHub, ChannelEvent, CorrelationToken, RemoteSync, ServerStatistics,
};
use taskflow::session::{Role, Session};
use taskflow::storage::{LocalPersistence, MemoryKvStore};
use taskflow::store::{IssueStore, StoreChange};
use tokio::sync::{Semaphore, mpsc};

/// Run the taskflow binary in the specified directory
pub fn run_taskflow_in_dir(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskflow"))
        .args(args)
        .current_dir(dir)
        .env_remove("TASKFLOW_API_URL")
        .env_remove("TASKFLOW_WS_URL")
        .env_remove("TASKFLOW_API_TOKEN")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute taskflow binary")
}

pub fn admin() -> Session {
    Session::new("alice", Role::Admin)
}

pub fn member() -> Session {
    Session::new("bob", Role::Member)
}

/// Store without a remote, backed by memory.
pub async fn local_store() -> IssueStore {
    IssueStore::open(
        LocalPersistence::new(Arc::new(MemoryKvStore::new())),
        None,
    )
    .await
}

/// Store synchronising with `remote`, backed by memory.
pub async fn remote_store(remote: Arc<dyn RemoteSync>) -> IssueStore {
    IssueStore::open(
        LocalPersistence::new(Arc::new(MemoryKvStore::new())),
        Some(remote),
    )
    .await
}

pub async fn demo_project(store: &IssueStore) -> Project {
    store
        .create_project(
            &admin(),
            NewProject {
                name: "Demo".into(),
                key: "DMO".into(),
                description: String::new(),
            },
        )
        .await
        .expect("create project")
}

pub fn draft(project: &ProjectId, title: &str) -> NewIssue {
    NewIssue {
        project_id: project.clone(),
        title: title.into(),
        description: String::new(),
        priority: Default::default(),
        issue_type: Default::default(),
    }
}

/// Collects every change a store emits.
pub fn record(store: &IssueStore) -> mpsc::UnboundedReceiver<StoreChange> {
    let (tx, rx) = mpsc::unbounded_channel();
    store.on_change(move |change| {
        let _ = tx.send(change.clone());
    });
    rx
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wraps a [`BroadcastHub`] with switches for failing and holding calls.
pub struct FlakyRemote {
    pub hub: BroadcastHub,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    hold_creates: AtomicBool,
    hold_update_acks: AtomicBool,
    gate: Semaphore,
    tokens: std::sync::Mutex<Vec<CorrelationToken>>,
}

impl FlakyRemote {
    pub fn new(hub: BroadcastHub) -> Arc<Self> {
        Arc::new(Self {
            hub,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            hold_creates: AtomicBool::new(false),
            hold_update_acks: AtomicBool::new(false),
            gate: Semaphore::new(0),
            tokens: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Makes `create_issue` wait for [`release`](Self::release).
    pub fn hold_creates(&self, on: bool) {
        self.hold_creates.store(on, Ordering::SeqCst);
    }

    /// Makes `update_issue` apply on the hub, then wait for
    /// [`release`](Self::release) before answering.
    pub fn hold_update_acks(&self, on: bool) {
        self.hold_update_acks.store(on, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Token of the most recent write that reached this remote.
    pub fn last_token(&self) -> Option<CorrelationToken> {
        self.tokens.lock().unwrap().last().cloned()
    }

    fn seen(&self, token: &CorrelationToken) {
        self.tokens.lock().unwrap().push(token.clone());
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSync for FlakyRemote {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        Self::check(&self.fail_reads)?;
        self.hub.list_projects().await
    }

    async fn list_issues(&self, project: Option<&ProjectId>) -> Result<Vec<Issue>> {
        Self::check(&self.fail_reads)?;
        self.hub.list_issues(project).await
    }

    async fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>> {
        Self::check(&self.fail_reads)?;
        self.hub.get_issue(id).await
    }

    async fn get_statistics(&self) -> Result<ServerStatistics> {
        Self::check(&self.fail_reads)?;
        self.hub.get_statistics().await
    }

    async fn create_project(
        &self,
        draft: &NewProject,
        token: &CorrelationToken,
    ) -> Result<Project> {
        self.seen(token);
        Self::check(&self.fail_writes)?;
        self.hub.create_project(draft, token).await
    }

    async fn create_issue(
        &self,
        draft: &NewIssue,
        creator: &UserId,
        token: &CorrelationToken,
    ) -> Result<Issue> {
        self.seen(token);
        if self.hold_creates.load(Ordering::SeqCst) {
            self.gate.acquire().await.expect("gate closed").forget();
        }
        Self::check(&self.fail_writes)?;
        self.hub.create_issue(draft, creator, token).await
    }

    async fn update_issue(
        &self,
        id: &IssueId,
        update: &IssueUpdate,
        token: &CorrelationToken,
    ) -> Result<Issue> {
        self.seen(token);
        Self::check(&self.fail_writes)?;
        let result = self.hub.update_issue(id, update, token).await;
        if self.hold_update_acks.load(Ordering::SeqCst) {
            self.gate.acquire().await.expect("gate closed").forget();
        }
        result
    }

    async fn delete_issue(&self, id: &IssueId, token: &CorrelationToken) -> Result<()> {
        self.seen(token);
        Self::check(&self.fail_writes)?;
        self.hub.delete_issue(id, token).await
    }

    async fn add_comment(
        &self,
        issue: &IssueId,
        draft: &NewComment,
        token: &CorrelationToken,
    ) -> Result<Comment> {
        self.seen(token);
        Self::check(&self.fail_writes)?;
        self.hub.add_comment(issue, draft, token).await
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ChannelEvent>> {
        self.hub.subscribe().await
    }
}
