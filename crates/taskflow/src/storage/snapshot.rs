//! Snapshot encoding for local persistence.
//!
//! A snapshot is stored as JSON Lines under one key. The first record is a
//! header carrying the format version; after it come project, issue and
//! sequence records in any order. Anything unexpected (a malformed line, a
//! missing header, an unknown version) makes the whole snapshot unusable and
//! it is treated as empty.

use super::KeyValueStore;
use crate::domain::{Issue, Project, ProjectId};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key the snapshot is stored under unless configured otherwise.
pub const DEFAULT_SNAPSHOT_KEY: &str = "taskflow.snapshot";

const FORMAT_VERSION: u32 = 1;

/// Full entity set as persisted locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Projects in creation order
    pub projects: Vec<Project>,

    /// Issues in creation order
    pub issues: Vec<Issue>,

    /// Next sequence number per project, kept when this process is the
    /// authority for issue codes
    pub sequences: BTreeMap<ProjectId, u64>,
}

impl Snapshot {
    /// Whether the snapshot holds no entities.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.issues.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum SnapshotRecord {
    Header { version: u32 },
    Project(Project),
    Issue(Issue),
    Sequence { project_id: ProjectId, next: u64 },
}

/// Reads and writes the snapshot through a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalPersistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocalPersistence {
    /// Persists under [`DEFAULT_SNAPSHOT_KEY`].
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_SNAPSHOT_KEY)
    }

    /// Persists under a custom key.
    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Returns the last saved snapshot.
    ///
    /// A missing snapshot, an unreadable store or corrupt contents all yield
    /// an empty snapshot; the latter two are logged.
    pub async fn load(&self) -> Snapshot {
        let bytes = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Snapshot::default(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Cannot read local snapshot, starting empty");
                return Snapshot::default();
            }
        };

        match decode_snapshot(&bytes) {
            Ok(snapshot) => {
                debug!(
                    projects = snapshot.projects.len(),
                    issues = snapshot.issues.len(),
                    "Loaded local snapshot"
                );
                snapshot
            }
            Err(reason) => {
                warn!(key = %self.key, %reason, "Local snapshot is corrupt, starting empty");
                Snapshot::default()
            }
        }
    }

    /// Replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the store rejects the write.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = encode_snapshot(snapshot)?;
        self.store.set(&self.key, bytes).await
    }
}

fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let records = std::iter::once(SnapshotRecord::Header {
        version: FORMAT_VERSION,
    })
    .chain(snapshot.projects.iter().cloned().map(SnapshotRecord::Project))
    .chain(snapshot.issues.iter().cloned().map(SnapshotRecord::Issue))
    .chain(
        snapshot
            .sequences
            .iter()
            .map(|(project_id, next)| SnapshotRecord::Sequence {
                project_id: project_id.clone(),
                next: *next,
            }),
    );
    Ok(taskflow_jsonl::encode_jsonl(records)?)
}

fn decode_snapshot(bytes: &[u8]) -> std::result::Result<Snapshot, String> {
    let (records, warnings) = taskflow_jsonl::decode_jsonl_resilient::<SnapshotRecord>(bytes);
    if let Some(first) = warnings.first() {
        return Err(first.to_string());
    }

    let mut records = records.into_iter();
    match records.next() {
        Some(SnapshotRecord::Header { version }) if version == FORMAT_VERSION => {}
        Some(SnapshotRecord::Header { version }) => {
            return Err(format!("unsupported snapshot version {version}"));
        }
        Some(_) => return Err("first record is not a header".to_string()),
        None => return Err("snapshot is empty".to_string()),
    }

    let mut snapshot = Snapshot::default();
    for record in records {
        match record {
            SnapshotRecord::Header { .. } => return Err("duplicate header".to_string()),
            SnapshotRecord::Project(project) => snapshot.projects.push(project),
            SnapshotRecord::Issue(issue) => snapshot.issues.push(issue),
            SnapshotRecord::Sequence { project_id, next } => {
                snapshot.sequences.insert(project_id, next);
            }
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueId, IssueStatus, IssueType, Priority, UserId};
    use crate::storage::MemoryKvStore;
    use chrono::Utc;
    use rstest::{fixture, rstest};

    #[fixture]
    fn snapshot() -> Snapshot {
        let now = Utc::now();
        let project = Project {
            id: ProjectId::new("prj-1"),
            name: "Demo".into(),
            key: "DMO".into(),
            description: String::new(),
            created_at: now,
        };
        let issue = Issue {
            id: IssueId::new("iss-1"),
            project_id: project.id.clone(),
            human_code: "DMO-101".into(),
            title: "Fix login".into(),
            description: String::new(),
            status: IssueStatus::InProgress,
            priority: Priority::High,
            issue_type: IssueType::Bug,
            creator: UserId::new("alice"),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 3,
        };
        Snapshot {
            sequences: BTreeMap::from([(project.id.clone(), 102)]),
            projects: vec![project],
            issues: vec![issue],
        }
    }

    #[rstest]
    #[tokio::test]
    async fn save_then_load_observes_new_data(snapshot: Snapshot) {
        let persistence = LocalPersistence::new(Arc::new(MemoryKvStore::new()));
        assert!(persistence.load().await.is_empty());

        persistence.save(&snapshot).await.unwrap();
        assert_eq!(persistence.load().await, snapshot);
    }

    #[rstest]
    #[case(b"not json at all".to_vec())]
    #[case(b"{\"record\":\"project\",\"id\":\"x\"}\n".to_vec())]
    #[case(b"{\"record\":\"header\",\"version\":99}\n".to_vec())]
    #[case(b"\n\n".to_vec())]
    #[case(vec![0xff, 0xfe, 0x00])]
    #[tokio::test]
    async fn corrupt_snapshot_loads_empty(#[case] bytes: Vec<u8>) {
        let store = MemoryKvStore::new();
        store.set(DEFAULT_SNAPSHOT_KEY, bytes).await.unwrap();

        let persistence = LocalPersistence::new(Arc::new(store));
        assert_eq!(persistence.load().await, Snapshot::default());
    }

    #[rstest]
    #[tokio::test]
    async fn one_bad_line_discards_everything(snapshot: Snapshot) {
        let store = MemoryKvStore::new();
        let persistence = LocalPersistence::new(Arc::new(store.clone()));
        persistence.save(&snapshot).await.unwrap();

        let mut bytes = store.get(DEFAULT_SNAPSHOT_KEY).await.unwrap().unwrap();
        bytes.extend_from_slice(b"{\"record\":\"issue\"\n");
        store.set(DEFAULT_SNAPSHOT_KEY, bytes).await.unwrap();

        assert!(persistence.load().await.is_empty());
    }
}
