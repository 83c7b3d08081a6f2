//! Bookkeeping for writes that have been applied optimistically but not yet
//! acknowledged by the remote authority.

use crate::domain::{CommentId, Issue, IssueId, ProjectId};
use crate::remote::CorrelationToken;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use tokio::sync::watch;

/// How many acknowledged tokens are remembered for echo suppression.
pub(crate) const RECENT_TOKEN_CAPACITY: usize = 256;

/// Set that forgets its oldest entries beyond a fixed capacity.
#[derive(Debug)]
pub(crate) struct BoundedSet<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
    capacity: usize,
}

impl<T: Eq + Hash + Clone> BoundedSet<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    pub(crate) fn insert(&mut self, value: T) {
        if !self.members.insert(value.clone()) {
            return;
        }
        self.order.push_back(value);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }

    pub(crate) fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }
}

/// What an in-flight write did locally, with enough to undo it.
#[derive(Debug, Clone)]
pub(crate) enum PendingKind {
    CreateProject {
        provisional: ProjectId,
    },
    CreateIssue {
        provisional: IssueId,
    },
    Update {
        issue: IssueId,
        before: Box<Issue>,
    },
    Delete {
        removed: Box<Issue>,
        position: usize,
    },
    Comment {
        issue: IssueId,
        provisional: CommentId,
    },
}

/// Outcome of a create, as seen by operations queued behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CreateOutcome {
    InFlight,
    Acked(String),
    Failed,
}

pub(crate) struct PendingWrites {
    ops: HashMap<CorrelationToken, PendingKind>,
    recent: BoundedSet<CorrelationToken>,
    creates: HashMap<String, watch::Sender<CreateOutcome>>,
}

impl Default for PendingWrites {
    fn default() -> Self {
        Self {
            ops: HashMap::new(),
            recent: BoundedSet::new(RECENT_TOKEN_CAPACITY),
            creates: HashMap::new(),
        }
    }
}

impl PendingWrites {
    pub(crate) fn begin(&mut self, token: CorrelationToken, kind: PendingKind) {
        let provisional = match &kind {
            PendingKind::CreateProject { provisional } => Some(provisional.to_string()),
            PendingKind::CreateIssue { provisional } => Some(provisional.to_string()),
            _ => None,
        };
        if let Some(provisional) = provisional {
            let (tx, _rx) = watch::channel(CreateOutcome::InFlight);
            self.creates.insert(provisional, tx);
        }
        self.ops.insert(token, kind);
    }

    /// Ends an operation and remembers its token so late echoes are still
    /// recognised.
    pub(crate) fn finish(&mut self, token: &CorrelationToken) -> Option<PendingKind> {
        let kind = self.ops.remove(token)?;
        self.recent.insert(token.clone());
        Some(kind)
    }

    /// Whether `token` belongs to one of this client's writes.
    pub(crate) fn is_own(&self, token: &CorrelationToken) -> bool {
        self.ops.contains_key(token) || self.recent.contains(token)
    }

    pub(crate) fn has_create(&self, provisional: &str) -> bool {
        self.creates.contains_key(provisional)
    }

    /// Receiver that resolves when the create of `provisional` completes.
    pub(crate) fn watch_create(&self, provisional: &str) -> Option<watch::Receiver<CreateOutcome>> {
        self.creates.get(provisional).map(watch::Sender::subscribe)
    }

    pub(crate) fn resolve_create(&mut self, provisional: &str, outcome: CreateOutcome) {
        if let Some(tx) = self.creates.remove(provisional) {
            tx.send_replace(outcome);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    /// Issues carrying an unacknowledged update or comment, whose local
    /// copy must survive a reload.
    pub(crate) fn optimistic_issues(&self) -> HashSet<IssueId> {
        self.ops
            .values()
            .filter_map(|kind| match kind {
                PendingKind::Update { issue, .. } | PendingKind::Comment { issue, .. } => {
                    Some(issue.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Issues with an unacknowledged delete.
    pub(crate) fn deleting(&self) -> HashSet<IssueId> {
        self.ops
            .values()
            .filter_map(|kind| match kind {
                PendingKind::Delete { removed, .. } => Some(removed.id.clone()),
                _ => None,
            })
            .collect()
    }
}
