//! In-memory state of the issue store.

use super::pending::{BoundedSet, PendingWrites};
use super::sync::SyncStatus;
use crate::domain::{FIRST_SEQUENCE, Issue, IssueId, Project, ProjectId};
use crate::id_generation::{IdGenerator, is_provisional};
use crate::storage::Snapshot;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// How many deleted issue ids are remembered to refuse late resurrection.
pub(crate) const TOMBSTONE_CAPACITY: usize = 1024;

/// Map that remembers insertion order and can replace an entry in place.
#[derive(Debug, Clone)]
pub(crate) struct OrderedMap<K, V> {
    order: Vec<K>,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash + Clone, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> OrderedMap<K, V> {
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Replaces in place or appends.
    pub(crate) fn upsert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }

    /// Inserts at `index` (clamped), or replaces in place if present.
    pub(crate) fn insert_at(&mut self, index: usize, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            let index = index.min(self.order.len());
            self.order.insert(index, key);
        }
    }

    /// Removes an entry, returning its former position.
    pub(crate) fn remove(&mut self, key: &K) -> Option<(usize, V)> {
        let value = self.entries.remove(key)?;
        let index = self.order.iter().position(|k| k == key)?;
        self.order.remove(index);
        Some((index, value))
    }

    /// Swaps the entry under `old` for `new_key`/`value` at the same
    /// position. Appends when `old` is gone.
    pub(crate) fn rekey(&mut self, old: &K, new_key: K, value: V) {
        match self.remove(old) {
            Some((index, _)) => self.insert_at(index, new_key, value),
            None => self.upsert(new_key, value),
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &V> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        let entries = &mut self.entries;
        self.order.retain(|k| {
            let keep_it = entries.get(k).is_some_and(|v| keep(k, v));
            if !keep_it {
                entries.remove(k);
            }
            keep_it
        });
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OrderedMap<K, V> {
    pub(crate) fn to_vec(&self) -> Vec<V> {
        self.values().cloned().collect()
    }
}

/// Id generators used when this process mints ids.
#[derive(Debug, Clone)]
pub(crate) struct Ids {
    pub(crate) project: IdGenerator,
    pub(crate) issue: IdGenerator,
    pub(crate) comment: IdGenerator,
    pub(crate) provisional: IdGenerator,
}

impl Default for Ids {
    fn default() -> Self {
        Self {
            project: IdGenerator::new("prj"),
            issue: IdGenerator::new("iss"),
            comment: IdGenerator::new("cmt"),
            provisional: IdGenerator::provisional(),
        }
    }
}

/// Everything the store guards behind its lock.
pub(crate) struct StoreState {
    pub(crate) projects: OrderedMap<ProjectId, Project>,
    pub(crate) issues: OrderedMap<IssueId, Issue>,
    /// Next sequence per project when this process is the authority.
    pub(crate) sequences: BTreeMap<ProjectId, u64>,
    pub(crate) issue_aliases: HashMap<IssueId, IssueId>,
    pub(crate) project_aliases: HashMap<ProjectId, ProjectId>,
    pub(crate) pending: PendingWrites,
    /// Issues the authority is known to have deleted.
    pub(crate) deleted: BoundedSet<IssueId>,
    pub(crate) ids: Ids,
    pub(crate) status: SyncStatus,
}

impl StoreState {
    pub(crate) fn from_snapshot(snapshot: Snapshot, status: SyncStatus) -> Self {
        let mut ids = Ids::default();
        let mut projects = OrderedMap::default();
        for project in snapshot.projects {
            ids.project.register_id(project.id.as_str());
            ids.provisional.register_id(project.id.as_str());
            projects.upsert(project.id.clone(), project);
        }
        let mut issues = OrderedMap::default();
        for issue in snapshot.issues {
            ids.issue.register_id(issue.id.as_str());
            ids.provisional.register_id(issue.id.as_str());
            for comment in &issue.comments {
                ids.comment.register_id(comment.id.as_str());
            }
            issues.upsert(issue.id.clone(), issue);
        }

        Self {
            projects,
            issues,
            sequences: snapshot.sequences,
            issue_aliases: HashMap::new(),
            project_aliases: HashMap::new(),
            pending: PendingWrites::default(),
            deleted: BoundedSet::new(TOMBSTONE_CAPACITY),
            ids,
            status,
        }
    }

    pub(crate) fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            projects: self.projects.to_vec(),
            issues: self.issues.to_vec(),
            sequences: self.sequences.clone(),
        }
    }

    /// Follows the provisional-to-authoritative alias, if any.
    pub(crate) fn resolve_issue(&self, id: &IssueId) -> IssueId {
        self.issue_aliases.get(id).unwrap_or(id).clone()
    }

    pub(crate) fn resolve_project(&self, id: &ProjectId) -> ProjectId {
        self.project_aliases.get(id).unwrap_or(id).clone()
    }

    pub(crate) fn project_list(&self) -> Vec<Project> {
        self.projects.to_vec()
    }

    /// Looks an issue up by id, provisional alias or human code.
    pub(crate) fn find_issue(&self, needle: &str) -> Option<&Issue> {
        let id = self.resolve_issue(&IssueId::new(needle));
        self.issues.get(&id).or_else(|| {
            self.issues
                .values()
                .find(|issue| issue.human_code.eq_ignore_ascii_case(needle))
        })
    }

    /// Looks a project up by id or key.
    pub(crate) fn find_project(&self, needle: &str) -> Option<&Project> {
        let id = self.resolve_project(&ProjectId::new(needle));
        self.projects.get(&id).or_else(|| {
            self.projects
                .values()
                .find(|project| project.key.eq_ignore_ascii_case(needle))
        })
    }

    fn highest_sequence(&self, project: &ProjectId) -> Option<u64> {
        self.issues
            .values()
            .filter(|issue| &issue.project_id == project)
            .filter_map(Issue::sequence)
            .max()
    }

    /// Allocates the next sequence number as the authority.
    pub(crate) fn allocate_sequence(&mut self, project: &ProjectId) -> u64 {
        let floor = self
            .highest_sequence(project)
            .map_or(FIRST_SEQUENCE, |seq| seq + 1);
        let next = self
            .sequences
            .get(project)
            .copied()
            .unwrap_or(FIRST_SEQUENCE)
            .max(floor);
        self.sequences.insert(project.clone(), next + 1);
        next
    }

    /// Best guess of the code the authority will assign, for display
    /// until the create is acknowledged.
    pub(crate) fn guess_sequence(&self, project: &ProjectId) -> u64 {
        self.highest_sequence(project)
            .map_or(FIRST_SEQUENCE, |seq| seq + 1)
    }

    /// Drops an issue the authority deleted and refuses it from now on.
    /// Returns whether it was held.
    pub(crate) fn bury_issue(&mut self, id: &IssueId) -> bool {
        self.deleted.insert(id.clone());
        self.issues.remove(id).is_some()
    }

    pub(crate) fn is_buried(&self, id: &IssueId) -> bool {
        self.deleted.contains(id)
    }

    /// Replaces or inserts an authoritative issue, unless a newer revision
    /// is already held or the issue was deleted. Returns whether state
    /// changed.
    pub(crate) fn reconcile_issue(&mut self, incoming: Issue) -> bool {
        if self.is_buried(&incoming.id) {
            return false;
        }
        let keep_stored = self
            .issues
            .get(&incoming.id)
            .is_some_and(|stored| stored.revision > incoming.revision || *stored == incoming);
        if keep_stored {
            return false;
        }
        self.issues.upsert(incoming.id.clone(), incoming);
        true
    }

    /// Provisional entities whose create is no longer in flight.
    pub(crate) fn stale_provisional_count(&self) -> usize {
        let projects = self
            .projects
            .values()
            .filter(|p| is_provisional(p.id.as_str()))
            .filter(|p| !self.pending.has_create(p.id.as_str()))
            .count();
        let issues = self
            .issues
            .values()
            .filter(|i| is_provisional(i.id.as_str()))
            .filter(|i| !self.pending.has_create(i.id.as_str()))
            .count();
        projects + issues
    }
}
