//! Domain types for issue tracking.
//!
//! This module contains the core records of the taskflow model: projects,
//! issues and their append-only comments, together with the construction and
//! validation rules every mutation goes through before it touches state.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// First sequence number handed out in a project; codes start at `KEY-101`.
pub const FIRST_SEQUENCE: u64 = 101;

/// Maximum length of an issue title, in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of descriptions and comment text, in characters.
pub const MAX_TEXT_LENGTH: usize = 10_000;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        /// Accepts a JSON string or an integer, as older backends use
        /// numeric primary keys.
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Raw {
                    Text(String),
                    Number(i64),
                }

                Ok(Self(match Raw::deserialize(deserializer)? {
                    Raw::Text(text) => text,
                    Raw::Number(number) => number.to_string(),
                }))
            }
        }

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a project
    ProjectId
);
string_id!(
    /// Unique identifier for an issue
    IssueId
);
string_id!(
    /// Unique identifier for a comment
    CommentId
);
string_id!(
    /// Reference to a user account
    UserId
);

/// A named container of issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,

    /// Display name
    pub name: String,

    /// Short uppercase key used as the issue code prefix. Immutable.
    pub key: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Creation timestamp
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A unit of trackable work within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier
    pub id: IssueId,

    /// Owning project
    #[serde(alias = "projectId")]
    pub project_id: ProjectId,

    /// Human-readable code, `{project.key}-{sequence}`. Assigned once.
    #[serde(alias = "humanCode", alias = "code")]
    pub human_code: String,

    /// Issue title
    pub title: String,

    /// Issue description
    #[serde(default)]
    pub description: String,

    /// Current board column
    #[serde(default)]
    pub status: IssueStatus,

    /// Priority level
    #[serde(default)]
    pub priority: Priority,

    /// Issue type
    #[serde(rename = "type", alias = "issue_type", default)]
    pub issue_type: IssueType,

    /// User who created the issue
    pub creator: UserId,

    /// Comments in insertion order
    #[serde(default)]
    pub comments: Vec<Comment>,

    /// Creation timestamp
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    #[serde(default = "Utc::now", alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,

    /// Monotonic revision assigned by whoever is authoritative
    #[serde(default)]
    pub revision: u64,
}

impl Issue {
    /// Sequence number embedded in the human code, if it parses.
    pub fn sequence(&self) -> Option<u64> {
        parse_human_code(&self.human_code).map(|(_, seq)| seq)
    }

    /// Everything observable about the issue except bookkeeping that only
    /// ever moves forward.
    pub fn same_content(&self, other: &Issue) -> bool {
        let mut a = self.clone();
        a.updated_at = other.updated_at;
        a.revision = other.revision;
        a == *other
    }
}

/// A note attached to an issue. Never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier
    pub id: CommentId,

    /// Issue the comment belongs to
    #[serde(alias = "issueId")]
    pub issue_id: IssueId,

    /// Author reference
    pub author: UserId,

    /// Comment body
    pub text: String,

    /// Creation timestamp
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Status of an issue. Any status can move to any other.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum IssueStatus {
    /// Not started
    #[default]
    #[serde(rename = "backlog", alias = "Backlog", alias = "To Do", alias = "todo")]
    Backlog,

    /// Being worked on
    #[serde(rename = "in_progress", alias = "In Progress", alias = "InProgress")]
    InProgress,

    /// Finished
    #[serde(rename = "done", alias = "Done")]
    Done,
}

impl IssueStatus {
    /// All statuses in board order.
    pub const ALL: [IssueStatus; 3] = [Self::Backlog, Self::InProgress, Self::Done];

    /// Column heading for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Backlog => "Backlog",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        })
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "backlog" | "todo" | "to_do" => Ok(Self::Backlog),
            "in_progress" | "inprogress" | "doing" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!(
                "Invalid status: '{s}'. Must be one of: backlog, in_progress, done"
            )),
        }
    }
}

/// Priority level of an issue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Can wait
    #[serde(rename = "low", alias = "Low")]
    Low,

    /// Normal work
    #[default]
    #[serde(rename = "medium", alias = "Medium")]
    Medium,

    /// Urgent
    #[serde(rename = "high", alias = "High")]
    High,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Priority; 3] = [Self::Low, Self::Medium, Self::High];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!(
                "Invalid priority: '{s}'. Must be one of: low, medium, high"
            )),
        }
    }
}

/// Kind of work an issue represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum IssueType {
    /// General task
    #[default]
    #[serde(rename = "task", alias = "Task")]
    Task,

    /// Bug fix
    #[serde(rename = "bug", alias = "Bug")]
    Bug,

    /// New feature
    #[serde(rename = "feature", alias = "Feature")]
    Feature,

    /// Investigation
    #[serde(rename = "research", alias = "Research")]
    Research,
}

impl IssueType {
    /// All issue types.
    pub const ALL: [IssueType; 4] = [Self::Task, Self::Bug, Self::Feature, Self::Research];
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Research => "research",
        })
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "research" => Ok(Self::Research),
            _ => Err(format!(
                "Invalid issue type: '{s}'. Must be one of: task, bug, feature, research"
            )),
        }
    }
}

/// Draft for creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    /// Display name
    pub name: String,

    /// Issue code prefix
    pub key: String,

    /// Description
    #[serde(default)]
    pub description: String,
}

impl NewProject {
    /// Validates the draft against the already known projects and returns a
    /// normalized copy.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty name, a malformed key or a
    /// key already used by one of `existing`.
    pub fn validate(&self, existing: &[Project]) -> Result<NewProject, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyProjectName);
        }
        check_length("name", name, MAX_TITLE_LENGTH)?;
        check_length("description", &self.description, MAX_TEXT_LENGTH)?;
        validate_project_key(&self.key)?;
        if existing.iter().any(|p| p.key == self.key) {
            return Err(ValidationError::DuplicateProjectKey(self.key.clone()));
        }
        Ok(NewProject {
            name: name.to_string(),
            key: self.key.clone(),
            description: self.description.clone(),
        })
    }

    /// Builds the project record.
    pub fn into_project(self, id: ProjectId, now: DateTime<Utc>) -> Project {
        Project {
            id,
            name: self.name,
            key: self.key,
            description: self.description,
            created_at: now,
        }
    }
}

/// Draft for creating an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    /// Project the issue is filed under
    pub project_id: ProjectId,

    /// Title (trimmed, non-empty)
    pub title: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Priority level
    #[serde(default)]
    pub priority: Priority,

    /// Issue type
    #[serde(rename = "type", default)]
    pub issue_type: IssueType,
}

/// Draft for a comment sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    /// Author reference
    pub author: UserId,

    /// Comment body, already validated
    pub text: String,
}

/// Field replacements for an existing issue. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// New status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IssueStatus>,

    /// New priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    /// New issue type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
}

impl IssueUpdate {
    /// An update that only moves the issue to another column.
    pub fn status(status: IssueStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
    }

    /// Validates the replacement values without touching any issue.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty or oversized title or an
    /// oversized description.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            check_length("description", description, MAX_TEXT_LENGTH)?;
        }
        Ok(())
    }

    /// Replaces the named fields of `issue`. The caller is expected to have
    /// validated the update.
    pub fn apply_to(&self, issue: &mut Issue, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            issue.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            issue.description.clone_from(description);
        }
        if let Some(status) = self.status {
            issue.status = status;
        }
        if let Some(priority) = self.priority {
            issue.priority = priority;
        }
        if let Some(issue_type) = self.issue_type {
            issue.issue_type = issue_type;
        }
        issue.updated_at = now;
    }
}

/// Validates a project key: 2-10 uppercase letters or digits, starting with
/// a letter.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidProjectKey`] describing the problem.
pub fn validate_project_key(key: &str) -> Result<(), ValidationError> {
    let invalid = |reason| {
        Err(ValidationError::InvalidProjectKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.len() < 2 || key.len() > 10 {
        return invalid("must be 2-10 characters");
    }
    if !key.starts_with(|c: char| c.is_ascii_uppercase()) {
        return invalid("must start with an uppercase letter");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return invalid("may only contain uppercase letters and digits");
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    check_length("title", title, MAX_TITLE_LENGTH)?;
    Ok(title.to_string())
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Formats a human code.
pub fn human_code(key: &str, sequence: u64) -> String {
    format!("{key}-{sequence}")
}

/// Splits a human code into key and sequence.
pub fn parse_human_code(code: &str) -> Option<(&str, u64)> {
    let (key, seq) = code.rsplit_once('-')?;
    let seq = seq.parse().ok()?;
    (!key.is_empty()).then_some((key, seq))
}

/// Validates an issue draft against its project.
///
/// `project` is the result of looking up `draft.project_id`; `None` means
/// the project is unknown.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownProject`], [`ValidationError::EmptyTitle`]
/// or [`ValidationError::TooLong`].
pub fn validate_new_issue(
    project: Option<&Project>,
    draft: &NewIssue,
) -> Result<NewIssue, ValidationError> {
    let Some(project) = project.filter(|p| p.id == draft.project_id) else {
        return Err(ValidationError::UnknownProject(
            draft.project_id.to_string(),
        ));
    };
    let title = validate_title(&draft.title)?;
    check_length("description", &draft.description, MAX_TEXT_LENGTH)?;
    Ok(NewIssue {
        project_id: project.id.clone(),
        title,
        ..draft.clone()
    })
}

/// Creates a new issue in `project` with the given sequence number.
///
/// The issue starts in [`IssueStatus::Backlog`] with no comments.
///
/// # Errors
///
/// See [`validate_new_issue`].
pub fn create_issue(
    project: Option<&Project>,
    draft: &NewIssue,
    creator: &UserId,
    id: IssueId,
    sequence: u64,
    now: DateTime<Utc>,
) -> Result<Issue, ValidationError> {
    let draft = validate_new_issue(project, draft)?;
    let key = project.map(|p| p.key.as_str()).unwrap_or_default();
    Ok(Issue {
        id,
        project_id: draft.project_id,
        human_code: human_code(key, sequence),
        title: draft.title,
        description: draft.description,
        status: IssueStatus::Backlog,
        priority: draft.priority,
        issue_type: draft.issue_type,
        creator: creator.clone(),
        comments: Vec::new(),
        created_at: now,
        updated_at: now,
        revision: 0,
    })
}

/// Validates comment text, returning it trimmed.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyComment`] or [`ValidationError::TooLong`].
pub fn validate_comment_text(text: &str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyComment);
    }
    check_length("comment", text, MAX_TEXT_LENGTH)?;
    Ok(text.to_string())
}

/// Appends a comment to `issue` and returns a copy of it.
///
/// # Errors
///
/// See [`validate_comment_text`]. The issue is untouched on error.
pub fn add_comment(
    issue: &mut Issue,
    author: &UserId,
    text: &str,
    id: CommentId,
    now: DateTime<Utc>,
) -> Result<Comment, ValidationError> {
    let text = validate_comment_text(text)?;
    let comment = Comment {
        id,
        issue_id: issue.id.clone(),
        author: author.clone(),
        text,
        created_at: now,
    };
    issue.comments.push(comment.clone());
    Ok(comment)
}
