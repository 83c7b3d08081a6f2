//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success/Done:   green   (done column, live sync, completed actions)
//!   - Warning/Active: yellow  (in progress, medium priority, stale sync)
//!   - Error:          red     (high priority, bugs, failed writes)
//!   - Info/Reference: cyan    (issue codes, project keys)
//!   - Muted:          dimmed  (field labels, backlog, low priority)
//!   - Emphasis:       bold    (section headers, column titles)

use crate::domain::{IssueStatus, IssueType, Priority};
use crate::store::SyncStatus;
use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Apply semantic "info" color (cyan) to text.
pub fn info(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.cyan().to_string()
}

/// Status label, colored by column.
pub(crate) fn colorize_status(status: IssueStatus, config: &OutputConfig) -> String {
    let text = status.label();
    if !config.use_colors {
        return text.to_string();
    }
    match status {
        IssueStatus::Backlog => text.dimmed().to_string(),
        IssueStatus::InProgress => text.yellow().to_string(),
        IssueStatus::Done => text.green().to_string(),
    }
}

/// Priority label, colored by urgency.
pub(crate) fn colorize_priority(priority: Priority, config: &OutputConfig) -> String {
    let text = priority.to_string();
    if !config.use_colors {
        return text;
    }
    match priority {
        Priority::High => text.red().bold().to_string(),
        Priority::Medium => text.yellow().to_string(),
        Priority::Low => text.dimmed().to_string(),
    }
}

/// Colorize an issue code or project key (cyan).
pub(crate) fn colorize_code(code: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return code.to_string();
    }
    code.cyan().to_string()
}

/// Sync status badge.
pub(crate) fn colorize_sync(status: SyncStatus, config: &OutputConfig) -> String {
    let text = status.to_string();
    if !config.use_colors {
        return text;
    }
    match status {
        SyncStatus::Live => text.green().to_string(),
        SyncStatus::Stale => text.yellow().bold().to_string(),
        SyncStatus::Connecting => text.yellow().to_string(),
        SyncStatus::LocalOnly => text.dimmed().to_string(),
    }
}

/// Get a colored status icon, with ASCII fallback support.
pub(crate) fn colored_status_icon(status: IssueStatus, config: &OutputConfig) -> String {
    let icon = if config.use_ascii {
        match status {
            IssueStatus::Backlog => "o",
            IssueStatus::InProgress => ">",
            IssueStatus::Done => "+",
        }
    } else {
        match status {
            IssueStatus::Backlog => "○",
            IssueStatus::InProgress => "▶",
            IssueStatus::Done => "✓",
        }
    };

    if !config.use_colors {
        return icon.to_string();
    }

    match status {
        IssueStatus::Backlog => icon.white().to_string(),
        IssueStatus::InProgress => icon.yellow().to_string(),
        IssueStatus::Done => icon.green().to_string(),
    }
}

/// Apply dimmed style to text (for labels/field names).
pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Apply bold style to text (for section headers).
pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

/// Get a type icon for issue types, with ASCII fallback support.
pub(crate) fn type_icon(issue_type: IssueType, config: &OutputConfig) -> &'static str {
    if config.use_ascii {
        match issue_type {
            IssueType::Task => "-",
            IssueType::Bug => "*",
            IssueType::Feature => "+",
            IssueType::Research => "?",
        }
    } else {
        match issue_type {
            IssueType::Task => "◇",
            IssueType::Bug => "●",
            IssueType::Feature => "★",
            IssueType::Research => "◎",
        }
    }
}

/// Get a colored type icon for issue types.
pub(crate) fn colored_type_icon(issue_type: IssueType, config: &OutputConfig) -> String {
    let icon = type_icon(issue_type, config);
    if !config.use_colors {
        return icon.to_string();
    }
    match issue_type {
        IssueType::Bug => icon.red().to_string(),
        IssueType::Feature => icon.green().to_string(),
        IssueType::Research => icon.magenta().to_string(),
        IssueType::Task => icon.blue().to_string(),
    }
}
