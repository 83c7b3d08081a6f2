//! Output formatting for CLI commands.
//!
//! Every printer takes an [`OutputMode`]: human-readable text for people,
//! pretty JSON for scripts. Text output honors `NO_COLOR`,
//! `TASKFLOW_COLOR`, `TASKFLOW_ASCII` and `TASKFLOW_MAX_WIDTH`.
//!
//! Submodules:
//! - [`color`]: Color and styling helpers (semantic colors, icons)
//! - [`board`]: Kanban board rendering sized to the terminal

pub mod board;
pub mod color;

use crate::domain::{Issue, Project};
use crate::remote::ServerStatistics;
use crate::store::SyncStatus;
use crate::view::Statistics;
use serde::Serialize;
use std::env;
use std::io::{self, Write};

pub use board::print_board;
pub use color::{error, info, success, warning};

use color::{
    bold, colored_status_icon, colored_type_icon, colorize_code, colorize_priority,
    colorize_status, colorize_sync, dimmed,
};

const DEFAULT_TERMINAL_WIDTH: u16 = 80;
const DEFAULT_MAX_CONTENT_WIDTH: usize = 100;

/// Configuration for output formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Maximum content width for text wrapping.
    pub max_width: usize,
    /// Whether to use ASCII-only icons instead of Unicode.
    pub use_ascii: bool,
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create a new `OutputConfig` with explicit values.
    pub fn new(max_width: usize, use_ascii: bool, use_colors: bool) -> Self {
        Self {
            max_width,
            use_ascii,
            use_colors,
        }
    }

    /// Create an `OutputConfig` by reading from environment variables.
    ///
    /// Reads:
    /// - `TASKFLOW_MAX_WIDTH`: Maximum content width (default: 100)
    /// - `TASKFLOW_ASCII`: Set to "1" or "true" for ASCII-only icons
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `TASKFLOW_COLOR`: Set to "0" or "false" to disable colors
    pub fn from_env() -> Self {
        let max_width = match env::var("TASKFLOW_MAX_WIDTH") {
            Ok(s) if !s.is_empty() => s.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    env_var = "TASKFLOW_MAX_WIDTH",
                    value = %s,
                    default = DEFAULT_MAX_CONTENT_WIDTH,
                    "Invalid value, using default"
                );
                DEFAULT_MAX_CONTENT_WIDTH
            }),
            _ => DEFAULT_MAX_CONTENT_WIDTH,
        };

        let use_ascii = env::var("TASKFLOW_ASCII")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        // https://no-color.org/
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("TASKFLOW_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);

        Self {
            max_width,
            use_ascii,
            use_colors,
        }
    }

    /// Usable width: the terminal width capped at `max_width`.
    pub fn content_width(&self) -> usize {
        terminal_width().min(self.max_width)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_CONTENT_WIDTH,
            use_ascii: false,
            use_colors: true,
        }
    }
}

/// Get the current terminal width, falling back to default if detection fails.
fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map_or(DEFAULT_TERMINAL_WIDTH, |(w, _)| w.0)
        .into()
}

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

fn with_stdout<F>(f: F) -> io::Result<()>
where
    F: FnOnce(&mut io::StdoutLock<'_>, &OutputConfig) -> io::Result<()>,
{
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    f(&mut handle, &OutputConfig::from_env())
}

/// Print a JSON-formatted result for any serializable value
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    with_stdout(|w, _| write_json(w, value))
}

fn write_json<W: Write, T: Serialize + ?Sized>(w: &mut W, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(w, "{json}")
}

/// Print a simple message
pub fn print_message(msg: &str) -> io::Result<()> {
    with_stdout(|w, _| writeln!(w, "{msg}"))
}

/// Print a one-line summary of an issue
pub fn print_issue(issue: &Issue, mode: OutputMode) -> io::Result<()> {
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_issue_line(w, issue, config),
        OutputMode::Json => write_json(w, issue),
    })
}

/// Print a list of issues
pub fn print_issues(issues: &[&Issue], mode: OutputMode) -> io::Result<()> {
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_issues_text(w, issues, config),
        OutputMode::Json => write_json(w, issues),
    })
}

/// Print an issue with description and comments (for `show`)
pub fn print_issue_details(issue: &Issue, mode: OutputMode) -> io::Result<()> {
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_issue_details(w, issue, config),
        OutputMode::Json => write_json(w, issue),
    })
}

/// Print the project list
pub fn print_projects(projects: &[Project], mode: OutputMode) -> io::Result<()> {
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_projects_text(w, projects, config),
        OutputMode::Json => write_json(w, projects),
    })
}

/// Print locally computed statistics
pub fn print_statistics(
    stats: &Statistics,
    status: SyncStatus,
    mode: OutputMode,
) -> io::Result<()> {
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_statistics_text(w, stats, status, config),
        OutputMode::Json => write_json(w, stats),
    })
}

/// Print statistics as reported by the server
pub fn print_server_statistics(stats: &ServerStatistics, mode: OutputMode) -> io::Result<()> {
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_server_statistics_text(w, stats, config),
        OutputMode::Json => write_json(w, stats),
    })
}

fn write_issue_line<W: Write>(w: &mut W, issue: &Issue, config: &OutputConfig) -> io::Result<()> {
    writeln!(
        w,
        "{} {}  {}  {}  {}",
        colored_status_icon(issue.status, config),
        colorize_code(&issue.human_code, config),
        colored_type_icon(issue.issue_type, config),
        colorize_priority(issue.priority, config),
        issue.title
    )
}

fn write_issues_text<W: Write>(
    w: &mut W,
    issues: &[&Issue],
    config: &OutputConfig,
) -> io::Result<()> {
    if issues.is_empty() {
        writeln!(w, "No issues found.")?;
        return Ok(());
    }

    writeln!(w, "Found {} issue(s):", issues.len())?;
    writeln!(w)?;
    for issue in issues {
        write_issue_line(w, issue, config)?;
    }
    Ok(())
}

fn write_issue_details<W: Write>(
    w: &mut W,
    issue: &Issue,
    config: &OutputConfig,
) -> io::Result<()> {
    let width = config.content_width();

    writeln!(
        w,
        "{} {}: {}",
        colored_status_icon(issue.status, config),
        colorize_code(&issue.human_code, config),
        bold(&issue.title, config)
    )?;
    writeln!(w)?;
    writeln!(
        w,
        "{} {}",
        dimmed("Status:  ", config),
        colorize_status(issue.status, config)
    )?;
    writeln!(
        w,
        "{} {}",
        dimmed("Priority:", config),
        colorize_priority(issue.priority, config)
    )?;
    writeln!(w, "{} {}", dimmed("Type:    ", config), issue.issue_type)?;
    writeln!(w, "{} {}", dimmed("Creator: ", config), issue.creator)?;
    writeln!(
        w,
        "{} {}",
        dimmed("Created: ", config),
        issue.created_at.format("%Y-%m-%d %H:%M UTC")
    )?;
    writeln!(w, "{} {}", dimmed("Id:      ", config), issue.id)?;

    if !issue.description.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}:", bold("Description", config))?;
        for line in wrap_text(&issue.description, width.saturating_sub(2)) {
            writeln!(w, "  {line}")?;
        }
    }

    if !issue.comments.is_empty() {
        writeln!(w)?;
        writeln!(w, "{} ({}):", bold("Comments", config), issue.comments.len())?;
        for comment in &issue.comments {
            writeln!(
                w,
                "  {} {}",
                info(comment.author.as_str(), config),
                dimmed(&comment.created_at.format("%Y-%m-%d %H:%M").to_string(), config)
            )?;
            for line in wrap_text(&comment.text, width.saturating_sub(4)) {
                writeln!(w, "    {line}")?;
            }
        }
    }
    Ok(())
}

fn write_projects_text<W: Write>(
    w: &mut W,
    projects: &[Project],
    config: &OutputConfig,
) -> io::Result<()> {
    if projects.is_empty() {
        writeln!(w, "No projects yet. Create one with 'taskflow project create'.")?;
        return Ok(());
    }
    for project in projects {
        writeln!(
            w,
            "{:<12} {}",
            colorize_code(&project.key, config),
            project.name
        )?;
        if !project.description.is_empty() {
            writeln!(w, "{:<12} {}", "", dimmed(&project.description, config))?;
        }
    }
    Ok(())
}

fn write_statistics_text<W: Write>(
    w: &mut W,
    stats: &Statistics,
    status: SyncStatus,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(w, "{}", bold("Issue Statistics", config))?;
    writeln!(w, "================")?;
    writeln!(w)?;
    writeln!(w, "Total:    {}", stats.total)?;
    writeln!(w, "Done:     {}%", stats.percent_done)?;
    writeln!(w, "Sync:     {}", colorize_sync(status, config))?;
    writeln!(w)?;

    writeln!(w, "{}", bold("By status:", config))?;
    for (status, count) in &stats.count_by_status {
        writeln!(w, "  {:<14} {count}", status.label())?;
    }
    writeln!(w, "{}", bold("By priority:", config))?;
    for (priority, count) in &stats.count_by_priority {
        writeln!(w, "  {:<14} {count}", priority.to_string())?;
    }
    writeln!(w, "{}", bold("By type:", config))?;
    for (issue_type, count) in &stats.count_by_type {
        writeln!(w, "  {:<14} {count}", issue_type.to_string())?;
    }
    Ok(())
}

fn write_server_statistics_text<W: Write>(
    w: &mut W,
    stats: &ServerStatistics,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(w, "{}", bold("Server Statistics", config))?;
    writeln!(w, "=================")?;
    writeln!(w)?;
    writeln!(w, "Projects: {}", stats.total_projects)?;
    writeln!(w, "Issues:   {}", stats.total_issues)?;
    let mut by_status: Vec<_> = stats.issues_by_status.iter().collect();
    by_status.sort();
    for (status, count) in by_status {
        writeln!(w, "  {:<14} {count}", status.label())?;
    }
    if !stats.recent_issues.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", bold("Recent:", config))?;
        for issue in &stats.recent_issues {
            write_issue_line(w, issue, config)?;
        }
    }
    Ok(())
}

/// Wrap text to the specified width, preserving blank lines.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    text.lines()
        .flat_map(|line| {
            if line.trim().is_empty() {
                vec![String::new()]
            } else {
                textwrap::wrap(line, max_width.max(1))
                    .into_iter()
                    .map(std::borrow::Cow::into_owned)
                    .collect()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Comment, CommentId, IssueId, IssueStatus, IssueType, Priority, ProjectId};
    use crate::domain::{UserId, human_code};
    use crate::view;
    use chrono::Utc;

    fn plain() -> OutputConfig {
        OutputConfig::new(80, true, false)
    }

    fn issue(title: &str) -> Issue {
        let now = Utc::now();
        Issue {
            id: IssueId::new("iss-1"),
            project_id: ProjectId::new("prj-1"),
            human_code: human_code("DMO", 101),
            title: title.into(),
            description: String::new(),
            status: IssueStatus::InProgress,
            priority: Priority::High,
            issue_type: IssueType::Bug,
            creator: UserId::new("alice"),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 1,
        }
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn issue_line_shows_code_and_title() {
        let out = render(|w| write_issue_line(w, &issue("Fix login"), &plain()));
        assert_eq!(out, "> DMO-101  *  high  Fix login\n");
    }

    #[test]
    fn empty_issue_list_says_so() {
        let out = render(|w| write_issues_text(w, &[], &plain()));
        assert_eq!(out, "No issues found.\n");
    }

    #[test]
    fn details_list_comments_in_order() {
        let mut issue = issue("Fix login");
        for (n, text) in ["first", "second"].into_iter().enumerate() {
            issue.comments.push(Comment {
                id: CommentId::new(format!("cmt-{n}")),
                issue_id: issue.id.clone(),
                author: UserId::new("bob"),
                text: text.into(),
                created_at: Utc::now(),
            });
        }
        let out = render(|w| write_issue_details(w, &issue, &plain()));
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        assert!(first < second);
        assert!(out.contains("Comments (2):"));
    }

    #[test]
    fn statistics_text_includes_percent() {
        let mut done = issue("a");
        done.status = IssueStatus::Done;
        let stats = view::statistics(&[done, issue("b")]);
        let out = render(|w| write_statistics_text(w, &stats, SyncStatus::LocalOnly, &plain()));
        assert!(out.contains("Done:     50%"));
        assert!(out.contains("local only"));
    }

    #[test]
    fn json_is_pretty_printed() {
        let out = render(|w| write_json(w, &issue("Fix login")));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["human_code"], "DMO-101");
        assert_eq!(value["type"], "bug");
    }

    #[test]
    fn wrap_text_preserves_blank_lines() {
        let lines = wrap_text("one two three\n\nfour", 7);
        assert_eq!(lines, vec!["one two", "three", "", "four"]);
    }
}
