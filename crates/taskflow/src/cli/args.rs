//! CLI argument structs for all commands.

use clap::{Parser, Subcommand};

use super::types::{IssueTypeArg, PriorityArg, RoleArg, StatusArg};
use super::validators::{
    validate_comment, validate_description, validate_issue_ref, validate_project_key,
    validate_title,
};

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// REST API base URL of a TaskFlow server (omit for local-only mode)
    #[arg(long)]
    pub api_url: Option<String>,

    /// WebSocket URL of the server's event channel
    #[arg(long, requires = "api_url")]
    pub ws_url: Option<String>,

    /// Keep nothing on disk (useful for demos)
    #[arg(long)]
    pub memory: bool,

    /// Suppress output messages
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `user` command
#[derive(Parser, Debug, Clone)]
pub struct UserArgs {
    /// User action
    #[command(subcommand)]
    pub action: UserAction,
}

/// User subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum UserAction {
    /// Register an account
    ///
    /// The first account may be an admin. Afterwards only a signed-in admin
    /// can create further admins.
    Add {
        /// Account name
        name: String,

        /// Password (prompted if omitted)
        #[arg(long)]
        password: Option<String>,

        /// Role of the new account
        #[arg(long, value_enum, default_value = "member")]
        role: RoleArg,
    },

    /// List accounts
    List,
}

/// Arguments for the `login` command
#[derive(Parser, Debug, Clone)]
pub struct LoginArgs {
    /// Account name
    pub name: String,

    /// Password (prompted if omitted)
    #[arg(long)]
    pub password: Option<String>,
}

/// Arguments for the `project` command
#[derive(Parser, Debug, Clone)]
pub struct ProjectArgs {
    /// Project action
    #[command(subcommand)]
    pub action: ProjectAction,
}

/// Project subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ProjectAction {
    /// Create a project
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        /// Issue code prefix, e.g. DMO for DMO-101
        #[arg(long, value_parser = validate_project_key)]
        key: String,

        /// Description
        #[arg(short = 'D', long, value_parser = validate_description, default_value = "")]
        description: String,
    },

    /// List projects
    List,
}

/// Arguments for the `create` command
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Project key or id
    #[arg(short = 'P', long)]
    pub project: String,

    /// Issue title (required, or prompted interactively)
    #[arg(long, value_parser = validate_title)]
    pub title: Option<String>,

    /// Detailed description
    #[arg(short = 'D', long, value_parser = validate_description, default_value = "")]
    pub description: String,

    /// Priority level
    #[arg(short, long, value_enum, default_value = "medium")]
    pub priority: PriorityArg,

    /// Issue type
    #[arg(short = 't', long = "type", value_enum, default_value = "task")]
    pub issue_type: IssueTypeArg,
}

/// Arguments for the `list` command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Only issues of this project (key or id)
    #[arg(short = 'P', long)]
    pub project: Option<String>,

    /// Filter by status
    #[arg(short, long, value_enum)]
    pub status: Option<StatusArg>,

    /// Case-insensitive match on title or code
    #[arg(short = 'q', long)]
    pub search: Option<String>,

    /// Show the newest issues first
    #[arg(long)]
    pub recent: bool,

    /// Maximum number of issues to display
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
}

/// Arguments for the `show` command
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Issue code or id
    #[arg(value_parser = validate_issue_ref)]
    pub issue: String,
}

/// Arguments for the `move` command
#[derive(Parser, Debug, Clone)]
pub struct MoveArgs {
    /// Issue code or id
    #[arg(value_parser = validate_issue_ref)]
    pub issue: String,

    /// Target column
    #[arg(value_enum)]
    pub status: StatusArg,
}

/// Arguments for the `update` command
#[derive(Parser, Debug, Clone)]
pub struct UpdateArgs {
    /// Issue code or id
    #[arg(value_parser = validate_issue_ref)]
    pub issue: String,

    /// New title
    #[arg(long, value_parser = validate_title)]
    pub title: Option<String>,

    /// New description
    #[arg(short = 'D', long, value_parser = validate_description)]
    pub description: Option<String>,

    /// New status
    #[arg(short, long, value_enum)]
    pub status: Option<StatusArg>,

    /// New priority
    #[arg(short, long, value_enum)]
    pub priority: Option<PriorityArg>,

    /// New issue type
    #[arg(short = 't', long = "type", value_enum)]
    pub issue_type: Option<IssueTypeArg>,
}

/// Arguments for the `delete` command
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Issue code or id
    #[arg(value_parser = validate_issue_ref)]
    pub issue: String,
}

/// Arguments for the `comment` command
#[derive(Parser, Debug, Clone)]
pub struct CommentArgs {
    /// Issue code or id
    #[arg(value_parser = validate_issue_ref)]
    pub issue: String,

    /// Comment text
    #[arg(value_parser = validate_comment)]
    pub text: String,
}

/// Arguments for the `board` command
#[derive(Parser, Debug, Clone)]
pub struct BoardArgs {
    /// Only issues of this project (key or id)
    #[arg(short = 'P', long)]
    pub project: Option<String>,
}

/// Arguments for the `stats` command
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Only issues of this project (key or id)
    #[arg(short = 'P', long, conflicts_with = "server")]
    pub project: Option<String>,

    /// Ask the server for its aggregate counts instead
    #[arg(long)]
    pub server: bool,
}
