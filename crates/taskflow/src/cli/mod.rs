//! CLI argument parsing and command dispatch.
//!
//! This module provides the command-line interface for taskflow using clap's derive API.
//! Each command has its own argument struct with validation and helpful error messages.
//!
//! # Commands
//!
//! - `init`: Initialize a workspace, optionally bound to a server
//! - `user`, `login`, `logout`, `whoami`: Accounts and the signed-in session
//! - `project`: Create and list projects
//! - `create`, `list`, `show`, `move`, `update`, `delete`, `comment`: Issues
//! - `board`: Kanban view
//! - `stats`: Counts per status, priority and type
//! - `sync`, `watch`: Talk to the server
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! taskflow project create --name Demo --key DMO
//! taskflow create -P DMO --title "Fix login" --priority high --type bug
//! taskflow move DMO-101 in_progress
//! taskflow board
//! ```

mod args;
mod execute;
mod types;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

// Re-export argument structs
pub use args::{
    BoardArgs, CommentArgs, CreateArgs, DeleteArgs, InitArgs, ListArgs, LoginArgs, MoveArgs,
    ProjectAction, ProjectArgs, ShowArgs, StatsArgs, UpdateArgs, UserAction, UserArgs,
};

// Re-export types
pub use types::{IssueTypeArg, PriorityArg, RoleArg, StatusArg};

// Re-export validators for external use
pub use validators::{
    validate_comment, validate_description, validate_issue_ref, validate_project_key,
    validate_title,
};

/// TaskFlow - kanban issue tracking from the terminal
///
/// Works offline against a local snapshot in `.taskflow/`, or against a
/// TaskFlow server when one is configured at init time.
#[derive(Parser, Debug)]
#[command(name = "taskflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new workspace
    ///
    /// Creates the `.taskflow/` directory with configuration. Pass `--api-url`
    /// to keep the workspace in sync with a server.
    Init(InitArgs),

    /// Manage accounts
    User(UserArgs),

    /// Sign in
    Login(LoginArgs),

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Manage projects
    Project(ProjectArgs),

    /// Create a new issue
    ///
    /// The issue lands in the backlog with the next code of its project. If
    /// title is not provided, an interactive prompt will be shown.
    Create(CreateArgs),

    /// List issues with optional filters
    List(ListArgs),

    /// Show detailed information about an issue, comments included
    Show(ShowArgs),

    /// Move an issue to another column
    Move(MoveArgs),

    /// Update an existing issue
    ///
    /// Only provided fields are updated; other fields remain unchanged.
    Update(UpdateArgs),

    /// Delete an issue permanently (admins only)
    Delete(DeleteArgs),

    /// Add a comment to an issue
    Comment(CommentArgs),

    /// Show the kanban board
    Board(BoardArgs),

    /// Show issue statistics
    Stats(StatsArgs),

    /// Reload everything from the server
    Sync,

    /// Follow live changes from the server until interrupted
    Watch,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        let command = match &self.command {
            Some(Commands::Init(args)) => return execute::execute_init(args).await,
            Some(command) => command,
            None => {
                println!("TaskFlow issue tracking");
                println!("Use --help for more information");
                return Ok(());
            }
        };

        let app = App::from_directory(&std::env::current_dir()?).await?;
        match command {
            Commands::Init(_) => Ok(()),
            Commands::User(args) => execute::execute_user(&app, args, output_mode).await,
            Commands::Login(args) => execute::execute_login(&app, args, output_mode).await,
            Commands::Logout => execute::execute_logout(&app, output_mode).await,
            Commands::Whoami => execute::execute_whoami(&app, output_mode).await,
            Commands::Project(args) => execute::execute_project(&app, args, output_mode).await,
            Commands::Create(args) => execute::execute_create(&app, args, output_mode).await,
            Commands::List(args) => execute::execute_list(&app, args, output_mode).await,
            Commands::Show(args) => execute::execute_show(&app, args, output_mode).await,
            Commands::Move(args) => execute::execute_move(&app, args, output_mode).await,
            Commands::Update(args) => execute::execute_update(&app, args, output_mode).await,
            Commands::Delete(args) => execute::execute_delete(&app, args, output_mode).await,
            Commands::Comment(args) => execute::execute_comment(&app, args, output_mode).await,
            Commands::Board(args) => execute::execute_board(&app, args, output_mode).await,
            Commands::Stats(args) => execute::execute_stats(&app, args, output_mode).await,
            Commands::Sync => execute::execute_sync(&app, output_mode).await,
            Commands::Watch => execute::execute_watch(&app, output_mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["taskflow"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_global_json_flag() {
        let cli = Cli::try_parse_from(["taskflow", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Commands::List(_))));
    }

    #[test]
    fn test_parse_init_remote() {
        let cli = Cli::try_parse_from([
            "taskflow",
            "init",
            "--api-url",
            "http://localhost:3000",
            "--ws-url",
            "ws://localhost:3000/ws",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Init(args)) => {
                assert_eq!(args.api_url.as_deref(), Some("http://localhost:3000"));
                assert_eq!(args.ws_url.as_deref(), Some("ws://localhost:3000/ws"));
                assert!(!args.memory);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_parse_init_ws_requires_api() {
        assert!(Cli::try_parse_from(["taskflow", "init", "--ws-url", "ws://x"]).is_err());
    }

    #[test]
    fn test_parse_user_add_defaults_to_member() {
        let cli =
            Cli::try_parse_from(["taskflow", "user", "add", "bob", "--password", "pw"]).unwrap();
        match cli.command {
            Some(Commands::User(UserArgs {
                action: UserAction::Add { name, role, password },
            })) => {
                assert_eq!(name, "bob");
                assert_eq!(role, RoleArg::Member);
                assert_eq!(password.as_deref(), Some("pw"));
            }
            _ => panic!("Expected user add"),
        }
    }

    #[test]
    fn test_parse_create_minimal() {
        let cli = Cli::try_parse_from(["taskflow", "create", "-P", "DMO"]).unwrap();
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.project, "DMO");
                assert!(args.title.is_none());
                assert_eq!(args.priority, PriorityArg::Medium);
                assert_eq!(args.issue_type, IssueTypeArg::Task);
            }
            _ => panic!("Expected Create command"),
        }
    }

    #[test]
    fn test_parse_create_full() {
        let cli = Cli::try_parse_from([
            "taskflow",
            "create",
            "-P",
            "DMO",
            "--title",
            "Fix login",
            "--priority",
            "high",
            "--type",
            "bug",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.title.as_deref(), Some("Fix login"));
                assert_eq!(args.priority, PriorityArg::High);
                assert_eq!(args.issue_type, IssueTypeArg::Bug);
            }
            _ => panic!("Expected Create command"),
        }
    }

    #[test]
    fn test_parse_create_rejects_blank_title() {
        assert!(Cli::try_parse_from(["taskflow", "create", "-P", "DMO", "--title", "  "]).is_err());
    }

    #[test]
    fn test_parse_move() {
        let cli = Cli::try_parse_from(["taskflow", "move", "DMO-101", "in-progress"]).unwrap();
        match cli.command {
            Some(Commands::Move(args)) => {
                assert_eq!(args.issue, "DMO-101");
                assert_eq!(args.status, StatusArg::InProgress);
            }
            _ => panic!("Expected Move command"),
        }
    }

    #[test]
    fn test_parse_list_filters() {
        let cli = Cli::try_parse_from([
            "taskflow", "list", "-s", "done", "-q", "login", "--recent", "-n", "5",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::List(args)) => {
                assert_eq!(args.status, Some(StatusArg::Done));
                assert_eq!(args.search.as_deref(), Some("login"));
                assert!(args.recent);
                assert_eq!(args.limit, 5);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_parse_comment_requires_text() {
        assert!(Cli::try_parse_from(["taskflow", "comment", "DMO-101"]).is_err());
        assert!(Cli::try_parse_from(["taskflow", "comment", "DMO-101", " "]).is_err());
    }

    #[test]
    fn test_parse_stats_server_conflicts_with_project() {
        assert!(Cli::try_parse_from(["taskflow", "stats", "--server", "-P", "DMO"]).is_err());
        let cli = Cli::try_parse_from(["taskflow", "stats", "--server"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Stats(StatsArgs { server: true, .. }))));
    }

    #[test]
    fn test_parse_unit_commands() {
        for (word, check) in [
            ("sync", (|c: &Commands| matches!(c, Commands::Sync)) as fn(&Commands) -> bool),
            ("watch", |c| matches!(c, Commands::Watch)),
            ("logout", |c| matches!(c, Commands::Logout)),
            ("whoami", |c| matches!(c, Commands::Whoami)),
        ] {
            let cli = Cli::try_parse_from(["taskflow", word]).unwrap();
            assert!(check(cli.command.as_ref().unwrap()), "{word}");
        }
    }
}
