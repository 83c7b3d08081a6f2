//! Command execution logic.
//!
//! This module contains the implementation of all CLI commands.

use anyhow::{Context, Result, anyhow, bail};

use super::args::{
    BoardArgs, CommentArgs, CreateArgs, DeleteArgs, InitArgs, ListArgs, LoginArgs, MoveArgs,
    ProjectAction, ProjectArgs, ShowArgs, StatsArgs, UpdateArgs, UserAction, UserArgs,
};
use crate::app::App;
use crate::config::{self, InitOptions};
use crate::domain::{Issue, IssueUpdate, NewIssue, NewProject, Project};
use crate::output::{self, OutputConfig, OutputMode};
use crate::store::{StoreChange, SyncStatus};
use crate::view;

/// Prompt on stderr and read one line from stdin.
fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// With a remote, re-read server state before showing anything. A failure
/// leaves the local copy in place and is reported, not fatal.
async fn catch_up(app: &App) {
    if !app.store().has_remote() {
        return;
    }
    if let Err(e) = app.store().refresh().await {
        tracing::warn!(error = %e, "Server unreachable, showing local copy");
        let config = OutputConfig::from_env();
        eprintln!(
            "{}",
            output::warning(
                &format!("{} (showing possibly stale local data)", e.user_message()),
                &config
            )
        );
    }
}

async fn find_issue(app: &App, needle: &str) -> Result<Issue> {
    app.store()
        .find_issue(needle)
        .await
        .ok_or_else(|| anyhow!("Issue '{needle}' not found"))
}

async fn find_project(app: &App, needle: &str) -> Result<Project> {
    app.store()
        .find_project(needle)
        .await
        .ok_or_else(|| anyhow!("Project '{needle}' not found"))
}

/// Execute the init command
pub async fn execute_init(args: &InitArgs) -> Result<()> {
    let current_dir = std::env::current_dir()?;

    if !args.quiet {
        println!(
            "Initializing TaskFlow workspace{}...",
            args.api_url
                .as_ref()
                .map(|url| format!(" synced with {url}"))
                .unwrap_or_default()
        );
    }

    let result = config::init(
        &current_dir,
        InitOptions {
            api_url: args.api_url.clone(),
            ws_url: args.ws_url.clone(),
            memory: args.memory,
        },
    )
    .await?;

    if !args.quiet {
        println!("Initialized TaskFlow in {}", result.taskflow_dir.display());
        println!("  Config: {}", result.config_file.display());
        println!(
            "  Mode:   {}",
            if result.config.remote.is_some() {
                "remote"
            } else {
                "local only"
            }
        );
        println!();
        println!("Next: 'taskflow user add <name> --role admin', then 'taskflow login <name>'.");
    }

    Ok(())
}

/// Execute the user command
pub async fn execute_user(app: &App, args: &UserArgs, output_mode: OutputMode) -> Result<()> {
    match &args.action {
        UserAction::Add {
            name,
            password,
            role,
        } => {
            let password = match password {
                Some(p) => p.clone(),
                None => prompt("Password")?,
            };
            let by = app.accounts().current().await?;
            let user = app
                .accounts()
                .register(name, &password, (*role).into(), by.as_ref())
                .await?;
            match output_mode {
                OutputMode::Json => output::print_json(&serde_json::json!({
                    "user": user,
                    "role": crate::session::Role::from(*role),
                }))?,
                OutputMode::Text => println!("Registered {user}"),
            }
        }
        UserAction::List => {
            let users = app.accounts().list().await?;
            match output_mode {
                OutputMode::Json => output::print_json(
                    &users
                        .iter()
                        .map(|(name, role)| serde_json::json!({ "user": name, "role": role }))
                        .collect::<Vec<_>>(),
                )?,
                OutputMode::Text => {
                    if users.is_empty() {
                        println!("No accounts yet.");
                    }
                    for (name, role) in users {
                        println!("{name:<20} {role}");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Execute the login command
pub async fn execute_login(app: &App, args: &LoginArgs, output_mode: OutputMode) -> Result<()> {
    let password = match &args.password {
        Some(p) => p.clone(),
        None => prompt("Password")?,
    };
    let session = app.accounts().login(&args.name, &password).await?;
    match output_mode {
        OutputMode::Json => output::print_json(&session)?,
        OutputMode::Text => println!("Logged in as {} ({})", session.user, session.role),
    }
    Ok(())
}

/// Execute the logout command
pub async fn execute_logout(app: &App, output_mode: OutputMode) -> Result<()> {
    let session = app.accounts().current().await?;
    if let Some(session) = &session {
        app.accounts().logout(session).await?;
    }
    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "logged_out": session.map(|s| s.user),
        }))?,
        OutputMode::Text => match session {
            Some(session) => println!("Logged out {}", session.user),
            None => println!("Not logged in."),
        },
    }
    Ok(())
}

/// Execute the whoami command
pub async fn execute_whoami(app: &App, output_mode: OutputMode) -> Result<()> {
    let session = app.accounts().current().await?;
    match output_mode {
        OutputMode::Json => output::print_json(&session)?,
        OutputMode::Text => match session {
            Some(session) => println!("{} ({})", session.user, session.role),
            None => println!("Not logged in."),
        },
    }
    Ok(())
}

/// Execute the project command
pub async fn execute_project(app: &App, args: &ProjectArgs, output_mode: OutputMode) -> Result<()> {
    match &args.action {
        ProjectAction::Create {
            name,
            key,
            description,
        } => {
            let session = app.session().await?;
            catch_up(app).await;
            let project = app
                .store()
                .create_project(
                    &session,
                    NewProject {
                        name: name.clone(),
                        key: key.clone(),
                        description: description.clone(),
                    },
                )
                .await?;
            match output_mode {
                OutputMode::Json => output::print_json(&project)?,
                OutputMode::Text => {
                    println!("Created project {} ({})", project.key, project.name);
                }
            }
        }
        ProjectAction::List => {
            catch_up(app).await;
            let snapshot = app.store().snapshot().await;
            output::print_projects(&snapshot.projects, output_mode)?;
        }
    }
    Ok(())
}

/// Execute the create command
pub async fn execute_create(app: &App, args: &CreateArgs, output_mode: OutputMode) -> Result<()> {
    let session = app.session().await?;
    catch_up(app).await;
    let project = find_project(app, &args.project).await?;

    let title = match &args.title {
        Some(t) => t.clone(),
        None => super::validators::validate_title(&prompt("Title")?).map_err(|e| anyhow!(e))?,
    };

    let issue = app
        .store()
        .create_issue(
            &session,
            NewIssue {
                project_id: project.id,
                title,
                description: args.description.clone(),
                priority: args.priority.into(),
                issue_type: args.issue_type.into(),
            },
        )
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&issue)?,
        OutputMode::Text => {
            println!("Created issue: {}", issue.human_code);
            output::print_issue(&issue, OutputMode::Text)?;
        }
    }
    Ok(())
}

/// Execute the list command
pub async fn execute_list(app: &App, args: &ListArgs, output_mode: OutputMode) -> Result<()> {
    catch_up(app).await;
    let snapshot = app.store().snapshot().await;

    let mut issues: Vec<&Issue> = if args.recent {
        view::recent(&snapshot.issues, snapshot.issues.len())
    } else {
        snapshot.issues.iter().collect()
    };
    if let Some(needle) = &args.project {
        let project = find_project(app, needle).await?;
        issues.retain(|i| i.project_id == project.id);
    }
    if let Some(status) = args.status {
        let status = status.into();
        issues.retain(|i| i.status == status);
    }
    if let Some(query) = &args.search {
        let matching: std::collections::HashSet<_> = view::search(&snapshot.issues, query)
            .into_iter()
            .map(|i| &i.id)
            .collect();
        issues.retain(|i| matching.contains(&i.id));
    }
    issues.truncate(args.limit);

    output::print_issues(&issues, output_mode)?;
    Ok(())
}

/// Execute the show command
pub async fn execute_show(app: &App, args: &ShowArgs, output_mode: OutputMode) -> Result<()> {
    catch_up(app).await;
    let issue = find_issue(app, &args.issue).await?;
    output::print_issue_details(&issue, output_mode)?;
    Ok(())
}

/// Execute the move command
pub async fn execute_move(app: &App, args: &MoveArgs, output_mode: OutputMode) -> Result<()> {
    app.session().await?;
    catch_up(app).await;
    let issue = find_issue(app, &args.issue).await?;
    let updated = app
        .store()
        .update_status(&issue.id, args.status.into())
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&updated)?,
        OutputMode::Text => println!(
            "Moved {} from {} to {}",
            updated.human_code,
            issue.status.label(),
            updated.status.label()
        ),
    }
    Ok(())
}

/// Execute the update command
pub async fn execute_update(app: &App, args: &UpdateArgs, output_mode: OutputMode) -> Result<()> {
    let update = IssueUpdate {
        title: args.title.clone(),
        description: args.description.clone(),
        status: args.status.map(Into::into),
        priority: args.priority.map(Into::into),
        issue_type: args.issue_type.map(Into::into),
    };
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one of --title, --description, --status, --priority, --type");
    }

    app.session().await?;
    catch_up(app).await;
    let issue = find_issue(app, &args.issue).await?;
    let updated = app.store().update(&issue.id, update).await?;

    match output_mode {
        OutputMode::Json => output::print_json(&updated)?,
        OutputMode::Text => {
            println!("Updated issue: {}", updated.human_code);
            output::print_issue(&updated, OutputMode::Text)?;
        }
    }
    Ok(())
}

/// Execute the delete command
pub async fn execute_delete(app: &App, args: &DeleteArgs, output_mode: OutputMode) -> Result<()> {
    let session = app.session().await?;
    catch_up(app).await;
    let issue = find_issue(app, &args.issue).await?;
    app.store().delete(&session, &issue.id).await?;

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "deleted": issue.id,
            "human_code": issue.human_code,
        }))?,
        OutputMode::Text => println!("Deleted issue: {}", issue.human_code),
    }
    Ok(())
}

/// Execute the comment command
pub async fn execute_comment(app: &App, args: &CommentArgs, output_mode: OutputMode) -> Result<()> {
    let session = app.session().await?;
    catch_up(app).await;
    let issue = find_issue(app, &args.issue).await?;
    let comment = app
        .store()
        .add_comment(&session, &issue.id, &args.text)
        .await?;

    match output_mode {
        OutputMode::Json => output::print_json(&comment)?,
        OutputMode::Text => println!("Commented on {}", issue.human_code),
    }
    Ok(())
}

/// Execute the board command
pub async fn execute_board(app: &App, args: &BoardArgs, output_mode: OutputMode) -> Result<()> {
    catch_up(app).await;
    let snapshot = app.store().snapshot().await;
    let issues: Vec<Issue> = match &args.project {
        Some(needle) => {
            let project = find_project(app, needle).await?;
            view::for_project(&snapshot.issues, &project.id)
                .into_iter()
                .cloned()
                .collect()
        }
        None => snapshot.issues,
    };

    if output_mode == OutputMode::Text && snapshot.status == SyncStatus::Stale {
        let config = OutputConfig::from_env();
        eprintln!("{}", output::warning("Board may be out of date (stale)", &config));
    }
    output::print_board(&issues, output_mode)?;
    Ok(())
}

/// Execute the stats command
pub async fn execute_stats(app: &App, args: &StatsArgs, output_mode: OutputMode) -> Result<()> {
    if args.server {
        let stats = app
            .store()
            .server_statistics()
            .await
            .context("Failed to fetch server statistics")?;
        output::print_server_statistics(&stats, output_mode)?;
        return Ok(());
    }

    catch_up(app).await;
    let snapshot = app.store().snapshot().await;
    let stats = match &args.project {
        Some(needle) => {
            let project = find_project(app, needle).await?;
            let issues: Vec<Issue> = view::for_project(&snapshot.issues, &project.id)
                .into_iter()
                .cloned()
                .collect();
            view::statistics(&issues)
        }
        None => app.store().statistics().await,
    };
    output::print_statistics(&stats, snapshot.status, output_mode)?;
    Ok(())
}

/// Execute the sync command
pub async fn execute_sync(app: &App, output_mode: OutputMode) -> Result<()> {
    if !app.store().has_remote() {
        bail!("No remote configured. Re-run 'taskflow init --api-url <url>' or set TASKFLOW_API_URL");
    }
    app.store().refresh().await?;
    let snapshot = app.store().snapshot().await;

    match output_mode {
        OutputMode::Json => output::print_json(&serde_json::json!({
            "projects": snapshot.projects.len(),
            "issues": snapshot.issues.len(),
        }))?,
        OutputMode::Text => println!(
            "Synced {} project(s) and {} issue(s)",
            snapshot.projects.len(),
            snapshot.issues.len()
        ),
    }
    Ok(())
}

/// Execute the watch command: stream store changes until interrupted.
pub async fn execute_watch(app: &App, output_mode: OutputMode) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listener = app.store().on_change(move |change| {
        // The receiver outlives the listener; a send can only fail during
        // shutdown.
        let _ = tx.send(change.clone());
    });
    let handle = app.store().connect().await?;
    let config = OutputConfig::from_env();

    if output_mode == OutputMode::Text {
        println!("Watching for changes (Ctrl-C to stop)...");
    }
    loop {
        tokio::select! {
            change = rx.recv() => {
                let Some(change) = change else { break };
                match output_mode {
                    OutputMode::Json => output::print_json(&change)?,
                    OutputMode::Text => print_change(&change, &config),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.store().remove_listener(listener);
    handle.stop();
    Ok(())
}

fn print_change(change: &StoreChange, config: &OutputConfig) {
    match change {
        StoreChange::ProjectUpserted(project) => {
            println!("project  {} {}", project.key, project.name);
        }
        StoreChange::IssueUpserted(issue) => println!(
            "issue    {} [{}] {}",
            issue.human_code,
            issue.status.label(),
            issue.title
        ),
        StoreChange::IssueRemoved(id) => println!("removed  {id}"),
        StoreChange::Reloaded => println!("{}", output::info("reloaded from server", config)),
        StoreChange::SyncStatusChanged(status) => match status {
            SyncStatus::Live => println!("{}", output::success("sync live", config)),
            SyncStatus::Stale => println!("{}", output::warning("sync stale", config)),
            other => println!("sync     {other}"),
        },
        StoreChange::Notification(message) => println!("{}", output::info(message, config)),
        StoreChange::MutationFailed { reason, .. } => {
            println!("{}", output::error(reason, config));
        }
        StoreChange::ProjectRekeyed { .. }
        | StoreChange::ProjectRemoved(_)
        | StoreChange::IssueRekeyed { .. } => {}
    }
}
