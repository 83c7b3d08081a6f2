//! Application context for CLI command execution.
//!
//! `App` locates the workspace, loads configuration, opens the key-value
//! store and wires the issue store to the configured remote (if any).
//!
//! # Example
//!
//! ```no_run
//! use taskflow::app::App;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::from_directory(Path::new(".")).await?;
//!     let snapshot = app.store().snapshot().await;
//!     println!("{} issues", snapshot.issues.len());
//!     Ok(())
//! }
//! ```

use crate::config::{CONFIG_FILE_NAME, TASKFLOW_DIR_NAME, TaskflowConfig, find_taskflow_root};
use crate::error::{Error, Result};
use crate::remote::{HttpRemote, RemoteSync};
use crate::session::{Accounts, Session};
use crate::storage::{LocalPersistence, create_kv_store};
use crate::store::IssueStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application context for CLI operations.
pub struct App {
    store: IssueStore,
    accounts: Accounts,
    config: TaskflowConfig,
    taskflow_dir: PathBuf,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("taskflow_dir", &self.taskflow_dir)
            .field("config", &self.config)
            .field("store", &"<IssueStore>")
            .finish()
    }
}

impl App {
    /// Create an App instance from the given working directory.
    ///
    /// Searches up the directory tree for `.taskflow/`, loads the
    /// configuration, applies `TASKFLOW_*` environment overrides and opens
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No workspace is found in the directory tree
    /// - Configuration cannot be loaded or is invalid
    /// - Storage or the HTTP client cannot be initialized
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root_dir = find_taskflow_root(working_dir).ok_or_else(|| {
            Error::Config("Not a TaskFlow workspace. Run 'taskflow init' first.".to_string())
        })?;

        let taskflow_dir = root_dir.join(TASKFLOW_DIR_NAME);
        let mut config = TaskflowConfig::load(&taskflow_dir.join(CONFIG_FILE_NAME)).await?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;

        Self::open(&root_dir, config).await
    }

    /// Opens storage and the remote for an already loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or the HTTP client cannot be initialized.
    pub async fn open(root_dir: &Path, config: TaskflowConfig) -> Result<Self> {
        let kv = create_kv_store(config.storage_backend(root_dir)).await?;
        let remote = match &config.remote {
            Some(remote_config) => {
                tracing::debug!(api_url = %remote_config.api_url, "Using remote authority");
                Some(Arc::new(HttpRemote::new(remote_config.clone())?) as Arc<dyn RemoteSync>)
            }
            None => None,
        };
        let store = IssueStore::open(
            LocalPersistence::with_key(Arc::clone(&kv), config.storage.snapshot_key.clone()),
            remote,
        ).await;

        Ok(Self {
            store,
            accounts: Accounts::new(kv),
            config,
            taskflow_dir: root_dir.join(TASKFLOW_DIR_NAME),
        })
    }

    /// The issue store.
    pub fn store(&self) -> &IssueStore {
        &self.store
    }

    /// The account registry.
    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Effective configuration, after environment overrides.
    pub fn config(&self) -> &TaskflowConfig {
        &self.config
    }

    /// Path to the `.taskflow` directory.
    pub fn taskflow_dir(&self) -> &Path {
        &self.taskflow_dir
    }

    /// The signed-in session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authorization`] when nobody is logged in.
    pub async fn session(&self) -> Result<Session> {
        self.accounts.current().await?.ok_or_else(|| {
            Error::Authorization("not logged in; run 'taskflow login' first".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, InitOptions};
    use crate::domain::NewProject;
    use crate::session::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn app_from_initialized_directory() {
        let temp_dir = TempDir::new().unwrap();
        config::init(temp_dir.path(), InitOptions::default())
            .await
            .unwrap();

        let app = App::from_directory(temp_dir.path()).await.unwrap();
        assert!(app.taskflow_dir().ends_with(".taskflow"));
        assert!(!app.store().has_remote());
    }

    #[tokio::test]
    async fn app_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        config::init(temp_dir.path(), InitOptions::default())
            .await
            .unwrap();

        let sub_dir = temp_dir.path().join("src").join("lib");
        std::fs::create_dir_all(&sub_dir).unwrap();

        let app = App::from_directory(&sub_dir).await.unwrap();
        assert_eq!(app.taskflow_dir(), temp_dir.path().join(".taskflow"));
    }

    #[tokio::test]
    async fn app_from_uninitialized_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = App::from_directory(temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn state_survives_reopening() {
        let temp_dir = TempDir::new().unwrap();
        config::init(temp_dir.path(), InitOptions::default())
            .await
            .unwrap();

        let app = App::from_directory(temp_dir.path()).await.unwrap();
        app.accounts()
            .register("alice", "pw", Role::Admin, None)
            .await
            .unwrap();
        let session = app.accounts().login("alice", "pw").await.unwrap();
        app.store()
            .create_project(
                &session,
                NewProject {
                    name: "Demo".into(),
                    key: "DMO".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        drop(app);

        let app = App::from_directory(temp_dir.path()).await.unwrap();
        assert_eq!(app.session().await.unwrap().user.as_str(), "alice");
        assert!(app.store().find_project("DMO").await.is_some());
    }

    #[tokio::test]
    async fn session_requires_login() {
        let temp_dir = TempDir::new().unwrap();
        config::init(temp_dir.path(), InitOptions::default())
            .await
            .unwrap();
        let app = App::from_directory(temp_dir.path()).await.unwrap();
        assert!(matches!(
            app.session().await.unwrap_err(),
            Error::Authorization(_)
        ));
    }
}
