//! Workspace configuration and initialization.
//!
//! A taskflow workspace is a directory containing `.taskflow/config.yaml`.
//! The file selects the local storage backend and, optionally, the remote
//! service to synchronise with. A few environment variables override the
//! remote settings so credentials need not live in the file.

use crate::error::{Error, Result};
use crate::remote::Backoff;
use crate::storage::{StorageBackend, DEFAULT_SNAPSHOT_KEY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Name of the workspace directory
pub const TASKFLOW_DIR_NAME: &str = ".taskflow";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the gitignore file within .taskflow
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Default data directory, relative to the workspace root
pub const DEFAULT_DATA_DIR: &str = ".taskflow/data";

/// Maximum directory depth to traverse when searching for the workspace root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Overrides `remote.api_url`
pub const ENV_API_URL: &str = "TASKFLOW_API_URL";

/// Overrides `remote.ws_url`
pub const ENV_WS_URL: &str = "TASKFLOW_WS_URL";

/// Overrides `remote.api_token`
pub const ENV_API_TOKEN: &str = "TASKFLOW_API_TOKEN";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskflowConfig {
    /// Local storage
    pub storage: StorageConfig,

    /// Remote service, absent in pure local mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

/// Storage backend kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Files under `data_dir`
    File,
    /// Nothing survives the process
    Memory,
}

/// Storage configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: BackendKind,

    /// Data directory, relative to the workspace root
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Key the snapshot is stored under
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_snapshot_key() -> String {
    DEFAULT_SNAPSHOT_KEY.to_string()
}

/// Remote service section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the REST API, e.g. `http://localhost:8000/api/v1`
    pub api_url: String,

    /// WebSocket URL of the event channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,

    /// Bearer token sent with every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Event channel reconnect policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// First delay after a drop
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling delay
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff state starting at the initial delay.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl RemoteConfig {
    /// Remote settings with defaults for everything but the API URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: None,
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        let api_url = self.api_url.trim();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "remote.api_url must be an http(s) URL, got '{api_url}'"
            )));
        }
        if let Some(ws_url) = &self.ws_url {
            if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
                return Err(Error::Config(format!(
                    "remote.ws_url must be a ws(s) URL, got '{ws_url}'"
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "remote.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        let reconnect = &self.reconnect;
        if reconnect.initial_backoff_ms == 0 || reconnect.initial_backoff_ms > reconnect.max_backoff_ms
        {
            return Err(Error::Config(
                "remote.reconnect needs 0 < initial_backoff_ms <= max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl TaskflowConfig {
    /// Local-only configuration with the file backend.
    pub fn new() -> Self {
        Self {
            storage: StorageConfig {
                backend: BackendKind::File,
                data_dir: default_data_dir(),
                snapshot_key: default_snapshot_key(),
            },
            remote: None,
        }
    }

    /// Load and validate configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML or
    /// fails validation.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(Error::Config("storage.data_dir cannot be empty".to_string()));
        }
        if self.storage.snapshot_key.trim().is_empty() {
            return Err(Error::Config(
                "storage.snapshot_key cannot be empty".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            remote.validate()?;
        }
        Ok(())
    }

    /// Applies `TASKFLOW_*` overrides read through `lookup`, then validates.
    ///
    /// Empty values are ignored. An API URL override enables remote mode even
    /// when the file has no `remote` section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is invalid.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(api_url) = get(ENV_API_URL) {
            match &mut self.remote {
                Some(remote) => remote.api_url = api_url,
                None => self.remote = Some(RemoteConfig::new(api_url)),
            }
        }
        match &mut self.remote {
            Some(remote) => {
                if let Some(ws_url) = get(ENV_WS_URL) {
                    remote.ws_url = Some(ws_url);
                }
                if let Some(token) = get(ENV_API_TOKEN) {
                    remote.api_token = Some(token);
                }
            }
            None => {
                if get(ENV_WS_URL).is_some() || get(ENV_API_TOKEN).is_some() {
                    tracing::debug!("Ignoring remote overrides without an API URL");
                }
            }
        }
        self.validate()
    }

    /// Storage backend for a workspace rooted at `root`.
    pub fn storage_backend(&self, root: &Path) -> StorageBackend {
        match self.storage.backend {
            BackendKind::Memory => StorageBackend::Memory,
            BackendKind::File => StorageBackend::File(root.join(&self.storage.data_dir)),
        }
    }
}

impl Default for TaskflowConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for [`init`]
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Remote API URL; `None` for local-only
    pub api_url: Option<String>,
    /// Remote WebSocket URL
    pub ws_url: Option<String>,
    /// Use the in-memory backend
    pub memory: bool,
}

/// Result of the init command
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created .taskflow directory
    pub taskflow_dir: PathBuf,
    /// Path to the created config file
    pub config_file: PathBuf,
    /// The configuration written
    pub config: TaskflowConfig,
}

/// Initialize a new workspace in `base_dir`.
///
/// # Errors
///
/// Returns an error if:
/// - The `.taskflow/` directory already exists
/// - The resulting configuration is invalid
/// - File system operations fail
pub async fn init(base_dir: &Path, options: InitOptions) -> Result<InitResult> {
    let taskflow_dir = base_dir.join(TASKFLOW_DIR_NAME);
    if taskflow_dir.exists() {
        return Err(Error::Config(format!(
            "TaskFlow is already initialized in this directory. Found existing '{TASKFLOW_DIR_NAME}'"
        )));
    }

    let mut config = TaskflowConfig::new();
    if options.memory {
        config.storage.backend = BackendKind::Memory;
    }
    if let Some(api_url) = options.api_url {
        let mut remote = RemoteConfig::new(api_url);
        remote.ws_url = options.ws_url;
        config.remote = Some(remote);
    }
    config.validate()?;

    fs::create_dir_all(&taskflow_dir).await?;
    let config_file = taskflow_dir.join(CONFIG_FILE_NAME);
    config.save(&config_file).await?;

    if config.storage.backend == BackendKind::File {
        fs::create_dir_all(base_dir.join(&config.storage.data_dir)).await?;
    }

    let gitignore_content = "\
# Local snapshot and session are per-machine
data/
";
    fs::write(taskflow_dir.join(GITIGNORE_FILE_NAME), gitignore_content).await?;

    Ok(InitResult {
        taskflow_dir,
        config_file,
        config,
    })
}

/// Find the workspace root by searching up the directory tree.
///
/// Returns the directory containing `.taskflow/`, or `None` if none is
/// found within [`MAX_TRAVERSAL_DEPTH`] levels.
pub fn find_taskflow_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(TASKFLOW_DIR_NAME).is_dir() {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn init_creates_workspace() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path(), InitOptions::default()).await.unwrap();

        assert!(result.config_file.exists());
        assert!(temp_dir.path().join(DEFAULT_DATA_DIR).is_dir());
        assert!(result.taskflow_dir.join(GITIGNORE_FILE_NAME).exists());

        let loaded = TaskflowConfig::load(&result.config_file).await.unwrap();
        assert_eq!(loaded, TaskflowConfig::new());
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();
        init(temp_dir.path(), InitOptions::default()).await.unwrap();

        let err = init(temp_dir.path(), InitOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already initialized"));
    }

    #[tokio::test]
    async fn init_with_remote_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let options = InitOptions {
            api_url: Some("http://localhost:8000/api/v1".into()),
            ws_url: Some("ws://localhost:8000/ws".into()),
            memory: true,
        };

        let result = init(temp_dir.path(), options).await.unwrap();
        let loaded = TaskflowConfig::load(&result.config_file).await.unwrap();

        assert_eq!(loaded.storage.backend, BackendKind::Memory);
        let remote = loaded.remote.unwrap();
        assert_eq!(remote.ws_url.as_deref(), Some("ws://localhost:8000/ws"));
        assert_eq!(remote.reconnect, ReconnectConfig::default());
    }

    #[tokio::test]
    async fn init_rejects_bad_url_without_creating_anything() {
        let temp_dir = TempDir::new().unwrap();
        let options = InitOptions {
            api_url: Some("localhost:8000".into()),
            ..InitOptions::default()
        };

        assert!(init(temp_dir.path(), options).await.is_err());
        assert!(!temp_dir.path().join(TASKFLOW_DIR_NAME).exists());
    }

    #[rstest]
    #[case::zero_timeout("request_timeout_secs: 0")]
    #[case::inverted_backoff("reconnect: { initial_backoff_ms: 5000, max_backoff_ms: 100 }")]
    #[case::bad_ws("ws_url: http://example.com")]
    #[tokio::test]
    async fn load_rejects_invalid_remote(#[case] extra: &str) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        let yaml = format!(
            "storage:\n  backend: file\nremote:\n  api_url: http://localhost\n  {extra}\n"
        );
        tokio::fs::write(&path, yaml).await.unwrap();

        let err = TaskflowConfig::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn env_api_url_enables_remote() {
        let mut config = TaskflowConfig::new();
        config
            .apply_env_overrides(env(&[
                (ENV_API_URL, "https://tf.example.com/api/v1"),
                (ENV_API_TOKEN, "secret"),
            ]))
            .unwrap();

        let remote = config.remote.unwrap();
        assert_eq!(remote.api_url, "https://tf.example.com/api/v1");
        assert_eq!(remote.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = TaskflowConfig::new();
        config
            .apply_env_overrides(env(&[(ENV_API_URL, "  "), (ENV_WS_URL, "ws://x")]))
            .unwrap();
        assert!(config.remote.is_none());
    }

    #[test]
    fn find_root_from_nested_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join(TASKFLOW_DIR_NAME)).unwrap();
        let sub_dir = temp_dir.path().join("sub").join("nested");
        std::fs::create_dir_all(&sub_dir).unwrap();

        assert_eq!(
            find_taskflow_root(&sub_dir),
            Some(temp_dir.path().to_path_buf())
        );
    }

    #[test]
    fn find_root_not_found() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_taskflow_root(temp_dir.path()).is_none());
    }

    #[test]
    fn storage_backend_resolves_against_root() {
        let config = TaskflowConfig::new();
        assert_eq!(
            config.storage_backend(Path::new("/work")),
            StorageBackend::File(PathBuf::from("/work/.taskflow/data"))
        );
    }
}
