//! Real-time event pump.

use super::IssueStore;
use crate::remote::ChannelEvent;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Freshness of the store relative to the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No remote configured; local state is the truth
    LocalOnly,
    /// Event channel is being opened
    Connecting,
    /// Event channel is up and state is current
    Live,
    /// Event channel is down or was never opened; changes may be missing
    Stale,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalOnly => "local only",
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Stale => "stale",
        })
    }
}

/// Running event pump. Dropping the handle stops it.
#[derive(Debug)]
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stops the pump.
    pub fn stop(self) {
        self.task.abort();
    }

    /// Whether the pump has ended on its own (channel closed).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) fn spawn_pump(store: IssueStore, rx: mpsc::Receiver<ChannelEvent>) -> SyncHandle {
    SyncHandle {
        task: tokio::spawn(pump(store, rx)),
    }
}

async fn pump(store: IssueStore, mut rx: mpsc::Receiver<ChannelEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ChannelEvent::Connected => {
                info!("Real-time sync connected");
                store.set_status(SyncStatus::Live).await;
                // Anything sent while we were away is only recoverable by
                // re-reading.
                if let Err(e) = store.refresh().await {
                    warn!(error = %e, "Refresh after connect failed");
                    store.set_status(SyncStatus::Stale).await;
                }
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(%reason, "Real-time sync lost, serving local state");
                store.set_status(SyncStatus::Stale).await;
            }
            ChannelEvent::Event(event) => {
                if let Err(e) = store.apply_remote_event(event).await {
                    warn!(error = %e, "Failed to apply remote event");
                }
            }
        }
    }
    debug!("Event channel closed");
    store.set_status(SyncStatus::Stale).await;
}
