//! TaskFlow - a kanban issue tracker with optimistic local state.
//!
//! The [`store::IssueStore`] is the heart of the crate: it applies every
//! mutation locally first, persists a snapshot, forwards the change to an
//! optional remote service and reconciles when the remote answers or pushes
//! events of its own. The CLI in [`cli`] is a thin layer on top.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod domain;
pub mod error;
pub mod id_generation;
pub mod remote;
pub mod session;
pub mod storage;
pub mod store;
pub mod view;

// Public CLI module (needed by binary)
pub mod cli;

pub mod app;
pub mod config;
pub mod output;

pub use error::{Error, Result};
pub use store::{IssueStore, StoreChange, SyncStatus};
