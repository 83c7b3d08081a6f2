//! JSON Lines (JSONL) codec used by TaskFlow for durable snapshots.
//!
//! The crate covers the three things the snapshot layer needs:
//!
//! - [`encode_jsonl`]: one serialized value per line
//! - [`decode_jsonl_resilient`]: line-by-line decoding that keeps going past
//!   bad lines and reports them as [`Warning`]s
//! - [`write_bytes_atomic`]: crash-safe file replacement using the
//!   temp-file-then-rename pattern

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atomic;
pub mod error;
pub mod reader;
pub mod warning;
pub mod writer;

pub use atomic::write_bytes_atomic;
pub use error::{Error, Result};
pub use reader::decode_jsonl_resilient;
pub use warning::Warning;
pub use writer::encode_jsonl;
