//! Atomic file replacement.
//!
//! Crash safety uses the temp-file-then-rename pattern:
//!
//! 1. Data is written to a sibling file with a `.tmp` extension
//! 2. The temporary file is flushed and synced
//! 3. The temporary file is renamed over the target path
//!
//! Renames within one filesystem are atomic on POSIX systems, so readers
//! observe either the old contents or the new contents, never a mix. If a
//! crash happens before the rename, the original file is untouched.

use crate::Result;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Atomically replaces `path` with `bytes`.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or the rename
/// fails. The temporary file is removed on a failed write.
pub async fn write_bytes_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let temp_path = make_temp_path(path);

    let write_result = async {
        let mut file = File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    tokio::fs::rename(&temp_path, path).await?;
    tracing::trace!(path = %path.display(), len = bytes.len(), "atomic write complete");
    Ok(())
}

/// Appends `.tmp` to the file name, keeping any existing extension.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}
