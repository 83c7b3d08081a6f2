//! JSONL encoding into an in-memory buffer.

use crate::Result;
use serde::Serialize;

/// Encodes values into an in-memory JSONL buffer.
///
/// # Errors
///
/// Returns [`Error::Json`](crate::Error::Json) if any value fails to serialize.
pub fn encode_jsonl<T, I>(values: I) -> Result<Vec<u8>>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut buf = Vec::new();
    for value in values {
        serde_json::to_writer(&mut buf, &value)?;
        buf.push(b'\n');
    }
    Ok(buf)
}
