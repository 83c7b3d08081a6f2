//! JSONL decoding.
//!
//! Decoding is resilient: a line that fails to decode is reported as a
//! [`Warning`] carrying its 1-based line number, and decoding continues with
//! the next line. Callers decide whether warnings are tolerable.

use crate::warning::Warning;
use serde::de::DeserializeOwned;

/// Decodes an in-memory JSONL buffer, collecting warnings for bad lines.
///
/// Blank lines are ignored. Lines that are not valid UTF-8 are reported as
/// [`Warning::SkippedLine`].
pub fn decode_jsonl_resilient<T: DeserializeOwned>(bytes: &[u8]) -> (Vec<T>, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut values = Vec::new();

    for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_number = index + 1;
        let Ok(line) = std::str::from_utf8(raw) else {
            warnings.push(Warning::SkippedLine {
                line_number,
                reason: "invalid UTF-8".to_string(),
            });
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(value) => values.push(value),
            Err(e) => warnings.push(Warning::MalformedJson {
                line_number,
                error: e.to_string(),
            }),
        }
    }

    if !warnings.is_empty() {
        tracing::debug!(count = warnings.len(), "JSONL decode produced warnings");
    }
    (values, warnings)
}
