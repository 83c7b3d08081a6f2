//! Hash-based ID generation.
//!
//! Ids look like `{prefix}-{hash}` where the hash is a SHA-256 digest of the
//! seed, a timestamp and a nonce, truncated and base36 encoded. The generator
//! remembers every id it has handed out or been told about and retries with
//! a new nonce on collision.
//!
//! # Features
//!
//! - **Adaptive length**: hash length grows with the number of known ids
//!   (4-6 characters)
//! - **Collision resistant**: nonce retry, then one extra character
//! - **Provisional ids**: the [`PROVISIONAL_PREFIX`] marks ids that only
//!   exist locally until the authority acknowledges the entity
//!
//! # Example
//!
//! ```
//! use taskflow::id_generation::{IdGenerator, validate_id};
//!
//! let mut generator = IdGenerator::new("iss");
//! let id = generator.generate("Fix login").unwrap();
//! assert!(validate_id(&id, "iss"));
//! ```

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MAX_NONCE: u32 = 100;

/// Prefix of ids minted for optimistic entities before the authority has
/// assigned a real one.
pub const PROVISIONAL_PREFIX: &str = "tmp";

/// Errors that can occur during ID generation
#[derive(Debug, Error)]
pub enum IdGenerationError {
    /// Unable to generate a unique ID after exhausting all nonces and length increases
    #[error("Unable to generate unique ID after {attempts} attempts")]
    CollisionExhausted {
        /// Number of nonces tried
        attempts: u32,
    },

    /// Invalid length parameter
    #[error("Length must be greater than 0")]
    InvalidLength,
}

/// Hash-based ID generator with collision detection.
///
/// The set of known ids grows with every call; recreate the generator (and
/// re-register live ids) if it is kept around for a very long time.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    existing_ids: HashSet<String>,
}

impl IdGenerator {
    /// Creates a generator for ids starting with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            existing_ids: HashSet::new(),
        }
    }

    /// Creates a generator for provisional ids.
    pub fn provisional() -> Self {
        Self::new(PROVISIONAL_PREFIX)
    }

    /// The prefix every generated id starts with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register an existing ID to prevent collisions
    pub fn register_id(&mut self, id: impl Into<String>) {
        self.existing_ids.insert(id.into());
    }

    /// Generates a new unique id from `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if unable to generate a unique ID after trying all nonces.
    pub fn generate(&mut self, seed: &str) -> Result<String, IdGenerationError> {
        let id_length = self.adaptive_length();

        for nonce in 0..MAX_NONCE {
            let id = self.generate_hash_id(seed, nonce, id_length)?;
            if !self.existing_ids.contains(&id) {
                if nonce > 0 {
                    debug!(nonce, id_length, "Generated unique ID after collision retries");
                }
                self.existing_ids.insert(id.clone());
                return Ok(id);
            }
        }

        if id_length < 6 {
            warn!(
                id_length,
                max_nonce = MAX_NONCE,
                "All nonces exhausted, increasing ID length"
            );
            let longer_id = self.generate_hash_id(seed, 0, id_length + 1)?;
            if self.existing_ids.insert(longer_id.clone()) {
                return Ok(longer_id);
            }
        }

        Err(IdGenerationError::CollisionExhausted {
            attempts: MAX_NONCE,
        })
    }

    fn generate_hash_id(
        &self,
        seed: &str,
        nonce: u32,
        length: usize,
    ) -> Result<String, IdGenerationError> {
        let now = Utc::now();
        let content = format!(
            "{}|{}|{}|{}",
            seed,
            now.timestamp(),
            now.timestamp_subsec_nanos(),
            nonce
        );

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let hash_bytes = hasher.finalize();

        let hash_str = encode_base36(&hash_bytes[..8], length)?;
        Ok(format!("{}-{}", self.prefix, hash_str))
    }

    /// Hash length based on how many ids are known
    ///
    /// - 0-500: 4 chars
    /// - 501-1,500: 5 chars
    /// - 1,500+: 6 chars
    fn adaptive_length(&self) -> usize {
        match self.existing_ids.len() {
            0..=500 => 4,
            501..=1500 => 5,
            _ => 6,
        }
    }
}

/// Encode bytes as base36 string
///
/// Only the first 8 bytes of a digest are passed in, so the value fits a
/// `u64`; wrapping arithmetic keeps the result deterministic regardless.
fn encode_base36(bytes: &[u8], length: usize) -> Result<String, IdGenerationError> {
    if length == 0 {
        return Err(IdGenerationError::InvalidLength);
    }

    let mut num: u64 = 0;
    for &byte in bytes {
        num = num.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut result = Vec::with_capacity(length);
    let mut n = num;
    while result.len() < length {
        let remainder = (n % 36) as usize;
        result.push(char::from(BASE36_CHARS[remainder]));
        n /= 36;
    }
    result.reverse();
    Ok(result.into_iter().collect())
}

/// Checks that `id` is `{prefix}-{hash}` with a 4-6 character base36 hash.
pub fn validate_id(id: &str, prefix: &str) -> bool {
    let Some(hash) = id
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    (4..=6).contains(&hash.len())
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}

/// Whether `id` was minted for a not-yet-acknowledged entity.
pub fn is_provisional(id: &str) -> bool {
    id.strip_prefix(PROVISIONAL_PREFIX)
        .is_some_and(|rest| rest.starts_with('-'))
}
