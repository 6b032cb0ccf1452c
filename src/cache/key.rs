use std::fmt;

use crate::engine::markup::truncate_on_char_boundary;
use crate::policy::CleaningPolicy;

const KEY_PREFIX: &str = "wmc_content_";

/// Bytes of raw content mixed into the key alongside the full-content hash.
const CONTENT_PREFIX_LEN: usize = 50;

/// Deterministic cache key for one cleaning request.
///
/// Two requests share a key only if they agree on content, resolved policy,
/// content type and version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(content: &str, policy: &CleaningPolicy, content_type: &str, version: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(truncate_on_char_boundary(content, CONTENT_PREFIX_LEN).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(content.len().to_string().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(blake3::hash(content.as_bytes()).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(policy.fingerprint().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(content_type.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(version.as_bytes());
        Self(format!("{KEY_PREFIX}{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
