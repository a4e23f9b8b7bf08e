//! Deterministic identifier derivation for entities the indexer must
//! synthesize itself: the external-file sentinel, external-module target
//! symbols, and header/implementation virtual file symbols (§4.7, §4.8).

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// File id owning every synthetic external-module symbol, created once per
/// repository.
pub const EXTERNAL_FILE_ID: &str = "__external_file__";
pub const EXTERNAL_FILE_PATH: &str = "__external__";
pub const EXTERNAL_FILE_LANGUAGE: &str = "external";

fn hash_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// Synthetic symbol id for an externally-referenced module. Stable across
/// runs so repeated imports of the same module resolve to the same vertex.
pub fn external_symbol_id(target_module: &str) -> String {
    format!("external:{}", hash_hex(&["external-module", target_module]))
}

/// Deterministic id for the virtual "file-as-symbol" vertex used to anchor
/// header/implementation associations.
pub fn virtual_file_symbol_id(path: &str) -> String {
    format!("file-symbol:{}", hash_hex(&["virtual-file-symbol", path]))
}

/// Generates an opaque repository id when the caller didn't supply one.
/// Not required to be reproducible across runs (unlike the synthetic ids
/// above) since a missing `repo_id` means "mint a fresh repository".
pub fn generate_repo_id(repo_name: Option<&str>) -> String {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seed = repo_name.unwrap_or("repo");
    format!("repo:{}", hash_hex(&[seed, &nonce.to_string()]))
}
