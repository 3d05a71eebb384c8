use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// SHA-256 of the source bytes, as a lowercase hex string (64 chars).
///
/// Conditioned outputs are keyed by the hash of the capture they came from,
/// so reprocessing the same photo overwrites rather than duplicates.
pub fn content_key(data: &[u8]) -> String {
    let digest: [u8; 32] = Sha256::digest(data).into();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Derive the output path for one variant of a conditioned capture.
/// Layout: `<base>/<first_2_hex_chars>/<full_hex>-<variant>.<ext>`
pub fn output_path(base: &Path, key: &str, variant: &str, ext: &str) -> PathBuf {
    let shard = key.get(..2).unwrap_or(key);
    base.join(shard).join(format!("{key}-{variant}.{ext}"))
}
