//! Stable 64-bit fingerprints for textual store keys.
//!
//! Every string that enters the store (file paths, USRs, build commands,
//! argument vectors, kind names) is keyed by its fingerprint. The store
//! treats the value as opaque, so truncation to a signed 64-bit integer is
//! fine; the raw text is kept in a side table for anything user-visible.

use xxhash_rust::xxh64::xxh64;

/// Fixed seed so fingerprints are stable across runs and hosts.
///
/// Changing this invalidates every existing store, which is why the value is
/// baked in rather than configurable.
const SEED: u64 = 0x5079_676d_616c_696f;

/// Fingerprint a textual key for use as a store join key.
#[must_use]
pub fn fingerprint(text: &str) -> i64 {
    xxh64(text.as_bytes(), SEED) as i64
}

/// Fingerprint an argument vector.
///
/// The vector is hashed through its canonical JSON serialization, the same
/// text stored in the `BuildArgs` dictionary, so the key and the stored text
/// can never disagree.
#[must_use]
pub fn fingerprint_args(args: &[String]) -> i64 {
    // Vec<String> -> JSON cannot fail
    let text = serde_json::to_string(args).unwrap_or_default();
    fingerprint(&text)
}
