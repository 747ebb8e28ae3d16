//! Manifest fingerprinting
//!
//! The fingerprint is a SHA-256 digest of a canonical JSON rendering of the
//! manifest. Object keys are emitted in sorted order and dependencies in
//! name order, so equivalent manifests hash identically regardless of how
//! they were written.

use crate::manifest::{DependencyManifest, DependencySpec};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Bumped whenever the canonical form changes, invalidating old entries
const CANONICAL_FORMAT: u32 = 1;

/// Number of digest bytes kept in the fingerprint
const FINGERPRINT_BYTES: usize = 16;

/// Hex digest identifying a (manifest, variant) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the fingerprint of `manifest` (which carries its variant)
pub fn fingerprint(manifest: &DependencyManifest) -> Fingerprint {
    let canonical = canonical_form(manifest).to_string();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    Fingerprint(hex::encode(&digest[..FINGERPRINT_BYTES]))
}

/// Canonical JSON value hashed by [`fingerprint`].
///
/// Keys are written in sorted order so the rendering is identical whether or
/// not `serde_json` preserves insertion order.
pub fn canonical_form(manifest: &DependencyManifest) -> Value {
    let dependencies: Vec<Value> = manifest.dependencies().iter().map(dependency_value).collect();

    json!({
        "dependencies": dependencies,
        "format": CANONICAL_FORMAT,
        "resolutions": manifest.resolutions(),
        "variant": manifest.variant().to_string(),
    })
}

fn dependency_value(dep: &DependencySpec) -> Value {
    json!({
        "kind": dep.kind.to_string(),
        "name": dep.name,
        "postinstall": dep.postinstall,
        "ref": dep.reference,
        "repo": dep.repo,
        "version": dep.version,
    })
}
