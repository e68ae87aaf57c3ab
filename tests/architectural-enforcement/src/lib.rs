//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce workspace-wide rules
//! on the relay crates' sources:
//! - No sleep() calls: chunked side-channel output is paced by the socket,
//!   never by timers
//!
//! These tests are designed to catch violations early in the development cycle.

use std::path::{Path, PathBuf};

/// Production source directories checked by the rules, relative to the
/// workspace root
pub const PRODUCTION_DIRS: &[&str] = &["relay/core/src", "relay/cli/src"];

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files below `dir`, relative to the workspace root
///
/// A missing directory yields no files.
#[must_use]
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}
