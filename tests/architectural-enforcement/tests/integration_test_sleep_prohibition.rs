//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Relay sources MUST NOT call sleep methods, test modules
//! included. Side-channel chunks go out as fast as the socket accepts them,
//! and tests synchronize on sockets and channels.

use std::fs;
use std::path::Path;

use architectural_enforcement::{rust_sources, workspace_root, PRODUCTION_DIRS};

/// Test that relay sources do not contain sleep() calls
#[test]
fn test_no_sleep_in_relay_sources() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in relay sources!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep between side-channel chunks");
        eprintln!("  - Sleep as poor man's synchronization in tests");
        eprintln!("  - Sleep to 'wait' for events (use async I/O!)");

        panic!(
            "\nFound {} sleep violation(s).\nFix these before merging!",
            violations.len()
        );
    }
}

/// The checked directories must exist, or the rule silently passes
#[test]
fn test_checked_directories_exist() {
    for dir in PRODUCTION_DIRS {
        assert!(
            workspace_root().join(dir).is_dir(),
            "missing source directory {dir}"
        );
        assert!(!rust_sources(dir).is_empty(), "no Rust sources in {dir}");
    }
}

/// Find all sleep() calls in relay sources
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for file in rust_sources(dir) {
            check_file(&file, &mut violations);
        }
    }

    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };

    for (idx, line) in content.lines().enumerate() {
        if let Some(code) = sleep_call(line) {
            violations.push(format!("{}:{} - {}", path.display(), idx + 1, code));
        }
    }
}

/// The trimmed line if its code part calls a sleep function
fn sleep_call(line: &str) -> Option<&str> {
    // Skip comments
    let code_part = line.split("//").next().unwrap_or(line);

    (code_part.contains("::sleep(") || code_part.contains(".sleep(")).then(|| line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_violation_detection() {
        assert!(sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;").is_some());
        assert!(sleep_call("    std::thread::sleep(delay);").is_some());
        assert!(sleep_call("    clock.sleep(delay);").is_some());
    }

    #[test]
    fn test_comments_are_ignored() {
        assert!(sleep_call("    // no time::sleep(0.01) between chunks").is_none());
        assert!(sleep_call("    send(chunk); // no ::sleep( here").is_none());
        assert!(sleep_call("    let asleep = true;").is_none());
    }
}
