// src/stale/commit.rs

//! Commit-history timestamps.
//!
//! In commit-time mode the oracle prefers a file's last commit time over its
//! worktree modification time, provided the worktree copy is unmodified.
//! This keeps a fresh checkout from rebuilding the world: checkout bumps
//! every mtime, but commit times still reflect the real edit history.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::process::Command;
use tracing::debug;

/// Per-file commit-time lookup with a cache.
///
/// Answers `None` whenever the commit time cannot be used: the file is
/// untracked, locally modified, or no history tool is available. Callers
/// fall back to the worktree mtime in that case.
#[derive(Debug, Default)]
pub struct CommitTimes {
    cache: HashMap<String, Option<SystemTime>>,
}

impl CommitTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn committed_time(&mut self, path: &str) -> Option<SystemTime> {
        if let Some(cached) = self.cache.get(path) {
            return *cached;
        }
        let resolved = lookup(path).await;
        self.cache.insert(path.to_string(), resolved);
        resolved
    }
}

async fn lookup(path: &str) -> Option<SystemTime> {
    if !worktree_is_clean(path).await? {
        debug!(path, "worktree copy differs from committed snapshot");
        return None;
    }

    let output = Command::new("git")
        .current_dir(repo_anchor(path))
        .args(["log", "-1", "--format=%ct", "--"])
        .arg(path)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let secs: u64 = stdout.trim().parse().ok()?;
    debug!(path, commit_time = secs, "using commit time for staleness");
    Some(UNIX_EPOCH + Duration::from_secs(secs))
}

/// `Some(true)` when the file is tracked and identical to its committed
/// snapshot; `Some(false)` when modified or untracked; `None` when git is
/// unavailable or errors.
async fn worktree_is_clean(path: &str) -> Option<bool> {
    let output = Command::new("git")
        .current_dir(repo_anchor(path))
        .args(["status", "--porcelain", "--"])
        .arg(path)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(output.stdout.is_empty())
}

/// Directory to run git from, so absolute target paths resolve against the
/// repository that actually contains them.
fn repo_anchor(path: &str) -> std::path::PathBuf {
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
