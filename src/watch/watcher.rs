// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` stays alive
/// for as long as needed. Dropping it stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `dirs` recursively and send one unit on `trigger_tx` per relevant
/// change. Events under `state_dir` are ignored so the engine's own store
/// writes cannot re-trigger a build.
pub fn spawn_watcher(
    dirs: &[PathBuf],
    state_dir: PathBuf,
    trigger_tx: mpsc::Sender<()>,
) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = event_tx.send(event);
            }
            Err(err) => {
                eprintln!("ruledag: file watch error: {err}");
            }
        },
        Config::default(),
    )
    .map_err(|e| anyhow::anyhow!("starting file watcher: {e}"))?;

    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|e| anyhow::anyhow!("watching {dir:?}: {e}"))?;
        info!(dir = %dir.display(), "watching for changes");
    }

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if event.paths.iter().all(|p| under(p, &state_dir)) {
                continue;
            }
            debug!(?event, "filesystem change");
            if trigger_tx.send(()).await.is_err() {
                warn!("watch trigger channel closed; stopping watcher loop");
                return;
            }
        }
    });

    Ok(WatcherHandle { _inner: watcher })
}

fn under(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}
