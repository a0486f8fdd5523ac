// src/watch/mod.rs

//! Watch mode: re-run the engine whenever watched directories change.

pub mod watcher;

pub use watcher::{spawn_watcher, WatcherHandle};
