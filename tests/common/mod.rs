#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tracing_subscriber::{fmt, EnvFilter};

use ruledag::errors::{Error, Result};
use ruledag::rules::{BoxFuture, Handler, Invocation, Probe};
use ruledag::BuildOptions;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Uses `with_test_writer()`, so logs are captured per-test and only shown
/// for failing tests (unless run with `-- --nocapture`). Enable levels with
/// e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// A temporary project directory. Targets are addressed by absolute path so
/// tests never depend on the process working directory.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().expect("creating temp project dir"),
        }
    }

    /// Absolute path for a project-relative name, as a target string.
    pub fn path(&self, rel: &str) -> String {
        self.dir.path().join(rel).to_string_lossy().into_owned()
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Shift a file's (or directory's) mtime relative to now.
    pub fn set_mtime(&self, rel: &str, offset_secs: i64) {
        let path = self.dir.path().join(rel);
        let when = if offset_secs >= 0 {
            SystemTime::now() + Duration::from_secs(offset_secs as u64)
        } else {
            SystemTime::now() - Duration::from_secs((-offset_secs) as u64)
        };
        let file = std::fs::File::options()
            .read(true)
            .open(&path)
            .unwrap_or_else(|e| panic!("opening {path:?} to set mtime: {e}"));
        file.set_modified(when).unwrap();
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }

    pub fn options(&self, jobs: usize) -> BuildOptions {
        BuildOptions {
            jobs,
            commit_time: false,
            state_dir: self.dir.path().join(".ruledag"),
        }
    }
}

/// Start/end markers recorded by the test handlers, in wall-clock order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Start(String),
    End(String),
}

pub type Log = Arc<Mutex<Vec<LogEvent>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Targets in the order their handlers started.
pub fn starts(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            LogEvent::Start(name) => Some(name.clone()),
            LogEvent::End(_) => None,
        })
        .collect()
}

pub fn clear(log: &Log) {
    log.lock().unwrap().clear();
}

/// Assert the child's handler finished strictly before the parent's began.
pub fn assert_finished_before_start(log: &Log, child: &str, parent: &str) {
    let events = log.lock().unwrap().clone();
    let child_end = events
        .iter()
        .position(|e| *e == LogEvent::End(child.to_string()))
        .unwrap_or_else(|| panic!("no End event for {child}: {events:?}"));
    let parent_start = events
        .iter()
        .position(|e| *e == LogEvent::Start(parent.to_string()))
        .unwrap_or_else(|| panic!("no Start event for {parent}: {events:?}"));
    assert!(
        child_end < parent_start,
        "{child} must finish before {parent} starts: {events:?}"
    );
}

/// A handler that records start/end and writes the target file.
pub fn write_handler(log: Log) -> Arc<dyn Handler> {
    Arc::new(move |inv: Invocation| -> BoxFuture<Result<()>> {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(LogEvent::Start(inv.target.clone()));
            let body = format!("built from {:?}\n", inv.depends);
            tokio::fs::write(&inv.target, body).await?;
            log.lock().unwrap().push(LogEvent::End(inv.target.clone()));
            Ok(())
        })
    })
}

/// A handler that records start/end and creates the target as a directory.
pub fn mkdir_handler(log: Log) -> Arc<dyn Handler> {
    Arc::new(move |inv: Invocation| -> BoxFuture<Result<()>> {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(LogEvent::Start(inv.target.clone()));
            tokio::fs::create_dir_all(&inv.target).await?;
            log.lock().unwrap().push(LogEvent::End(inv.target.clone()));
            Ok(())
        })
    })
}

/// A handler that records its start, sleeps a little, then writes its
/// target. Useful for exercising concurrency windows.
pub fn slow_write_handler(log: Log, delay: Duration) -> Arc<dyn Handler> {
    Arc::new(move |inv: Invocation| -> BoxFuture<Result<()>> {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(LogEvent::Start(inv.target.clone()));
            tokio::time::sleep(delay).await;
            tokio::fs::write(&inv.target, "slow\n").await?;
            log.lock().unwrap().push(LogEvent::End(inv.target.clone()));
            Ok(())
        })
    })
}

/// A handler that always fails after recording its start.
pub fn failing_handler(log: Log) -> Arc<dyn Handler> {
    Arc::new(move |inv: Invocation| -> BoxFuture<Result<()>> {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(LogEvent::Start(inv.target.clone()));
            Err(Error::HandlerFailed {
                target: inv.target.clone(),
                reason: "deliberate test failure".to_string(),
            })
        })
    })
}

/// A handler that succeeds without producing any output file.
pub fn produce_nothing_handler(log: Log) -> Arc<dyn Handler> {
    Arc::new(move |inv: Invocation| -> BoxFuture<Result<()>> {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(LogEvent::Start(inv.target.clone()));
            log.lock().unwrap().push(LogEvent::End(inv.target.clone()));
            Ok(())
        })
    })
}

/// A probe that reports whatever value the shared cell currently holds.
pub fn value_probe(value: Arc<Mutex<String>>) -> Arc<dyn Probe> {
    Arc::new(move |_resource: &str| -> BoxFuture<Result<String>> {
        let current = value.lock().unwrap().clone();
        Box::pin(async move { Ok(current) })
    })
}

/// A probe that always fails.
pub fn failing_probe() -> Arc<dyn Probe> {
    Arc::new(|resource: &str| -> BoxFuture<Result<String>> {
        let resource = resource.to_string();
        Box::pin(async move {
            Err(Error::CheckProbeFailed {
                resource,
                reason: "deliberate probe failure".to_string(),
            })
        })
    })
}
