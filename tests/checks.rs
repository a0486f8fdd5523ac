// tests/checks.rs

//! Check-driven staleness: virtual resources, the persisted value store,
//! and probe failures.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use ruledag::build_targets;
use ruledag::errors::Error;
use ruledag::rules::{Depends, Registry};

fn check_registry(p: &Project, log: &Log, value: Arc<Mutex<String>>) -> Registry {
    let mut reg = Registry::new();
    reg.add_check(&["res://*"], value_probe(value)).unwrap();
    reg.add_rule(
        &[p.path("data.json").as_str()],
        None,
        Depends::from(["res://data"]),
        &[],
        write_handler(log.clone()),
    )
    .unwrap();
    reg
}

#[tokio::test]
async fn probe_value_drives_rebuilds_across_runs() {
    let p = Project::new();
    let log = new_log();
    let value = Arc::new(Mutex::new("v1".to_string()));
    let reg = check_registry(&p, &log, value.clone());
    let target = p.path("data.json");

    // First run: output missing, builds; the probe value is recorded.
    let report = build_targets(&reg, &p.options(1), &[target.clone()])
        .await
        .unwrap();
    assert_eq!(report.built, 1);

    // Unchanged probe value: up to date.
    let report = build_targets(&reg, &p.options(1), &[target.clone()])
        .await
        .unwrap();
    assert_eq!(report.built, 0);

    // Changed probe value: rebuilt.
    *value.lock().unwrap() = "v2".to_string();
    let report = build_targets(&reg, &p.options(1), &[target.clone()])
        .await
        .unwrap();
    assert_eq!(report.built, 1);

    // And the new value round-trips through the store.
    let report = build_targets(&reg, &p.options(1), &[target])
        .await
        .unwrap();
    assert_eq!(report.built, 0);
}

#[tokio::test]
async fn failing_probe_is_a_build_error_and_reprobes_next_run() {
    let p = Project::new();
    let log = new_log();
    let value = Arc::new(Mutex::new("v1".to_string()));
    let target = p.path("data.json");

    // Establish a stored value with a working probe.
    let reg = check_registry(&p, &log, value.clone());
    build_targets(&reg, &p.options(1), &[target.clone()])
        .await
        .unwrap();

    // Same graph, but the probe now fails: build error, exit code 1.
    let mut broken = Registry::new();
    broken.add_check(&["res://*"], failing_probe()).unwrap();
    broken
        .add_rule(
            &[target.as_str()],
            None,
            Depends::from(["res://data"]),
            &[],
            write_handler(log.clone()),
        )
        .unwrap();
    let err = build_targets(&broken, &p.options(1), &[target.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CheckProbeFailed { .. }));
    assert_eq!(err.exit_code(), 1);

    // The failure invalidated the stored entry, so a working probe now
    // reports "changed" and the target rebuilds.
    clear(&log);
    let report = build_targets(&reg, &p.options(1), &[target])
        .await
        .unwrap();
    assert_eq!(report.built, 1);
}

#[tokio::test]
async fn virtual_target_with_rule_compares_probe_against_depends() {
    // A rule may produce a virtual resource; its own freshness comes from
    // the probe, not the filesystem, and no output file is expected.
    let p = Project::new();
    let log = new_log();
    let value = Arc::new(Mutex::new("snapshot-1".to_string()));
    p.write("seed.sql", "create table t;\n");
    p.set_mtime("seed.sql", -100);

    let mut reg = Registry::new();
    reg.add_check(&["db://*"], value_probe(value.clone())).unwrap();
    reg.add_rule(
        &["db://main/table"],
        None,
        Depends::from([p.path("seed.sql")]),
        &[],
        produce_nothing_handler(log.clone()),
    )
    .unwrap();

    // First sight of the resource stamps it "just changed", which is newer
    // than the aged seed file: nothing to do.
    let report = build_targets(&reg, &p.options(1), &["db://main/table"])
        .await
        .unwrap();
    assert_eq!(report.built, 0);

    // With the seed newer than the recorded probe time, the rule runs; no
    // output-file verification applies to virtual targets.
    p.set_mtime("seed.sql", 10);
    let report = build_targets(&reg, &p.options(1), &["db://main/table"])
        .await
        .unwrap();
    assert_eq!(report.built, 1);
}
