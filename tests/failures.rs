// tests/failures.rs

//! Failure propagation and cancellation.

mod common;

use std::time::Duration;

use common::*;
use ruledag::build_targets;
use ruledag::errors::Error;
use ruledag::rules::{Depends, Registry};

#[tokio::test]
async fn failed_child_fails_the_parent_and_exits_one() {
    let p = Project::new();
    let log = new_log();
    let (x, y, z, top) = (
        p.path("x.txt"),
        p.path("y.txt"),
        p.path("z.txt"),
        p.path("top.txt"),
    );

    let mut reg = Registry::new();
    reg.add_rule(
        &[top.as_str()],
        None,
        Depends::from([x.clone(), y.clone(), z.clone()]),
        &[],
        write_handler(log.clone()),
    )
    .unwrap();
    reg.add_rule(
        &[x.as_str()],
        None,
        Depends::none(),
        &[],
        slow_write_handler(log.clone(), Duration::from_millis(30)),
    )
    .unwrap();
    reg.add_rule(&[y.as_str()], None, Depends::none(), &[], failing_handler(log.clone()))
        .unwrap();
    reg.add_rule(
        &[z.as_str()],
        None,
        Depends::none(),
        &[],
        slow_write_handler(log.clone(), Duration::from_millis(30)),
    )
    .unwrap();

    let err = build_targets(&reg, &p.options(4), &[top.clone()])
        .await
        .unwrap_err();
    match &err {
        Error::HandlerFailed { target, .. } => assert_eq!(target, &y),
        other => panic!("expected HandlerFailed for y, got {other}"),
    }
    assert_eq!(err.exit_code(), 1);

    // The parent never ran; siblings may or may not have completed.
    assert!(!starts(&log).contains(&top));
}

#[tokio::test]
async fn no_new_dispatch_after_a_failure() {
    let p = Project::new();
    let log = new_log();
    let (first, second, top) = (p.path("first.txt"), p.path("second.txt"), p.path("top.txt"));

    // With one job, `first` fails before `second` can be dispatched.
    let mut reg = Registry::new();
    reg.add_rule(
        &[top.as_str()],
        None,
        Depends::from([first.clone(), second.clone()]),
        &[],
        write_handler(log.clone()),
    )
    .unwrap();
    reg.add_rule(
        &[first.as_str()],
        None,
        Depends::none(),
        &[],
        failing_handler(log.clone()),
    )
    .unwrap();
    reg.add_rule(
        &[second.as_str()],
        None,
        Depends::none(),
        &[],
        write_handler(log.clone()),
    )
    .unwrap();

    let err = build_targets(&reg, &p.options(1), &[top.clone()])
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);

    let started = starts(&log);
    assert_eq!(started, vec![first.clone()]);
}

#[tokio::test]
async fn successful_handler_without_output_is_target_not_produced() {
    let p = Project::new();
    let log = new_log();
    let out = p.path("ghost.txt");

    let mut reg = Registry::new();
    reg.add_rule(
        &[out.as_str()],
        None,
        Depends::none(),
        &[],
        produce_nothing_handler(log.clone()),
    )
    .unwrap();

    let err = build_targets(&reg, &p.options(1), &[out.clone()])
        .await
        .unwrap_err();
    match err {
        Error::TargetNotProduced(target) => assert_eq!(target, out),
        other => panic!("expected TargetNotProduced, got {other}"),
    }
}

#[tokio::test]
async fn tasks_need_no_output_file() {
    let p = Project::new();
    let log = new_log();
    let mut reg = Registry::new();
    reg.add_task(
        "noop",
        false,
        Depends::none(),
        &[],
        produce_nothing_handler(log.clone()),
        None,
    )
    .unwrap();

    let report = build_targets(&reg, &p.options(1), &["noop"]).await.unwrap();
    assert_eq!(report.built, 1);
}

#[tokio::test]
async fn failure_through_uses_edge_fails_the_user() {
    let p = Project::new();
    let log = new_log();
    let (dir, out) = (p.path("outdir"), p.path("outdir/out.txt"));
    p.write("in.txt", "x\n");

    let mut reg = Registry::new();
    reg.add_rule(
        &[out.as_str()],
        None,
        Depends::from([p.path("in.txt")]),
        &[dir.as_str()],
        write_handler(log.clone()),
    )
    .unwrap();
    reg.add_rule(&[dir.as_str()], None, Depends::none(), &[], failing_handler(log.clone()))
        .unwrap();

    let err = build_targets(&reg, &p.options(2), &[out.clone()])
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(!starts(&log).contains(&out));
}
