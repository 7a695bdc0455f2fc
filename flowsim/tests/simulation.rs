// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

mod common;

use common::{FailingWriter, LAB, build, build_with_log, http_count, settings};
use flowsim::error::RunError;
use flowsim::report::{AbortCause, RunState};
use flowsim::results::{ResultLog, TaskRecord};
use flowsim::simulation::{RunSettings, run_to_completion, schedule_stop};
use flowsim_emulation::platform::ExchangeError;
use flowsim_engine::test_helpers::start_test;
use flowsim_traffic::task::{ErrorKind, TaskKind, TaskState};

fn states(records: &[TaskRecord]) -> Vec<(u64, TaskState, Option<ErrorKind>)> {
    records
        .iter()
        .map(|r| (r.task_id.0, r.state, r.error_kind))
        .collect()
}

#[test]
fn two_hosts_one_switch() {
    let mut engine = start_test(file!());
    let topology = "graph { h1 -- s1 -- h2; h2 [role=server]; }";
    let (run, platform) = build(
        &engine,
        topology,
        &http_count(5, 10_000, 1),
        settings(),
        200,
    );
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.generated, 5);
    assert_eq!(report.done, 5);
    assert_eq!(report.total_failed(), 0);
    assert_eq!(report.abort_cause, None);
    assert!(report.end_time >= 10_000);

    let records = run.records();
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.kind, TaskKind::Http);
        assert_eq!(record.source, "h1");
        assert_eq!(record.dest, "h2");
        assert!(record.completion_time >= record.scheduled_time);
        assert_eq!(record.completion_time, record.scheduled_time + 200);
    }
    assert_eq!(platform.started().len(), 5);
    assert!(platform.is_torn_down());
    assert_eq!(run.state(), RunState::Completed);
}

#[test]
fn single_worker_runs_tasks_in_turn() {
    let mut engine = start_test(file!());
    let settings = RunSettings {
        duration: 1,
        workers: 1,
        ..settings()
    };
    // Both arrivals land on tick 0.
    let (run, platform) = build(&engine, LAB, &http_count(2, 1, 7), settings, 500);
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(platform.started(), vec![(0, 0), (1, 500)]);
    let records = run.records();
    assert_eq!(
        states(&records),
        vec![(0, TaskState::Done, None), (1, TaskState::Done, None)]
    );
    assert_eq!(records[0].completion_time, 500);
    assert_eq!(records[1].completion_time, 1_000);
    assert_eq!(report.end_time, 1_000);
}

#[test]
fn timed_out_task_frees_its_worker() {
    let mut engine = start_test(file!());
    let settings = RunSettings {
        duration: 1,
        workers: 1,
        task_timeout: 300,
        ..settings()
    };
    let (run, platform) = build(&engine, LAB, &http_count(2, 1, 7), settings, 500);
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(platform.started(), vec![(0, 0), (1, 300)]);
    let records = run.records();
    assert_eq!(
        states(&records),
        vec![
            (0, TaskState::Failed, Some(ErrorKind::TaskTimeout)),
            (1, TaskState::Failed, Some(ErrorKind::TaskTimeout)),
        ]
    );
    assert_eq!(records[1].completion_time, 600);
    assert_eq!(report.failed_with(ErrorKind::TaskTimeout), 2);
}

#[test]
fn stop_cancels_in_flight_task_after_grace() {
    let mut engine = start_test(file!());
    let settings = RunSettings {
        duration: 1_000,
        task_timeout: 60_000,
        grace: 500,
        ..settings()
    };
    let (run, _platform) = build(&engine, LAB, &http_count(1, 1_000, 3), settings, 10_000);
    schedule_stop(&engine.spawner(), engine.clock(), run.stop_handle(), 1_500);
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.abort_cause, Some(AbortCause::Stopped));
    assert_eq!(report.force_cancelled, 1);
    assert_eq!(report.end_time, 2_000);

    let records = run.records();
    assert_eq!(
        states(&records),
        vec![(0, TaskState::Failed, Some(ErrorKind::Cancelled))]
    );
    assert_eq!(records[0].completion_time, 2_000);
}

#[test]
fn stop_cancels_waiting_tasks_immediately() {
    let mut engine = start_test(file!());
    let settings = RunSettings {
        duration: 1,
        workers: 1,
        task_timeout: 60_000,
        grace: 100,
        ..settings()
    };
    let (run, platform) = build(&engine, LAB, &http_count(3, 1, 5), settings, 5_000);
    schedule_stop(&engine.spawner(), engine.clock(), run.stop_handle(), 1_000);
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.force_cancelled, 3);
    assert_eq!(platform.started(), vec![(0, 0)]);

    // Tasks that never started are cancelled at the stop, the running one
    // once its grace has run out.
    let records = run.records();
    let cancelled: Vec<(u64, u64)> = records
        .iter()
        .map(|r| (r.task_id.0, r.completion_time))
        .collect();
    assert_eq!(cancelled, vec![(1, 1_000), (2, 1_000), (0, 1_100)]);
    assert!(
        records
            .iter()
            .all(|r| r.error_kind == Some(ErrorKind::Cancelled))
    );
}

#[test]
fn stop_after_the_run_finished_is_ignored() {
    let mut engine = start_test(file!());
    let (run, _platform) = build(&engine, LAB, &http_count(3, 10_000, 2), settings(), 100);
    schedule_stop(&engine.spawner(), engine.clock(), run.stop_handle(), 1_000_000);
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.done, 3);
    assert!(report.end_time < 1_000_000);
    assert!(!run.stop_handle().is_stopped());
}

#[test]
fn unreachable_tasks_fail_without_waiting() {
    let mut engine = start_test(file!());
    let topology = "graph {
        h1 -- s1 -- web;
        web [role=server];
        h3 [type=host];
    }";
    let (run, platform) = build(&engine, topology, &http_count(20, 10_000, 11), settings(), 200);
    let report = run_to_completion(&mut engine, &run).unwrap();
    assert_eq!(report.state, RunState::Completed);

    let records = run.records();
    assert_eq!(records.len(), 20);
    let unreachable: Vec<&TaskRecord> = records
        .iter()
        .filter(|r| r.error_kind == Some(ErrorKind::Unreachable))
        .collect();
    assert!(!unreachable.is_empty());
    for record in &unreachable {
        assert_eq!(record.source, "h3");
        assert_eq!(record.completion_time, record.scheduled_time);
        assert_eq!(record.bytes, 0);
    }
    for record in records.iter().filter(|r| r.source == "h1") {
        assert_eq!(record.state, TaskState::Done);
    }
    assert_eq!(platform.started().len(), 20 - unreachable.len());
    assert_eq!(report.failed_with(ErrorKind::Unreachable), unreachable.len());
}

#[test]
fn failed_task_does_not_affect_others() {
    let mut engine = start_test(file!());
    let (run, platform) = build(&engine, LAB, &http_count(6, 10_000, 4), settings(), 100);
    platform.set_failure(2, ExchangeError::ConnectionRefused);
    platform.set_failure(4, ExchangeError::Platform("host crashed".to_string()));
    platform.set_duration(3, 60_000);
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.done, 3);
    assert_eq!(report.failed_with(ErrorKind::ConnectionRefused), 1);
    assert_eq!(report.failed_with(ErrorKind::PlatformFailure), 1);
    assert_eq!(report.failed_with(ErrorKind::TaskTimeout), 1);

    let mut by_id = states(&run.records());
    by_id.sort();
    assert_eq!(
        by_id,
        vec![
            (0, TaskState::Done, None),
            (1, TaskState::Done, None),
            (2, TaskState::Failed, Some(ErrorKind::ConnectionRefused)),
            (3, TaskState::Failed, Some(ErrorKind::TaskTimeout)),
            (4, TaskState::Failed, Some(ErrorKind::PlatformFailure)),
            (5, TaskState::Done, None),
        ]
    );
}

#[test]
fn same_seed_same_results() {
    let outcome = |seed| {
        let mut engine = start_test(file!());
        let (run, _platform) = build(&engine, LAB, &http_count(30, 10_000, seed), settings(), 250);
        run_to_completion(&mut engine, &run).unwrap();
        run.records()
    };
    assert_eq!(outcome(9), outcome(9));
    assert_ne!(outcome(9), outcome(10));
}

#[test]
fn controller_not_ready() {
    let mut engine = start_test(file!());
    let topology = "graph { h1 -- s1 -- s2 -- web; web [role=server]; }";
    let (run, platform) = build(&engine, topology, &http_count(5, 10_000, 1), settings(), 100);
    platform.connect_only(1);

    let result = run_to_completion(&mut engine, &run);
    assert_eq!(
        result,
        Err(RunError::ControllerNotReady {
            connected: 1,
            expected: 2
        })
    );
    assert_eq!(run.state(), RunState::Aborted);
    assert!(run.records().is_empty());
    assert!(platform.started().is_empty());
    assert!(platform.is_torn_down());
    assert_eq!(run.report().map(|r| r.end_time), Some(1_000));
}

#[test]
fn session_lost_mid_run() {
    let mut engine = start_test(file!());
    let settings = RunSettings {
        duration: 1_000,
        task_timeout: 60_000,
        grace: 500,
        ..settings()
    };
    let (run, platform) = build(&engine, LAB, &http_count(1, 1_000, 3), settings, 10_000);
    {
        let platform = platform.clone();
        let clock = engine.clock();
        engine.spawn(async move {
            clock.wait_ticks(1_500).await;
            platform.sever();
            Ok(())
        });
    }
    let report = run_to_completion(&mut engine, &run).unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.abort_cause, Some(AbortCause::ControllerSessionLost));
    assert_eq!(report.failed_with(ErrorKind::Cancelled), 1);
    assert_eq!(report.end_time, 2_000);
    assert!(platform.is_torn_down());
}

#[test]
fn unwritable_results_still_release_everything() {
    let mut engine = start_test(file!());
    let (writer, failing) = FailingWriter::new();
    let results = ResultLog::new(Box::new(writer)).unwrap();
    let (run, platform) = build_with_log(
        &engine,
        LAB,
        &http_count(4, 1_000, 1),
        settings(),
        500,
        results,
    );
    failing.set(true);

    let result = run_to_completion(&mut engine, &run);
    match result {
        Err(RunError::Simulation(msg)) => assert!(msg.contains("disk full"), "{msg}"),
        other => panic!("expected a simulation error, got {other:?}"),
    }

    assert_eq!(run.state(), RunState::Aborted);
    assert!(platform.is_torn_down());
    assert_eq!(run.controller().connected_count(), 0);

    let report = run.report().unwrap();
    assert!(matches!(report.abort_cause, Some(AbortCause::Failed(ref msg)) if msg.contains("disk full")));
    assert!(report.end_time < settings().duration);
    // Every task still reaches a final state in memory.
    assert_eq!(run.records().len() as u64, report.generated);
}

#[test]
fn platform_that_cannot_instantiate_aborts_the_run() {
    let mut engine = start_test(file!());
    let (run, platform) = build(&engine, LAB, &http_count(3, 1_000, 1), settings(), 100);
    platform.fail_instantiate("no room for s1");

    let result = run_to_completion(&mut engine, &run);
    assert_eq!(result, Err(RunError::Simulation("no room for s1".to_string())));
    assert_eq!(run.state(), RunState::Aborted);
    assert!(platform.is_torn_down());
    assert!(platform.started().is_empty());

    let report = run.report().unwrap();
    assert_eq!(
        report.abort_cause,
        Some(AbortCause::PlatformFailure("no room for s1".to_string()))
    );
    assert_eq!(report.end_time, 0);
}
