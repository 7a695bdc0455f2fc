// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::fs;

use flowsim_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use flowsim_track::entity::{Entity, toplevel};
use flowsim_track::{debug, info};

#[test]
fn file_tracker_respects_filter() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("run.log");
    let log_path_str = log_path.to_str().unwrap();

    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            level: log::Level::Debug,
            filter_regex: ".*controller",
            file: Some(log_path_str),
        },
    };
    let tracker = setup_trackers(&config).unwrap();

    {
        let top = toplevel(&tracker, "top");
        let controller = Entity::new(&top, "controller");
        let pool = Entity::new(&top, "pool");

        debug!(controller ; "installed {} rules", 4);
        info!(pool ; "not shown");
        tracker.shutdown();
    }

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("DEBUG: installed 4 rules"));
    assert!(!contents.contains("not shown"));
}

#[test]
fn bad_filter_regex() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: true,
            level: log::Level::Info,
            filter_regex: "[",
            file: None,
        },
        log_file: TrackerConfig {
            enable: false,
            ..Default::default()
        },
    };
    assert!(setup_trackers(&config).is_err());
}

#[test]
fn missing_log_file_name() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            ..Default::default()
        },
    };
    assert!(setup_trackers(&config).is_err());
}
