// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use flowsim::config::RunConfig;
use flowsim::error::RunError;
use tempfile::TempDir;

fn cli(args: &[&str]) -> RunConfig {
    RunConfig::parse_from(std::iter::once("flowsim").chain(args.iter().copied()))
}

#[test]
fn conf_file_sits_below_the_command_line() {
    let dir = TempDir::new().unwrap();
    let conf_file = dir.path().join("run.toml");
    fs::write(
        &conf_file,
        "workers = 2\nduration_secs = 5.0\ninstall_mode = \"reactive\"\n",
    )
    .unwrap();

    let config = RunConfig::from_cli(cli(&[
        "--topology",
        "lab.dot",
        "--conf-file",
        conf_file.to_str().unwrap(),
        "--duration-secs",
        "7.5",
    ]))
    .unwrap();

    assert_eq!(config.workers, Some(2));
    assert_eq!(config.install_mode.as_deref(), Some("reactive"));
    assert_eq!(config.duration_secs, Some(7.5));
    assert_eq!(config.topology, Some(PathBuf::from("lab.dot")));
    assert_eq!(config.run_settings().unwrap().duration, 7_500);
}

#[test]
fn conf_file_must_be_a_file() {
    let dir = TempDir::new().unwrap();

    let result = RunConfig::from_cli(cli(&[
        "--topology",
        "lab.dot",
        "--conf-file",
        dir.path().to_str().unwrap(),
    ]));
    match result {
        Err(RunError::Configuration(msg)) => assert!(msg.contains("is not a file path")),
        other => panic!("unexpected {other:?}"),
    }

    let missing = dir.path().join("missing.toml");
    let result = RunConfig::from_cli(cli(&[
        "--topology",
        "lab.dot",
        "--conf-file",
        missing.to_str().unwrap(),
    ]));
    match result {
        Err(RunError::Configuration(msg)) => assert!(msg.contains("not found")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn invalid_conf_file_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let conf_file = dir.path().join("run.toml");
    fs::write(&conf_file, "workers = 0\n").unwrap();

    let result = RunConfig::from_cli(cli(&[
        "--topology",
        "lab.dot",
        "--conf-file",
        conf_file.to_str().unwrap(),
    ]));
    assert!(matches!(result, Err(RunError::Configuration(_))));

    fs::write(&conf_file, "workers = \"many\"\n").unwrap();
    let result = RunConfig::from_cli(cli(&[
        "--topology",
        "lab.dot",
        "--conf-file",
        conf_file.to_str().unwrap(),
    ]));
    assert!(matches!(result, Err(RunError::Configuration(_))));
}
