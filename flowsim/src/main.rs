// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Run a traffic simulation from the command line.
//!
//! See `lib.rs` for details.

use std::process::ExitCode;

use flowsim::builder::build_run;
use flowsim::config::RunConfig;
use flowsim::error::RunError;
use flowsim::simulation::{run_to_completion, schedule_stop};
use flowsim_engine::engine::Engine;
use flowsim_engine::executor::Spawner;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::time::{Ticks, secs_to_ticks};
use flowsim_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use flowsim_track::{Tracker, error, info};
use indicatif::{ProgressBar, ProgressStyle};

/// Milliseconds of logical time between progress bar updates.
const PROGRESS_TICKS: Ticks = 100;

fn setup_all_trackers(config: &RunConfig) -> Result<Tracker, RunError> {
    let log_file = config
        .log_file
        .as_ref()
        .map(|path| path.display().to_string());
    let trackers = TrackersConfig {
        stdout: TrackerConfig {
            enable: config.stdout.unwrap_or(false),
            level: config.stdout_level.unwrap_or(log::Level::Info),
            filter_regex: config.stdout_filter_regex.as_deref().unwrap_or(""),
            file: None,
        },
        log_file: TrackerConfig {
            enable: log_file.is_some(),
            level: config.log_file_level.unwrap_or(log::Level::Debug),
            filter_regex: "",
            file: log_file.as_deref(),
        },
    };
    Ok(setup_trackers(&trackers)?)
}

/// Spawn a background task that moves the progress bar along with logical
/// time.
fn start_progress(spawner: &Spawner, clock: Clock, duration: Ticks, progress_bar: ProgressBar) {
    spawner.spawn(async move {
        loop {
            // Use the `background` wait so that the simulation can end while this is
            // still active.
            clock.wait_ticks_or_exit(PROGRESS_TICKS).await;
            progress_bar.set_position(clock.tick_now().min(duration));
            if clock.tick_now() >= duration {
                break;
            }
        }
        Ok(())
    });
}

fn run(config: &RunConfig) -> Result<(), RunError> {
    let tracker = setup_all_trackers(config)?;
    let mut engine = Engine::with_pacing(&tracker, config.pacing()?);
    let top = engine.top().clone();

    let built = build_run(&engine, config)?;
    let settings = *built.run.settings();

    if let Some(secs) = config.stop_after_secs {
        schedule_stop(
            &engine.spawner(),
            engine.clock(),
            built.run.stop_handle(),
            secs_to_ticks(secs),
        );
    }

    let progress_bar = ProgressBar::new(settings.duration);
    if config.progress.unwrap_or(false) {
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len}ms {msg}") {
            progress_bar.set_style(style);
        }
        start_progress(
            &engine.spawner(),
            engine.clock(),
            settings.duration,
            progress_bar.clone(),
        );
    }

    let result = run_to_completion(&mut engine, &built.run);
    progress_bar.finish_and_clear();
    match result {
        Ok(report) => {
            info!(top ; "{} table misses raised by the network", built.network.packet_ins());
            println!("{report}");
            tracker.shutdown();
            Ok(())
        }
        Err(e) => {
            error!(top ; "{e}");
            tracker.shutdown();
            Err(e)
        }
    }
}

fn main() -> ExitCode {
    let config = match RunConfig::parse_all_sources() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
