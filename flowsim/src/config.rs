// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Run configuration gathered from several sources.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. the defaults of [`RunConfig::default`],
//! 2. an optional TOML file named by `--conf-file`,
//! 3. environment variables prefixed with `FLOWSIM_` (`FLOWSIM_WORKERS=4`),
//! 4. command-line flags.
//!
//! Every field is an `Option` so that a source only overrides what it sets.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use flowsim_controller::controller::InstallMode;
use flowsim_engine::time::clock::Pacing;
use flowsim_engine::time::secs_to_ticks;
use flowsim_traffic::generator::{Arrivals, GeneratorConfig, KindConfig};
use flowsim_traffic::sizes::SizeDistribution;
use flowsim_traffic::task::TaskKind;
use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::simulation::RunSettings;

pub const ENV_PREFIX: &str = "FLOWSIM_";

pub const DEFAULT_DURATION_SECS: f64 = 60.0;
pub const DEFAULT_HTTP_RATE_PER_SEC: f64 = 1.0;
pub const DEFAULT_FTP_RATE_PER_SEC: f64 = 0.1;
pub const DEFAULT_LOCAL_SHARE: f64 = 0.5;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_TASK_TIMEOUT_SECS: f64 = 20.0;
pub const DEFAULT_GRACE_SECS: f64 = 5.0;
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_CONTROLLER_READY_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_CHECK_INTERVAL_SECS: f64 = 0.1;

#[derive(Parser, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[command(
    name = "flowsim",
    version,
    about = "Drive scheduled HTTP and FTP traffic across an emulated software-defined network"
)]
pub struct RunConfig {
    /// Topology to emulate (`.dot`/`.gv` graph or `.yaml`/`.yml` switch
    /// layout).
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<PathBuf>,

    /// Catalog of HTTP sites and FTP files (YAML or JSON).
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,

    /// CSV of `timestamp_secs,packet_count` shaping traffic over the day.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<PathBuf>,

    /// Time of day, in seconds, that the run starts at in the profile.
    #[arg(long)]
    pub start_time_of_day_secs: Option<f64>,

    /// Logical run time in seconds.
    #[arg(long)]
    pub duration_secs: Option<f64>,

    /// Mean HTTP arrivals per second.
    #[arg(long)]
    pub http_rate_per_sec: Option<f64>,

    /// Exact number of HTTP arrivals over the run. Overrides the rate.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_count: Option<u64>,

    /// Mean FTP arrivals per second.
    #[arg(long)]
    pub ftp_rate_per_sec: Option<f64>,

    /// Exact number of FTP arrivals over the run. Overrides the rate.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftp_count: Option<u64>,

    /// Default HTTP payload size (`64KiB`, `exponential:64KiB`, ...).
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_size: Option<String>,

    /// Default FTP payload size (`uniform:1MiB-8MiB`, ...).
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftp_size: Option<String>,

    /// Probability that an arrival targets a local server.
    #[arg(long)]
    pub local_share: Option<f64>,

    /// Number of workers executing tasks.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seconds a task may run before it fails with a timeout.
    #[arg(long)]
    pub task_timeout_secs: Option<f64>,

    /// Seconds in-flight tasks get to finish after the run is stopped.
    #[arg(long)]
    pub grace_secs: Option<f64>,

    /// Seed of the traffic generator.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds to wait for every switch to connect to the controller.
    #[arg(long)]
    pub controller_ready_timeout_secs: Option<f64>,

    /// Longest logical sleep of the scheduler when nothing is due.
    #[arg(long)]
    pub check_interval_secs: Option<f64>,

    /// When paths are installed: `proactive` or `reactive`.
    #[arg(long)]
    pub install_mode: Option<String>,

    /// `virtual` to run as fast as possible or `realtime` to follow the
    /// wall clock.
    #[arg(long)]
    pub pacing: Option<String>,

    /// Speed-up applied to `realtime` pacing.
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Stop the run after this many logical seconds.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_after_secs: Option<f64>,

    /// CSV file the task results are written to.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<PathBuf>,

    /// Enable logging to the console.
    #[arg(long)]
    pub stdout: Option<bool>,

    /// Level of log message to display.
    #[arg(long)]
    pub stdout_level: Option<log::Level>,

    /// Set a regular expression for which entities should have logging level
    /// set to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long)]
    pub stdout_filter_regex: Option<String>,

    /// Also write the log to this file.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Level of log message written to `--log-file`.
    #[arg(long)]
    pub log_file_level: Option<log::Level>,

    /// Show a progress bar over logical run time.
    #[arg(long)]
    pub progress: Option<bool>,

    /// Additional TOML configuration file.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            topology: None,
            catalog: None,
            profile: None,
            start_time_of_day_secs: Some(0.0),
            duration_secs: Some(DEFAULT_DURATION_SECS),
            http_rate_per_sec: Some(DEFAULT_HTTP_RATE_PER_SEC),
            http_count: None,
            ftp_rate_per_sec: Some(DEFAULT_FTP_RATE_PER_SEC),
            ftp_count: None,
            http_size: None,
            ftp_size: None,
            local_share: Some(DEFAULT_LOCAL_SHARE),
            workers: Some(DEFAULT_WORKERS),
            task_timeout_secs: Some(DEFAULT_TASK_TIMEOUT_SECS),
            grace_secs: Some(DEFAULT_GRACE_SECS),
            seed: Some(DEFAULT_SEED),
            controller_ready_timeout_secs: Some(DEFAULT_CONTROLLER_READY_TIMEOUT_SECS),
            check_interval_secs: Some(DEFAULT_CHECK_INTERVAL_SECS),
            install_mode: Some(InstallMode::default().to_string()),
            pacing: Some("virtual".to_string()),
            time_scale: Some(1.0),
            stop_after_secs: None,
            results: None,
            stdout: Some(false),
            stdout_level: Some(log::Level::Info),
            stdout_filter_regex: Some(String::new()),
            log_file: None,
            log_file_level: Some(log::Level::Debug),
            progress: Some(false),
            conf_file: None,
        }
    }
}

/// Overwrite the fields of `$config` that `$other` sets.
macro_rules! merge_fields {
    ($config:ident, $other:ident ; $($field:ident),* $(,)?) => {
        $(
            if $other.$field.is_some() {
                $config.$field = $other.$field;
            }
        )*
    };
}

/// Check that an extra configuration file can be read.
pub fn check_conf_file(conf_file: &Path) -> Result<(), io::Error> {
    if conf_file.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            format!("{} is not a file path", conf_file.display()),
        ));
    }
    if !conf_file.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", conf_file.display()),
        ));
    }
    Ok(())
}

fn positive_secs(value: Option<f64>, name: &str) -> Result<f64, RunError> {
    match value {
        Some(secs) if secs > 0.0 && secs.is_finite() => Ok(secs),
        Some(secs) => Err(RunError::Configuration(format!(
            "{name} must be positive, got {secs}"
        ))),
        None => Err(RunError::Configuration(format!("{name} is not set"))),
    }
}

impl RunConfig {
    /// Parse the command line and merge it over the other sources.
    pub fn parse_all_sources() -> Result<Self, RunError> {
        Self::from_cli(Self::parse())
    }

    /// Merge already parsed command-line flags over the defaults, the
    /// configuration file and the environment.
    pub fn from_cli(cli: RunConfig) -> Result<Self, RunError> {
        if let Some(conf_file) = &cli.conf_file {
            check_conf_file(conf_file)?;
        }
        let mut config: RunConfig = Self::figment(cli.conf_file.as_deref()).extract()?;
        config.merge(cli);
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the configuration file, then the environment.
    #[must_use]
    pub fn figment(conf_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(RunConfig::default()));
        if let Some(conf_file) = conf_file {
            figment = figment.merge(Toml::file(conf_file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Take every value `other` sets.
    pub fn merge(&mut self, other: RunConfig) {
        merge_fields!(self, other ;
            topology, catalog, profile, start_time_of_day_secs, duration_secs,
            http_rate_per_sec, http_count, ftp_rate_per_sec, ftp_count,
            http_size, ftp_size, local_share, workers, task_timeout_secs,
            grace_secs, seed, controller_ready_timeout_secs, check_interval_secs,
            install_mode, pacing, time_scale, stop_after_secs, results,
            stdout, stdout_level, stdout_filter_regex, log_file, log_file_level,
            progress, conf_file,
        );
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.topology.is_none() {
            return Err(RunError::Configuration(
                "no topology given (--topology)".to_string(),
            ));
        }
        self.run_settings()?;
        self.generator_config()?;
        self.pacing()?;
        if let Some(secs) = self.stop_after_secs {
            if secs.is_nan() || secs < 0.0 {
                return Err(RunError::Configuration(format!(
                    "stop after {secs}s is negative"
                )));
            }
        }
        Ok(())
    }

    pub fn run_settings(&self) -> Result<RunSettings, RunError> {
        let install_mode = match &self.install_mode {
            Some(mode) => InstallMode::from_str(mode).map_err(RunError::Configuration)?,
            None => InstallMode::default(),
        };
        let grace = self.grace_secs.unwrap_or(DEFAULT_GRACE_SECS);
        if !grace.is_finite() || grace < 0.0 {
            return Err(RunError::Configuration(format!(
                "grace must be finite and not negative, got {grace}"
            )));
        }
        let settings = RunSettings {
            duration: secs_to_ticks(positive_secs(self.duration_secs, "duration")?),
            workers: self.workers.unwrap_or(DEFAULT_WORKERS),
            task_timeout: secs_to_ticks(positive_secs(
                self.task_timeout_secs,
                "task timeout",
            )?),
            grace: secs_to_ticks(grace),
            controller_ready_timeout: secs_to_ticks(positive_secs(
                self.controller_ready_timeout_secs,
                "controller ready timeout",
            )?),
            check_interval: secs_to_ticks(positive_secs(
                self.check_interval_secs,
                "check interval",
            )?),
            install_mode,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn arrivals(
        kind: TaskKind,
        rate: Option<f64>,
        count: Option<u64>,
    ) -> Result<Arrivals, RunError> {
        if let Some(count) = count {
            return Ok(Arrivals::Count(count));
        }
        let rate = rate.unwrap_or(0.0);
        if !rate.is_finite() || rate < 0.0 {
            return Err(RunError::Configuration(format!(
                "{kind} rate must be finite and not negative, got {rate}"
            )));
        }
        Ok(Arrivals::RatePerSec(rate))
    }

    fn size(size: &Option<String>) -> Result<Option<SizeDistribution>, RunError> {
        size.as_deref()
            .map(SizeDistribution::from_str)
            .transpose()
            .map_err(RunError::Configuration)
    }

    pub fn generator_config(&self) -> Result<GeneratorConfig, RunError> {
        let local_share = self.local_share.unwrap_or(DEFAULT_LOCAL_SHARE);
        if !(0.0..=1.0).contains(&local_share) {
            return Err(RunError::Configuration(format!(
                "local share {local_share} is not between 0 and 1"
            )));
        }
        let kinds = vec![
            KindConfig {
                kind: TaskKind::Http,
                arrivals: Self::arrivals(TaskKind::Http, self.http_rate_per_sec, self.http_count)?,
                size: Self::size(&self.http_size)?,
            },
            KindConfig {
                kind: TaskKind::Ftp,
                arrivals: Self::arrivals(TaskKind::Ftp, self.ftp_rate_per_sec, self.ftp_count)?,
                size: Self::size(&self.ftp_size)?,
            },
        ];
        Ok(GeneratorConfig {
            kinds,
            horizon: secs_to_ticks(positive_secs(self.duration_secs, "duration")?),
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            local_share,
            start_time_of_day_secs: self.start_time_of_day_secs.unwrap_or(0.0),
        })
    }

    pub fn pacing(&self) -> Result<Pacing, RunError> {
        match self.pacing.as_deref().unwrap_or("virtual").to_ascii_lowercase().as_str() {
            "virtual" => Ok(Pacing::Virtual),
            "realtime" => {
                let time_scale = self.time_scale.unwrap_or(1.0);
                if time_scale > 0.0 && time_scale.is_finite() {
                    Ok(Pacing::Realtime { time_scale })
                } else {
                    Err(RunError::Configuration(format!(
                        "time scale must be positive, got {time_scale}"
                    )))
                }
            }
            other => Err(RunError::Configuration(format!(
                "Unknown pacing '{other}' (expected virtual or realtime)"
            ))),
        }
    }
}
