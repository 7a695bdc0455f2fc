// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Assemble a [`SimulationRun`] from a [`RunConfig`].
//!
//! Every input is loaded and checked before anything is registered with
//! the engine, so a bad topology or catalog fails without leaving half a
//! run behind.

use std::rc::Rc;

use flowsim_emulation::network::EmulatedNetwork;
use flowsim_engine::engine::Engine;
use flowsim_topology::Topology;
use flowsim_track::info;
use flowsim_traffic::catalog::Catalog;
use flowsim_traffic::generator::TrafficGenerator;
use flowsim_traffic::profile::TrafficProfile;

use crate::config::RunConfig;
use crate::error::RunError;
use crate::results::ResultLog;
use crate::simulation::SimulationRun;

/// A run together with the network it drives.
pub struct BuiltRun {
    pub run: Rc<SimulationRun>,
    pub network: EmulatedNetwork,
    pub topology: Rc<Topology>,
}

pub fn load_topology(config: &RunConfig) -> Result<Rc<Topology>, RunError> {
    let Some(path) = &config.topology else {
        return Err(RunError::Configuration(
            "no topology given (--topology)".to_string(),
        ));
    };
    Ok(Rc::new(Topology::from_file(path)?))
}

pub fn build_generator(
    engine: &Engine,
    config: &RunConfig,
    topology: &Topology,
) -> Result<TrafficGenerator, RunError> {
    let catalog = match &config.catalog {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::default(),
    };
    let profile = config
        .profile
        .as_deref()
        .map(TrafficProfile::from_file)
        .transpose()?;
    Ok(TrafficGenerator::new(
        engine.top(),
        topology,
        &catalog,
        profile.as_ref(),
        &config.generator_config()?,
    )?)
}

/// Build and register a run on the in-process emulated network.
pub fn build_run(engine: &Engine, config: &RunConfig) -> Result<BuiltRun, RunError> {
    config.validate()?;
    let settings = config.run_settings()?;
    let topology = load_topology(config)?;
    let generator = build_generator(engine, config, &topology)?;
    let results = match &config.results {
        Some(path) => ResultLog::create(path)?,
        None => ResultLog::in_memory(),
    };

    let top = engine.top();
    info!(top ; "{} hosts, {} switches, {} links",
        topology.hosts().count(), topology.switches().count(), topology.links().len());

    let network = EmulatedNetwork::new(engine, top, topology.clone());
    let run = SimulationRun::new_and_register(
        engine,
        topology.clone(),
        generator,
        Rc::new(network.clone()),
        results,
        settings,
    )?;
    Ok(BuiltRun {
        run,
        network,
        topology,
    })
}
