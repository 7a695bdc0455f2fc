// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The stochastic traffic generator.
//!
//! Each kind of traffic has its own arrival process driven by its own
//! random stream. Every arrival is fully sampled (time, endpoints and
//! payload) as soon as it is drawn, so the tasks produced only depend on
//! the seed and never on how calls to [`TrafficGenerator::advance`] are
//! split up.

use std::collections::VecDeque;
use std::rc::Rc;

use flowsim_engine::time::Ticks;
use flowsim_topology::{HostRole, NodeId, Topology};
use flowsim_track::entity::Entity;
use flowsim_track::{debug, info, trace};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{Catalog, Target, local_targets};
use crate::error::TrafficError;
use crate::profile::{BIN_TICKS, TrafficProfile};
use crate::sizes::SizeDistribution;
use crate::task::{Payload, Task, TaskId, TaskKind};

/// How the arrivals of one kind of traffic are produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Arrivals {
    /// A Poisson process with this mean rate.
    RatePerSec(f64),
    /// Exactly this many arrivals over the run.
    Count(u64),
}

impl Arrivals {
    fn is_enabled(self) -> bool {
        match self {
            Arrivals::RatePerSec(rate) => rate > 0.0,
            Arrivals::Count(count) => count > 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KindConfig {
    pub kind: TaskKind,
    pub arrivals: Arrivals,
    /// Overrides the default size distribution of the kind.
    pub size: Option<SizeDistribution>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorConfig {
    pub kinds: Vec<KindConfig>,
    /// No arrival is at or beyond this time.
    pub horizon: Ticks,
    pub seed: u64,
    /// Probability that an arrival targets a local server.
    pub local_share: f64,
    /// Time of day that tick 0 corresponds to in the traffic profile.
    pub start_time_of_day_secs: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            horizon: 0,
            seed: 0,
            local_share: 0.5,
            start_time_of_day_secs: 0.0,
        }
    }
}

/// Piecewise constant rate modulation used to thin a Poisson process.
struct Thinning {
    /// Profile value per bin divided by the mean over the run.
    factors: Vec<f64>,
    max_factor: f64,
}

enum Process {
    Poisson {
        rate_per_tick: f64,
        thinning: Option<Thinning>,
        /// Time of the last candidate arrival.
        time: f64,
    },
    Scheduled {
        times: VecDeque<Ticks>,
    },
}

struct Arrival {
    time: Ticks,
    src: NodeId,
    dst: NodeId,
    payload: Payload,
}

struct KindStream {
    kind: TaskKind,
    rng: StdRng,
    process: Process,
    horizon: Ticks,
    clients: Rc<Vec<NodeId>>,
    remote: Vec<Target>,
    remote_index: Option<WeightedIndex<f64>>,
    local: Vec<Target>,
    local_share: f64,
    default_size: SizeDistribution,
    next: Option<Arrival>,
}

fn stream_seed(seed: u64, kind: TaskKind) -> u64 {
    let salt = match kind {
        TaskKind::Http => 0x9E37_79B9_7F4A_7C15,
        TaskKind::Ftp => 0xC2B2_AE3D_27D4_EB4F,
    };
    seed ^ salt
}

fn exponential<R: Rng>(rng: &mut R, rate: f64) -> f64 {
    let u: f64 = rng.r#gen();
    -(1.0 - u).ln() / rate
}

impl KindStream {
    fn next_time(&mut self) -> Option<Ticks> {
        match &mut self.process {
            Process::Poisson {
                rate_per_tick,
                thinning,
                time,
            } => loop {
                let max_factor = thinning.as_ref().map_or(1.0, |t| t.max_factor);
                *time += exponential(&mut self.rng, *rate_per_tick * max_factor);
                if *time >= self.horizon as f64 {
                    return None;
                }
                let tick = time.floor() as Ticks;
                match thinning {
                    None => return Some(tick),
                    Some(thinning) => {
                        let bin = (tick / BIN_TICKS) as usize;
                        let factor = thinning.factors.get(bin).copied().unwrap_or(0.0);
                        let u: f64 = self.rng.r#gen();
                        if u * thinning.max_factor < factor {
                            return Some(tick);
                        }
                    }
                }
            },
            Process::Scheduled { times } => times.pop_front(),
        }
    }

    fn choose_target(&mut self) -> Target {
        let use_local = match (&self.remote_index, self.local.is_empty()) {
            (None, _) => true,
            (Some(_), true) => false,
            (Some(_), false) => self.rng.r#gen::<f64>() < self.local_share,
        };
        if use_local {
            let index = self.rng.gen_range(0..self.local.len());
            self.local[index].clone()
        } else {
            match &self.remote_index {
                Some(remote_index) => self.remote[remote_index.sample(&mut self.rng)].clone(),
                None => self.local[0].clone(),
            }
        }
    }

    fn sample(&mut self, time: Ticks) -> Arrival {
        let src = self.clients[self.rng.gen_range(0..self.clients.len())];
        let target = self.choose_target();
        let size = target.size.unwrap_or(self.default_size);
        let bytes = size.sample(&mut self.rng);
        Arrival {
            time,
            src,
            dst: target.host,
            payload: Payload {
                target: target.url,
                bytes,
            },
        }
    }

    /// Draw the next arrival and sample everything about it.
    fn draw(&mut self) {
        self.next = match self.next_time() {
            Some(time) => Some(self.sample(time)),
            None => None,
        };
    }
}

fn scheduled_times(
    rng: &mut StdRng,
    count: u64,
    horizon: Ticks,
    profile: Option<&TrafficProfile>,
    start_secs: f64,
) -> Result<VecDeque<Ticks>, TrafficError> {
    if horizon == 0 {
        return Ok(VecDeque::new());
    }

    let mut times: Vec<Ticks> = match profile {
        None => (0..count).map(|_| rng.gen_range(0..horizon)).collect(),
        Some(profile) => {
            let weights = profile.noisy_bin_values(start_secs, horizon, rng);
            let bins = WeightedIndex::new(&weights).map_err(|e| {
                TrafficError::Configuration(format!(
                    "traffic profile cannot spread arrivals over the run: {e}"
                ))
            })?;
            (0..count)
                .map(|_| {
                    let start = bins.sample(rng) as Ticks * BIN_TICKS;
                    let end = (start + BIN_TICKS).min(horizon);
                    rng.gen_range(start..end)
                })
                .collect()
        }
    };
    times.sort_unstable();
    Ok(times.into())
}

fn thinning(
    profile: &TrafficProfile,
    horizon: Ticks,
    start_secs: f64,
) -> Result<Thinning, TrafficError> {
    let values = profile.bin_values(start_secs, horizon);
    let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
    if mean <= 0.0 {
        return Err(TrafficError::Configuration(
            "traffic profile has no traffic during the run".to_string(),
        ));
    }
    let factors: Vec<f64> = values.iter().map(|v| v / mean).collect();
    let max_factor = factors.iter().copied().fold(0.0, f64::max);
    Ok(Thinning {
        factors,
        max_factor,
    })
}

pub struct TrafficGenerator {
    pub entity: Rc<Entity>,
    streams: Vec<KindStream>,
    next_id: u64,
    stopped: bool,
}

impl TrafficGenerator {
    pub fn new(
        parent: &Rc<Entity>,
        topology: &Topology,
        catalog: &Catalog,
        profile: Option<&TrafficProfile>,
        config: &GeneratorConfig,
    ) -> Result<Self, TrafficError> {
        let entity = Rc::new(Entity::new(parent, "generator"));

        if !(0.0..=1.0).contains(&config.local_share) {
            return Err(TrafficError::Configuration(format!(
                "local share {} is not between 0 and 1",
                config.local_share
            )));
        }

        let clients: Rc<Vec<NodeId>> = Rc::new(
            topology
                .hosts_with_role(HostRole::Client)
                .map(|node| node.id)
                .collect(),
        );
        if clients.is_empty() {
            return Err(TrafficError::Configuration(
                "topology has no client hosts to send traffic from".to_string(),
            ));
        }

        let mut kinds = config.kinds.clone();
        kinds.sort_by_key(|k| k.kind);
        if let Some(pair) = kinds.windows(2).find(|pair| pair[0].kind == pair[1].kind) {
            return Err(TrafficError::Configuration(format!(
                "{} traffic is configured twice",
                pair[0].kind
            )));
        }

        let mut streams = Vec::new();
        for kind_config in kinds {
            let kind = kind_config.kind;
            if let Arrivals::RatePerSec(rate) = kind_config.arrivals {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(TrafficError::Configuration(format!(
                        "{kind} arrival rate must be finite and not negative, got {rate}"
                    )));
                }
            }
            if !kind_config.arrivals.is_enabled() {
                debug!(entity ; "{kind} traffic disabled");
                continue;
            }

            let remote = catalog.targets(kind, topology)?;
            let local = local_targets(kind, topology);
            if remote.is_empty() && local.is_empty() {
                return Err(TrafficError::Configuration(format!(
                    "no targets for {kind} traffic: the catalog is empty and no server offers {}",
                    kind.service()
                )));
            }
            let remote_index = if remote.is_empty() {
                None
            } else {
                Some(
                    WeightedIndex::new(remote.iter().map(|t| t.weight))
                        .map_err(|e| TrafficError::Configuration(format!("{kind} catalog: {e}")))?,
                )
            };

            let mut rng = StdRng::seed_from_u64(stream_seed(config.seed, kind));
            let process = match kind_config.arrivals {
                Arrivals::RatePerSec(rate) => Process::Poisson {
                    rate_per_tick: rate / 1000.0,
                    thinning: profile
                        .map(|p| thinning(p, config.horizon, config.start_time_of_day_secs))
                        .transpose()?,
                    time: 0.0,
                },
                Arrivals::Count(count) => Process::Scheduled {
                    times: scheduled_times(
                        &mut rng,
                        count,
                        config.horizon,
                        profile,
                        config.start_time_of_day_secs,
                    )?,
                },
            };

            info!(entity ; "{kind}: {:?}, {} remote and {} local targets",
                kind_config.arrivals, remote.len(), local.len());

            let default_size = kind_config.size.unwrap_or(match kind {
                TaskKind::Http => SizeDistribution::http_default(),
                TaskKind::Ftp => SizeDistribution::ftp_default(),
            });
            let mut stream = KindStream {
                kind,
                rng,
                process,
                horizon: config.horizon,
                clients: clients.clone(),
                remote,
                remote_index,
                local,
                local_share: config.local_share,
                default_size,
                next: None,
            };
            stream.draw();
            streams.push(stream);
        }

        Ok(Self {
            entity,
            streams,
            next_id: 0,
            stopped: false,
        })
    }

    /// Produce every arrival up to and including `until` that has not been
    /// produced yet, in time order. Arrivals at the same time come out in
    /// kind order.
    pub fn advance(&mut self, until: Ticks) -> Vec<Task> {
        let mut tasks = Vec::new();
        if self.stopped {
            return tasks;
        }

        loop {
            // Streams are held in kind order so the first minimum wins ties.
            let next = self
                .streams
                .iter()
                .enumerate()
                .filter_map(|(i, s)| s.next.as_ref().map(|a| (a.time, i)))
                .min();
            let Some((time, index)) = next else {
                break;
            };
            if time > until {
                break;
            }

            let stream = &mut self.streams[index];
            let Some(arrival) = stream.next.take() else {
                break;
            };
            let kind = stream.kind;
            stream.draw();

            let task = Task::new(
                TaskId(self.next_id),
                kind,
                arrival.time,
                arrival.src,
                arrival.dst,
                arrival.payload,
            );
            self.next_id += 1;
            trace!(self.entity ; "generated {task}");
            tasks.push(task);
        }
        tasks
    }

    /// Time of the next arrival that has not been produced yet.
    #[must_use]
    pub fn peek_next_time(&self) -> Option<Ticks> {
        if self.stopped {
            return None;
        }
        self.streams
            .iter()
            .filter_map(|s| s.next.as_ref().map(|a| a.time))
            .min()
    }

    /// Stop producing arrivals.
    pub fn stop(&mut self) {
        if !self.stopped {
            debug!(self.entity ; "stopped after {} tasks", self.next_id);
        }
        self.stopped = true;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// True once every arrival has been produced, or after a stop.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.peek_next_time().is_none()
    }

    /// Number of tasks produced so far.
    #[must_use]
    pub fn num_generated(&self) -> u64 {
        self.next_id
    }
}
