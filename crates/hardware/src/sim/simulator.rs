//! Top-level simulator: drivers, agents, bus, directory, and the clock.
//!
//! Scheduling is single-threaded cooperative discrete-event: every
//! component is advanced explicitly, in CPU id order, once per simulated
//! cycle. Nothing here spawns threads or reads wall time, so a given trace
//! and configuration always produce the same cycle-exact history.

use tracing::{debug, info};

use crate::bus::Bus;
use crate::cache::agent::CacheAgent;
use crate::coherence::Directory;
use crate::common::{CpuId, SimError};
use crate::config::Config;
use crate::stats::Stats;
use crate::trace::Trace;

/// One trace-driven CPU front end.
///
/// A driver feeds its cache agent one record at a time, with the mandated
/// one-cycle gap between a completed request and the next issue falling out
/// of the tick ordering (the agent turns idle strictly after the drivers
/// have run for that cycle).
#[derive(Debug, Default)]
struct Driver {
    done: bool,
}

/// A complete simulation: N CPUs, their private caches, one bus, one
/// directory.
#[derive(Debug)]
pub struct Simulator {
    config: Config,
    trace: Trace,
    drivers: Vec<Driver>,
    agents: Vec<CacheAgent>,
    bus: Bus,
    directory: Directory,
    stats: Stats,
    clock: u64,
}

impl Simulator {
    /// Builds a simulator for `trace` with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for invalid cache geometry.
    pub fn new(config: Config, trace: Trace) -> Result<Self, SimError> {
        config.validate()?;
        let num_cpus = trace.num_cpus();

        info!(
            cache_bytes = config.cache.size_bytes,
            line_bytes = config.cache.line_bytes,
            ways = config.cache.ways,
            sets = config.cache.num_sets(),
            num_cpus,
            "simulator configured"
        );

        let agents = (0..num_cpus)
            .map(|cpu| CacheAgent::new(cpu, &config.cache))
            .collect();
        let drivers = (0..num_cpus).map(|_| Driver::default()).collect();

        Ok(Self {
            config,
            trace,
            drivers,
            agents,
            bus: Bus::new(num_cpus),
            directory: Directory::new(),
            stats: Stats::new(num_cpus),
            clock: 0,
        })
    }

    /// Advances the whole system by one simulated cycle.
    ///
    /// Drivers run first (issuing new requests to idle agents, retiring
    /// exhausted streams), then every agent runs in CPU id order. A grant
    /// broadcast is routed to all peers within the same cycle, so snoopers
    /// observe every transaction before the next one can exist.
    ///
    /// # Errors
    ///
    /// Propagates [`SimError::Protocol`] from the coherence directory.
    pub fn tick(&mut self) -> Result<(), SimError> {
        let now = self.clock;

        for cpu in 0..self.agents.len() {
            if self.drivers[cpu].done || !self.agents[cpu].is_idle() {
                continue;
            }
            if let Some(entry) = self.trace.next_for(cpu) {
                self.agents[cpu].begin(entry, now);
            } else {
                debug!(cpu, cycle = now, "trace stream exhausted");
                self.drivers[cpu].done = true;
                self.bus.retire(cpu);
            }
        }

        for cpu in 0..self.agents.len() {
            let broadcast = self.agents[cpu].tick(
                now,
                &mut self.bus,
                &mut self.directory,
                &mut self.stats,
                &self.config.timing,
            )?;
            if let Some(tx) = broadcast {
                for peer in 0..self.agents.len() {
                    if peer != cpu {
                        self.agents[peer].snoop(&tx, &mut self.stats);
                    }
                }
            }
        }

        self.clock += 1;
        Ok(())
    }

    /// Runs until every trace stream is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates the first error a `tick` reports.
    pub fn run(&mut self) -> Result<(), SimError> {
        while !self.is_finished() {
            self.tick()?;
        }
        Ok(())
    }

    /// Whether all drivers have retired.
    pub fn is_finished(&self) -> bool {
        self.bus.all_retired()
    }

    /// Current simulated cycle.
    pub const fn now(&self) -> u64 {
        self.clock
    }

    /// Number of simulated processors.
    pub fn num_cpus(&self) -> usize {
        self.agents.len()
    }

    /// Collected statistics.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The coherence directory (read-only, for reporting and tests).
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// One CPU's cache agent (read-only, for reporting and tests).
    pub fn agent(&self, cpu: CpuId) -> &CacheAgent {
        &self.agents[cpu]
    }
}
