//! Simulation statistics collection and reporting.
//!
//! This module tracks what the simulator exists to measure:
//! 1. **Per-CPU counters:** read/write hits and misses.
//! 2. **Bus counters:** memory traffic, invalidations, cache-to-cache
//!    transfers, and bus-acquisition totals and wait time.
//! 3. **Reporting:** per-CPU and aggregate hit-rate lines plus a bus
//!    section, printed to stdout.
//!
//! All waits are in simulated cycles; nothing here reads wall time.

use crate::common::CpuId;

/// Hit/miss counters for one CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Reads that found the block locally.
    pub read_hits: u64,
    /// Reads that had to fetch the block.
    pub read_misses: u64,
    /// Writes that found the block locally.
    pub write_hits: u64,
    /// Writes that had to fetch the block.
    pub write_misses: u64,
}

impl CoreStats {
    /// Total accesses recorded for this CPU.
    pub const fn total(&self) -> u64 {
        self.read_hits + self.read_misses + self.write_hits + self.write_misses
    }

    /// Hit fraction over all accesses, as a percentage.
    pub fn hit_rate(&self) -> f64 {
        percent(self.read_hits + self.write_hits, self.total())
    }
}

/// Bus and coherence traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Block fetches served by main memory.
    pub memory_reads: u64,
    /// Dirty-line writebacks accepted by main memory.
    pub memory_writes: u64,
    /// Snoop invalidations that dropped a valid line.
    pub invalidations: u64,
    /// Read misses served by a peer cache instead of memory.
    pub cache_to_cache: u64,
    /// Bus grants handed out (READ, WRITE, and NOP alike).
    pub acquisitions: u64,
    /// Total cycles agents spent between bus request and grant.
    pub acquisition_wait: u64,
}

impl BusStats {
    /// Mean request-to-grant wait in cycles.
    pub fn avg_acquisition_wait(&self) -> f64 {
        if self.acquisitions == 0 {
            0.0
        } else {
            self.acquisition_wait as f64 / self.acquisitions as f64
        }
    }
}

/// All statistics for one simulation run.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// One row per CPU.
    pub cores: Vec<CoreStats>,
    /// Shared bus counters.
    pub bus: BusStats,
}

impl Stats {
    /// Creates zeroed statistics for `num_cpus` processors.
    pub fn new(num_cpus: usize) -> Self {
        Self {
            cores: vec![CoreStats::default(); num_cpus],
            bus: BusStats::default(),
        }
    }

    /// Records a read hit for `cpu`.
    pub fn record_read_hit(&mut self, cpu: CpuId) {
        self.cores[cpu].read_hits += 1;
    }

    /// Records a read miss for `cpu`.
    pub fn record_read_miss(&mut self, cpu: CpuId) {
        self.cores[cpu].read_misses += 1;
    }

    /// Records a write hit for `cpu`.
    pub fn record_write_hit(&mut self, cpu: CpuId) {
        self.cores[cpu].write_hits += 1;
    }

    /// Records a write miss for `cpu`.
    pub fn record_write_miss(&mut self, cpu: CpuId) {
        self.cores[cpu].write_misses += 1;
    }

    /// Sums the per-CPU rows.
    pub fn aggregate(&self) -> CoreStats {
        let mut total = CoreStats::default();
        for core in &self.cores {
            total.read_hits += core.read_hits;
            total.read_misses += core.read_misses;
            total.write_hits += core.write_hits;
            total.write_misses += core.write_misses;
        }
        total
    }

    /// Prints the per-CPU table, the aggregate line, and the bus section.
    pub fn print(&self) {
        println!();
        println!("==========================================================");
        println!("CACHE HIERARCHY SIMULATION STATISTICS");
        println!("==========================================================");
        println!(
            "{:<6} {:>10} {:>10} {:>10} {:>10} {:>9}",
            "cpu", "rd_hit", "rd_miss", "wr_hit", "wr_miss", "hitrate"
        );
        for (cpu, core) in self.cores.iter().enumerate() {
            print_core_row(&cpu.to_string(), core);
        }
        println!("----------------------------------------------------------");
        print_core_row("total", &self.aggregate());
        println!("----------------------------------------------------------");
        println!("BUS / COHERENCE");
        println!("  mem.reads              {}", self.bus.memory_reads);
        println!("  mem.writes             {}", self.bus.memory_writes);
        println!("  coherence.invalidations {}", self.bus.invalidations);
        println!("  coherence.c2c_transfers {}", self.bus.cache_to_cache);
        println!("  bus.acquisitions       {}", self.bus.acquisitions);
        println!("  bus.wait_cycles        {}", self.bus.acquisition_wait);
        println!("  bus.avg_wait           {:.2}", self.bus.avg_acquisition_wait());
        println!("==========================================================");
    }
}

fn print_core_row(label: &str, core: &CoreStats) {
    println!(
        "{:<6} {:>10} {:>10} {:>10} {:>10} {:>8.2}%",
        label, core.read_hits, core.read_misses, core.write_hits, core.write_misses,
        core.hit_rate()
    );
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}
