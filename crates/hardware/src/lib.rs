//! Multiprocessor cache hierarchy simulator library.
//!
//! This crate implements a cycle-based simulator of N private set-associative
//! caches kept coherent by a MOESI protocol over a shared snooping bus:
//! 1. **Cache:** Set-associative tag arrays with LRU replacement, plus the
//!    per-CPU cache agent that services requests and snoops.
//! 2. **Bus:** Round-robin arbitration of the single shared interconnect and
//!    broadcast of globally ordered transactions.
//! 3. **Coherence:** The directory holding per-block MOESI state and the
//!    transition function that emits invalidations, writebacks, and
//!    cache-to-cache transfers.
//! 4. **Simulation:** `Simulator` (drivers + agents + bus + directory on one
//!    deterministic clock), trace ingestion, configuration, and statistics.
//!
//! No data payloads are modeled: addresses stand in for cache line contents,
//! and timing comes from a discrete simulated clock, never from wall time.

/// Common types (cpu ids, memory operations, sharer sets) and errors.
pub mod common;
/// Simulator configuration (defaults, cache geometry, timing).
pub mod config;
/// Trace source: per-CPU streams of READ/WRITE/NOP records.
pub mod trace;

/// Set-associative cache array and the per-CPU cache agent.
pub mod cache;

/// Shared bus: arbitration, transaction ids, snoop broadcast.
pub mod bus;
/// MOESI coherence directory.
pub mod coherence;

/// Simulation driver loop and top-level `Simulator`.
pub mod sim;
/// Per-CPU and bus-level statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Top-level simulator; owns the agents, bus, directory, and clock.
pub use crate::sim::Simulator;
/// Parsed trace with one ordered record stream per CPU.
pub use crate::trace::Trace;
