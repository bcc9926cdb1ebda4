//! Simulation driver loop and top-level simulator.
//!
//! The [`Simulator`] owns every component of one run — the per-CPU drivers
//! and cache agents, the shared bus, the coherence directory, the
//! statistics, and the clock — and advances them together, one simulated
//! cycle per `tick`.

/// Top-level `Simulator` and its cycle loop.
pub mod simulator;

pub use simulator::Simulator;
