//! Per-CPU cache agent.
//!
//! One agent fronts each CPU's private [`CacheArray`]. It accepts one
//! request at a time from the driver and carries it through the fixed
//! request pipeline:
//!
//! 1. arbitrate for the bus (servicing snoops while waiting),
//! 2. on grant, probe the local array and apply the coherence directory's
//!    verdict, broadcasting the stamped transaction to the peers,
//! 3. burn the cycles the verdict costs (local access, memory fill, dirty
//!    writebacks),
//! 4. apply local effects (install / touch / set-dirty), release the bus,
//!    and drain until the arbitration round wraps.
//!
//! The agent is a plain state machine advanced one cycle per `tick`; every
//! suspension point of the request flow is a `Phase` variant.

use tracing::debug;

use crate::bus::{Bus, BusTransaction};
use crate::coherence::Directory;
use crate::common::{CpuId, MemOp, SimError};
use crate::config::{CacheConfig, TimingConfig};
use crate::stats::Stats;
use crate::trace::TraceEntry;

use super::{CacheArray, ProbeResult};

/// Where an in-flight request is in the pipeline.
#[derive(Debug, Clone, Copy)]
enum Phase {
    /// No request in flight; the driver may issue one.
    Idle,
    /// Arbitrating: waiting for the bus grant.
    WaitBus {
        entry: TraceEntry,
        requested_at: u64,
    },
    /// Holding the bus while latency cycles drain.
    Busy { remaining: u64, pending: Pending },
    /// Released the bus; waiting for ownership to wrap to the round start.
    Drain,
}

/// Local effects to apply when the latency of a granted request has passed.
#[derive(Debug, Clone, Copy)]
struct Pending {
    op: MemOp,
    block: u64,
    way: usize,
    hit: bool,
}

/// A CPU's cache agent: private array plus request/snoop state.
#[derive(Debug)]
pub struct CacheAgent {
    id: CpuId,
    array: CacheArray,
    phase: Phase,
    /// Snoop progress cursor: newest transaction id already observed.
    last_seen_trans_id: u64,
    /// Id of this agent's most recent own transaction.
    last_issued: Option<u64>,
}

impl CacheAgent {
    /// Creates an idle agent with an empty cache.
    pub fn new(id: CpuId, config: &CacheConfig) -> Self {
        Self {
            id,
            array: CacheArray::new(config),
            phase: Phase::Idle,
            last_seen_trans_id: 0,
            last_issued: None,
        }
    }

    /// This agent's CPU id.
    pub const fn id(&self) -> CpuId {
        self.id
    }

    /// Whether the agent can accept a new request.
    pub const fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Read-only view of the private cache array.
    pub const fn array(&self) -> &CacheArray {
        &self.array
    }

    /// Transaction id of this agent's most recent broadcast, if any.
    pub const fn last_issued(&self) -> Option<u64> {
        self.last_issued
    }

    /// Hands the agent its next request. Must be idle.
    pub fn begin(&mut self, entry: TraceEntry, now: u64) {
        debug_assert!(self.is_idle(), "request issued to a busy agent");
        self.phase = Phase::WaitBus {
            entry,
            requested_at: now,
        };
    }

    /// Advances the agent by one cycle.
    ///
    /// Returns the broadcast transaction if this cycle was the agent's bus
    /// grant; the caller routes it to every peer for snooping.
    ///
    /// # Errors
    ///
    /// Propagates [`SimError::Protocol`] from the coherence directory.
    pub fn tick(
        &mut self,
        now: u64,
        bus: &mut Bus,
        directory: &mut Directory,
        stats: &mut Stats,
        timing: &TimingConfig,
    ) -> Result<Option<BusTransaction>, SimError> {
        match self.phase {
            Phase::Idle => Ok(None),
            Phase::WaitBus {
                entry,
                requested_at,
            } => {
                if bus.is_granted(self.id) {
                    self.grant(entry, requested_at, now, bus, directory, stats, timing)
                } else {
                    Ok(None)
                }
            }
            Phase::Busy { remaining, pending } => {
                if remaining <= 1 {
                    self.complete(pending, now, bus);
                } else {
                    self.phase = Phase::Busy {
                        remaining: remaining - 1,
                        pending,
                    };
                }
                Ok(None)
            }
            Phase::Drain => {
                if bus.owner() == bus.round_start() {
                    self.phase = Phase::Idle;
                }
                Ok(None)
            }
        }
    }

    /// Observes a peer's broadcast, invalidating the named block if this
    /// agent is in the transaction's invalidation set.
    ///
    /// Snoops never block the issuing agent; the directory already decided
    /// who must invalidate.
    pub fn snoop(&mut self, tx: &BusTransaction, stats: &mut Stats) {
        if tx.requester == self.id || tx.trans_id <= self.last_seen_trans_id {
            return;
        }
        self.last_seen_trans_id = tx.trans_id;

        if tx.invalidate.contains(self.id) {
            let block = self.array.block_addr(tx.addr);
            if let ProbeResult::Hit { way } = self.array.probe(block) {
                self.array.invalidate(block, way);
                stats.bus.invalidations += 1;
                debug!(cpu = self.id, block, trans_id = tx.trans_id, "snoop invalidate");
            }
        }
    }

    /// Executes the grant cycle: probe, directory update, broadcast, and
    /// latency accounting.
    #[allow(clippy::too_many_arguments)]
    fn grant(
        &mut self,
        entry: TraceEntry,
        requested_at: u64,
        now: u64,
        bus: &mut Bus,
        directory: &mut Directory,
        stats: &mut Stats,
        timing: &TimingConfig,
    ) -> Result<Option<BusTransaction>, SimError> {
        stats.bus.acquisitions += 1;
        stats.bus.acquisition_wait += now - requested_at;

        let Some(op) = entry.op.mem_op() else {
            // NOPs arbitrate for fairness but touch nothing.
            debug!(cpu = self.id, cycle = now, "nop");
            bus.release();
            self.phase = Phase::Drain;
            return Ok(None);
        };

        let block = self.array.block_addr(entry.addr);
        let probe = self.array.probe(block);
        let hit = probe.is_hit();
        let way = probe.way();
        debug!(cpu = self.id, cycle = now, %op, addr = entry.addr, block, hit, "bus grant");

        let outcome = directory.update(block, self.id, op, hit)?;

        match (op, hit) {
            (MemOp::Read, true) => stats.record_read_hit(self.id),
            (MemOp::Read, false) => stats.record_read_miss(self.id),
            (MemOp::Write, true) => stats.record_write_hit(self.id),
            (MemOp::Write, false) => stats.record_write_miss(self.id),
        }

        let mut latency = timing.cache_latency;
        if outcome.needs_writeback {
            stats.bus.memory_writes += 1;
            latency += timing.mem_latency;
        }
        if !hit {
            let victim = self.array.set(self.array.set_index(block))[way];
            if victim.valid && victim.dirty {
                // Dirty victim goes back to memory before the fill lands.
                stats.bus.memory_writes += 1;
                latency += timing.mem_latency;
            }
            if outcome.needs_fill {
                stats.bus.memory_reads += 1;
                latency += timing.mem_latency;
            } else if outcome.source.is_some() {
                stats.bus.cache_to_cache += 1;
            }
        }

        let tx = bus.issue(self.id, op, entry.addr, outcome.invalidate, outcome.source);
        self.last_issued = Some(tx.trans_id);
        self.last_seen_trans_id = tx.trans_id;

        let pending = Pending {
            op,
            block,
            way,
            hit,
        };
        if latency == 0 {
            self.complete(pending, now, bus);
        } else {
            self.phase = Phase::Busy {
                remaining: latency,
                pending,
            };
        }
        Ok(Some(tx))
    }

    /// Applies local effects, releases the bus, and starts draining.
    fn complete(&mut self, pending: Pending, now: u64, bus: &mut Bus) {
        let Pending {
            op,
            block,
            way,
            hit,
        } = pending;
        if hit {
            self.array.touch(block, way, now);
            if op == MemOp::Write {
                self.array.set_dirty(block, way);
            }
        } else {
            let _ = self.array.install(block, way, op == MemOp::Write, now);
        }
        bus.release();
        self.phase = Phase::Drain;
    }
}
