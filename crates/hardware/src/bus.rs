//! Shared bus: arbitration, transaction ids, snoop broadcast.
//!
//! A single shared medium connects the cache agents. Arbitration is
//! round-robin: ownership starts at CPU 0 and advances by one (mod N) on
//! every release. An agent that released the bus then drains — it may not
//! request again until ownership wraps back to the start of the round — so
//! every CPU gets exactly one grant per round and no CPU can starve the
//! others. CPUs whose trace stream has ended are retired from the rotation.
//!
//! Every READ/WRITE performed under a grant is stamped with a monotonically
//! increasing transaction id and broadcast to all agents together with the
//! directory's side effects. The id sequence is strictly increasing and
//! gap-free, and is the ordering token snoopers use to detect a new
//! broadcast.

use tracing::trace;

use crate::common::{CpuId, MemOp, SharerSet};

/// One broadcast bus transaction.
///
/// Carries the request itself plus the directory's side effects for it, so
/// snoopers never consult the directory: an agent named in `invalidate`
/// drops its copy of the block, and `provider` identifies a cache-to-cache
/// data source when memory is not involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTransaction {
    /// Globally unique, strictly increasing id.
    pub trans_id: u64,
    /// CPU that issued the transaction.
    pub requester: CpuId,
    /// Operation on the bus.
    pub op: MemOp,
    /// Byte address of the access.
    pub addr: u64,
    /// Peers that must invalidate their copy.
    pub invalidate: SharerSet,
    /// Peer supplying the line cache-to-cache, if any.
    pub provider: Option<CpuId>,
}

/// The shared bus and its arbitration state.
#[derive(Debug)]
pub struct Bus {
    num_cpus: usize,
    owner: CpuId,
    retired: SharerSet,
    next_trans_id: u64,
}

impl Bus {
    /// Creates a bus for `num_cpus` agents with ownership parked at CPU 0.
    pub fn new(num_cpus: usize) -> Self {
        Self {
            num_cpus,
            owner: 0,
            retired: SharerSet::empty(),
            next_trans_id: 1,
        }
    }

    /// The CPU currently allowed to use the bus.
    pub const fn owner(&self) -> CpuId {
        self.owner
    }

    /// Whether `cpu` holds the grant this cycle.
    pub fn is_granted(&self, cpu: CpuId) -> bool {
        self.owner == cpu
    }

    /// First CPU of each arbitration round (the lowest still-active id).
    ///
    /// An agent that released the bus waits until ownership returns here
    /// before issuing its next request.
    pub fn round_start(&self) -> CpuId {
        (0..self.num_cpus)
            .find(|cpu| !self.retired.contains(*cpu))
            .unwrap_or(0)
    }

    /// Releases the grant, passing ownership to the next active CPU.
    pub fn release(&mut self) {
        trace!(from = self.owner, "bus release");
        self.advance();
    }

    /// Removes an exhausted CPU from the arbitration rotation.
    ///
    /// If that CPU currently holds the (idle) grant, ownership moves on so
    /// the remaining agents keep making progress.
    pub fn retire(&mut self, cpu: CpuId) {
        self.retired.insert(cpu);
        if self.owner == cpu && self.retired.len() < self.num_cpus {
            self.advance();
        }
    }

    /// Whether every CPU has been retired.
    pub fn all_retired(&self) -> bool {
        self.retired.len() == self.num_cpus
    }

    /// Stamps and broadcasts a transaction for the current owner.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not 4-byte aligned: bus requests come straight
    /// from the trace, so a misaligned address means a broken trace.
    pub fn issue(
        &mut self,
        requester: CpuId,
        op: MemOp,
        addr: u64,
        invalidate: SharerSet,
        provider: Option<CpuId>,
    ) -> BusTransaction {
        assert_eq!(addr & 0x3, 0, "misaligned address {addr:#x} on the bus");
        debug_assert_eq!(self.owner, requester, "issue without the grant");

        let trans_id = self.next_trans_id;
        self.next_trans_id += 1;
        trace!(trans_id, requester, %op, addr, "bus broadcast");
        BusTransaction {
            trans_id,
            requester,
            op,
            addr,
            invalidate,
            provider,
        }
    }

    fn advance(&mut self) {
        for _ in 0..self.num_cpus {
            self.owner = (self.owner + 1) % self.num_cpus;
            if !self.retired.contains(self.owner) {
                return;
            }
        }
    }
}
