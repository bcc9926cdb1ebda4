//! MOESI coherence directory.
//!
//! The directory is the single source of truth for the global state of every
//! block any cache has touched. It maps block addresses to entries carrying
//! a MOESI state and the sharer set, and exposes one operation:
//! [`Directory::update`], the transition function consulted by the cache
//! agent that currently holds the bus. Updates are therefore serialized in
//! bus-transaction order, which is what makes the protocol well defined.
//!
//! The directory never calls into the caches. Peer side effects
//! (invalidations, the cache-to-cache data source) are returned in the
//! [`CoherenceOutcome`] and carried to the snoopers on the bus broadcast.

use std::collections::HashMap;

use tracing::debug;

use crate::common::{CpuId, MemOp, SharerSet, SimError};

/// Global state of a block, as tracked by the directory.
///
/// Invalid is not represented: absence of a directory entry means no cache
/// holds the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// One clean copy, matching memory; its holder may upgrade silently.
    Exclusive,
    /// One dirty copy; memory is stale.
    Modified,
    /// One distinguished dirty copy plus any number of clean copies; the
    /// owner services read misses cache-to-cache.
    Owned,
    /// Any number of clean copies, all matching memory.
    Shared,
}

/// Directory record for one ever-touched block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// MOESI state of the block.
    pub state: LineState,
    /// Caches holding a copy.
    pub sharers: SharerSet,
    /// Holder of the sole dirty copy in state Modified.
    pub modifier: Option<CpuId>,
    /// Holder of the distinguished dirty copy in state Owned.
    pub owner: Option<CpuId>,
}

impl DirectoryEntry {
    fn exclusive(cpu: CpuId) -> Self {
        Self {
            state: LineState::Exclusive,
            sharers: SharerSet::solo(cpu),
            modifier: None,
            owner: None,
        }
    }

    fn modified(cpu: CpuId) -> Self {
        Self {
            state: LineState::Modified,
            sharers: SharerSet::solo(cpu),
            modifier: Some(cpu),
            owner: None,
        }
    }

    /// Verifies the per-state shape invariants.
    fn check(&self, block: u64) -> Result<(), SimError> {
        let ok = match self.state {
            LineState::Exclusive => {
                self.sharers.len() == 1 && self.modifier.is_none() && self.owner.is_none()
            }
            LineState::Modified => {
                self.sharers.len() == 1
                    && self.owner.is_none()
                    && self.modifier.is_some_and(|m| self.sharers.contains(m))
            }
            LineState::Owned => {
                !self.sharers.is_empty()
                    && self.modifier.is_none()
                    && self.owner.is_some_and(|o| self.sharers.contains(o))
            }
            LineState::Shared => {
                !self.sharers.is_empty() && self.modifier.is_none() && self.owner.is_none()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::protocol(
                block,
                format!("entry in impossible shape: {self:?}"),
            ))
        }
    }
}

/// Side effects of one directory update, applied by the requesting agent
/// and broadcast to the snoopers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoherenceOutcome {
    /// The requester must fetch the block from memory.
    pub needs_fill: bool,
    /// A dirty copy must be written back to memory before completion.
    pub needs_writeback: bool,
    /// Peers that must drop their copy on the next snoop.
    pub invalidate: SharerSet,
    /// Peer supplying the block cache-to-cache instead of memory.
    pub source: Option<CpuId>,
}

/// The coherence directory: block address to entry.
#[derive(Debug, Default)]
pub struct Directory {
    entries: HashMap<u64, DirectoryEntry>,
}

impl Directory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one globally ordered transaction to the directory.
    ///
    /// `local_hit` is whether `requester` found the block valid in its own
    /// array; the Shared-state rows depend on it. The caller must hold the
    /// bus, which serializes updates in transaction order.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Protocol`] if the touched entry ends up in a
    /// shape the protocol forbids. That indicates a simulator bug.
    pub fn update(
        &mut self,
        block: u64,
        requester: CpuId,
        op: MemOp,
        local_hit: bool,
    ) -> Result<CoherenceOutcome, SimError> {
        let mut outcome = CoherenceOutcome::default();

        let Some(entry) = self.entries.get_mut(&block) else {
            // First touch: the requester becomes the sole holder.
            let entry = match op {
                MemOp::Read => DirectoryEntry::exclusive(requester),
                MemOp::Write => DirectoryEntry::modified(requester),
            };
            debug!(block, requester, state = ?entry.state, "directory first touch");
            outcome.needs_fill = true;
            entry.check(block)?;
            let _ = self.entries.insert(block, entry);
            return Ok(outcome);
        };

        match entry.state {
            LineState::Exclusive => {
                let holder = entry
                    .sharers
                    .iter()
                    .next()
                    .ok_or_else(|| SimError::protocol(block, "exclusive entry with no holder"))?;
                match op {
                    MemOp::Read if requester == holder => {}
                    MemOp::Read => {
                        entry.state = LineState::Shared;
                        entry.sharers.insert(requester);
                        outcome.needs_fill = true;
                    }
                    MemOp::Write if requester == holder => {
                        // Silent upgrade: no peers to notify.
                        entry.state = LineState::Modified;
                        entry.modifier = Some(requester);
                    }
                    MemOp::Write => {
                        outcome.invalidate = SharerSet::solo(holder);
                        outcome.needs_fill = true;
                        *entry = DirectoryEntry::modified(requester);
                    }
                }
            }
            LineState::Shared => match op {
                MemOp::Read => {
                    if !local_hit {
                        entry.sharers.insert(requester);
                        outcome.needs_fill = true;
                    }
                }
                MemOp::Write => {
                    outcome.invalidate = entry.sharers.without(requester);
                    outcome.needs_writeback = true;
                    outcome.needs_fill = !local_hit;
                    *entry = DirectoryEntry::modified(requester);
                }
            },
            LineState::Modified => {
                let modifier = entry
                    .modifier
                    .ok_or_else(|| SimError::protocol(block, "modified entry with no modifier"))?;
                if requester == modifier {
                    // The sole dirty holder re-accessing its own block.
                } else {
                    match op {
                        MemOp::Read => {
                            // Dirty data moves peer-to-peer; the old modifier
                            // keeps the burden of the dirty copy as owner.
                            entry.state = LineState::Owned;
                            entry.owner = Some(modifier);
                            entry.modifier = None;
                            entry.sharers.insert(requester);
                            outcome.source = Some(modifier);
                        }
                        MemOp::Write => {
                            outcome.invalidate = SharerSet::solo(modifier);
                            outcome.needs_writeback = true;
                            outcome.needs_fill = true;
                            *entry = DirectoryEntry::modified(requester);
                        }
                    }
                }
            }
            LineState::Owned => {
                let owner = entry
                    .owner
                    .ok_or_else(|| SimError::protocol(block, "owned entry with no owner"))?;
                match op {
                    MemOp::Read => {
                        if !entry.sharers.contains(requester) {
                            entry.sharers.insert(requester);
                            outcome.source = Some(owner);
                        }
                    }
                    MemOp::Write => {
                        outcome.invalidate = entry.sharers.without(requester);
                        if requester != owner {
                            outcome.needs_writeback = true;
                        }
                        *entry = DirectoryEntry::modified(requester);
                    }
                }
            }
        }

        let entry = self.entries[&block];
        debug!(block, requester, %op, local_hit, state = ?entry.state, sharers = ?entry.sharers, "directory update");
        if entry.sharers.is_empty() {
            // A block nobody holds is Invalid, which is never stored.
            let _ = self.entries.remove(&block);
            return Ok(outcome);
        }
        entry.check(block)?;
        Ok(outcome)
    }

    /// The entry for `block`, if any cache holds it.
    pub fn entry(&self, block: u64) -> Option<&DirectoryEntry> {
        self.entries.get(&block)
    }

    /// Number of tracked blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no block is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
