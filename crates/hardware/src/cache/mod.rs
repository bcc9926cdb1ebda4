//! Set-associative cache storage.
//!
//! This module implements the tag array behind each CPU's private cache:
//! a fixed grid of `num_sets x ways` lines holding tag, valid, dirty, and
//! LRU metadata. No data bytes are stored. It models lookups, LRU victim
//! selection, installs with dirty-victim eviction reporting, and snoop
//! invalidation. The per-CPU request engine built on top lives in
//! [`agent`].

/// Per-CPU cache agent: request state machine and snoop servicing.
pub mod agent;

use tracing::debug;

use crate::config::CacheConfig;

/// Cache line entry containing the tag and validity/dirty/LRU metadata.
///
/// `tag` is the full block address (byte address divided by the line size);
/// with set index taken modulo the set count there is no separate tag
/// truncation. `last_used` is the simulated cycle of the last touch.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheLine {
    /// Block address held by this line.
    pub tag: u64,
    /// Cycle of last use, for LRU victim selection.
    pub last_used: u64,
    /// Whether this line holds a live block.
    pub valid: bool,
    /// Whether the held block has been written locally.
    pub dirty: bool,
}

/// Outcome of probing a set for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The block is resident in `way`.
    Hit {
        /// Way holding the block.
        way: usize,
    },
    /// The block is absent; `victim_way` is where an install would land.
    Miss {
        /// First invalid way, or the LRU way if the set is full.
        victim_way: usize,
    },
}

impl ProbeResult {
    /// Whether the probe found the block.
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// The way a subsequent `touch`/`install` should target.
    pub const fn way(&self) -> usize {
        match *self {
            Self::Hit { way } | Self::Miss { victim_way: way } => way,
        }
    }
}

/// A valid line displaced by an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    /// Block address of the displaced line.
    pub tag: u64,
    /// Whether the displaced line was dirty (requires a writeback).
    pub dirty: bool,
}

/// One CPU's private set-associative tag array.
#[derive(Debug, Clone)]
pub struct CacheArray {
    sets: Vec<Vec<CacheLine>>,
    line_bytes: usize,
    num_sets: usize,
    ways: usize,
}

impl CacheArray {
    /// Creates an empty array with the given geometry.
    ///
    /// The geometry must already be validated; see
    /// [`CacheConfig::validate`].
    pub fn new(config: &CacheConfig) -> Self {
        let num_sets = config.num_sets();
        Self {
            sets: vec![vec![CacheLine::default(); config.ways]; num_sets],
            line_bytes: config.line_bytes,
            num_sets,
            ways: config.ways,
        }
    }

    /// Block address for a byte address (line-offset bits removed).
    pub const fn block_addr(&self, addr: u64) -> u64 {
        addr / self.line_bytes as u64
    }

    /// Set index for a block address.
    pub const fn set_index(&self, block: u64) -> usize {
        (block % self.num_sets as u64) as usize
    }

    /// Looks up `block` in its set without mutating anything.
    ///
    /// On a miss the returned victim is the first invalid way, or failing
    /// that the way with the smallest `last_used` (ties to the lowest way
    /// index). The scan seeds its minimum with `u64::MAX`, larger than any
    /// real timestamp.
    pub fn probe(&self, block: u64) -> ProbeResult {
        let set = &self.sets[self.set_index(block)];

        for (way, line) in set.iter().enumerate() {
            if line.valid && line.tag == block {
                return ProbeResult::Hit { way };
            }
        }

        let mut victim_way = 0;
        let mut oldest = u64::MAX;
        for (way, line) in set.iter().enumerate() {
            if !line.valid {
                return ProbeResult::Miss { victim_way: way };
            }
            if line.last_used < oldest {
                victim_way = way;
                oldest = line.last_used;
            }
        }
        ProbeResult::Miss { victim_way }
    }

    /// Refreshes the LRU timestamp of `way` after a hit.
    pub fn touch(&mut self, block: u64, way: usize, now: u64) {
        let set_index = self.set_index(block);
        self.sets[set_index][way].last_used = now;
    }

    /// Installs `block` into `way`, displacing the prior occupant.
    ///
    /// Returns the displaced line if the way held a valid different block;
    /// a dirty eviction obliges the caller to emit a writeback first.
    pub fn install(&mut self, block: u64, way: usize, dirty: bool, now: u64) -> Option<Eviction> {
        let set_index = self.set_index(block);
        let prior = self.sets[set_index][way];

        let evicted = (prior.valid && prior.tag != block).then(|| {
            debug!(block = prior.tag, set = set_index, way, dirty = prior.dirty, "evict");
            Eviction {
                tag: prior.tag,
                dirty: prior.dirty,
            }
        });

        self.sets[set_index][way] = CacheLine {
            tag: block,
            last_used: now,
            valid: true,
            dirty,
        };
        evicted
    }

    /// Drops the line in `way`.
    pub fn invalidate(&mut self, block: u64, way: usize) {
        let set_index = self.set_index(block);
        let line = &mut self.sets[set_index][way];
        line.valid = false;
        line.dirty = false;
    }

    /// Marks a resident line dirty.
    pub fn set_dirty(&mut self, block: u64, way: usize) {
        let set_index = self.set_index(block);
        let line = &mut self.sets[set_index][way];
        debug_assert!(line.valid, "set_dirty on an invalid line");
        line.dirty = true;
    }

    /// Whether the array holds a valid line for `block`.
    pub fn contains(&self, block: u64) -> bool {
        self.probe(block).is_hit()
    }

    /// Number of sets.
    pub const fn num_sets(&self) -> usize {
        self.num_sets
    }

    /// Associativity.
    pub const fn ways(&self) -> usize {
        self.ways
    }

    /// Line size in bytes.
    pub const fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    /// Read-only view of one set, for diagnostics and tests.
    pub fn set(&self, set_index: usize) -> &[CacheLine] {
        &self.sets[set_index]
    }

    /// Prints every set and way to stdout.
    pub fn dump(&self) {
        for (set_index, set) in self.sets.iter().enumerate() {
            println!("set {set_index}:");
            for (way, line) in set.iter().enumerate() {
                println!(
                    "  way {way}: {{tag={:#x}, last_used={}, valid={}, dirty={}}}",
                    line.tag, line.last_used, line.valid, line.dirty
                );
            }
        }
    }
}
