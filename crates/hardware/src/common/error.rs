//! Error types for the simulator.
//!
//! Three failure families exist, each with a distinct disposition:
//! 1. **Configuration:** rejected before the simulation starts.
//! 2. **Trace:** I/O or format problems in the input trace; rejected at load.
//! 3. **Protocol:** a coherence directory entry reached an impossible shape.
//!    This always indicates a simulator bug, never a bad trace, and aborts
//!    the run.

use thiserror::Error;

/// Any error the simulator can report.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration (cache geometry, processor count, CLI usage).
    #[error("configuration error: {0}")]
    Config(String),

    /// The trace file could not be read.
    #[error("failed to read trace {path}")]
    TraceIo {
        /// Path of the trace file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A trace record could not be parsed or violates a trace invariant.
    #[error("trace error at line {line}: {reason}")]
    Trace {
        /// 1-based line number in the trace file.
        line: usize,
        /// What was wrong with the record.
        reason: String,
    },

    /// A directory entry violated a MOESI invariant.
    #[error("coherence protocol violation for block {block:#x}: {reason}")]
    Protocol {
        /// Block address of the offending directory entry.
        block: u64,
        /// The violated invariant.
        reason: String,
    },
}

impl SimError {
    pub(crate) fn trace(line: usize, reason: impl Into<String>) -> Self {
        Self::Trace {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(block: u64, reason: impl Into<String>) -> Self {
        Self::Protocol {
            block,
            reason: reason.into(),
        }
    }
}
