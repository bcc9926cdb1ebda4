//! Trace source: ordered per-CPU streams of memory-access records.
//!
//! A trace is a text file with one record per line:
//!
//! ```text
//! # lines starting with '#' are comments
//! procs 2        # optional processor-count directive
//! 0 R 0x100
//! 1 W 0x200
//! 0 N
//! ```
//!
//! Each record names the issuing CPU, an operation (`R`/`W`/`N`, also
//! accepted spelled out), and for reads and writes a 4-byte-aligned address
//! (hex with `0x`, or decimal). The per-CPU streams are the ordered
//! subsequences with that CPU id; without a `procs` directive the processor
//! count is the highest id seen plus one.
//!
//! The whole file is parsed before simulation starts, so a malformed record
//! rejects the trace instead of surfacing mid-run. EOF per stream is sticky.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::common::types::MAX_CPUS;
use crate::common::{CpuId, MemOp, SimError};

/// One operation from a trace stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    /// Memory load.
    Read,
    /// Memory store.
    Write,
    /// No memory access; still arbitrates for the bus.
    Nop,
}

impl TraceOp {
    /// The bus-visible operation, if any (NOPs never reach the bus).
    pub const fn mem_op(self) -> Option<MemOp> {
        match self {
            Self::Read => Some(MemOp::Read),
            Self::Write => Some(MemOp::Write),
            Self::Nop => None,
        }
    }
}

/// One parsed trace record.
///
/// NOP records carry address zero; the address is never inspected for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// The operation to perform.
    pub op: TraceOp,
    /// Byte address of the access (4-byte aligned).
    pub addr: u64,
}

/// A fully parsed trace: one ordered record stream per CPU.
#[derive(Debug, Clone)]
pub struct Trace {
    streams: Vec<VecDeque<TraceEntry>>,
}

impl Trace {
    /// Reads and parses a trace file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TraceIo`] if the file cannot be read, or any
    /// error [`Trace::parse`] reports.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SimError::TraceIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses trace text.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Trace`] for malformed records, out-of-range CPU
    /// ids, misaligned addresses, or an empty trace, and
    /// [`SimError::Config`] if the processor count exceeds the sharer-set
    /// width.
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let mut declared: Option<usize> = None;
        let mut records: Vec<(CpuId, TraceEntry)> = Vec::new();
        let mut max_cpu = 0;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let first = fields.next().unwrap_or("");

            if first.eq_ignore_ascii_case("procs") {
                if declared.is_some() || !records.is_empty() {
                    return Err(SimError::trace(
                        line_no,
                        "procs directive must appear once, before any record",
                    ));
                }
                let count: usize = fields
                    .next()
                    .ok_or_else(|| SimError::trace(line_no, "procs directive missing count"))?
                    .parse()
                    .map_err(|_| SimError::trace(line_no, "unparsable processor count"))?;
                if count == 0 {
                    return Err(SimError::trace(line_no, "processor count must be nonzero"));
                }
                declared = Some(count);
                continue;
            }

            let cpu: CpuId = first
                .parse()
                .map_err(|_| SimError::trace(line_no, format!("unparsable cpu id {first:?}")))?;
            if let Some(count) = declared {
                if cpu >= count {
                    return Err(SimError::trace(
                        line_no,
                        format!("cpu id {cpu} out of range for {count} processors"),
                    ));
                }
            }
            max_cpu = max_cpu.max(cpu);

            let op_field = fields
                .next()
                .ok_or_else(|| SimError::trace(line_no, "missing operation"))?;
            let op = parse_op(op_field)
                .ok_or_else(|| SimError::trace(line_no, format!("unknown operation {op_field:?}")))?;

            let addr = match (op, fields.next()) {
                (TraceOp::Nop, None) => 0,
                (TraceOp::Nop, Some(_)) => {
                    return Err(SimError::trace(line_no, "NOP records take no address"));
                }
                (_, None) => return Err(SimError::trace(line_no, "missing address")),
                (_, Some(text)) => parse_addr(text)
                    .ok_or_else(|| SimError::trace(line_no, format!("unparsable address {text:?}")))?,
            };
            if addr & 0x3 != 0 {
                return Err(SimError::trace(
                    line_no,
                    format!("address {addr:#x} is not 4-byte aligned"),
                ));
            }

            if fields.next().is_some() {
                return Err(SimError::trace(line_no, "trailing fields after record"));
            }
            records.push((cpu, TraceEntry { op, addr }));
        }

        let num_cpus = declared.unwrap_or(max_cpu + 1);
        if records.is_empty() && declared.is_none() {
            return Err(SimError::trace(0, "trace contains no records"));
        }
        if num_cpus > MAX_CPUS {
            return Err(SimError::Config(format!(
                "{num_cpus} processors exceed the supported maximum of {MAX_CPUS}"
            )));
        }

        let mut streams = vec![VecDeque::new(); num_cpus];
        for (cpu, entry) in records {
            streams[cpu].push_back(entry);
        }
        Ok(Self { streams })
    }

    /// Number of processors the trace drives.
    pub fn num_cpus(&self) -> usize {
        self.streams.len()
    }

    /// Pops the next record for `cpu`; `None` once the stream is exhausted.
    pub fn next_for(&mut self, cpu: CpuId) -> Option<TraceEntry> {
        self.streams[cpu].pop_front()
    }

    /// Records remaining in `cpu`'s stream.
    pub fn remaining(&self, cpu: CpuId) -> usize {
        self.streams[cpu].len()
    }
}

fn parse_op(text: &str) -> Option<TraceOp> {
    if text.eq_ignore_ascii_case("r") || text.eq_ignore_ascii_case("read") {
        Some(TraceOp::Read)
    } else if text.eq_ignore_ascii_case("w") || text.eq_ignore_ascii_case("write") {
        Some(TraceOp::Write)
    } else if text.eq_ignore_ascii_case("n") || text.eq_ignore_ascii_case("nop") {
        Some(TraceOp::Nop)
    } else {
        None
    }
}

fn parse_addr(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}
