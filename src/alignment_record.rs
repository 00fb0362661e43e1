//! Format-agnostic view of an aligned read.
//!
//! Truth alignments reach the filter through [`AlignmentSource`]. Two sources
//! are provided: indexed BAM/CRAM files read with rust-htslib, and an
//! in-memory source of [`SimpleAlignment`]s built from CIGAR strings.

use log::debug;
use rust_htslib::bam::{self, Read as BamRead};
use rustc_hash::FxHashMap;
use std::io;

/// A single CIGAR operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub len: u32,
    pub op: u8,
}

impl CigarOp {
    pub fn new(len: u32, op: u8) -> Self {
        Self { len, op }
    }

    pub fn consumes_query(&self) -> bool {
        matches!(self.op, b'M' | b'I' | b'S' | b'=' | b'X')
    }

    pub fn consumes_reference(&self) -> bool {
        matches!(self.op, b'M' | b'D' | b'N' | b'=' | b'X')
    }
}

/// Parse a CIGAR string such as `10M2I5M3D` into operations.
pub fn parse_cigar(cigar: &str) -> io::Result<Vec<CigarOp>> {
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut has_digits = false;

    for c in cigar.bytes() {
        if c.is_ascii_digit() {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add((c - b'0') as u32))
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "CIGAR length overflow")
                })?;
            has_digits = true;
        } else if matches!(c, b'M' | b'I' | b'D' | b'N' | b'S' | b'H' | b'P' | b'=' | b'X') {
            if !has_digits {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("CIGAR operation without length in '{cigar}'"),
                ));
            }
            ops.push(CigarOp::new(len, c));
            len = 0;
            has_digits = false;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported CIGAR operation '{}' in '{cigar}'", c as char),
            ));
        }
    }

    if has_digits {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Trailing length without operation in '{cigar}'"),
        ));
    }

    Ok(ops)
}

/// Aligned `(query, reference)` coordinate pairs in alignment order.
///
/// Matches yield both coordinates, insertions only a query coordinate,
/// deletions and skips only a reference coordinate. Soft-clipped bases are
/// stepped over without being yielded.
pub struct AlignedPairs {
    ops: Vec<CigarOp>,
    op_idx: usize,
    op_offset: u32,
    query_pos: i64,
    reference_pos: i64,
}

impl AlignedPairs {
    pub fn new(reference_start: i64, ops: Vec<CigarOp>) -> Self {
        Self {
            ops,
            op_idx: 0,
            op_offset: 0,
            query_pos: 0,
            reference_pos: reference_start,
        }
    }
}

impl Iterator for AlignedPairs {
    type Item = (Option<i64>, Option<i64>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let op = *self.ops.get(self.op_idx)?;
            if self.op_offset >= op.len {
                self.op_idx += 1;
                self.op_offset = 0;
                continue;
            }

            match op.op {
                b'M' | b'=' | b'X' => {
                    self.op_offset += 1;
                    let pair = (Some(self.query_pos), Some(self.reference_pos));
                    self.query_pos += 1;
                    self.reference_pos += 1;
                    return Some(pair);
                }
                b'I' => {
                    self.op_offset += 1;
                    let pair = (Some(self.query_pos), None);
                    self.query_pos += 1;
                    return Some(pair);
                }
                b'D' | b'N' => {
                    self.op_offset += 1;
                    let pair = (None, Some(self.reference_pos));
                    self.reference_pos += 1;
                    return Some(pair);
                }
                b'S' => {
                    self.query_pos += (op.len - self.op_offset) as i64;
                    self.op_idx += 1;
                    self.op_offset = 0;
                }
                // H, P
                _ => {
                    self.op_idx += 1;
                    self.op_offset = 0;
                }
            }
        }
    }
}

/// An alignment record as seen by the truth filter and the label mapper.
pub trait AlignedRecord {
    fn is_unmapped(&self) -> bool;
    fn is_secondary(&self) -> bool;
    /// 0-based inclusive start on the reference.
    fn reference_start(&self) -> i64;
    /// 0-based exclusive end on the reference.
    fn reference_end(&self) -> i64;
    fn query_sequence(&self) -> Vec<u8>;
    fn cigar(&self) -> Vec<CigarOp>;

    fn reference_length(&self) -> i64 {
        self.reference_end() - self.reference_start()
    }

    fn aligned_pairs(&self) -> AlignedPairs {
        AlignedPairs::new(self.reference_start(), self.cigar())
    }
}

impl AlignedRecord for bam::Record {
    fn is_unmapped(&self) -> bool {
        bam::Record::is_unmapped(self)
    }

    fn is_secondary(&self) -> bool {
        bam::Record::is_secondary(self)
    }

    fn reference_start(&self) -> i64 {
        self.pos()
    }

    fn reference_end(&self) -> i64 {
        self.cigar().end_pos()
    }

    fn query_sequence(&self) -> Vec<u8> {
        self.seq().as_bytes()
    }

    fn cigar(&self) -> Vec<CigarOp> {
        bam::Record::cigar(self)
            .iter()
            .map(|c| CigarOp::new(c.len(), c.char() as u8))
            .collect()
    }
}

/// An alignment held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleAlignment {
    pub reference_start: i64,
    pub cigar: Vec<CigarOp>,
    pub query: Vec<u8>,
    pub unmapped: bool,
    pub secondary: bool,
}

impl SimpleAlignment {
    /// Build a primary mapped alignment, checking that the CIGAR string
    /// consumes exactly the query.
    pub fn new(reference_start: i64, cigar: &str, query: &[u8]) -> io::Result<Self> {
        let cigar = parse_cigar(cigar)?;
        let query_len: u64 = cigar
            .iter()
            .filter(|op| op.consumes_query())
            .map(|op| op.len as u64)
            .sum();
        if query_len != query.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CIGAR consumes {} query bases but the query has {}",
                    query_len,
                    query.len()
                ),
            ));
        }

        Ok(Self {
            reference_start,
            cigar,
            query: query.to_vec(),
            unmapped: false,
            secondary: false,
        })
    }

    /// Alignment matching the reference base for base over `[start, start + query.len())`.
    pub fn exact(reference_start: i64, query: &[u8]) -> Self {
        Self {
            reference_start,
            cigar: vec![CigarOp::new(query.len() as u32, b'M')],
            query: query.to_vec(),
            unmapped: false,
            secondary: false,
        }
    }
}

impl AlignedRecord for SimpleAlignment {
    fn is_unmapped(&self) -> bool {
        self.unmapped
    }

    fn is_secondary(&self) -> bool {
        self.secondary
    }

    fn reference_start(&self) -> i64 {
        self.reference_start
    }

    fn reference_end(&self) -> i64 {
        self.reference_start
            + self
                .cigar
                .iter()
                .filter(|op| op.consumes_reference())
                .map(|op| op.len as i64)
                .sum::<i64>()
    }

    fn query_sequence(&self) -> Vec<u8> {
        self.query.clone()
    }

    fn cigar(&self) -> Vec<CigarOp> {
        self.cigar.clone()
    }
}

/// Source of alignments overlapping a reference interval.
pub trait AlignmentSource: Sync {
    type Record: AlignedRecord + Send;

    fn fetch(&self, contig: &str, start: i64, end: i64) -> io::Result<Vec<Self::Record>>;
}

/// Alignment file format types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignmentFormat {
    Bam,
    Cram,
}

impl AlignmentFormat {
    /// Detect format from file extension
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".bam") {
            Some(AlignmentFormat::Bam)
        } else if path.ends_with(".cram") {
            Some(AlignmentFormat::Cram)
        } else {
            None
        }
    }
}

/// Open an indexed BAM/CRAM file. CRAM decoding uses `reference` when given.
pub fn open_indexed_reader(path: &str, reference: Option<&str>) -> io::Result<bam::IndexedReader> {
    let mut reader = bam::IndexedReader::from_path(path).map_err(|e| {
        io::Error::other(format!("Failed to open alignment file '{path}': {e}"))
    })?;

    if let Some(reference) = reference {
        if AlignmentFormat::from_path(path) == Some(AlignmentFormat::Cram) {
            reader.set_reference(reference).map_err(|e| {
                io::Error::other(format!("Failed to set reference '{reference}' for '{path}': {e}"))
            })?;
        }
    }
    Ok(reader)
}

/// Indexed BAM/CRAM file. A reader is opened per fetch so that the source can
/// be shared between worker threads.
pub struct BamAlignmentSource {
    path: String,
    reference: Option<String>,
}

impl BamAlignmentSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            reference: None,
        }
    }

    /// Reference FASTA used to decode CRAM input.
    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
}

impl AlignmentSource for BamAlignmentSource {
    type Record = bam::Record;

    fn fetch(&self, contig: &str, start: i64, end: i64) -> io::Result<Vec<bam::Record>> {
        let mut reader = open_indexed_reader(&self.path, self.reference.as_deref())?;

        let tid = match reader.header().tid(contig.as_bytes()) {
            Some(tid) => tid as i32,
            None => {
                debug!("Contig {} not present in '{}'", contig, self.path);
                return Ok(Vec::new());
            }
        };

        reader.fetch((tid, start, end)).map_err(|e| {
            io::Error::other(format!(
                "Failed to fetch {contig}:{start}-{end} from '{}': {e}",
                self.path
            ))
        })?;

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to read record from '{}': {e}", self.path),
                )
            })?;
            if record.tid() != tid {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Record on target {} returned while fetching {contig} from '{}'",
                        record.tid(),
                        self.path
                    ),
                ));
            }
            records.push(record);
        }

        Ok(records)
    }
}

/// Alignments grouped by contig name, kept in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryAlignmentSource {
    records: FxHashMap<String, Vec<SimpleAlignment>>,
}

impl MemoryAlignmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, contig: &str, record: SimpleAlignment) {
        self.records.entry(contig.to_string()).or_default().push(record);
    }
}

impl AlignmentSource for MemoryAlignmentSource {
    type Record = SimpleAlignment;

    fn fetch(&self, contig: &str, start: i64, end: i64) -> io::Result<Vec<SimpleAlignment>> {
        Ok(self
            .records
            .get(contig)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.reference_start() < end && r.reference_end() > start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
