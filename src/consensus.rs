//! Rebuilding polished contigs from per-position predictions.

use crate::coder::{Base, ALPHABET_SIZE};
use crate::container::ContigRecord;
use crate::position::Position;
use log::debug;
use noodles::bgzf;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

pub const FASTA_LINE_WIDTH: usize = 80;

/// Label votes per contig and position.
#[derive(Debug, Default)]
pub struct VoteTable {
    votes: FxHashMap<String, BTreeMap<Position, [u32; ALPHABET_SIZE]>>,
}

impl VoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, contig: &str, position: Position, base: Base) {
        let counts = self
            .votes
            .entry(contig.to_string())
            .or_default()
            .entry(position)
            .or_insert([0; ALPHABET_SIZE]);
        counts[base.code() as usize] += 1;
    }

    pub fn contains(&self, contig: &str) -> bool {
        self.votes.contains_key(contig)
    }

    pub fn len(&self) -> usize {
        self.votes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Polished sequence of `contig`.
    ///
    /// Reference bases before the first and after the last voted reference
    /// column are kept. Insertion positions ahead of the first reference
    /// column are ignored. Each voted position contributes its majority base
    /// (the lowest code on ties) and nothing when the majority is a gap.
    pub fn stitch(&self, contig: &str, reference: &[u8]) -> Vec<u8> {
        let Some(positions) = self.votes.get(contig) else {
            return reference.to_vec();
        };

        let mut voted = positions
            .iter()
            .skip_while(|(position, _)| position.is_insertion())
            .peekable();
        let Some(first) = voted.peek().map(|(position, _)| position.reference) else {
            return reference.to_vec();
        };
        let last = positions
            .keys()
            .next_back()
            .map_or(first, |position| position.reference);

        let first = (first.max(0) as usize).min(reference.len());
        let tail = ((last + 1).max(0) as usize).min(reference.len());

        let mut sequence = Vec::with_capacity(reference.len());
        sequence.extend_from_slice(&reference[..first]);
        for (_, counts) in voted {
            let base = majority(counts);
            if base != Base::Gap {
                sequence.push(base.symbol());
            }
        }
        sequence.extend_from_slice(&reference[tail.max(first)..]);
        sequence
    }
}

fn majority(counts: &[u32; ALPHABET_SIZE]) -> Base {
    let mut best = 0;
    for code in 1..ALPHABET_SIZE {
        if counts[code] > counts[best] {
            best = code;
        }
    }
    Base::from_code(best as u8).unwrap_or(Base::Unknown)
}

fn invalid_line(path: &str, line_no: usize, msg: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{path}:{line_no}: {msg}"),
    )
}

/// Parse predictions from `contig  reference  insertion  base` lines.
pub fn parse_predictions<R: BufRead>(reader: R, path: &str) -> io::Result<VoteTable> {
    let mut table = VoteTable::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(invalid_line(
                path,
                line_no,
                format!("expected 4 tab-separated fields, found {}", fields.len()),
            ));
        }

        let reference = fields[1]
            .parse::<i64>()
            .map_err(|e| invalid_line(path, line_no, format!("invalid reference '{}': {e}", fields[1])))?;
        let insertion = fields[2]
            .parse::<u32>()
            .map_err(|e| invalid_line(path, line_no, format!("invalid insertion '{}': {e}", fields[2])))?;
        let base = match fields[3].as_bytes() {
            [symbol] => Base::from_symbol(*symbol)
                .map_err(|e| invalid_line(path, line_no, e.to_string()))?,
            _ => {
                return Err(invalid_line(
                    path,
                    line_no,
                    format!("invalid base '{}'", fields[3]),
                ))
            }
        };

        table.add(fields[0], Position::new(reference, insertion), base);
    }

    debug!("Read {} predicted positions from '{}'", table.len(), path);
    Ok(table)
}

/// Read predictions from a plain or BGZF-compressed file.
pub fn read_predictions(path: &str) -> io::Result<VoteTable> {
    let file = File::open(path).map_err(|e| {
        io::Error::new(e.kind(), format!("Failed to open predictions '{path}': {e}"))
    })?;
    let reader: Box<dyn io::Read> = if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        Box::new(bgzf::io::Reader::new(file))
    } else {
        Box::new(file)
    };
    parse_predictions(BufReader::new(reader), path)
}

/// Stitch every contig, leaving contigs without votes unchanged.
pub fn stitch_contigs(table: &VoteTable, contigs: &[ContigRecord]) -> Vec<(String, Vec<u8>)> {
    contigs
        .iter()
        .map(|contig| {
            if !table.contains(&contig.name) {
                debug!("No predictions for {}, keeping the draft sequence", contig.name);
            }
            (contig.name.clone(), table.stitch(&contig.name, &contig.sequence))
        })
        .collect()
}

pub fn write_fasta<W: Write>(writer: &mut W, name: &str, sequence: &[u8]) -> io::Result<()> {
    writeln!(writer, ">{name}")?;
    for line in sequence.chunks(FASTA_LINE_WIDTH) {
        writer.write_all(line)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
