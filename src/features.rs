//! Feature windows and the pileup-based feature generator.
//!
//! A feature window is a `rows x columns` matrix of encoded bases sampled
//! from the reads piled up over `columns` consecutive positions. Reverse
//! strand bases are offset by [`ALPHABET_SIZE`].

use crate::alignment_record::open_indexed_reader;
use crate::coder::{Base, ALPHABET_SIZE};
use crate::position::Position;
use crate::region::Region;
use log::debug;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_htslib::bam::{pileup::Indel, Read as BamRead};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::io;

/// Positions of one window and the matching feature matrix.
///
/// `features` has one column per position.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    pub positions: Vec<Position>,
    pub features: Array2<u8>,
}

impl FeatureWindow {
    pub fn new(positions: Vec<Position>, features: Array2<u8>) -> Self {
        Self {
            positions,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Produces feature windows for a region of a read alignment file.
pub trait FeatureGenerator: Sync {
    /// `region` is a 1-based inclusive region string, `contig:start-end`.
    fn generate(
        &self,
        reads_path: &str,
        reference: &[u8],
        region: &str,
    ) -> io::Result<Vec<FeatureWindow>>;
}

/// Parameters of [`PileupFeatureGenerator`].
#[derive(Debug, Clone, Copy)]
pub struct PileupConfig {
    /// Sampled reads per window (matrix rows).
    pub rows: usize,
    /// Positions per window (matrix columns).
    pub columns: usize,
    /// Positions dropped from the front of the queue after each window.
    pub stride: usize,
    /// Inserted bases tracked after each reference column.
    pub max_insertions: u32,
    /// Leading rows filled with the reference base instead of reads.
    pub reference_rows: usize,
    pub max_depth: u32,
    pub seed: u64,
}

impl Default for PileupConfig {
    fn default() -> Self {
        PileupConfig {
            rows: 200,
            columns: 90,
            stride: 30,
            max_insertions: 3,
            reference_rows: 0,
            max_depth: 10_000,
            seed: 42,
        }
    }
}

/// One read's contribution to a pileup column.
#[derive(Debug, Clone)]
pub struct ColumnRead {
    pub id: u32,
    /// Reference span of the read, `[start, end)`.
    pub start: i64,
    pub end: i64,
    pub forward: bool,
    /// Base at the column (`Gap` for a deletion) followed by inserted bases.
    pub bases: Vec<Base>,
}

#[derive(Debug, Clone, Copy)]
struct ReadInfo {
    start: i64,
    end: i64,
    forward: bool,
}

/// Turns pileup columns into overlapping feature windows.
pub struct Windower<'a> {
    config: PileupConfig,
    reference: &'a [u8],
    rng: StdRng,
    queue: VecDeque<Position>,
    bases: FxHashMap<Position, FxHashMap<u32, Base>>,
    reads: FxHashMap<u32, ReadInfo>,
    windows: Vec<FeatureWindow>,
}

impl<'a> Windower<'a> {
    pub fn new(config: PileupConfig, reference: &'a [u8], seed: u64) -> Self {
        Self {
            config,
            reference,
            rng: StdRng::seed_from_u64(seed),
            queue: VecDeque::new(),
            bases: FxHashMap::default(),
            reads: FxHashMap::default(),
            windows: Vec::new(),
        }
    }

    pub fn push_column(&mut self, reference: i64, column: &[ColumnRead]) {
        for read in column {
            self.reads.entry(read.id).or_insert(ReadInfo {
                start: read.start,
                end: read.end,
                forward: read.forward,
            });

            let inserted = self.config.max_insertions as usize + 1;
            for (i, &base) in read.bases.iter().take(inserted).enumerate() {
                let position = Position::new(reference, i as u32);
                let column_bases = self.bases.entry(position).or_insert_with(|| {
                    self.queue.push_back(position);
                    FxHashMap::default()
                });
                column_bases.entry(read.id).or_insert(base);
            }
        }

        while self.queue.len() >= self.config.columns.max(1) {
            self.emit_window();
        }
    }

    fn emit_window(&mut self) {
        let columns = self.config.columns.max(1);
        let window: Vec<Position> = self.queue.iter().take(columns).copied().collect();

        let mut valid: Vec<u32> = window
            .iter()
            .filter_map(|p| self.bases.get(p))
            .flat_map(|column| {
                column
                    .iter()
                    .filter(|(_, b)| **b != Base::Unknown)
                    .map(|(&id, _)| id)
            })
            .collect();
        valid.sort_unstable();
        valid.dedup();

        if valid.is_empty() {
            debug!(
                "No informative reads for window starting at {}, skipping",
                window[0]
            );
        } else {
            let mut features = Array2::<u8>::zeros((self.config.rows, columns));
            let reference_rows = self.config.reference_rows.min(self.config.rows);

            for (s, position) in window.iter().enumerate() {
                let value = if position.is_insertion() {
                    Base::Gap
                } else {
                    self.reference
                        .get(position.reference as usize)
                        .map_or(Base::Unknown, |&b| Base::from_symbol_lossy(b))
                };
                for r in 0..reference_rows {
                    features[[r, s]] = value.code();
                }
            }

            for r in reference_rows..self.config.rows {
                let id = valid[self.rng.gen_range(0..valid.len())];
                let info = self.reads[&id];

                for (s, position) in window.iter().enumerate() {
                    let base = match self.bases.get(position).and_then(|c| c.get(&id)) {
                        Some(&base) => base,
                        None if position.reference < info.start
                            || position.reference >= info.end =>
                        {
                            Base::Unknown
                        }
                        None => Base::Gap,
                    };
                    let offset = if info.forward { 0 } else { ALPHABET_SIZE as u8 };
                    features[[r, s]] = base.code() + offset;
                }
            }

            self.windows.push(FeatureWindow::new(window, features));
        }

        for _ in 0..self.config.stride.clamp(1, self.queue.len()) {
            if let Some(position) = self.queue.pop_front() {
                self.bases.remove(&position);
            }
        }
    }

    pub fn finish(self) -> Vec<FeatureWindow> {
        self.windows
    }
}

/// Feature generator reading an indexed BAM/CRAM file with rust-htslib.
pub struct PileupFeatureGenerator {
    config: PileupConfig,
    reference_path: Option<String>,
}

impl PileupFeatureGenerator {
    pub fn new(config: PileupConfig) -> Self {
        Self {
            config,
            reference_path: None,
        }
    }

    /// Reference FASTA used to decode CRAM reads.
    pub fn with_reference(mut self, reference_path: &str) -> Self {
        self.reference_path = Some(reference_path.to_string());
        self
    }
}

impl Default for PileupFeatureGenerator {
    fn default() -> Self {
        Self::new(PileupConfig::default())
    }
}

impl FeatureGenerator for PileupFeatureGenerator {
    fn generate(
        &self,
        reads_path: &str,
        reference: &[u8],
        region: &str,
    ) -> io::Result<Vec<FeatureWindow>> {
        let region = Region::parse(region)?;

        let mut reader = open_indexed_reader(reads_path, self.reference_path.as_deref())?;
        reader
            .fetch((region.contig.as_str(), region.start, region.end))
            .map_err(|e| io::Error::other(format!("Failed to fetch {region}: {e}")))?;

        let seed = self.config.seed.wrapping_add(region.start as u64);
        let mut windower = Windower::new(self.config, reference, seed);
        let mut read_ids: FxHashMap<(Vec<u8>, i64, u16), u32> = FxHashMap::default();
        let mut column = Vec::new();

        let mut pileups = reader.pileup();
        pileups.set_max_depth(self.config.max_depth);

        for pileup in pileups {
            let pileup = pileup.map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Pileup failed: {e}"))
            })?;

            let position = pileup.pos() as i64;
            if position < region.start {
                continue;
            }
            if position >= region.end {
                break;
            }

            column.clear();
            for alignment in pileup.alignments() {
                if alignment.is_refskip() {
                    continue;
                }

                let record = alignment.record();
                let key = (record.qname().to_vec(), record.pos(), record.flags());
                let next_id = read_ids.len() as u32;
                let id = *read_ids.entry(key).or_insert(next_id);

                let mut bases = Vec::new();
                match alignment.qpos() {
                    Some(qpos) if !alignment.is_del() => {
                        let seq = record.seq();
                        bases.push(Base::from_symbol_lossy(seq[qpos]));
                        if let Indel::Ins(len) = alignment.indel() {
                            let n = len.min(self.config.max_insertions) as usize;
                            for i in 1..=n {
                                bases.push(Base::from_symbol_lossy(seq[qpos + i]));
                            }
                        }
                    }
                    _ => bases.push(Base::Gap),
                }

                column.push(ColumnRead {
                    id,
                    start: record.pos(),
                    end: record.cigar().end_pos(),
                    forward: !record.is_reverse(),
                    bases,
                });
            }

            windower.push_column(position, &column);
        }

        let windows = windower.finish();
        debug!("Generated {} feature windows for {}", windows.len(), region);
        Ok(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> PileupConfig {
        PileupConfig {
            rows: 4,
            columns: 5,
            stride: 2,
            max_insertions: 2,
            reference_rows: 1,
            max_depth: 100,
            seed: 7,
        }
    }

    fn read(id: u32, start: i64, end: i64, forward: bool, bases: &[Base]) -> ColumnRead {
        ColumnRead {
            id,
            start,
            end,
            forward,
            bases: bases.to_vec(),
        }
    }

    #[test]
    fn test_windows_are_strided() {
        let reference = b"ACGTACGTAC";
        let mut windower = Windower::new(small_config(), reference, 1);
        for pos in 0..10 {
            let base = Base::from_symbol_lossy(reference[pos as usize]);
            windower.push_column(pos, &[read(0, 0, 10, true, &[base])]);
        }
        let windows = windower.finish();

        let starts: Vec<i64> = windows.iter().map(|w| w.positions[0].reference).collect();
        assert_eq!(starts, vec![0, 2, 4]);
        for window in &windows {
            assert_eq!(window.features.dim(), (4, 5));
            assert!(crate::position::is_strictly_increasing(&window.positions));
            for (s, p) in window.positions.iter().enumerate() {
                let expected = Base::from_symbol_lossy(reference[p.reference as usize]).code();
                // Reference row and every sampled row agree with the single read
                for r in 0..4 {
                    assert_eq!(window.features[[r, s]], expected);
                }
            }
        }
    }

    #[test]
    fn test_insertions_and_strand_encoding() {
        let reference = b"AAAAAAAA";
        let mut config = small_config();
        config.reference_rows = 0;
        let mut windower = Windower::new(config, reference, 3);

        // Reverse read with a 3-base insertion after column 1; only two are kept
        windower.push_column(0, &[read(9, 0, 4, false, &[Base::A])]);
        windower.push_column(1, &[read(9, 0, 4, false, &[Base::A, Base::C, Base::G, Base::T])]);
        windower.push_column(2, &[read(9, 0, 4, false, &[Base::Gap])]);
        let windows = windower.finish();

        assert_eq!(windows.len(), 1);
        let window = &windows[0];
        assert_eq!(
            window.positions,
            vec![
                Position::new(0, 0),
                Position::new(1, 0),
                Position::new(1, 1),
                Position::new(1, 2),
                Position::new(2, 0),
            ]
        );
        let offset = ALPHABET_SIZE as u8;
        let row: Vec<u8> = window.features.row(0).to_vec();
        assert_eq!(
            row,
            vec![
                Base::A.code() + offset,
                Base::A.code() + offset,
                Base::C.code() + offset,
                Base::G.code() + offset,
                Base::Gap.code() + offset,
            ]
        );
    }

    #[test]
    fn test_absent_reads_are_gap_inside_span_and_unknown_outside() {
        let reference = b"CCCCCCCC";
        let mut config = small_config();
        config.reference_rows = 0;
        config.rows = 32;
        let mut windower = Windower::new(config, reference, 11);

        // Read 1 covers 0..2, read 2 covers 0..5 and has an insertion at 0
        windower.push_column(0, &[
            read(1, 0, 2, true, &[Base::C]),
            read(2, 0, 5, true, &[Base::C, Base::T]),
        ]);
        windower.push_column(1, &[read(1, 0, 2, true, &[Base::C]), read(2, 0, 5, true, &[Base::C])]);
        windower.push_column(2, &[read(2, 0, 5, true, &[Base::C])]);
        windower.push_column(3, &[read(2, 0, 5, true, &[Base::C])]);
        let windows = windower.finish();
        assert_eq!(windows.len(), 1);

        let window = &windows[0];
        for row in window.features.rows() {
            let row = row.to_vec();
            if row[1] == Base::T.code() {
                assert_eq!(row, vec![1, 3, 1, 1, 1]);
            } else {
                // Read 1: gap in the insertion column, unknown past its end
                assert_eq!(
                    row,
                    vec![1, Base::Gap.code(), 1, Base::Unknown.code(), Base::Unknown.code()]
                );
            }
        }
    }

    #[test]
    fn test_window_without_informative_reads_is_skipped() {
        let reference = b"NNNNNN";
        let mut windower = Windower::new(small_config(), reference, 5);
        for pos in 0..5 {
            windower.push_column(pos, &[read(0, 0, 6, true, &[Base::Unknown])]);
        }
        assert!(windower.finish().is_empty());
    }
}
