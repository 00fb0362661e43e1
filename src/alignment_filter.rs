//! Resolution of overlapping truth alignments into a non-overlapping cover.

use crate::alignment_record::{AlignedRecord, AlignmentSource};
use crate::error::DataError;
use crate::region::Region;
use log::debug;

/// Thresholds applied when two truth alignments overlap.
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    /// Length ratio at or above which the longer alignment dominates.
    pub len_threshold: f64,
    /// Overlap (relative to the shorter alignment) at or above which the
    /// overlap is treated as ambiguous.
    pub overlap_threshold: f64,
    /// Minimum length of a retained alignment after trimming.
    pub min_len: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            len_threshold: 2.0,
            overlap_threshold: 0.5,
            min_len: 1000,
        }
    }
}

/// A truth alignment together with its working interval `[start, end)`.
///
/// The interval starts as the record's reference span and may only shrink.
#[derive(Debug, Clone)]
pub struct TruthAlignment<R> {
    pub record: R,
    pub start: i64,
    pub end: i64,
}

impl<R: AlignedRecord> TruthAlignment<R> {
    pub fn new(record: R) -> Self {
        let start = record.reference_start();
        let end = record.reference_end();
        Self { record, start, end }
    }
}

impl<R> TruthAlignment<R> {
    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Fetch the primary, mapped truth alignments overlapping `region`, sorted by
/// reference start.
///
/// Records without a stored query sequence carry no truth bases and are
/// skipped.
pub fn collect_truth_alignments<S: AlignmentSource>(
    source: &S,
    region: &Region,
) -> Result<Vec<TruthAlignment<S::Record>>, DataError> {
    let mut aligns: Vec<TruthAlignment<S::Record>> = source
        .fetch(&region.contig, region.start, region.end)?
        .into_iter()
        .filter(|r| !r.is_unmapped() && !r.is_secondary())
        .filter(|r| r.reference_end() > region.start && r.reference_start() < region.end)
        .filter(|r| {
            let has_sequence = !r.query_sequence().is_empty();
            if !has_sequence {
                debug!(
                    "Skipping truth alignment {}-{} on {} without a query sequence",
                    r.reference_start(),
                    r.reference_end(),
                    region.contig
                );
            }
            has_sequence
        })
        .map(TruthAlignment::new)
        .collect();

    aligns.sort_by_key(|a| (a.record.reference_start(), a.record.reference_end()));
    Ok(aligns)
}

/// Reduce `aligns` to a non-overlapping subset.
///
/// Every unordered pair `(i, j)` with `i < j` is visited once, in index order
/// over the input sorted by original reference start. Trims are applied to the
/// shared working intervals immediately, so later pairs see the trimmed
/// bounds and the outcome depends on this visiting order. Pairs are ordered by
/// the records' original start and length; overlaps are measured on the
/// working intervals.
pub fn filter_alignments<R: AlignedRecord>(
    mut aligns: Vec<TruthAlignment<R>>,
    config: &FilterConfig,
) -> Vec<TruthAlignment<R>> {
    aligns.sort_by_key(|a| (a.record.reference_start(), a.record.reference_end()));

    let n = aligns.len();
    let mut removed = vec![false; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let (first, second) = if aligns[j].record.reference_start()
                < aligns[i].record.reference_start()
            {
                (j, i)
            } else {
                (i, j)
            };

            // Overlap on the working intervals
            if aligns[second].start >= aligns[first].end {
                continue;
            }
            let overlap_start = aligns[second].start;
            let overlap_end = aligns[first].end;

            let (shorter, longer) = if aligns[j].record.reference_length()
                < aligns[i].record.reference_length()
            {
                (j, i)
            } else {
                (i, j)
            };

            let shorter_len = aligns[shorter].record.reference_length();
            if shorter_len <= 0 {
                removed[shorter] = true;
                continue;
            }
            let longer_len = aligns[longer].record.reference_length();

            let len_ratio = longer_len as f64 / shorter_len as f64;
            let overlap_ratio = (overlap_end - overlap_start) as f64 / shorter_len as f64;

            if len_ratio < config.len_threshold {
                if overlap_ratio < config.overlap_threshold {
                    aligns[first].end = overlap_start;
                    aligns[second].start = overlap_end;
                } else {
                    removed[shorter] = true;
                    removed[longer] = true;
                }
            } else if overlap_ratio >= config.overlap_threshold {
                removed[shorter] = true;
            } else {
                aligns[second].start = overlap_end;
            }
        }
    }

    let before = aligns.len();
    let mut filtered: Vec<TruthAlignment<R>> = aligns
        .into_iter()
        .zip(removed)
        .filter(|(a, removed)| !*removed && a.len() >= config.min_len)
        .map(|(a, _)| a)
        .collect();
    filtered.sort_by_key(|a| a.start);

    debug!(
        "Retained {} of {} truth alignments (min length {})",
        filtered.len(),
        before,
        config.min_len
    );

    filtered
}
