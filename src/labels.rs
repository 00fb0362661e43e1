//! Per-column truth labels derived from a filtered truth alignment.

use crate::alignment_filter::TruthAlignment;
use crate::alignment_record::AlignedRecord;
use crate::coder::Base;
use crate::position::Position;
use crate::region::Region;

/// Positions and encoded labels of one truth alignment, in alignment order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LabelTrack {
    pub positions: Vec<Position>,
    pub labels: Vec<u8>,
    /// Reference columns whose label differs from the reference base.
    pub mismatches: usize,
}

impl LabelTrack {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Reference span `[first, last + 1)` of the track, if any column was emitted.
    pub fn span(&self) -> Option<(i64, i64)> {
        let first = self.positions.first()?;
        let last = self.positions.last()?;
        Some((first.reference, last.reference + 1))
    }
}

/// Walk the aligned pairs of `align` inside `region` and label every column.
///
/// Columns start at `max(region.start, align.start)`; pairs without a
/// reference coordinate before the first column are skipped. The walk stops
/// at the record's reference end or at `min(region.end, align.end)`. Inserted
/// bases share the preceding reference coordinate and count up the insertion
/// index. Labels are the upper-cased query base, `*` where the query has a
/// deletion, and `N` for anything outside the alphabet.
pub fn map_labels<R: AlignedRecord>(
    align: &TruthAlignment<R>,
    reference: &[u8],
    region: &Region,
) -> LabelTrack {
    let start = region.start.max(align.start);
    let end = region.end.min(align.end);
    let record_end = align.record.reference_end();

    let query = align.record.query_sequence();
    let mut track = LabelTrack::default();
    let mut current_reference = start;
    let mut insertion: u32 = 0;

    let pairs = align
        .record
        .aligned_pairs()
        .skip_while(|(_, r)| r.map_or(true, |r| r < start));

    for (query_pos, reference_pos) in pairs {
        if let Some(r) = reference_pos {
            if r == record_end || r >= end {
                break;
            }
            insertion = 0;
            current_reference = r;
        } else {
            insertion += 1;
        }

        let base = query_pos
            .and_then(|q| query.get(q as usize))
            .map_or(Base::Gap, |&b| Base::from_symbol_lossy(b));

        if insertion == 0 {
            let reference_base = reference
                .get(current_reference as usize)
                .map(|&b| Base::from_symbol_lossy(b));
            if reference_base != Some(base) {
                track.mismatches += 1;
            }
        }

        track
            .positions
            .push(Position::new(current_reference, insertion));
        track.labels.push(base.code());
    }

    track
}
