//! Reconciliation of feature windows with truth labels.

use crate::coder::Base;
use crate::error::{DataError, IntegrityViolation};
use crate::features::FeatureWindow;
use crate::labels::LabelTrack;
use crate::position::Position;
use coitrees::{BasicCOITree, Interval, IntervalTree};
use ndarray::Array2;
use rustc_hash::{FxHashMap, FxHashSet};

/// A feature window with one truth label per position.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledExample {
    pub positions: Vec<Position>,
    pub features: Array2<u8>,
    pub labels: Vec<u8>,
}

/// Truth labels of a region, merged over all filtered alignments.
///
/// Positions labelled `N` are kept apart: any window touching one is dropped.
#[derive(Debug, Default, Clone)]
pub struct TruthMap {
    labels: FxHashMap<Position, u8>,
    unknown: FxHashSet<Position>,
}

impl TruthMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tracks(tracks: &[LabelTrack]) -> Self {
        let mut map = Self::new();
        for track in tracks {
            map.insert_track(track);
        }
        map
    }

    pub fn insert_track(&mut self, track: &LabelTrack) {
        let unknown = Base::Unknown.code();
        for (&position, &label) in track.positions.iter().zip(&track.labels) {
            if label == unknown {
                self.unknown.insert(position);
            } else {
                self.labels.insert(position, label);
            }
        }
    }

    pub fn get(&self, position: &Position) -> Option<u8> {
        self.labels.get(position).copied()
    }

    pub fn is_unknown(&self, position: &Position) -> bool {
        self.unknown.contains(position)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn unknown_count(&self) -> usize {
        self.unknown.len()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyStats {
    pub accepted: usize,
    pub rejected_unknown: usize,
}

/// Labels the feature windows of one region.
pub struct ExampleAssembler {
    contig: String,
    truth: TruthMap,
    coverage: BasicCOITree<(), u32>,
}

impl ExampleAssembler {
    /// `spans` are the `[start, end)` working intervals of the filtered truth
    /// alignments. Spans must fit the `i32` coordinates of the coverage tree.
    pub fn new(contig: &str, truth: TruthMap, spans: &[(i64, i64)]) -> Result<Self, DataError> {
        let mut intervals: Vec<Interval<()>> = Vec::with_capacity(spans.len());
        for &(start, end) in spans.iter().filter(|(start, end)| end > start) {
            match (i32::try_from(start), i32::try_from(end - 1)) {
                (Ok(first), Ok(last)) => intervals.push(Interval::new(first, last, ())),
                _ => {
                    return Err(DataError::Format(format!(
                        "truth span {}-{} on {} exceeds the supported coordinate range",
                        start, end, contig
                    )))
                }
            }
        }

        Ok(Self {
            contig: contig.to_string(),
            truth,
            coverage: BasicCOITree::new(intervals.as_slice()),
        })
    }

    fn is_covered(&self, reference: i64) -> bool {
        match i32::try_from(reference) {
            Ok(reference) => self.coverage.query_count(reference, reference) > 0,
            Err(_) => false,
        }
    }

    /// Label one window.
    ///
    /// Returns `Ok(None)` when the window touches a position with an unknown
    /// truth base. Positions outside the filtered spans, and reference columns
    /// without a label, are integrity violations.
    pub fn assemble_window(
        &self,
        window: FeatureWindow,
    ) -> Result<Option<LabeledExample>, IntegrityViolation> {
        let mut labels = Vec::with_capacity(window.positions.len());

        for position in &window.positions {
            if !self.is_covered(position.reference) {
                return Err(IntegrityViolation::OutsideCoverage {
                    contig: self.contig.clone(),
                    position: *position,
                });
            }

            if self.truth.is_unknown(position) {
                return Ok(None);
            }

            let label = match self.truth.get(position) {
                Some(label) => label,
                None if position.is_insertion() => Base::Gap.code(),
                None => {
                    return Err(IntegrityViolation::MissingLabel {
                        contig: self.contig.clone(),
                        position: *position,
                    })
                }
            };
            labels.push(label);
        }

        Ok(Some(LabeledExample {
            positions: window.positions,
            features: window.features,
            labels,
        }))
    }

    /// Label every window, keeping the accepted ones in input order.
    pub fn assemble<I>(
        &self,
        windows: I,
        stats: &mut AssemblyStats,
    ) -> Result<Vec<LabeledExample>, IntegrityViolation>
    where
        I: IntoIterator<Item = FeatureWindow>,
    {
        let mut examples = Vec::new();
        for window in windows {
            match self.assemble_window(window)? {
                Some(example) => {
                    stats.accepted += 1;
                    examples.push(example);
                }
                None => stats.rejected_unknown += 1,
            }
        }
        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::encode;

    fn track(positions: &[(i64, u32)], symbols: &[u8]) -> LabelTrack {
        LabelTrack {
            positions: positions.iter().map(|&(r, i)| Position::new(r, i)).collect(),
            labels: symbols.iter().map(|&s| encode(s).unwrap()).collect(),
            mismatches: 0,
        }
    }

    fn window(positions: &[(i64, u32)]) -> FeatureWindow {
        FeatureWindow::new(
            positions.iter().map(|&(r, i)| Position::new(r, i)).collect(),
            Array2::zeros((2, positions.len())),
        )
    }

    #[test]
    fn test_window_is_labelled() {
        let truth = TruthMap::from_tracks(&[track(&[(0, 0), (0, 1), (1, 0), (2, 0)], b"AGC*")]);
        let assembler = ExampleAssembler::new("ctg", truth, &[(0, 3)]).unwrap();

        let example = assembler
            .assemble_window(window(&[(0, 0), (0, 1), (0, 2), (1, 0), (2, 0)]))
            .unwrap()
            .unwrap();
        let expected: Vec<u8> = b"AG*C*".iter().map(|&s| encode(s).unwrap()).collect();
        assert_eq!(example.labels, expected);
        assert_eq!(example.positions.len(), 5);
    }

    #[test]
    fn test_unknown_position_rejects_whole_window() {
        let truth = TruthMap::from_tracks(&[track(&[(0, 0), (1, 0), (2, 0), (3, 0)], b"ACNT")]);
        assert_eq!(truth.unknown_count(), 1);
        let assembler = ExampleAssembler::new("ctg", truth, &[(0, 4)]).unwrap();

        let mut stats = AssemblyStats::default();
        let examples = assembler
            .assemble(
                vec![window(&[(0, 0), (1, 0), (2, 0)]), window(&[(0, 0), (1, 0)])],
                &mut stats,
            )
            .unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(
            stats,
            AssemblyStats {
                accepted: 1,
                rejected_unknown: 1
            }
        );
    }

    #[test]
    fn test_position_outside_coverage_is_fatal() {
        let truth = TruthMap::from_tracks(&[track(&[(10, 0), (11, 0)], b"AC")]);
        let assembler = ExampleAssembler::new("ctg", truth, &[(10, 12)]).unwrap();

        let err = assembler
            .assemble_window(window(&[(11, 0), (12, 0)]))
            .unwrap_err();
        assert_eq!(
            err,
            IntegrityViolation::OutsideCoverage {
                contig: "ctg".to_string(),
                position: Position::new(12, 0)
            }
        );
    }

    #[test]
    fn test_missing_reference_column_is_fatal() {
        let truth = TruthMap::from_tracks(&[track(&[(0, 0), (2, 0)], b"AC")]);
        let assembler = ExampleAssembler::new("ctg", truth, &[(0, 3)]).unwrap();

        let err = assembler
            .assemble_window(window(&[(0, 0), (1, 0), (2, 0)]))
            .unwrap_err();
        assert!(matches!(
            err,
            IntegrityViolation::MissingLabel { position, .. } if position == Position::new(1, 0)
        ));
    }

    #[test]
    fn test_tracks_are_merged() {
        let truth = TruthMap::from_tracks(&[
            track(&[(0, 0), (1, 0)], b"AC"),
            track(&[(5, 0), (5, 1), (6, 0)], b"GTA"),
        ]);
        assert_eq!(truth.len(), 5);
        let assembler = ExampleAssembler::new("ctg", truth, &[(0, 2), (5, 7)]).unwrap();

        // A window spanning both alignments draws labels from each
        let example = assembler
            .assemble_window(window(&[(1, 0), (5, 0), (5, 1), (6, 0)]))
            .unwrap()
            .unwrap();
        let expected: Vec<u8> = b"CGTA".iter().map(|&s| encode(s).unwrap()).collect();
        assert_eq!(example.labels, expected);

        let err = assembler.assemble_window(window(&[(1, 0), (3, 0)])).unwrap_err();
        assert!(matches!(err, IntegrityViolation::OutsideCoverage { .. }));
    }

    #[test]
    fn test_coordinates_beyond_tree_range() {
        let truth = TruthMap::from_tracks(&[track(&[(0, 0), (1, 0)], b"AC")]);
        let far = i32::MAX as i64 + 10;
        assert!(matches!(
            ExampleAssembler::new("ctg", truth.clone(), &[(far, far + 5)]),
            Err(DataError::Format(_))
        ));

        // A position past the tree range is never treated as covered
        let assembler = ExampleAssembler::new("ctg", truth, &[(0, 2)]).unwrap();
        let err = assembler
            .assemble_window(window(&[(1, 0), (u32::MAX as i64 + 1, 0)]))
            .unwrap_err();
        assert!(matches!(err, IntegrityViolation::OutsideCoverage { .. }));
    }
}
