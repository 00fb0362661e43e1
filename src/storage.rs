//! Per-contig buffering of examples waiting to be written.

use crate::assembler::LabeledExample;
use crate::error::DataError;
use crate::features::FeatureWindow;
use crate::position::Position;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Whether a dataset carries truth labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetMode {
    Training,
    Inference,
}

impl std::fmt::Display for DatasetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetMode::Training => write!(f, "training"),
            DatasetMode::Inference => write!(f, "inference"),
        }
    }
}

/// The output of one region, as handed to an [`ExampleStore`].
#[derive(Debug, Clone)]
pub enum RegionExamples {
    Labeled(Vec<LabeledExample>),
    Unlabeled(Vec<FeatureWindow>),
}

impl RegionExamples {
    pub fn mode(&self) -> DatasetMode {
        match self {
            RegionExamples::Labeled(_) => DatasetMode::Training,
            RegionExamples::Unlabeled(_) => DatasetMode::Inference,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RegionExamples::Labeled(examples) => examples.len(),
            RegionExamples::Unlabeled(windows) => windows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabeledBatch {
    pub contig: String,
    pub examples: Vec<LabeledExample>,
}

#[derive(Debug, Clone, Default)]
pub struct UnlabeledBatch {
    pub contig: String,
    pub examples: Vec<FeatureWindow>,
}

/// Pending examples of one contig.
#[derive(Debug, Clone)]
pub enum ContigBatch {
    Labeled(LabeledBatch),
    Unlabeled(UnlabeledBatch),
}

impl ContigBatch {
    fn empty(mode: DatasetMode, contig: &str) -> Self {
        let contig = contig.to_string();
        match mode {
            DatasetMode::Training => ContigBatch::Labeled(LabeledBatch {
                contig,
                examples: Vec::new(),
            }),
            DatasetMode::Inference => ContigBatch::Unlabeled(UnlabeledBatch {
                contig,
                examples: Vec::new(),
            }),
        }
    }

    pub fn contig(&self) -> &str {
        match self {
            ContigBatch::Labeled(batch) => &batch.contig,
            ContigBatch::Unlabeled(batch) => &batch.contig,
        }
    }

    pub fn mode(&self) -> DatasetMode {
        match self {
            ContigBatch::Labeled(_) => DatasetMode::Training,
            ContigBatch::Unlabeled(_) => DatasetMode::Inference,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ContigBatch::Labeled(batch) => batch.examples.len(),
            ContigBatch::Unlabeled(batch) => batch.examples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positions of every example, in batch order.
    pub fn positions(&self) -> Vec<&[Position]> {
        match self {
            ContigBatch::Labeled(batch) => batch
                .examples
                .iter()
                .map(|e| e.positions.as_slice())
                .collect(),
            ContigBatch::Unlabeled(batch) => batch
                .examples
                .iter()
                .map(|e| e.positions.as_slice())
                .collect(),
        }
    }

    /// Order examples by their first position.
    pub fn sort_by_start(&mut self) {
        match self {
            ContigBatch::Labeled(batch) => batch
                .examples
                .sort_by_key(|e| e.positions.first().copied()),
            ContigBatch::Unlabeled(batch) => batch
                .examples
                .sort_by_key(|e| e.positions.first().copied()),
        }
    }

    /// First position of the first example and last position of the last one.
    pub fn span(&self) -> Option<(Position, Position)> {
        let positions = self.positions();
        let first = positions.first()?.first()?;
        let last = positions.last()?.last()?;
        Some((*first, *last))
    }

    fn append(&mut self, examples: RegionExamples) -> Result<(), DataError> {
        match (self, examples) {
            (ContigBatch::Labeled(batch), RegionExamples::Labeled(mut examples)) => {
                batch.examples.append(&mut examples);
                Ok(())
            }
            (ContigBatch::Unlabeled(batch), RegionExamples::Unlabeled(mut windows)) => {
                batch.examples.append(&mut windows);
                Ok(())
            }
            (batch, examples) => Err(DataError::Configuration(format!(
                "cannot store {} examples in a {} batch for {}",
                examples.mode(),
                batch.mode(),
                batch.contig()
            ))),
        }
    }
}

/// Accumulates examples per contig until the next flush.
#[derive(Debug)]
pub struct RegionBuffer {
    mode: DatasetMode,
    batches: FxHashMap<String, ContigBatch>,
}

impl RegionBuffer {
    pub fn new(mode: DatasetMode) -> Self {
        Self {
            mode,
            batches: FxHashMap::default(),
        }
    }

    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    pub fn store(&mut self, contig: &str, examples: RegionExamples) -> Result<(), DataError> {
        if examples.mode() != self.mode {
            return Err(DataError::Configuration(format!(
                "cannot store {} examples in a {} dataset",
                examples.mode(),
                self.mode
            )));
        }

        let mode = self.mode;
        self.batches
            .entry(contig.to_string())
            .or_insert_with(|| ContigBatch::empty(mode, contig))
            .append(examples)
    }

    /// Number of buffered examples over all contigs.
    pub fn pending(&self) -> usize {
        self.batches.values().map(ContigBatch::len).sum()
    }

    /// Take every non-empty batch, in natural contig order.
    pub fn flush(&mut self) -> Vec<ContigBatch> {
        let mut batches: Vec<ContigBatch> = self
            .batches
            .drain()
            .map(|(_, batch)| batch)
            .filter(|batch| !batch.is_empty())
            .collect();
        batches.sort_by(|a, b| natord::compare(a.contig(), b.contig()));
        batches
    }
}

/// Sink for the examples of completed regions.
pub trait ExampleStore {
    fn store(&mut self, contig: &str, examples: RegionExamples) -> Result<(), DataError>;

    /// Persist everything stored since the previous flush.
    fn flush(&mut self) -> Result<(), DataError>;
}
