//! Chunked dataset container.
//!
//! Layout, little-endian:
//!
//! ```text
//! magic "PLDSET01" | u64 index offset | contigs | group sections ... | index
//! ```
//!
//! The contigs section and the trailing index are bincode encoded. Each group
//! stores three fixed-width sections: positions (`cols` pairs of `i64`
//! reference and `u32` insertion per example), labels (`cols` bytes per
//! example, training only) and examples (`rows * cols` bytes per example,
//! row-major). Example `i` of a group therefore lives at
//! `examples_offset + i * rows * cols`, and every example is read with one
//! seek. The index offset stays zero until [`DatasetWriter::finish`] seals the
//! file.

use crate::error::DataError;
use crate::group_map::{GroupEntry, GroupMap};
use crate::position::{is_strictly_increasing, Position};
use crate::storage::{ContigBatch, DatasetMode, ExampleStore, RegionBuffer, RegionExamples};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};

const MAGIC: &[u8] = b"PLDSET01";
const HEADER_SIZE: u64 = 16;
const POSITION_SIZE: usize = 12;

/// A reference contig as stored in the contigs section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigRecord {
    pub name: String,
    pub sequence: Vec<u8>,
    pub length: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatasetIndex {
    mode: DatasetMode,
    /// Rows and columns shared by every example
    shape: Option<(u64, u64)>,
    contigs_offset: Option<u64>,
    groups: GroupMap,
}

struct ExampleView<'a> {
    positions: &'a [Position],
    features: &'a Array2<u8>,
    labels: Option<&'a [u8]>,
}

fn views(batch: &ContigBatch) -> Vec<ExampleView<'_>> {
    match batch {
        ContigBatch::Labeled(batch) => batch
            .examples
            .iter()
            .map(|e| ExampleView {
                positions: &e.positions,
                features: &e.features,
                labels: Some(&e.labels),
            })
            .collect(),
        ContigBatch::Unlabeled(batch) => batch
            .examples
            .iter()
            .map(|e| ExampleView {
                positions: &e.positions,
                features: &e.features,
                labels: None,
            })
            .collect(),
    }
}

fn encode_positions(positions: &[Position], out: &mut Vec<u8>) {
    for p in positions {
        out.extend_from_slice(&p.reference.to_le_bytes());
        out.extend_from_slice(&p.insertion.to_le_bytes());
    }
}

fn decode_positions(bytes: &[u8]) -> Vec<Position> {
    bytes
        .chunks_exact(POSITION_SIZE)
        .map(|chunk| {
            let mut reference = [0u8; 8];
            let mut insertion = [0u8; 4];
            reference.copy_from_slice(&chunk[..8]);
            insertion.copy_from_slice(&chunk[8..]);
            Position::new(i64::from_le_bytes(reference), u32::from_le_bytes(insertion))
        })
        .collect()
}

/// Writes a dataset file. Examples are buffered per contig and written as one
/// group per contig on every flush.
pub struct DatasetWriter {
    path: String,
    writer: BufWriter<File>,
    offset: u64,
    buffer: RegionBuffer,
    shape: Option<(usize, usize)>,
    contigs_offset: Option<u64>,
    groups: GroupMap,
}

impl DatasetWriter {
    /// Create a dataset whose examples carry labels.
    pub fn training(path: &str) -> Result<Self, DataError> {
        Self::create(path, DatasetMode::Training)
    }

    /// Create a dataset of unlabeled examples.
    pub fn inference(path: &str) -> Result<Self, DataError> {
        Self::create(path, DatasetMode::Inference)
    }

    pub fn create(path: &str, mode: DatasetMode) -> Result<Self, DataError> {
        let file = File::create(path).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to create dataset '{path}': {e}"))
        })?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        // Index offset, patched by finish()
        writer.write_all(&[0u8; 8])?;

        Ok(Self {
            path: path.to_string(),
            writer,
            offset: HEADER_SIZE,
            buffer: RegionBuffer::new(mode),
            shape: None,
            contigs_offset: None,
            groups: GroupMap::new(),
        })
    }

    pub fn mode(&self) -> DatasetMode {
        self.buffer.mode()
    }

    pub fn groups(&self) -> &GroupMap {
        &self.groups
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Store the reference contigs. May be called once.
    pub fn write_contigs(&mut self, contigs: &[(String, Vec<u8>)]) -> Result<(), DataError> {
        if self.contigs_offset.is_some() {
            return Err(DataError::Configuration(format!(
                "contigs already written to '{}'",
                self.path
            )));
        }

        let records: Vec<ContigRecord> = contigs
            .iter()
            .map(|(name, sequence)| ContigRecord {
                name: name.clone(),
                sequence: sequence.clone(),
                length: sequence.len() as u64,
            })
            .collect();
        let data = bincode::serde::encode_to_vec(&records, bincode::config::standard())
            .map_err(|e| io::Error::other(format!("Failed to encode contigs: {e:?}")))?;

        self.contigs_offset = Some(self.offset);
        self.write_bytes(&data)?;
        debug!("Wrote {} contigs to '{}'", records.len(), self.path);
        Ok(())
    }

    fn check_example(&mut self, contig: &str, view: &ExampleView) -> Result<(), DataError> {
        let (rows, cols) = view.features.dim();
        if view.positions.len() != cols {
            return Err(DataError::Format(format!(
                "example on {} has {} positions but {} feature columns",
                contig,
                view.positions.len(),
                cols
            )));
        }
        if !is_strictly_increasing(view.positions) {
            return Err(DataError::Format(format!(
                "example on {} starting at {} has positions out of order",
                contig, view.positions[0]
            )));
        }
        if let Some(labels) = view.labels {
            if labels.len() != cols {
                return Err(DataError::Format(format!(
                    "example on {} has {} labels but {} positions",
                    contig,
                    labels.len(),
                    cols
                )));
            }
        }
        match self.shape {
            None => self.shape = Some((rows, cols)),
            Some(shape) if shape != (rows, cols) => {
                return Err(DataError::Format(format!(
                    "example on {} has shape {}x{}, dataset uses {}x{}",
                    contig, rows, cols, shape.0, shape.1
                )))
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn write_batch(&mut self, mut batch: ContigBatch) -> Result<(), DataError> {
        batch.sort_by_start();
        let Some((start, end)) = batch.span() else {
            return Ok(());
        };
        let contig = batch.contig().to_string();
        let examples = views(&batch);
        for view in &examples {
            self.check_example(&contig, view)?;
        }

        let name = self.groups.unique_name(&contig, &start, &end);

        let mut data = Vec::new();
        for view in &examples {
            encode_positions(view.positions, &mut data);
        }
        let positions_offset = self.offset;
        self.write_bytes(&data)?;

        let labels_offset = match &batch {
            ContigBatch::Labeled(_) => {
                data.clear();
                for view in &examples {
                    data.extend_from_slice(view.labels.unwrap_or_default());
                }
                let offset = self.offset;
                self.write_bytes(&data)?;
                Some(offset)
            }
            ContigBatch::Unlabeled(_) => None,
        };

        data.clear();
        for view in &examples {
            data.extend(view.features.iter());
        }
        let examples_offset = self.offset;
        self.write_bytes(&data)?;

        debug!(
            "Wrote group {} with {} examples to '{}'",
            name,
            examples.len(),
            self.path
        );
        self.groups.add_entry(GroupEntry {
            name,
            contig,
            size: examples.len() as u64,
            start,
            end,
            positions_offset,
            labels_offset,
            examples_offset,
        });
        Ok(())
    }

    /// Flush pending examples, write the index and seal the file.
    pub fn finish(mut self) -> Result<(), DataError> {
        ExampleStore::flush(&mut self)?;

        let index = DatasetIndex {
            mode: self.mode(),
            shape: self.shape.map(|(r, c)| (r as u64, c as u64)),
            contigs_offset: self.contigs_offset,
            groups: std::mem::take(&mut self.groups),
        };
        let index_offset = self.offset;
        let data = bincode::serde::encode_to_vec(&index, bincode::config::standard())
            .map_err(|e| io::Error::other(format!("Failed to encode dataset index: {e:?}")))?;
        self.write_bytes(&data)?;

        self.writer.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.flush()?;

        info!(
            "Wrote {} {} examples in {} groups to '{}'",
            index.groups.total_examples(),
            index.mode,
            index.groups.len(),
            self.path
        );
        Ok(())
    }
}

impl ExampleStore for DatasetWriter {
    fn store(&mut self, contig: &str, examples: RegionExamples) -> Result<(), DataError> {
        self.buffer.store(contig, examples)
    }

    fn flush(&mut self) -> Result<(), DataError> {
        for batch in self.buffer.flush() {
            self.write_batch(batch)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// One example read back from a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredExample {
    pub contig: String,
    pub group: String,
    pub positions: Vec<Position>,
    pub features: Array2<u8>,
    pub labels: Option<Vec<u8>>,
}

/// Random access to the examples of a sealed dataset.
///
/// Examples are numbered globally in group write order.
pub struct DatasetReader {
    path: String,
    file: File,
    index: DatasetIndex,
    /// Exclusive end of each group's global range
    group_ends: Vec<u64>,
}

impl DatasetReader {
    pub fn open(path: &str) -> io::Result<Self> {
        let mut file = File::open(path).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to open dataset '{path}': {e}"))
        })?;

        let mut magic_buf = [0u8; 8];
        file.read_exact(&mut magic_buf)?;
        if magic_buf != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid magic bytes - '{path}' is not a dataset file"),
            ));
        }

        let mut offset_buf = [0u8; 8];
        file.read_exact(&mut offset_buf)?;
        let index_offset = u64::from_le_bytes(offset_buf);
        if index_offset == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Dataset '{path}' has no index (truncated or not finished)"),
            ));
        }

        file.seek(SeekFrom::Start(index_offset))?;
        let index: DatasetIndex = {
            let mut reader = BufReader::new(&mut file);
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Failed to load dataset index from '{path}': {e:?}"),
                    )
                })?
        };

        let group_ends = index
            .groups
            .entries()
            .iter()
            .scan(0u64, |total, entry| {
                *total += entry.size;
                Some(*total)
            })
            .collect();

        Ok(Self {
            path: path.to_string(),
            file,
            index,
            group_ends,
        })
    }

    pub fn mode(&self) -> DatasetMode {
        self.index.mode
    }

    /// Rows and columns of every example.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.index.shape.map(|(r, c)| (r as usize, c as usize))
    }

    pub fn len(&self) -> u64 {
        self.group_ends.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Groups in natural name order.
    pub fn groups(&self) -> Vec<&GroupEntry> {
        let mut groups: Vec<&GroupEntry> = self.index.groups.entries().iter().collect();
        groups.sort_by(|a, b| natord::compare(&a.name, &b.name));
        groups
    }

    pub fn group(&self, name: &str) -> Option<&GroupEntry> {
        self.index.groups.get(name)
    }

    pub fn contigs(&mut self) -> io::Result<Vec<ContigRecord>> {
        let Some(offset) = self.index.contigs_offset else {
            return Ok(Vec::new());
        };
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&mut self.file);
        bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard()).map_err(
            |e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to load contigs from '{}': {e:?}", self.path),
                )
            },
        )
    }

    fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn shape_or_err(&self) -> io::Result<(usize, usize)> {
        self.shape().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Dataset '{}' has groups but no example shape", self.path),
            )
        })
    }

    /// Read example `index` of the global numbering.
    pub fn example(&mut self, index: u64) -> io::Result<StoredExample> {
        if index >= self.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Example {} out of range, '{}' holds {}",
                    index,
                    self.path,
                    self.len()
                ),
            ));
        }

        let group_idx = self.group_ends.partition_point(|&end| end <= index);
        let local = index - group_idx.checked_sub(1).map_or(0, |i| self.group_ends[i]);
        let entry = self.index.groups.entries()[group_idx].clone();
        let (rows, cols) = self.shape_or_err()?;

        let positions = self.read_at(
            entry.positions_offset + local * (cols * POSITION_SIZE) as u64,
            cols * POSITION_SIZE,
        )?;
        let features = self.read_at(entry.examples_offset + local * (rows * cols) as u64, rows * cols)?;
        let labels = match entry.labels_offset {
            Some(offset) => Some(self.read_at(offset + local * cols as u64, cols)?),
            None => None,
        };

        let features = Array2::from_shape_vec((rows, cols), features)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(StoredExample {
            contig: entry.contig,
            group: entry.name,
            positions: decode_positions(&positions),
            features,
            labels,
        })
    }

    /// Positions of every example in group `name`.
    pub fn group_positions(&mut self, name: &str) -> io::Result<Vec<Vec<Position>>> {
        let entry = self.group(name).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No group '{}' in '{}'", name, self.path),
            )
        })?;
        let (_, cols) = self.shape_or_err()?;

        let bytes = self.read_at(
            entry.positions_offset,
            entry.size as usize * cols * POSITION_SIZE,
        )?;
        Ok(bytes
            .chunks_exact(cols * POSITION_SIZE)
            .map(decode_positions)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::LabeledExample;
    use crate::features::FeatureWindow;
    use tempfile::TempDir;

    fn window(start: i64, fill: u8) -> FeatureWindow {
        let positions = vec![
            Position::new(start, 0),
            Position::new(start, 1),
            Position::new(start + 1, 0),
        ];
        FeatureWindow::new(positions, Array2::from_elem((2, 3), fill))
    }

    fn labeled(start: i64, fill: u8) -> LabeledExample {
        let window = window(start, fill);
        LabeledExample {
            positions: window.positions,
            features: window.features,
            labels: vec![fill, 4, fill],
        }
    }

    fn path(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().to_string()
    }

    #[test]
    fn test_training_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = path(&dir, "train.pld");

        let mut writer = DatasetWriter::training(&path).unwrap();
        writer
            .write_contigs(&[
                ("chr1".to_string(), b"ACGT".to_vec()),
                ("chr2".to_string(), b"GG".to_vec()),
            ])
            .unwrap();
        writer
            .store("chr2", RegionExamples::Labeled(vec![labeled(50, 3)]))
            .unwrap();
        writer
            .store("chr1", RegionExamples::Labeled(vec![labeled(10, 1), labeled(0, 0)]))
            .unwrap();
        writer.flush().unwrap();
        writer
            .store("chr1", RegionExamples::Labeled(vec![labeled(0, 2)]))
            .unwrap();
        writer.finish().unwrap();

        let mut reader = DatasetReader::open(&path).unwrap();
        assert_eq!(reader.mode(), DatasetMode::Training);
        assert_eq!(reader.shape(), Some((2, 3)));
        assert_eq!(reader.len(), 4);

        let names: Vec<&str> = reader.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["chr1_0-1", "chr1_0-11", "chr2_50-51"]);

        // Second flush of chr1 lands in a new group; examples sorted by start
        let first = reader.example(0).unwrap();
        assert_eq!(first.group, "chr1_0-11");
        assert_eq!(first.positions[0], Position::new(0, 0));
        assert_eq!(first.features, Array2::from_elem((2, 3), 0));
        assert_eq!(first.labels, Some(vec![0, 4, 0]));

        let second = reader.example(1).unwrap();
        assert_eq!(second.positions[2], Position::new(11, 0));
        assert_eq!(reader.example(2).unwrap().contig, "chr2");
        assert_eq!(reader.example(3).unwrap().group, "chr1_0-1");
        assert!(reader.example(4).is_err());

        let positions = reader.group_positions("chr1_0-11").unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1][1], Position::new(10, 1));

        let contigs = reader.contigs().unwrap();
        assert_eq!(contigs.len(), 2);
        assert_eq!(contigs[0].name, "chr1");
        assert_eq!(contigs[0].length, 4);
        assert_eq!(contigs[1].sequence, b"GG".to_vec());
    }

    #[test]
    fn test_colliding_group_names_are_suffixed() {
        let dir = TempDir::new().unwrap();
        let path = path(&dir, "infer.pld");

        let mut writer = DatasetWriter::inference(&path).unwrap();
        writer
            .store("chr1", RegionExamples::Unlabeled(vec![window(0, 1)]))
            .unwrap();
        writer.flush().unwrap();
        writer
            .store("chr1", RegionExamples::Unlabeled(vec![window(0, 2)]))
            .unwrap();
        writer.finish().unwrap();

        let mut reader = DatasetReader::open(&path).unwrap();
        assert_eq!(reader.mode(), DatasetMode::Inference);
        let names: Vec<&str> = reader.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["chr1_0-1", "chr1_0-1.1"]);

        let example = reader.example(1).unwrap();
        assert_eq!(example.labels, None);
        assert_eq!(example.features, Array2::from_elem((2, 3), 2));
        assert!(reader.contigs().unwrap().is_empty());
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = DatasetWriter::inference(&path(&dir, "bad.pld")).unwrap();

        let mut wide = window(10, 0);
        wide.features = Array2::zeros((3, 3));
        writer
            .store("chr1", RegionExamples::Unlabeled(vec![window(0, 0), wide]))
            .unwrap();
        assert!(matches!(writer.flush(), Err(DataError::Format(_))));
    }

    #[test]
    fn test_unordered_positions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = path(&dir, "unordered.pld");
        let mut writer = DatasetWriter::inference(&path).unwrap();

        let repeated = FeatureWindow::new(
            vec![Position::new(5, 0), Position::new(5, 0), Position::new(2, 0)],
            Array2::zeros((2, 3)),
        );
        writer
            .store("chr1", RegionExamples::Unlabeled(vec![repeated]))
            .unwrap();
        assert!(matches!(writer.flush(), Err(DataError::Format(_))));
        assert!(writer.finish().is_ok());

        // Nothing from the rejected batch reached the file
        let reader = DatasetReader::open(&path).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unfinished_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = path(&dir, "partial.pld");
        {
            let mut writer = DatasetWriter::training(&path).unwrap();
            writer
                .store("chr1", RegionExamples::Labeled(vec![labeled(0, 0)]))
                .unwrap();
            writer.flush().unwrap();
        }
        let err = DatasetReader::open(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
