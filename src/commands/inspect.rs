use crate::container::DatasetReader;
use std::io::{self, Write};

/// Print mode, example shape, contigs and the group table of a dataset
pub fn run_inspect<W: Write>(dataset_path: &str, out: &mut W) -> io::Result<()> {
    let mut reader = DatasetReader::open(dataset_path)?;

    writeln!(out, "mode\t{}", reader.mode())?;
    match reader.shape() {
        Some((rows, cols)) => writeln!(out, "shape\t{rows}x{cols}")?,
        None => writeln!(out, "shape\t-")?,
    }
    writeln!(out, "examples\t{}", reader.len())?;

    for contig in reader.contigs()? {
        writeln!(out, "contig\t{}\t{}", contig.name, contig.length)?;
    }
    for group in reader.groups() {
        writeln!(
            out,
            "group\t{}\t{}\t{}\t{}\t{}",
            group.name, group.contig, group.size, group.start, group.end
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::DatasetWriter;
    use crate::features::FeatureWindow;
    use crate::position::Position;
    use crate::storage::{ExampleStore, RegionExamples};
    use ndarray::Array2;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_lists_contigs_and_groups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.pld").to_string_lossy().to_string();

        let mut writer = DatasetWriter::inference(&path).unwrap();
        writer
            .write_contigs(&[("chr1".to_string(), b"ACGTACGT".to_vec())])
            .unwrap();
        let window = FeatureWindow::new(
            vec![Position::new(3, 0), Position::new(4, 0)],
            Array2::zeros((4, 2)),
        );
        writer
            .store("chr1", RegionExamples::Unlabeled(vec![window]))
            .unwrap();
        writer.finish().unwrap();

        let mut out = Vec::new();
        run_inspect(&path, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "mode\tinference\nshape\t4x2\nexamples\t1\ncontig\tchr1\t8\ngroup\tchr1_3-4\tchr1\t1\t(3, 0)\t(4, 0)\n"
        );
    }
}
