//! Runs the polishdata binary against small datasets written with the library.

use ndarray::Array2;
use noodles::bgzf;
use polishdata::container::DatasetWriter;
use polishdata::features::FeatureWindow;
use polishdata::position::Position;
use polishdata::storage::{ExampleStore, RegionExamples};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn get_binary() -> PathBuf {
    // CARGO_BIN_EXE_polishdata is set by cargo test for the binary crate
    if let Some(path) = option_env!("CARGO_BIN_EXE_polishdata") {
        return PathBuf::from(path);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        manifest_dir.join("target/release/polishdata"),
        manifest_dir.join("target/debug/polishdata"),
    ];
    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }

    PathBuf::from("polishdata")
}

fn run(work_dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new(get_binary())
        .current_dir(work_dir)
        .args(args)
        .output()
}

fn write_dataset(path: &Path) {
    let mut writer = DatasetWriter::inference(path.to_str().unwrap()).unwrap();
    writer
        .write_contigs(&[
            ("chr1".to_string(), b"ACGTACGTAC".to_vec()),
            ("chr2".to_string(), b"TTTT".to_vec()),
        ])
        .unwrap();
    let window = FeatureWindow::new(
        vec![Position::new(2, 0), Position::new(2, 1), Position::new(3, 0)],
        Array2::zeros((5, 3)),
    );
    writer
        .store("chr1", RegionExamples::Unlabeled(vec![window]))
        .unwrap();
    writer.flush().unwrap();
    writer.finish().unwrap();
}

#[test]
fn test_inspect_prints_layout() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    write_dataset(&temp_dir.path().join("data.pld"));

    let output = run(temp_dir.path(), &["inspect", "-i", "data.pld"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mode\tinference"));
    assert!(stdout.contains("shape\t5x3"));
    assert!(stdout.contains("contig\tchr2\t4"));
    assert!(stdout.contains("group\tchr1_2-3\tchr1\t1"));
    Ok(())
}

#[test]
fn test_stitch_applies_predictions() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    write_dataset(&temp_dir.path().join("data.pld"));

    // Substitution at 2, inserted base after it, deletion at 3
    let predictions = "chr1\t2\t0\tT\nchr1\t2\t1\tA\nchr1\t3\t0\t*\n";
    fs::write(temp_dir.path().join("pred.tsv"), predictions)?;

    let output = run(
        temp_dir.path(),
        &["stitch", "-i", "data.pld", "-p", "pred.tsv", "-o", "polished.fa"],
    )?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let fasta = fs::read_to_string(temp_dir.path().join("polished.fa"))?;
    assert_eq!(fasta, ">chr1\nACTAACGTAC\n>chr2\nTTTT\n");

    // Same predictions, bgzip-compressed
    {
        let file = fs::File::create(temp_dir.path().join("pred.tsv.gz"))?;
        let mut writer = bgzf::io::Writer::new(file);
        writer.write_all(predictions.as_bytes())?;
    }
    let output = run(
        temp_dir.path(),
        &["stitch", "-i", "data.pld", "-p", "pred.tsv.gz", "-o", "polished_gz.fa"],
    )?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(temp_dir.path().join("polished_gz.fa"))?, fasta);
    Ok(())
}

#[test]
fn test_generate_rejects_missing_inputs() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;

    let output = run(
        temp_dir.path(),
        &["generate", "-r", "reads.bam", "-f", "ref.fa", "-o", "out.pld"],
    )?;
    assert!(!output.status.success());
    assert!(!temp_dir.path().join("out.pld").exists());

    // Missing required argument
    let output = run(temp_dir.path(), &["generate", "-r", "reads.bam"])?;
    assert!(!output.status.success());
    Ok(())
}
