use crate::alignment_record::{AlignmentFormat, BamAlignmentSource};
use crate::container::DatasetWriter;
use crate::features::{PileupConfig, PileupFeatureGenerator};
use crate::pipeline::{generate_dataset, GenerateConfig, GenerateStats};
use crate::sequence_index::{open_reference, SequenceSource};
use log::info;
use std::io;
use std::path::Path;

/// Inputs of the generate command
pub struct GenerateOptions {
    pub reads_path: String,
    pub truth_path: Option<String>,
    pub reference_path: String,
    pub output_path: String,
    pub pipeline: GenerateConfig,
    pub pileup: PileupConfig,
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

/// Check that an alignment file exists and carries an index
fn check_alignment_file(path: &str, what: &str) -> io::Result<()> {
    if !Path::new(path).is_file() {
        return Err(invalid_input(format!("{what} file '{path}' does not exist")));
    }

    let indexes: &[&str] = match AlignmentFormat::from_path(path) {
        Some(AlignmentFormat::Bam) => &["bai", "csi"],
        Some(AlignmentFormat::Cram) => &["crai"],
        None => {
            return Err(invalid_input(format!(
                "{what} file '{path}' must be .bam or .cram"
            )))
        }
    };
    let indexed = indexes.iter().any(|ext| {
        Path::new(&format!("{path}.{ext}")).is_file()
            || Path::new(path).with_extension(ext).is_file()
    });
    if !indexed {
        return Err(invalid_input(format!(
            "{what} file '{path}' has no index ({})",
            indexes.join(" or ")
        )));
    }
    Ok(())
}

/// Validate every path before any work starts
pub fn validate(options: &GenerateOptions) -> io::Result<()> {
    check_alignment_file(&options.reads_path, "Reads")?;
    if let Some(truth_path) = &options.truth_path {
        check_alignment_file(truth_path, "Truth")?;
    }
    if !Path::new(&options.reference_path).is_file() {
        return Err(invalid_input(format!(
            "Reference file '{}' does not exist",
            options.reference_path
        )));
    }

    let output_dir = Path::new(&options.output_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !output_dir.is_dir() {
        return Err(invalid_input(format!(
            "Output directory '{}' does not exist",
            output_dir.display()
        )));
    }
    Ok(())
}

pub fn run_generate(options: GenerateOptions) -> io::Result<GenerateStats> {
    validate(&options)?;

    let reference = open_reference(&options.reference_path)?;
    let contigs = reference.sequences()?;
    info!(
        "Loaded {} contigs from '{}'",
        contigs.len(),
        options.reference_path
    );

    let generator =
        PileupFeatureGenerator::new(options.pileup).with_reference(&options.reference_path);
    let stats = match &options.truth_path {
        Some(truth_path) => {
            info!("Generating training data with truth '{}'", truth_path);
            let truth =
                BamAlignmentSource::new(truth_path).with_reference(&options.reference_path);
            let writer = DatasetWriter::training(&options.output_path)?;
            generate_dataset(
                &options.reads_path,
                Some(&truth),
                &generator,
                &contigs,
                writer,
                &options.pipeline,
            )?
        }
        None => {
            info!("Generating inference data");
            let writer = DatasetWriter::inference(&options.output_path)?;
            generate_dataset::<BamAlignmentSource, _>(
                &options.reads_path,
                None,
                &generator,
                &contigs,
                writer,
                &options.pipeline,
            )?
        }
    };

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> GenerateOptions {
        let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();
        GenerateOptions {
            reads_path: path("reads.bam"),
            truth_path: None,
            reference_path: path("ref.fa"),
            output_path: path("out.pld"),
            pipeline: GenerateConfig::default(),
            pileup: PileupConfig::default(),
        }
    }

    #[test]
    fn test_missing_paths_fail_before_processing() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir);
        let err = validate(&opts).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        std::fs::write(&opts.reads_path, b"").unwrap();
        // Reads without an index
        assert!(validate(&opts).is_err());
        std::fs::write(format!("{}.bai", opts.reads_path), b"").unwrap();
        // Reference still missing
        assert!(validate(&opts).is_err());
        std::fs::write(&opts.reference_path, b">chr1\nACGT\n").unwrap();
        validate(&opts).unwrap();

        opts.truth_path = Some(dir.path().join("truth.sam").to_string_lossy().to_string());
        assert!(validate(&opts).is_err());

        opts.truth_path = None;
        opts.output_path = dir.path().join("missing/out.pld").to_string_lossy().to_string();
        assert!(validate(&opts).is_err());
    }
}
