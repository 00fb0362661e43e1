use crate::consensus::{read_predictions, stitch_contigs, write_fasta};
use crate::container::DatasetReader;
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Rebuild polished contigs from a dataset's contigs and a prediction table
pub fn run_stitch(dataset_path: &str, predictions_path: &str, output_path: &str) -> io::Result<()> {
    let mut reader = DatasetReader::open(dataset_path)?;
    let contigs = reader.contigs()?;
    if contigs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Dataset '{dataset_path}' has no contigs section"),
        ));
    }

    let votes = read_predictions(predictions_path)?;
    let polished = stitch_contigs(&votes, &contigs);

    let file = File::create(output_path).map_err(|e| {
        io::Error::new(e.kind(), format!("Failed to create '{output_path}': {e}"))
    })?;
    let mut writer = BufWriter::new(file);
    for (name, sequence) in &polished {
        write_fasta(&mut writer, name, sequence)?;
    }
    writer.flush()?;

    info!("Wrote {} polished contigs to '{}'", polished.len(), output_path);
    Ok(())
}
