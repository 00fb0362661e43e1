use std::io;
use std::path::Path;

use crate::faidx::FastaIndex;

// Trait for loading the reference contigs from different sources
pub trait SequenceSource {
    /// All contigs with their full sequences, in source order.
    fn sequences(&self) -> io::Result<Vec<(String, Vec<u8>)>>;
}

impl SequenceSource for FastaIndex {
    fn sequences(&self) -> io::Result<Vec<(String, Vec<u8>)>> {
        self.fetch_all()
    }
}

impl SequenceSource for Vec<(String, Vec<u8>)> {
    fn sequences(&self) -> io::Result<Vec<(String, Vec<u8>)>> {
        Ok(self.clone())
    }
}

/// Open a reference file, checking its extension.
pub fn open_reference(path: &str) -> io::Result<FastaIndex> {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let supported = [".fa", ".fasta", ".fna", ".fa.gz", ".fasta.gz", ".fna.gz"]
        .iter()
        .any(|ext| file_name.ends_with(ext));
    if !supported {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Unsupported reference file '{path}'. Expected .fa/.fasta/.fna/.fa.gz/.fasta.gz/.fna.gz"
            ),
        ));
    }

    FastaIndex::build_from_file(path)
}
