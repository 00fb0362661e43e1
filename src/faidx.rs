use rust_htslib::faidx;
use std::io;

/// Indexed FASTA reference. Sequence names keep their `.fai` order.
#[derive(Debug)]
pub struct FastaIndex {
    pub fasta_path: String,
    pub sequences: Vec<(String, usize)>,
}

impl FastaIndex {
    pub fn build_from_file(fasta_path: &str) -> io::Result<Self> {
        // Read the .fai file to get sequence names
        let fai_path = format!("{fasta_path}.fai");

        // Opening the reader creates a missing index
        let fai_content = match std::fs::read_to_string(&fai_path) {
            Ok(content) => content,
            Err(_) => match faidx::Reader::from_path(fasta_path) {
                Ok(_) => std::fs::read_to_string(&fai_path)?,
                Err(e) => {
                    return Err(io::Error::other(format!(
                        "Failed to create FASTA index for '{fasta_path}': {e}"
                    )));
                }
            },
        };

        let mut sequences = Vec::new();
        for line in fai_content.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 || fields[0].is_empty() {
                continue;
            }
            let length = fields[1].parse::<usize>().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid length for '{}' in '{fai_path}': {e}", fields[0]),
                )
            })?;
            sequences.push((fields[0].to_string(), length));
        }

        Ok(FastaIndex {
            fasta_path: fasta_path.to_string(),
            sequences,
        })
    }

    pub fn get_sequence_length(&self, seq_name: &str) -> io::Result<usize> {
        self.sequences
            .iter()
            .find(|(name, _)| name == seq_name)
            .map(|&(_, length)| length)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Sequence '{seq_name}' not found"),
                )
            })
    }

    /// Upper-cased sequence of `[start, end)`.
    pub fn fetch_sequence(&self, seq_name: &str, start: usize, end: usize) -> io::Result<Vec<u8>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let reader = faidx::Reader::from_path(&self.fasta_path).map_err(|e| {
            io::Error::other(format!("Failed to open FASTA file '{}': {e}", self.fasta_path))
        })?;
        fetch_with(&reader, seq_name, start, end)
    }

    /// Every sequence in index order, upper-cased.
    pub fn fetch_all(&self) -> io::Result<Vec<(String, Vec<u8>)>> {
        let reader = faidx::Reader::from_path(&self.fasta_path).map_err(|e| {
            io::Error::other(format!("Failed to open FASTA file '{}': {e}", self.fasta_path))
        })?;

        self.sequences
            .iter()
            .map(|(name, length)| {
                let sequence = if *length == 0 {
                    Vec::new()
                } else {
                    fetch_with(&reader, name, 0, *length)?
                };
                Ok((name.clone(), sequence))
            })
            .collect()
    }
}

fn fetch_with(reader: &faidx::Reader, seq_name: &str, start: usize, end: usize) -> io::Result<Vec<u8>> {
    // fetch_seq expects 0-based inclusive end coordinate
    match reader.fetch_seq(seq_name, start, end - 1) {
        Ok(seq) => {
            let mut seq_vec = seq.to_vec();
            unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) }; // Free up memory to avoid memory leak (bug https://github.com/rust-bio/rust-htslib/issues/401#issuecomment-1704290171)
            seq_vec.make_ascii_uppercase();
            Ok(seq_vec)
        }
        Err(e) => Err(io::Error::other(format!(
            "Failed to fetch sequence for {seq_name}: {e}"
        ))),
    }
}
