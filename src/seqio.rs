use crate::error::PrepError;
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A single two-line FASTA record: header line (with leading '>') plus one
/// sequence line. Wrapped FASTA is out of scope for the shufflers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub header: String,
    pub seq: String,
}

fn is_gz(path: &Path) -> bool {
    path.extension().map(|e| e.eq_ignore_ascii_case("gz")).unwrap_or(false)
}

pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path)
        .with_context(|| format!("Failed to open input: {}", path.display()))?;
    if is_gz(path) {
        let gz = MultiGzDecoder::new(f);
        Ok(Box::new(BufReader::new(gz)))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Read a strict two-line-per-record FASTA file. A header without a
/// sequence line, a sequence spanning multiple lines, or a non-header line
/// in header position is malformed.
pub fn read_two_line_fasta(path: &Path) -> Result<Vec<ReadRecord>> {
    let reader = open_maybe_gz(path)?;
    let mut records = Vec::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next() {
        let header = line?;
        if header.trim().is_empty() {
            continue;
        }
        if !header.starts_with('>') {
            return Err(PrepError::MalformedInput(format!(
                "{}: record {}: expected a '>' header line",
                path.display(),
                records.len() + 1
            ))
            .into());
        }
        let seq = match lines.next() {
            Some(l) => l?,
            None => {
                return Err(PrepError::MalformedInput(format!(
                    "{}: record {}: header without a sequence line",
                    path.display(),
                    records.len() + 1
                ))
                .into())
            }
        };
        if seq.starts_with('>') || seq.trim().is_empty() {
            return Err(PrepError::MalformedInput(format!(
                "{}: record {}: two-line FASTA required (one sequence line per record)",
                path.display(),
                records.len() + 1
            ))
            .into());
        }
        records.push(ReadRecord { header, seq });
    }
    Ok(records)
}

/// Write two-line FASTA records, fully rewriting the file.
pub fn write_two_line_fasta(path: &Path, records: &[ReadRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output FASTA: {}", path.display()))?;
    let mut w = BufWriter::new(file);
    for rec in records {
        writeln!(w, "{}", rec.header)?;
        writeln!(w, "{}", rec.seq)?;
    }
    w.flush()?;
    Ok(())
}

/// Locate the downloaded FASTA for one accession: the first (sorted)
/// `*.fna.gz` file under `fasta_dir/<accession>/`. None when the directory
/// or file is absent.
pub fn find_accession_fasta(fasta_dir: &Path, accession: &str) -> Option<PathBuf> {
    let dir = fasta_dir.join(accession);
    let entries = std::fs::read_dir(&dir).ok()?;
    let mut hits: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().ends_with(".fna.gz"))
                .unwrap_or(false)
        })
        .collect();
    hits.sort();
    hits.into_iter().next()
}

/// Decompress one gzipped FASTA into the given writer, returning the number
/// of bytes written.
pub fn copy_gz_contents<W: Write>(src: &Path, dst: &mut W) -> Result<u64> {
    let f = File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
    let mut gz = MultiGzDecoder::new(BufReader::new(f));
    io::copy(&mut gz, dst).with_context(|| format!("Failed to decompress {}", src.display()))
}
