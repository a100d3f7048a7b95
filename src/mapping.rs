//! Flat mapping files shared across the pipeline stages.
//!
//! Two text formats tie the commands together:
//! - `genus_fasta_mapping.txt`: one genus per line, `genus: acc1, acc2, ...`
//! - taxid mappings, either flat (`accession\ttaxid` per line,
//!   `assacc_to_taxid.tsv`) or grouped (`taxid: acc1, acc2, ...`,
//!   `taxid_fasta_mapping.txt`)

use crate::error::PrepError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Parse one `key: item1, item2` line; used by both grouped formats.
fn parse_grouped_line(line: &str, path: &Path, lineno: usize) -> Result<(String, Vec<String>)> {
    let (key, rest) = line.split_once(": ").ok_or_else(|| {
        PrepError::MalformedInput(format!(
            "{} line {}: expected 'key: item, item, ...'",
            path.display(),
            lineno
        ))
    })?;
    let items: Vec<String> = rest
        .split(", ")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return Err(PrepError::MalformedInput(format!(
            "{} line {}: no accessions listed for {:?}",
            path.display(),
            lineno,
            key
        ))
        .into());
    }
    Ok((key.to_string(), items))
}

/// Read a genus mapping file, preserving line order and per-genus
/// accession order.
pub fn read_genus_mapping(path: &Path) -> Result<Vec<(String, Vec<String>)>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open mapping file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut groups = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        groups.push(parse_grouped_line(&line, path, i + 1)?);
    }
    Ok(groups)
}

/// Write a genus mapping file, one `genus: acc1, acc2, ...` line per group.
pub fn write_genus_mapping(path: &Path, groups: &[(String, Vec<String>)]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create mapping file {}", path.display()))?;
    let mut w = BufWriter::new(file);
    for (genus, accessions) in groups {
        writeln!(w, "{}: {}", genus, accessions.join(", "))?;
    }
    w.flush()?;
    Ok(())
}

/// Read a flat `accession\ttaxid` table into a lookup map.
pub fn read_taxid_tsv(path: &Path) -> Result<HashMap<String, u32>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open taxid mapping {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut map = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (accession, taxid) = line.split_once('\t').ok_or_else(|| {
            PrepError::MalformedInput(format!(
                "{} line {}: expected 'accession<TAB>taxid'",
                path.display(),
                i + 1
            ))
        })?;
        let taxid: u32 = taxid.trim().parse().map_err(|_| {
            PrepError::MalformedInput(format!(
                "{} line {}: taxid {:?} is not an unsigned integer",
                path.display(),
                i + 1,
                taxid.trim()
            ))
        })?;
        map.insert(accession.trim().to_string(), taxid);
    }
    Ok(map)
}

/// Write a flat `accession\ttaxid` table in the given pair order.
pub fn write_taxid_tsv(path: &Path, pairs: &[(String, u32)]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create taxid mapping {}", path.display()))?;
    let mut w = BufWriter::new(file);
    for (accession, taxid) in pairs {
        writeln!(w, "{}\t{}", accession, taxid)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a grouped `taxid: acc1, acc2, ...` mapping, preserving order.
/// Taxids stay as text: this format is only rewritten, never joined on.
pub fn read_taxid_grouped(path: &Path) -> Result<Vec<(String, Vec<String>)>> {
    read_genus_mapping(path)
}

/// Write a grouped `taxid: acc1, acc2, ...` mapping.
pub fn write_taxid_grouped(path: &Path, groups: &[(String, Vec<String>)]) -> Result<()> {
    write_genus_mapping(path, groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn genus_mapping_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("genus_fasta_mapping.txt");
        let groups = vec![
            (
                "g__Alpha".to_string(),
                vec!["GCF_1.1".to_string(), "GCF_2.1".to_string()],
            ),
            ("g__Beta".to_string(), vec!["GCF_3.1".to_string()]),
        ];
        write_genus_mapping(&path, &groups).unwrap();
        let parsed = read_genus_mapping(&path).unwrap();
        assert_eq!(parsed, groups);
    }

    #[test]
    fn taxid_tsv_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("assacc_to_taxid.tsv");
        let pairs = vec![("GCF_1.1".to_string(), 9001), ("GCF_2.1".to_string(), 9002)];
        write_taxid_tsv(&path, &pairs).unwrap();
        let map = read_taxid_tsv(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["GCF_1.1"], 9001);
        assert_eq!(map["GCF_2.1"], 9002);
    }

    #[test]
    fn rejects_lines_without_separator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        std::fs::write(&path, "g__Alpha GCF_1.1\n").unwrap();
        let err = read_genus_mapping(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>().unwrap(),
            PrepError::MalformedInput(_)
        ));
    }

    #[test]
    fn skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("genus.txt");
        std::fs::write(&path, "g__Alpha: GCF_1.1\n\ng__Beta: GCF_2.1\n").unwrap();
        let groups = read_genus_mapping(&path).unwrap();
        assert_eq!(groups.len(), 2);
    }
}
