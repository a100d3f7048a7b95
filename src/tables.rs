//! Loaders for the three delimited input tables.
//!
//! Three heterogeneous sources feed the accession pipeline:
//! - a taxonomy **metadata** table (TSV with header; carries a
//!   semicolon-delimited lineage column and a species-level taxid),
//! - a two-column **accession → taxid map** (TSV, no header),
//! - an **assembly summary** (TSV; first line is a comment, the header line's
//!   first column name carries a leading `#`).
//!
//! Each loader keeps only the columns needed downstream and normalizes
//! accession identifiers so the merge can join on plain strings.

use crate::error::PrepError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One metadata row. `accession` is present only when the metadata table
/// carries an accession column; without it the merge falls back to joining
/// on the species taxid.
#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub accession: Option<String>,
    pub genus: String,
    pub species: String,
    pub ncbi_species_taxid: u32,
}

/// One entry of the curated accession → taxid map.
#[derive(Debug, Clone)]
pub struct TaxidMapEntry {
    pub accession: String,
    pub taxid: u32,
}

/// One assembly-summary row, reduced to the join columns.
#[derive(Debug, Clone)]
pub struct AssemblyRow {
    pub accession: String,
    pub taxid: u32,
}

/// Strip GTDB-style `GB_`/`RS_` prefixes so accessions from every source
/// join on the same string (`RS_GCF_000123.1` and `GCF_000123.1` are the
/// same assembly).
pub fn normalize_accession(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("RS_")
        .or_else(|| trimmed.strip_prefix("GB_"))
        .unwrap_or(trimmed);
    stripped.to_string()
}

/// Split a semicolon-delimited lineage into (genus, species): the
/// second-to-last and last segments, whitespace-trimmed. None when the
/// lineage has fewer than two segments.
pub fn parse_lineage(lineage: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = lineage.split(';').collect();
    if segments.len() < 2 {
        return None;
    }
    let genus = segments[segments.len() - 2].trim();
    let species = segments[segments.len() - 1].trim();
    if genus.is_empty() || species.is_empty() {
        return None;
    }
    Some((genus.to_string(), species.to_string()))
}

fn required_column(headers: &csv::StringRecord, name: &str, what: &str) -> Result<usize, PrepError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('#') == name)
        .ok_or_else(|| {
            PrepError::MalformedInput(format!("{} is missing required column '{}'", what, name))
        })
}

fn parse_taxid(field: &str, what: &str, row: usize) -> Result<u32, PrepError> {
    field.trim().parse::<u32>().map_err(|_| {
        PrepError::MalformedInput(format!(
            "{} row {}: taxid {:?} is not an unsigned integer",
            what,
            row,
            field.trim()
        ))
    })
}

/// Load the taxonomy metadata table, keeping the lineage-derived genus and
/// species labels, the species-level taxid, and (when present) the
/// normalized accession.
pub fn load_metadata(path: &Path) -> Result<Vec<MetadataRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open metadata file {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read metadata header from {}", path.display()))?
        .clone();
    let lineage_col = required_column(&headers, "gtdb_taxonomy", "metadata")?;
    let taxid_col = required_column(&headers, "ncbi_species_taxid", "metadata")?;
    let accession_col = headers.iter().position(|h| h == "accession");

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        // Header is line 1; data rows start at line 2.
        let line = i + 2;
        let record =
            record.with_context(|| format!("Failed to read metadata row at line {}", line))?;
        let lineage = record.get(lineage_col).unwrap_or("");
        let (genus, species) = parse_lineage(lineage).ok_or_else(|| {
            PrepError::MalformedInput(format!(
                "metadata row {}: lineage {:?} has fewer than two ranks",
                line, lineage
            ))
        })?;
        let taxid = parse_taxid(record.get(taxid_col).unwrap_or(""), "metadata", line)?;
        let accession = accession_col
            .and_then(|c| record.get(c))
            .map(normalize_accession)
            .filter(|a| !a.is_empty());
        rows.push(MetadataRow {
            accession,
            genus,
            species,
            ncbi_species_taxid: taxid,
        });
    }
    Ok(rows)
}

/// Load the headerless two-column accession → taxid map.
pub fn load_taxid_map(path: &Path) -> Result<Vec<TaxidMapEntry>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open taxid map {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let accession = fields.next().unwrap_or("");
        let taxid = fields.next().ok_or_else(|| {
            PrepError::MalformedInput(format!(
                "taxid map line {}: expected two tab-separated columns",
                i + 1
            ))
        })?;
        entries.push(TaxidMapEntry {
            accession: normalize_accession(accession),
            taxid: parse_taxid(taxid, "taxid map", i + 1)?,
        });
    }
    Ok(entries)
}

/// Load the assembly summary: skip the leading comment line, strip the `#`
/// marker off the header names, and keep accession + taxid.
pub fn load_assembly_summary(path: &Path) -> Result<Vec<AssemblyRow>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open assembly summary {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut comment = String::new();
    reader
        .read_line(&mut comment)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(reader);
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read assembly summary header from {}", path.display()))?
        .clone();
    let accession_col = required_column(&headers, "assembly_accession", "assembly summary")?;
    let taxid_col = required_column(&headers, "taxid", "assembly summary")?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        // Comment is line 1, header line 2; data rows start at line 3.
        let line = i + 3;
        let record = record
            .with_context(|| format!("Failed to read assembly summary row at line {}", line))?;
        let accession = record.get(accession_col).unwrap_or("").trim();
        if accession.is_empty() {
            return Err(PrepError::MalformedInput(format!(
                "assembly summary row {}: empty assembly_accession",
                line
            ))
            .into());
        }
        rows.push(AssemblyRow {
            accession: accession.to_string(),
            taxid: parse_taxid(record.get(taxid_col).unwrap_or(""), "assembly summary", line)?,
        });
    }
    Ok(rows)
}
