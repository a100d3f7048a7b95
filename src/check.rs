//! Read-only leakage checks over the splitter's output files.
//!
//! `check-genus-leakage` verifies that no accession is claimed by more than
//! one genus in the mapping file; `check-species-leakage` verifies that the
//! query and reference lists share no species-level taxid. Both print a
//! PASS/FAIL summary to stdout and exit non-zero on FAIL.

use crate::mapping;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

const MAX_EXAMPLES: usize = 10;

#[derive(Args, Debug, Clone)]
pub struct GenusLeakageArgs {
    /// Genus mapping file (genus: acc1, acc2, ...)
    #[arg(long = "mapping_file", value_name = "FILE")]
    pub mapping_file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SpeciesLeakageArgs {
    /// Accession-to-taxid table (accession<TAB>taxid)
    #[arg(long = "mapping_file", value_name = "FILE")]
    pub mapping_file: PathBuf,

    /// Query accession list, one per line
    #[arg(long = "query_list", value_name = "FILE")]
    pub query_list: PathBuf,

    /// Reference accession list, one per line
    #[arg(long = "reference_list", value_name = "FILE")]
    pub reference_list: PathBuf,
}

/// Accessions that appear under more than one genus, with their genera.
/// BTreeMap keeps the report order stable.
pub fn find_multi_genus_accessions(
    groups: &[(String, Vec<String>)],
) -> BTreeMap<String, BTreeSet<String>> {
    let mut genera_by_accession: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (genus, accessions) in groups {
        for accession in accessions {
            genera_by_accession
                .entry(accession.clone())
                .or_default()
                .insert(genus.clone());
        }
    }
    genera_by_accession
        .into_iter()
        .filter(|(_, genera)| genera.len() > 1)
        .collect()
}

pub fn run_genus(args: GenusLeakageArgs) -> Result<()> {
    let groups = mapping::read_genus_mapping(&args.mapping_file)?;
    let total: usize = groups.iter().map(|(_, accessions)| accessions.len()).sum();
    let leaked = find_multi_genus_accessions(&groups);

    if leaked.is_empty() {
        println!(
            "PASS: every accession belongs to exactly one genus ({} assignments checked)",
            total
        );
        return Ok(());
    }

    println!(
        "FAIL: {} accessions are claimed by more than one genus",
        leaked.len()
    );
    for (accession, genera) in leaked.iter().take(MAX_EXAMPLES) {
        println!(
            "  {}: {}",
            accession,
            genera.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    Err(anyhow!("genus leakage detected"))
}

fn read_accession_list(path: &Path) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read accession list {}", path.display()))?;
    Ok(text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect())
}

/// Species taxids present on both sides. Accessions absent from the taxid
/// mapping never entered the taxid universe and are ignored.
pub fn find_species_overlap(
    taxids: &HashMap<String, u32>,
    query: &HashSet<String>,
    reference: &HashSet<String>,
) -> BTreeSet<u32> {
    let query_species: HashSet<u32> =
        query.iter().filter_map(|acc| taxids.get(acc)).copied().collect();
    reference
        .iter()
        .filter_map(|acc| taxids.get(acc))
        .copied()
        .filter(|taxid| query_species.contains(taxid))
        .collect()
}

pub fn run_species(args: SpeciesLeakageArgs) -> Result<()> {
    let taxids = mapping::read_taxid_tsv(&args.mapping_file)?;
    let query = read_accession_list(&args.query_list)?;
    let reference = read_accession_list(&args.reference_list)?;
    let overlap = find_species_overlap(&taxids, &query, &reference);

    if overlap.is_empty() {
        println!(
            "PASS: query and reference are fully separated at species level ({} query, {} reference accessions)",
            query.len(),
            reference.len()
        );
        return Ok(());
    }

    println!(
        "FAIL: query and reference share {} species-level taxids",
        overlap.len()
    );
    let examples: Vec<String> = overlap
        .iter()
        .take(MAX_EXAMPLES)
        .map(|t| t.to_string())
        .collect();
    println!("  examples: {}", examples.join(", "));
    Err(anyhow!("species leakage detected"))
}
