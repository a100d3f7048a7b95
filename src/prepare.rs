//! Accession selection pipeline (`prepare-accessions`).
//!
//! Merges three taxonomy sources into one per-accession table, removes
//! accessions with ambiguous genus assignment, samples one representative per
//! species, bounds each genus to a configured size range, and writes the
//! accession list plus the genus and taxid mapping files.
//!
//! ### Determinism
//! All sampling draws from a single `StdRng` seeded with `--seed` (default
//! 42), groups are visited in first-seen input order, and surviving rows keep
//! their input order. Identical inputs and seed produce byte-identical
//! outputs.
//!
//! ### Example
//! ```text
//! taxprep prepare-accessions --metadata bac120_metadata.tsv \
//!     --assembly_summary assembly_summary.txt --gtdb_taxid taxid.map \
//!     --output fasta/ --num_genus 50 --min_species_per_genus 5 \
//!     --max_species_per_genus 20
//! ```

use crate::error::PrepError;
use crate::mapping;
use crate::tables::{self, AssemblyRow, MetadataRow, TaxidMapEntry};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use log::{info, warn};
use rand::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    /// Taxonomy metadata table (TSV with gtdb_taxonomy and ncbi_species_taxid columns)
    #[arg(long = "metadata", value_name = "TSV")]
    pub metadata: PathBuf,

    /// Assembly summary table (TSV; first line is a comment, header names may carry a leading '#')
    #[arg(long = "assembly_summary", value_name = "TSV")]
    pub assembly_summary: PathBuf,

    /// Accession-to-taxid map (two tab-separated columns, no header)
    #[arg(long = "gtdb_taxid", value_name = "MAP")]
    pub gtdb_taxid: PathBuf,

    /// Output directory for the accession list and mapping files
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: PathBuf,

    /// Number of genera to keep; clamped to the eligible count with a warning
    #[arg(long = "num_genus", value_name = "INT")]
    pub num_genus: Option<usize>,

    /// Minimum species per genus; smaller genera are dropped whole
    #[arg(long = "min_species_per_genus", value_name = "INT", default_value_t = 5)]
    pub min_species_per_genus: usize,

    /// Maximum species per genus; larger genera are subsampled down
    #[arg(long = "max_species_per_genus", value_name = "INT", default_value_t = 20)]
    pub max_species_per_genus: usize,

    /// Grouping key for picking one representative per species
    #[arg(long = "species_grouping", value_enum, default_value = "species-only")]
    pub species_grouping: SpeciesGrouping,

    /// Output format of the taxid mapping artifact
    #[arg(long = "taxid_map_format", value_enum, default_value = "tsv")]
    pub taxid_map_format: TaxidMapFormat,

    /// RNG seed for reproducible sampling
    #[arg(long = "seed", value_name = "INT", default_value_t = 42)]
    pub seed: u64,
}

/// One row of the unified table; the unit every downstream stage filters.
#[derive(Debug, Clone)]
pub struct AccessionRecord {
    pub accession: String,
    pub genus: String,
    pub species: String,
    /// Curated taxid from the accession-to-taxid map.
    pub taxid: u32,
    pub ncbi_species_taxid: u32,
}

/// Key used by the species-level reduction. Source script variants disagreed
/// on whether the curated taxid participates; both behaviors are kept behind
/// this knob.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesGrouping {
    /// One representative per species label
    SpeciesOnly,
    /// One representative per (species label, curated taxid) pair
    SpeciesAndTaxid,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxidMapFormat {
    /// Flat assacc_to_taxid.tsv, one accession<TAB>taxid per line
    Tsv,
    /// Grouped taxid_fasta_mapping.txt, one taxid: acc1, acc2, ... per line
    Grouped,
}

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub min_species_per_genus: usize,
    pub max_species_per_genus: usize,
    pub num_genus: Option<usize>,
    pub species_grouping: SpeciesGrouping,
    pub seed: u64,
}

impl SampleConfig {
    pub fn validate(&self) -> Result<(), PrepError> {
        if self.min_species_per_genus == 0 {
            return Err(PrepError::Configuration(
                "--min_species_per_genus must be greater than 0".to_string(),
            ));
        }
        if self.min_species_per_genus > self.max_species_per_genus {
            return Err(PrepError::Configuration(format!(
                "--min_species_per_genus ({}) must be <= --max_species_per_genus ({})",
                self.min_species_per_genus, self.max_species_per_genus
            )));
        }
        if self.num_genus == Some(0) {
            return Err(PrepError::Configuration(
                "--num_genus must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inner-join the three sources into the unified per-accession table.
///
/// When every metadata row carries an accession, the join key is the
/// normalized accession string across all three tables. Without metadata
/// accessions, the metadata joins the assembly summary on the species taxid
/// first (several assemblies per species are expected and all kept), then
/// the taxid map joins on the assembly accession. Either way the curated
/// map taxid wins; the assembly summary's own taxid is dropped.
pub fn merge_tables(
    metadata: &[MetadataRow],
    taxid_map: &[TaxidMapEntry],
    assemblies: &[AssemblyRow],
) -> Vec<AccessionRecord> {
    let mut map_taxids: HashMap<&str, u32> = HashMap::new();
    for entry in taxid_map {
        map_taxids.entry(entry.accession.as_str()).or_insert(entry.taxid);
    }

    let mut merged = Vec::new();
    let accession_join = !metadata.is_empty() && metadata.iter().all(|m| m.accession.is_some());
    if accession_join {
        let known: HashSet<&str> = assemblies.iter().map(|a| a.accession.as_str()).collect();
        for row in metadata {
            let Some(accession) = row.accession.as_deref() else {
                continue;
            };
            if !known.contains(accession) {
                continue;
            }
            if let Some(&taxid) = map_taxids.get(accession) {
                merged.push(AccessionRecord {
                    accession: accession.to_string(),
                    genus: row.genus.clone(),
                    species: row.species.clone(),
                    taxid,
                    ncbi_species_taxid: row.ncbi_species_taxid,
                });
            }
        }
    } else {
        let mut by_taxid: HashMap<u32, Vec<&AssemblyRow>> = HashMap::new();
        for assembly in assemblies {
            by_taxid.entry(assembly.taxid).or_default().push(assembly);
        }
        for row in metadata {
            let Some(matches) = by_taxid.get(&row.ncbi_species_taxid) else {
                continue;
            };
            for assembly in matches {
                if let Some(&taxid) = map_taxids.get(assembly.accession.as_str()) {
                    merged.push(AccessionRecord {
                        accession: assembly.accession.clone(),
                        genus: row.genus.clone(),
                        species: row.species.clone(),
                        taxid,
                        ncbi_species_taxid: row.ncbi_species_taxid,
                    });
                }
            }
        }
    }
    merged
}

/// Remove every accession whose rows disagree on genus. Ambiguous identity
/// is a data-quality failure for that accession, never resolved by
/// preference. Returns the kept rows and the number of accessions removed.
pub fn drop_multi_genus_accessions(records: Vec<AccessionRecord>) -> (Vec<AccessionRecord>, usize) {
    let mut genus_sets: HashMap<&str, HashSet<&str>> = HashMap::new();
    for r in &records {
        genus_sets
            .entry(r.accession.as_str())
            .or_default()
            .insert(r.genus.as_str());
    }
    let ambiguous: HashSet<String> = genus_sets
        .iter()
        .filter(|(_, genera)| genera.len() > 1)
        .map(|(accession, _)| accession.to_string())
        .collect();
    let removed = ambiguous.len();
    let kept = records
        .into_iter()
        .filter(|r| !ambiguous.contains(&r.accession))
        .collect();
    (kept, removed)
}

/// Group row indices by key, groups ordered by first appearance. Group
/// iteration order feeds the RNG, so it must not depend on hash order.
fn group_indices_by<K, F>(records: &[AccessionRecord], key: F) -> Vec<(K, Vec<usize>)>
where
    K: Eq + Hash + Clone,
    F: Fn(&AccessionRecord) -> K,
{
    let mut order: Vec<K> = Vec::new();
    let mut groups: HashMap<K, Vec<usize>> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        let k = key(r);
        let entry = groups.entry(k.clone()).or_insert_with(|| {
            order.push(k);
            Vec::new()
        });
        entry.push(i);
    }
    order
        .into_iter()
        .map(|k| {
            let idxs = groups.remove(&k).unwrap_or_default();
            (k, idxs)
        })
        .collect()
}

fn filter_by_index(records: Vec<AccessionRecord>, keep: &HashSet<usize>) -> Vec<AccessionRecord> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, r)| keep.contains(&i).then_some(r))
        .collect()
}

fn pick_one_per_group<K, F>(
    records: &[AccessionRecord],
    key: F,
    rng: &mut StdRng,
) -> HashSet<usize>
where
    K: Eq + Hash + Clone,
    F: Fn(&AccessionRecord) -> K,
{
    group_indices_by(records, key)
        .iter()
        .map(|(_, idxs)| idxs[rng.gen_range(0..idxs.len())])
        .collect()
}

fn reduce_species(
    records: Vec<AccessionRecord>,
    grouping: SpeciesGrouping,
    rng: &mut StdRng,
) -> Vec<AccessionRecord> {
    let keep = match grouping {
        SpeciesGrouping::SpeciesOnly => pick_one_per_group(&records, |r| r.species.clone(), rng),
        SpeciesGrouping::SpeciesAndTaxid => {
            pick_one_per_group(&records, |r| (r.species.clone(), r.taxid), rng)
        }
    };
    filter_by_index(records, &keep)
}

fn apply_genus_floor(records: Vec<AccessionRecord>, min: usize) -> Vec<AccessionRecord> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in &records {
        *counts.entry(r.genus.as_str()).or_insert(0) += 1;
    }
    let valid: HashSet<String> = counts
        .iter()
        .filter(|(_, &count)| count >= min)
        .map(|(genus, _)| genus.to_string())
        .collect();
    records
        .into_iter()
        .filter(|r| valid.contains(&r.genus))
        .collect()
}

fn select_genera(
    records: Vec<AccessionRecord>,
    num_genus: Option<usize>,
    rng: &mut StdRng,
) -> Vec<AccessionRecord> {
    let Some(want) = num_genus else {
        return records;
    };
    let mut genera: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for r in &records {
        if seen.insert(r.genus.as_str()) {
            genera.push(r.genus.as_str());
        }
    }
    if want >= genera.len() {
        if want > genera.len() {
            warn!(
                "--num_genus {} exceeds the {} eligible genera; keeping all of them",
                want,
                genera.len()
            );
        }
        return records;
    }
    let chosen: HashSet<usize> = rand::seq::index::sample(rng, genera.len(), want)
        .into_vec()
        .into_iter()
        .collect();
    let selected: HashSet<String> = genera
        .iter()
        .enumerate()
        .filter(|(i, _)| chosen.contains(i))
        .map(|(_, g)| g.to_string())
        .collect();
    records
        .into_iter()
        .filter(|r| selected.contains(&r.genus))
        .collect()
}

fn apply_genus_cap(
    records: Vec<AccessionRecord>,
    max: usize,
    rng: &mut StdRng,
) -> Vec<AccessionRecord> {
    let groups = group_indices_by(&records, |r| r.genus.clone());
    let mut keep: HashSet<usize> = HashSet::new();
    for (_, idxs) in &groups {
        if idxs.len() > max {
            for j in rand::seq::index::sample(rng, idxs.len(), max).into_vec() {
                keep.insert(idxs[j]);
            }
        } else {
            keep.extend(idxs.iter().copied());
        }
    }
    filter_by_index(records, &keep)
}

/// Run the stratified sampler over the deduplicated table, in fixed stage
/// order: species reduction, genus floor, genus selection, genus cap.
pub fn sample_representatives(
    records: Vec<AccessionRecord>,
    cfg: &SampleConfig,
) -> Result<Vec<AccessionRecord>, PrepError> {
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let records = reduce_species(records, cfg.species_grouping, &mut rng);
    let records = apply_genus_floor(records, cfg.min_species_per_genus);
    let records = select_genera(records, cfg.num_genus, &mut rng);
    let records = apply_genus_cap(records, cfg.max_species_per_genus, &mut rng);
    Ok(records)
}

/// Genus → accessions in first-seen table order, accessions deduplicated
/// within each genus.
pub fn genus_groups(records: &[AccessionRecord]) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for r in records {
        if !seen.insert((r.genus.as_str(), r.accession.as_str())) {
            continue;
        }
        let entry = groups.entry(r.genus.clone()).or_insert_with(|| {
            order.push(r.genus.clone());
            Vec::new()
        });
        entry.push(r.accession.clone());
    }
    order
        .into_iter()
        .map(|g| {
            let accessions = groups.remove(&g).unwrap_or_default();
            (g, accessions)
        })
        .collect()
}

fn taxid_pairs(records: &[AccessionRecord]) -> Vec<(String, u32)> {
    let mut seen: HashSet<(&str, u32)> = HashSet::new();
    let mut pairs = Vec::new();
    for r in records {
        if seen.insert((r.accession.as_str(), r.taxid)) {
            pairs.push((r.accession.clone(), r.taxid));
        }
    }
    pairs
}

fn taxid_groups(records: &[AccessionRecord]) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<u32> = Vec::new();
    let mut groups: HashMap<u32, Vec<String>> = HashMap::new();
    let mut seen: HashSet<(u32, &str)> = HashSet::new();
    for r in records {
        if !seen.insert((r.taxid, r.accession.as_str())) {
            continue;
        }
        let entry = groups.entry(r.taxid).or_insert_with(|| {
            order.push(r.taxid);
            Vec::new()
        });
        entry.push(r.accession.clone());
    }
    order
        .into_iter()
        .map(|taxid| {
            let accessions = groups.remove(&taxid).unwrap_or_default();
            (taxid.to_string(), accessions)
        })
        .collect()
}

/// Write the three output artifacts, fully rewriting each file. The whole
/// table is already in memory, so nothing is written until every stage has
/// succeeded.
pub fn export_outputs(
    records: &[AccessionRecord],
    output_dir: &Path,
    format: TaxidMapFormat,
) -> Result<()> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory {}", output_dir.display())
    })?;

    let accession_path = output_dir.join("accessions.txt");
    let file = File::create(&accession_path)
        .with_context(|| format!("Failed to create {}", accession_path.display()))?;
    let mut w = BufWriter::new(file);
    let mut seen: HashSet<&str> = HashSet::new();
    for r in records {
        if seen.insert(r.accession.as_str()) {
            writeln!(w, "{}", r.accession)?;
        }
    }
    w.flush()?;
    info!("accession list saved to {}", accession_path.display());

    let genus_path = output_dir.join("genus_fasta_mapping.txt");
    mapping::write_genus_mapping(&genus_path, &genus_groups(records))?;
    info!("genus mapping saved to {}", genus_path.display());

    match format {
        TaxidMapFormat::Tsv => {
            let path = output_dir.join("assacc_to_taxid.tsv");
            mapping::write_taxid_tsv(&path, &taxid_pairs(records))?;
            info!("taxid mapping saved to {}", path.display());
        }
        TaxidMapFormat::Grouped => {
            let path = output_dir.join("taxid_fasta_mapping.txt");
            mapping::write_taxid_grouped(&path, &taxid_groups(records))?;
            info!("taxid mapping saved to {}", path.display());
        }
    }
    Ok(())
}

/// Execute the `prepare-accessions` subcommand end to end.
pub fn run(args: PrepareArgs) -> Result<()> {
    let cfg = SampleConfig {
        min_species_per_genus: args.min_species_per_genus,
        max_species_per_genus: args.max_species_per_genus,
        num_genus: args.num_genus,
        species_grouping: args.species_grouping,
        seed: args.seed,
    };
    cfg.validate()?;

    info!("loading input tables");
    let metadata = tables::load_metadata(&args.metadata)?;
    let taxid_map = tables::load_taxid_map(&args.gtdb_taxid)?;
    let assemblies = tables::load_assembly_summary(&args.assembly_summary)?;
    info!(
        "loaded {} metadata rows, {} taxid map entries, {} assembly rows",
        metadata.len(),
        taxid_map.len(),
        assemblies.len()
    );

    let merged = merge_tables(&metadata, &taxid_map, &assemblies);
    info!("after merging, {} records remain", merged.len());

    let (unique, removed) = drop_multi_genus_accessions(merged);
    info!("removed {} accessions with ambiguous genus assignment", removed);

    let sampled = sample_representatives(unique, &cfg)?;
    let genus_count = sampled
        .iter()
        .map(|r| r.genus.as_str())
        .collect::<HashSet<_>>()
        .len();
    info!(
        "after filtering, {} genera and {} records remain",
        genus_count,
        sampled.len()
    );
    if sampled.is_empty() {
        warn!("no records survived filtering; outputs will be empty");
    }

    export_outputs(&sampled, &args.output, args.taxid_map_format)?;
    Ok(())
}
