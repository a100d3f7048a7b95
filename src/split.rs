//! Query/reference splitter (`split-query-reference`).
//!
//! Reads a genus mapping file and, for each genus, partitions its accessions
//! into a query set and a reference set. With `--emit fasta` the downloaded
//! per-accession FASTA files (`fasta_dir/<accession>/*.fna.gz`) are
//! decompressed and concatenated per side, streaming genus by genus with
//! append semantics; `query.list` and `reference.list` record the assignment
//! either way. Accessions whose FASTA is missing on disk are skipped with a
//! warning and counted, never fatal.
//!
//! ### Example
//! ```text
//! taxprep split-query-reference --mapping_file fasta/genus_fasta_mapping.txt \
//!     --fasta_dir downloads/ --output fasta/reads --query_fraction 0.2
//! ```

use crate::error::PrepError;
use crate::mapping;
use crate::seqio;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use log::{info, warn};
use rand::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    /// Genus mapping file (genus: acc1, acc2, ...)
    #[arg(long = "mapping_file", value_name = "FILE")]
    pub mapping_file: PathBuf,

    /// Directory holding one subdirectory per accession with its *.fna.gz
    #[arg(long = "fasta_dir", value_name = "DIR")]
    pub fasta_dir: PathBuf,

    /// Output directory for FASTA and list files
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: PathBuf,

    /// Fraction of each genus's accessions assigned to the query set
    #[arg(long = "query_fraction", value_name = "FLOAT", default_value_t = 0.2)]
    pub query_fraction: f64,

    /// What to write: concatenated FASTA files plus lists, or lists only
    #[arg(long = "emit", value_enum, default_value = "fasta")]
    pub emit: EmitFormat,

    /// Optional RNG seed for a reproducible partition
    #[arg(long = "seed", value_name = "INT")]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitFormat {
    /// query.fasta / reference.fasta / <genus>.fasta plus the list files
    Fasta,
    /// query.list / reference.list only; no FASTA content is read
    Lists,
}

/// Split one genus's accessions. Genera with more than four members send
/// `floor(fraction * n)` accessions (at least one) to the query side,
/// smaller genera exactly one.
pub fn partition_accessions(
    accessions: &[String],
    fraction: f64,
    rng: &mut StdRng,
) -> (Vec<String>, Vec<String>) {
    let n = accessions.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let num_query = if n > 4 {
        ((fraction * n as f64) as usize).clamp(1, n)
    } else {
        1
    };
    let chosen: HashSet<usize> = rand::seq::index::sample(rng, n, num_query)
        .into_vec()
        .into_iter()
        .collect();
    let mut query = Vec::new();
    let mut reference = Vec::new();
    for (i, accession) in accessions.iter().enumerate() {
        if chosen.contains(&i) {
            query.push(accession.clone());
        } else {
            reference.push(accession.clone());
        }
    }
    (query, reference)
}

fn write_list(path: &Path, accessions: &[String]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    for accession in accessions {
        writeln!(w, "{}", accession)?;
    }
    w.flush()?;
    Ok(())
}

/// Execute the `split-query-reference` subcommand.
pub fn run(args: SplitArgs) -> Result<()> {
    if !(args.query_fraction > 0.0 && args.query_fraction < 1.0) {
        return Err(PrepError::Configuration(format!(
            "--query_fraction must be strictly between 0 and 1, got {}",
            args.query_fraction
        ))
        .into());
    }

    let groups = mapping::read_genus_mapping(&args.mapping_file)?;
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;

    let mut rng: StdRng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_rng(thread_rng()).context("Failed to initialize RNG")?,
    };

    let mut query_list: Vec<String> = Vec::new();
    let mut reference_list: Vec<String> = Vec::new();
    let mut skipped = 0usize;

    match args.emit {
        EmitFormat::Lists => {
            for (_, accessions) in &groups {
                let (query, reference) =
                    partition_accessions(accessions, args.query_fraction, &mut rng);
                query_list.extend(query);
                reference_list.extend(reference);
            }
        }
        EmitFormat::Fasta => {
            let query_path = args.output.join("query.fasta");
            let reference_path = args.output.join("reference.fasta");
            let mut query_w = BufWriter::new(
                File::create(&query_path)
                    .with_context(|| format!("Failed to create {}", query_path.display()))?,
            );
            let mut reference_w = BufWriter::new(
                File::create(&reference_path)
                    .with_context(|| format!("Failed to create {}", reference_path.display()))?,
            );

            for (genus, accessions) in &groups {
                info!("processing genus {}", genus);
                let (query, reference) =
                    partition_accessions(accessions, args.query_fraction, &mut rng);
                let query_set: HashSet<&str> = query.iter().map(|s| s.as_str()).collect();

                let genus_path = args.output.join(format!("{}.fasta", genus));
                let mut genus_w = BufWriter::new(
                    File::create(&genus_path)
                        .with_context(|| format!("Failed to create {}", genus_path.display()))?,
                );

                for accession in accessions {
                    let Some(fasta) = seqio::find_accession_fasta(&args.fasta_dir, accession)
                    else {
                        warn!(
                            "no .fna.gz file found for {} under {}",
                            accession,
                            args.fasta_dir.join(accession).display()
                        );
                        skipped += 1;
                        continue;
                    };
                    let mut content = Vec::new();
                    seqio::copy_gz_contents(&fasta, &mut content)?;
                    if query_set.contains(accession.as_str()) {
                        query_w.write_all(&content)?;
                    } else {
                        reference_w.write_all(&content)?;
                    }
                    genus_w.write_all(&content)?;
                }
                genus_w.flush()?;
                query_list.extend(query);
                reference_list.extend(reference);
            }
            query_w.flush()?;
            reference_w.flush()?;
        }
    }

    write_list(&args.output.join("query.list"), &query_list)?;
    write_list(&args.output.join("reference.list"), &reference_list)?;

    info!(
        "assigned {} query and {} reference accessions across {} genera",
        query_list.len(),
        reference_list.len(),
        groups.len()
    );
    if skipped > 0 {
        warn!("skipped {} accessions with no FASTA file on disk", skipped);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    fn accs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn small_genera_get_exactly_one_query() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..=4 {
            let accessions: Vec<String> = (0..n).map(|i| format!("GCF_{}.1", i)).collect();
            let (query, reference) = partition_accessions(&accessions, 0.2, &mut rng);
            assert_eq!(query.len(), 1);
            assert_eq!(reference.len(), n - 1);
        }
    }

    #[test]
    fn large_genera_follow_the_fraction() {
        let mut rng = StdRng::seed_from_u64(7);
        let accessions: Vec<String> = (0..10).map(|i| format!("GCF_{}.1", i)).collect();
        let (query, reference) = partition_accessions(&accessions, 0.2, &mut rng);
        assert_eq!(query.len(), 2);
        assert_eq!(reference.len(), 8);

        // fraction rounding down to zero still yields one query
        let (query, _) = partition_accessions(&accessions, 0.05, &mut rng);
        assert_eq!(query.len(), 1);
    }

    #[test]
    fn partition_never_duplicates_or_drops() {
        let mut rng = StdRng::seed_from_u64(11);
        let accessions = accs(&["a", "b", "c", "d", "e", "f"]);
        let (query, reference) = partition_accessions(&accessions, 0.3, &mut rng);
        let mut combined = query.clone();
        combined.extend(reference.clone());
        combined.sort();
        let mut expected = accessions.clone();
        expected.sort();
        assert_eq!(combined, expected);
        let query_set: HashSet<&String> = query.iter().collect();
        assert!(reference.iter().all(|a| !query_set.contains(a)));
    }

    fn write_gz_fasta(dir: &Path, accession: &str, body: &str) {
        let acc_dir = dir.join(accession);
        fs::create_dir_all(&acc_dir).unwrap();
        let f = File::create(acc_dir.join(format!("{}_genomic.fna.gz", accession))).unwrap();
        let mut enc = GzEncoder::new(f, Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    fn split_args(dir: &Path, emit: EmitFormat) -> SplitArgs {
        SplitArgs {
            mapping_file: dir.join("genus_fasta_mapping.txt"),
            fasta_dir: dir.join("downloads"),
            output: dir.join("reads"),
            query_fraction: 0.2,
            emit,
            seed: Some(42),
        }
    }

    #[test]
    fn fasta_mode_partitions_each_genus() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("genus_fasta_mapping.txt"),
            "g__Alpha: GCF_1.1, GCF_2.1\ng__Beta: GCF_3.1, GCF_4.1\n",
        )
        .unwrap();
        let downloads = dir.path().join("downloads");
        write_gz_fasta(&downloads, "GCF_1.1", ">a1\nAAAA\n");
        write_gz_fasta(&downloads, "GCF_2.1", ">a2\nCCCC\n");
        write_gz_fasta(&downloads, "GCF_3.1", ">b1\nGGGG\n");
        write_gz_fasta(&downloads, "GCF_4.1", ">b2\nTTTT\n");

        run(split_args(dir.path(), EmitFormat::Fasta)).unwrap();

        let out = dir.path().join("reads");
        let query: Vec<String> = fs::read_to_string(out.join("query.list"))
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect();
        let reference: Vec<String> = fs::read_to_string(out.join("reference.list"))
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect();
        // one query per genus (both genera are at or below four accessions)
        assert_eq!(query.len(), 2);
        assert_eq!(reference.len(), 2);

        let query_fa = fs::read_to_string(out.join("query.fasta")).unwrap();
        let reference_fa = fs::read_to_string(out.join("reference.fasta")).unwrap();
        // four records total, no record on both sides
        assert_eq!(query_fa.matches('>').count(), 2);
        assert_eq!(reference_fa.matches('>').count(), 2);

        // per-genus files carry the whole genus
        let alpha = fs::read_to_string(out.join("g__Alpha.fasta")).unwrap();
        assert!(alpha.contains(">a1") && alpha.contains(">a2"));
    }

    #[test]
    fn missing_fasta_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("genus_fasta_mapping.txt"),
            "g__Alpha: GCF_1.1, GCF_2.1\n",
        )
        .unwrap();
        let downloads = dir.path().join("downloads");
        write_gz_fasta(&downloads, "GCF_1.1", ">a1\nAAAA\n");
        // GCF_2.1 never downloaded

        run(split_args(dir.path(), EmitFormat::Fasta)).unwrap();

        let out = dir.path().join("reads");
        // assignment still covers both accessions
        let assigned = fs::read_to_string(out.join("query.list")).unwrap()
            + &fs::read_to_string(out.join("reference.list")).unwrap();
        assert!(assigned.contains("GCF_1.1") && assigned.contains("GCF_2.1"));
        // but only the present one contributed sequence
        let total = fs::read_to_string(out.join("query.fasta")).unwrap()
            + &fs::read_to_string(out.join("reference.fasta")).unwrap();
        assert_eq!(total.matches('>').count(), 1);
    }

    #[test]
    fn lists_mode_touches_no_fasta() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("genus_fasta_mapping.txt"),
            "g__Alpha: GCF_1.1, GCF_2.1, GCF_3.1\n",
        )
        .unwrap();
        // no downloads directory at all

        run(split_args(dir.path(), EmitFormat::Lists)).unwrap();

        let out = dir.path().join("reads");
        assert!(out.join("query.list").exists());
        assert!(out.join("reference.list").exists());
        assert!(!out.join("query.fasta").exists());
        let query = fs::read_to_string(out.join("query.list")).unwrap();
        assert_eq!(query.lines().count(), 1);
    }

    #[test]
    fn split_lists_satisfy_the_species_checker() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("genus_fasta_mapping.txt"),
            "g__Alpha: GCF_1.1, GCF_2.1, GCF_3.1\ng__Beta: GCF_4.1, GCF_5.1\n",
        )
        .unwrap();
        run(split_args(dir.path(), EmitFormat::Lists)).unwrap();

        // one taxid per accession: a disjoint partition must pass the check
        let taxid_tsv = dir.path().join("assacc_to_taxid.tsv");
        std::fs::write(
            &taxid_tsv,
            "GCF_1.1\t9001\nGCF_2.1\t9002\nGCF_3.1\t9003\nGCF_4.1\t9004\nGCF_5.1\t9005\n",
        )
        .unwrap();
        let out = dir.path().join("reads");
        crate::check::run_species(crate::check::SpeciesLeakageArgs {
            mapping_file: taxid_tsv,
            query_list: out.join("query.list"),
            reference_list: out.join("reference.list"),
        })
        .unwrap();
    }

    #[test]
    fn out_of_range_fraction_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("genus_fasta_mapping.txt"), "g__A: GCF_1.1\n").unwrap();
        let mut args = split_args(dir.path(), EmitFormat::Lists);
        args.query_fraction = 1.0;
        let err = run(args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>().unwrap(),
            PrepError::Configuration(_)
        ));
    }
}
