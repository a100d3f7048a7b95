//! Read-order shufflers (`shuffle-fasta`, `shuffle-paired-fasta`).
//!
//! Operates on strict two-line-per-record FASTA (header line + single
//! sequence line; wrapped FASTA is rejected). The single-file variant
//! permutes record order; the paired variant applies one permutation to both
//! mate files so pairs stay aligned. Unseeded by default; pass `--seed` for
//! a reproducible permutation.

use crate::error::PrepError;
use crate::seqio::{self, ReadRecord};
use anyhow::{Context, Result};
use clap::Args;
use log::info;
use rand::prelude::*;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ShuffleArgs {
    /// Input two-line FASTA
    #[arg(long = "query", value_name = "FASTA")]
    pub query: PathBuf,

    /// Output FASTA with shuffled record order
    #[arg(long = "shuffled_query", value_name = "FASTA")]
    pub shuffled_query: PathBuf,

    /// Optional RNG seed for a reproducible permutation
    #[arg(long = "seed", value_name = "INT")]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ShufflePairedArgs {
    /// Left mate two-line FASTA
    #[arg(long = "query_l", value_name = "FASTA")]
    pub query_l: PathBuf,

    /// Right mate two-line FASTA
    #[arg(long = "query_r", value_name = "FASTA")]
    pub query_r: PathBuf,

    /// Output path for the shuffled left mates
    #[arg(long = "shuffled_query_l", value_name = "FASTA")]
    pub shuffled_query_l: PathBuf,

    /// Output path for the shuffled right mates
    #[arg(long = "shuffled_query_r", value_name = "FASTA")]
    pub shuffled_query_r: PathBuf,

    /// Optional RNG seed for a reproducible permutation
    #[arg(long = "seed", value_name = "INT")]
    pub seed: Option<u64>,
}

fn make_rng(seed: Option<u64>) -> Result<StdRng> {
    match seed {
        Some(s) => Ok(StdRng::seed_from_u64(s)),
        None => StdRng::from_rng(thread_rng()).context("Failed to initialize RNG"),
    }
}

/// Execute the `shuffle-fasta` subcommand.
pub fn run(args: ShuffleArgs) -> Result<()> {
    let mut records = seqio::read_two_line_fasta(&args.query)?;
    let mut rng = make_rng(args.seed)?;
    records.shuffle(&mut rng);
    seqio::write_two_line_fasta(&args.shuffled_query, &records)?;
    info!(
        "shuffled {} records into {}",
        records.len(),
        args.shuffled_query.display()
    );
    Ok(())
}

/// Execute the `shuffle-paired-fasta` subcommand. Both mates are read and
/// validated before any output file is created.
pub fn run_paired(args: ShufflePairedArgs) -> Result<()> {
    let left = seqio::read_two_line_fasta(&args.query_l)?;
    let right = seqio::read_two_line_fasta(&args.query_r)?;
    if left.len() != right.len() {
        return Err(PrepError::MalformedInput(format!(
            "paired inputs differ in record count: {} in {} vs {} in {}",
            left.len(),
            args.query_l.display(),
            right.len(),
            args.query_r.display()
        ))
        .into());
    }

    let mut pairs: Vec<(ReadRecord, ReadRecord)> = left.into_iter().zip(right).collect();
    let mut rng = make_rng(args.seed)?;
    pairs.shuffle(&mut rng);
    let (left, right): (Vec<ReadRecord>, Vec<ReadRecord>) = pairs.into_iter().unzip();

    seqio::write_two_line_fasta(&args.shuffled_query_l, &left)?;
    seqio::write_two_line_fasta(&args.shuffled_query_r, &right)?;
    info!("shuffled {} read pairs", left.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_reads(path: &Path, n: usize, tag: &str) {
        let mut text = String::new();
        for i in 0..n {
            text.push_str(&format!(">{}_{}\nACGT{}\n", tag, i, "A".repeat(i)));
        }
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn shuffle_preserves_records() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("query.fasta");
        let output = dir.path().join("shuffled_query.fasta");
        write_reads(&input, 8, "read");

        run(ShuffleArgs {
            query: input.clone(),
            shuffled_query: output.clone(),
            seed: Some(3),
        })
        .unwrap();

        let mut before = seqio::read_two_line_fasta(&input).unwrap();
        let mut after = seqio::read_two_line_fasta(&output).unwrap();
        assert_eq!(before.len(), after.len());
        before.sort_by(|a, b| a.header.cmp(&b.header));
        after.sort_by(|a, b| a.header.cmp(&b.header));
        assert_eq!(before, after);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("query.fasta");
        write_reads(&input, 12, "read");
        let out1 = dir.path().join("s1.fasta");
        let out2 = dir.path().join("s2.fasta");

        for out in [&out1, &out2] {
            run(ShuffleArgs {
                query: input.clone(),
                shuffled_query: out.clone(),
                seed: Some(99),
            })
            .unwrap();
        }
        assert_eq!(
            std::fs::read(&out1).unwrap(),
            std::fs::read(&out2).unwrap()
        );
    }

    #[test]
    fn paired_shuffle_keeps_mates_aligned() {
        let dir = tempdir().unwrap();
        let left = dir.path().join("query_l.fasta");
        let right = dir.path().join("query_r.fasta");
        write_reads(&left, 6, "pair");
        write_reads(&right, 6, "pair");
        let out_l = dir.path().join("shuffled_l.fasta");
        let out_r = dir.path().join("shuffled_r.fasta");

        run_paired(ShufflePairedArgs {
            query_l: left,
            query_r: right,
            shuffled_query_l: out_l.clone(),
            shuffled_query_r: out_r.clone(),
            seed: Some(5),
        })
        .unwrap();

        let shuffled_l = seqio::read_two_line_fasta(&out_l).unwrap();
        let shuffled_r = seqio::read_two_line_fasta(&out_r).unwrap();
        assert_eq!(shuffled_l.len(), 6);
        // the same permutation was applied to both sides
        for (l, r) in shuffled_l.iter().zip(&shuffled_r) {
            assert_eq!(l.header, r.header);
        }
    }

    #[test]
    fn mismatched_pair_lengths_fail_before_writing() {
        let dir = tempdir().unwrap();
        let left = dir.path().join("query_l.fasta");
        let right = dir.path().join("query_r.fasta");
        write_reads(&left, 4, "pair");
        write_reads(&right, 3, "pair");
        let out_l = dir.path().join("shuffled_l.fasta");
        let out_r = dir.path().join("shuffled_r.fasta");

        let err = run_paired(ShufflePairedArgs {
            query_l: left,
            query_r: right,
            shuffled_query_l: out_l.clone(),
            shuffled_query_r: out_r.clone(),
            seed: Some(5),
        })
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>().unwrap(),
            PrepError::MalformedInput(_)
        ));
        assert!(!out_l.exists());
        assert!(!out_r.exists());
    }
}
