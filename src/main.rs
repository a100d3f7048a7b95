//! taxprep: benchmark dataset preparation CLI
//!
//! Subcommands:
//! - `prepare-accessions`: build a balanced accession list from taxonomy tables
//! - `split-query-reference`: partition each genus into query and reference sets
//! - `check-genus-leakage` / `check-species-leakage`: verify the partitions
//! - `shuffle-fasta` / `shuffle-paired-fasta`: permute read order
//! - `convert-mapping`: rewrite a grouped taxid mapping as a flat table

mod check;
mod convert;
mod error;
mod mapping;
mod prepare;
mod seqio;
mod shuffle;
mod split;
mod tables;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// taxprep CLI
#[derive(Parser, Debug)]
#[command(name = "taxprep")]
#[command(author, version, about = "Benchmark dataset preparation utilities in Rust", long_about = None)]
struct Cli {
    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge taxonomy tables and sample a balanced accession list
    PrepareAccessions(prepare::PrepareArgs),
    /// Split each genus's accessions into query and reference sets
    SplitQueryReference(split::SplitArgs),
    /// Verify that no accession is claimed by more than one genus
    CheckGenusLeakage(check::GenusLeakageArgs),
    /// Verify that query and reference share no species-level taxid
    CheckSpeciesLeakage(check::SpeciesLeakageArgs),
    /// Shuffle record order in a two-line FASTA
    ShuffleFasta(shuffle::ShuffleArgs),
    /// Shuffle two paired FASTA files with a single permutation
    ShufflePairedFasta(shuffle::ShufflePairedArgs),
    /// Convert a grouped taxid mapping into a flat accession-to-taxid table
    ConvertMapping(convert::ConvertArgs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Commands::PrepareAccessions(args) => prepare::run(args)?,
        Commands::SplitQueryReference(args) => split::run(args)?,
        Commands::CheckGenusLeakage(args) => check::run_genus(args)?,
        Commands::CheckSpeciesLeakage(args) => check::run_species(args)?,
        Commands::ShuffleFasta(args) => shuffle::run(args)?,
        Commands::ShufflePairedFasta(args) => shuffle::run_paired(args)?,
        Commands::ConvertMapping(args) => convert::run(args)?,
    }
    Ok(())
}
