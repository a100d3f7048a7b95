use thiserror::Error;

/// Fatal error classes shared by the pipeline commands.
///
/// Anything that would make a command write wrong or partial output is fatal
/// and raised before the first byte hits disk. Missing per-accession FASTA
/// files during the split stage are deliberately NOT here: those are skipped
/// with a warning and counted.
#[derive(Error, Debug)]
pub enum PrepError {
    /// An input table or FASTA file violates its expected shape.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A command-line configuration that can never produce valid output.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}
