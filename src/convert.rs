use crate::mapping;
use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

/// Convert a grouped `taxid: acc1, acc2, ...` mapping into the flat
/// `accession<TAB>taxid` table the species-leakage check consumes.
#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Grouped taxid mapping (taxid: acc1, acc2, ...)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Output accession-to-taxid table (accession<TAB>taxid)
    #[arg(short = 'o', long = "output", value_name = "TSV")]
    pub output: PathBuf,
}

pub fn run(args: ConvertArgs) -> Result<()> {
    let groups = mapping::read_taxid_grouped(&args.input)?;

    let mut lines = String::new();
    let mut count = 0usize;
    for (taxid, accessions) in &groups {
        for accession in accessions {
            lines.push_str(accession);
            lines.push('\t');
            lines.push_str(taxid);
            lines.push('\n');
            count += 1;
        }
    }
    std::fs::write(&args.output, lines)?;
    info!(
        "converted {} accessions into {}",
        count,
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn flattens_grouped_mapping_in_order() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("taxid_fasta_mapping.txt");
        std::fs::write(&input, "9001: GCF_1.1, GCF_2.1\n9002: GCF_3.1\n").unwrap();
        let output = dir.path().join("assacc_to_taxid.tsv");

        run(ConvertArgs {
            input,
            output: output.clone(),
        })
        .unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text, "GCF_1.1\t9001\nGCF_2.1\t9001\nGCF_3.1\t9002\n");

        let map = mapping::read_taxid_tsv(&output).unwrap();
        assert_eq!(map["GCF_2.1"], 9001);
    }
}
