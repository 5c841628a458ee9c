//! Contig Statistics Module
//!
//! Basic assembly QC computed from the loaded contigs: contig count, N50,
//! largest contig, total size and ambiguous bases, plus warnings when these
//! fall outside the configured limits.

use crate::config::ContigQcThresholds;
use crate::seqio::Assembly;

/// Size and base composition summary of an assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContigStats {
    pub contig_count: usize,
    pub n50: usize,
    pub largest_contig: usize,
    pub total_size: usize,
    /// Bases other than A, C, G and T.
    pub ambiguous_bases: usize,
}

impl ContigStats {
    pub fn from_sequences<'a, I>(seqs: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut lengths = Vec::new();
        let mut ambiguous_bases = 0;
        for seq in seqs {
            lengths.push(seq.len());
            ambiguous_bases += seq
                .bytes()
                .filter(|b| !matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
                .count();
        }

        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let total_size = lengths.iter().sum();

        Self {
            contig_count: lengths.len(),
            n50: n50(&lengths, total_size),
            largest_contig: lengths.first().copied().unwrap_or(0),
            total_size,
            ambiguous_bases,
        }
    }

    pub fn from_assembly(assembly: &Assembly) -> Self {
        Self::from_sequences(assembly.contigs.values().map(String::as_str))
    }

    /// `no`, or `yes (<count>)` when the assembly has ambiguous bases.
    pub fn ambiguous_label(&self) -> String {
        if self.ambiguous_bases == 0 {
            "no".to_string()
        } else {
            format!("yes ({})", self.ambiguous_bases)
        }
    }

    /// QC problems in reporting order. Empty when the assembly passes.
    pub fn qc_warnings(&self, thresholds: &ContigQcThresholds) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if thresholds.min_genome_size.is_some_and(|min| self.total_size < min) {
            warnings.push("total_size below min threshold");
        } else if thresholds.max_genome_size.is_some_and(|max| self.total_size > max) {
            warnings.push("total_size above max threshold");
        }
        if self.n50 < thresholds.min_n50 {
            warnings.push("N50");
        }
        if self.ambiguous_bases > 0 {
            warnings.push("ambiguous_bases");
        }
        warnings
    }
}

/// Length of the contig at which the running total reaches half the assembly.
/// `lengths` must be sorted longest first.
fn n50(lengths: &[usize], total_size: usize) -> usize {
    let mut running = 0;
    for &length in lengths {
        running += length;
        if running * 2 >= total_size {
            return length;
        }
    }
    0
}
