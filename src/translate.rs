//! Translation & Exact-Match Module
//!
//! Translates nucleotide hit regions with the bacterial genetic code
//! (NCBI translation table 11) and recovers exact protein matches for hits
//! that are not exact at the nucleotide level.
//!
//! # Translation Strategy
//! 1. Try a strict CDS translation: length divisible by three, a start codon
//!    (alternate starts such as GTG and TTG read as M), a terminal stop and
//!    no internal stops. On success the stop is appended as `*`.
//! 2. Otherwise trim to the nearest lower multiple of three and translate
//!    codon by codon, keeping internal stops.
//!
//! # Exact Protein Matching
//! A hit is an exact protein match to a reference when the reference protein
//! occurs inside the hit region translated in any of the three forward frames.

use rayon::prelude::*;
use thiserror::Error;

use crate::paf::{AlignmentHit, Strand};
use crate::seqio::{reverse_complement, FastaRecord, SequenceMap};

/// Largest query boundary gap that is recovered by extending the hit region.
pub const MAX_BOUNDARY_EXTENSION: usize = 10;

// ============================================================================
// Genetic Code (translation table 11)
// ============================================================================

/// Amino acids for codons in TCAG order (first base slowest).
const TABLE_11_AMINO_ACIDS: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

/// Start codons in TCAG order, `M` marks an initiator.
const TABLE_11_STARTS: &[u8; 64] =
    b"---M------**--*----M------------MMMM---------------M------------";

/// TCAG indices a nucleotide or IUPAC ambiguity code stands for.
fn base_indices(base: u8) -> &'static [usize] {
    match base.to_ascii_uppercase() {
        b'T' | b'U' => &[0],
        b'C' => &[1],
        b'A' => &[2],
        b'G' => &[3],
        b'Y' => &[0, 1],
        b'W' => &[0, 2],
        b'K' => &[0, 3],
        b'M' => &[1, 2],
        b'S' => &[1, 3],
        b'R' => &[2, 3],
        b'H' => &[0, 1, 2],
        b'B' => &[0, 1, 3],
        b'D' => &[0, 2, 3],
        b'V' => &[1, 2, 3],
        b'N' => &[0, 1, 2, 3],
        _ => &[],
    }
}

fn codon_index(codon: &[u8]) -> Option<usize> {
    let &[a, b, c] = codon else {
        return None;
    };
    match (base_indices(a), base_indices(b), base_indices(c)) {
        (&[x], &[y], &[z]) => Some(x * 16 + y * 4 + z),
        _ => None,
    }
}

/// Translates one codon.
///
/// Ambiguity codes resolve when every codon they expand to gives the same
/// residue (`GGN` is `G`, `TAR` is `*`). Anything else, including
/// incomplete codons, gives `X`.
pub fn translate_codon(codon: &[u8]) -> char {
    let &[a, b, c] = codon else {
        return 'X';
    };
    let mut residues = base_indices(a).iter().flat_map(|&x| {
        base_indices(b).iter().flat_map(move |&y| {
            base_indices(c)
                .iter()
                .map(move |&z| TABLE_11_AMINO_ACIDS[x * 16 + y * 4 + z])
        })
    });

    match residues.next() {
        Some(first) if residues.all(|aa| aa == first) => first as char,
        _ => 'X',
    }
}

/// True for the seven table-11 initiation codons.
pub fn is_start_codon(codon: &[u8]) -> bool {
    codon_index(codon).is_some_and(|i| TABLE_11_STARTS[i] == b'M')
}

/// True for TAA, TAG and TGA.
pub fn is_stop_codon(codon: &[u8]) -> bool {
    translate_codon(codon) == '*'
}

// ============================================================================
// Translation
// ============================================================================

/// Why a sequence is not a clean coding sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CdsError {
    #[error("sequence length {0} is not a multiple of three")]
    PartialCodon(usize),
    #[error("first codon '{0}' is not a start codon")]
    NoStart(String),
    #[error("final codon '{0}' is not a stop codon")]
    NoStop(String),
    #[error("internal stop codon at codon {0}")]
    InternalStop(usize),
}

/// Strict CDS translation. The initiator always reads as `M` and the
/// terminal stop is dropped.
pub fn translate_cds(seq: &str) -> Result<String, CdsError> {
    let bytes = seq.as_bytes();
    if bytes.len() % 3 != 0 || bytes.is_empty() {
        return Err(CdsError::PartialCodon(bytes.len()));
    }

    let codons: Vec<&[u8]> = bytes.chunks_exact(3).collect();
    let first = codons[0];
    if !is_start_codon(first) {
        return Err(CdsError::NoStart(String::from_utf8_lossy(first).into_owned()));
    }
    let last = codons[codons.len() - 1];
    if !is_stop_codon(last) {
        return Err(CdsError::NoStop(String::from_utf8_lossy(last).into_owned()));
    }

    let mut protein = String::with_capacity(codons.len());
    protein.push('M');
    for (i, codon) in codons[1..codons.len() - 1].iter().enumerate() {
        let aa = translate_codon(codon);
        if aa == '*' {
            return Err(CdsError::InternalStop(i + 1));
        }
        protein.push(aa);
    }
    Ok(protein)
}

/// Codon-by-codon translation of the longest whole-codon prefix.
pub fn translate_relaxed(seq: &str) -> String {
    seq.as_bytes().chunks_exact(3).map(translate_codon).collect()
}

/// Translates a hit region to protein: strict CDS translation with an
/// explicit `*` stop when possible, relaxed translation otherwise.
///
/// # Examples
/// ```
/// use bactyper::translate::translate_nucl_to_prot;
///
/// assert_eq!(translate_nucl_to_prot("GTGAAATAA"), "MK*");
/// assert_eq!(translate_nucl_to_prot("AAATAAGGGC"), "K*G");
/// ```
pub fn translate_nucl_to_prot(seq: &str) -> String {
    match translate_cds(seq) {
        Ok(mut protein) => {
            protein.push('*');
            protein
        }
        Err(_) => translate_relaxed(seq),
    }
}

/// Translation up to, not including, the first stop codon.
pub fn translate_to_stop(seq: &str) -> String {
    let protein = translate_nucl_to_prot(seq);
    match protein.find('*') {
        Some(stop) => protein[..stop].to_string(),
        None => protein,
    }
}

// ============================================================================
// Exact Protein Matching
// ============================================================================

/// A reference allele with its translated protein, built once per database.
#[derive(Debug, Clone)]
pub struct ReferenceProtein {
    /// Reference sequence identifier.
    pub name: String,
    /// Nucleotide length, used to prefer longer references.
    pub nucl_length: usize,
    /// Translation of the full reference sequence.
    pub protein: String,
}

impl ReferenceProtein {
    pub fn from_record(record: &FastaRecord) -> Self {
        Self {
            name: record.name.clone(),
            nucl_length: record.seq.len(),
            protein: translate_nucl_to_prot(&record.seq),
        }
    }
}

/// Translates all references of a catalog.
pub fn translate_references(records: &[FastaRecord]) -> Vec<ReferenceProtein> {
    records.par_iter().map(ReferenceProtein::from_record).collect()
}

/// True if the reference protein occurs in any forward frame of `gene_seq`.
pub fn is_exact_aa_match(gene_seq: &str, ref_protein: &str) -> bool {
    if ref_protein.is_empty() {
        return false;
    }
    (0..3).any(|frame| {
        gene_seq
            .get(frame..)
            .is_some_and(|framed| translate_nucl_to_prot(framed).contains(ref_protein))
    })
}

/// Hit region extended on the contig to cover the query bases the alignment
/// missed, in the query's orientation.
///
/// Returns `None` when nothing is missing, when either missing boundary is
/// longer than [`MAX_BOUNDARY_EXTENSION`], or when the contig is unknown.
pub fn augmented_region(hit: &AlignmentHit, contigs: &SequenceMap) -> Option<String> {
    let missing_start = hit.query_start;
    let missing_end = hit.query_length.saturating_sub(hit.query_end);
    if missing_start == 0 && missing_end == 0 {
        return None;
    }
    if missing_start > MAX_BOUNDARY_EXTENSION || missing_end > MAX_BOUNDARY_EXTENSION {
        return None;
    }

    let contig = contigs.get(&hit.target_name)?;
    let (extend_left, extend_right) = match hit.strand {
        Strand::Forward => (missing_start, missing_end),
        Strand::Reverse => (missing_end, missing_start),
    };
    let start = hit.target_start.saturating_sub(extend_left);
    let end = (hit.target_end + extend_right).min(contig.len());
    let region = contig.get(start..end)?;

    Some(match hit.strand {
        Strand::Forward => region.to_string(),
        Strand::Reverse => reverse_complement(region),
    })
}

/// Looks for a reference whose protein exactly matches the hit region.
///
/// Both the aligned region and its boundary-extended form are tested against
/// every reference. Among matches the longest reference wins, then the
/// alphabetically first name.
///
/// # Returns
/// The winning reference name, or `None` when no reference matches or the
/// hit has no attached target sequence.
pub fn find_exact_aa_match(
    hit: &AlignmentHit,
    contigs: &SequenceMap,
    references: &[ReferenceProtein],
) -> Option<String> {
    let gene_seq = hit.target_seq.as_deref()?;
    let augmented = augmented_region(hit, contigs);

    references
        .par_iter()
        .filter(|reference| {
            is_exact_aa_match(gene_seq, &reference.protein)
                || augmented
                    .as_deref()
                    .is_some_and(|seq| is_exact_aa_match(seq, &reference.protein))
        })
        .map(|reference| (reference.nucl_length, reference.name.as_str()))
        .reduce_with(|a, b| {
            if b.0 > a.0 || (b.0 == a.0 && b.1 < a.1) {
                b
            } else {
                a
            }
        })
        .map(|(_, name)| name.to_string())
}

/// One fixed codon per residue followed by `TAA`.
#[cfg(test)]
pub(crate) fn back_translate(protein: &str) -> String {
    let mut seq: String = protein
        .chars()
        .map(|aa| match aa {
            'A' => "GCT",
            'R' => "CGT",
            'N' => "AAT",
            'D' => "GAT",
            'C' => "TGT",
            'Q' => "CAA",
            'E' => "GAA",
            'G' => "GGT",
            'H' => "CAT",
            'I' => "ATT",
            'L' => "CTG",
            'K' => "AAA",
            'M' => "ATG",
            'F' => "TTT",
            'P' => "CCG",
            'S' => "TCT",
            'T' => "ACT",
            'W' => "TGG",
            'Y' => "TAT",
            'V' => "GTT",
            other => panic!("no codon for {other}"),
        })
        .collect();
    seq.push_str("TAA");
    seq
}

// ============================================================================
// Tests
// ============================================================================
