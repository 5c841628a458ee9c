//! Marker Mutation Module
//!
//! Chromosomal resistance that comes from point mutations or loss of
//! function rather than acquired genes:
//!
//! - **QRDR**: quinolone resistance determining region substitutions in
//!   GyrA and ParC (`Flq_mutations`)
//! - **Colistin**: truncated MgrB or PmrB (`Col_mutations`)
//! - **Porins**: truncated OmpK35/OmpK36 and the OmpK36 loop 3 insertions
//!   (`Omp_mutations`)
//!
//! The scans work on hits that already carry their target sequence
//! (see [`AlignmentHit::with_sequences`]).

use crate::error::TypingError;
use crate::paf::AlignmentHit;
use crate::pairwise::global_align;
use crate::truncation::{truncation_check, FULL_LENGTH_COVERAGE};

// ============================================================================
// QRDR
// ============================================================================

/// GyrA region used as the alignment reference.
pub const GYRA_REFERENCE: &str = "MSDLAREITPVNIEEELKNSYLDYAMSVIVGRALPDVRDGLKPVHRRVLYAMNVLGNDWN\
KAYKKSARVVGDVIGKYHPHGDSAVYDTIVRMAQPFSLRYMLVDGQGNFGSIDGDSAAAM";

/// ParC region used as the alignment reference.
pub const PARC_REFERENCE: &str = "MSDMAERLALHEFTENAYLNYSMYVIMDRALPFIGDGLKPVQRRIVYAMSELGLNASAKF\
KKSARTVGDVLGKYHPHGDSACYEAMVLMAQPFSYRYPLVDGQGNWGAPDDPKSFAAMRY";

/// Wild-type residues at the resistance positions.
const GYRA_SITES: [(usize, char); 2] = [(83, 'S'), (87, 'D')];
const PARC_SITES: [(usize, char); 2] = [(80, 'S'), (84, 'E')];

/// Reports QRDR substitutions such as `GyrA-83I` or `ParC-80I`.
///
/// Only hits whose translation is full length (coverage strictly above
/// [`FULL_LENGTH_COVERAGE`]) are aligned. Gaps at a site are not reported.
pub fn check_qrdr_mutations(hits: &[AlignmentHit]) -> Result<Vec<String>, TypingError> {
    let mut snps = Vec::new();

    for hit in hits {
        let (reference, sites) = match hit.query_name.as_str() {
            "GyrA" => (GYRA_REFERENCE, &GYRA_SITES),
            "ParC" => (PARC_REFERENCE, &PARC_SITES),
            other => {
                return Err(TypingError::UnexpectedQuery {
                    scan: "QRDR",
                    query: other.to_string(),
                })
            }
        };

        let truncation = truncation_check(hit);
        if truncation.coverage <= FULL_LENGTH_COVERAGE {
            continue;
        }

        let alignment = global_align(reference, &truncation.translation);
        for &(pos, wild_type) in sites {
            match alignment.residue_at(pos) {
                Some(residue) if residue != wild_type && residue != '-' && residue != '.' => {
                    snps.push(format!("{}-{}{}", hit.query_name, pos, residue));
                }
                _ => {}
            }
        }
    }

    Ok(snps)
}

// ============================================================================
// Colistin
// ============================================================================

/// Best truncation coverage seen for a marker gene.
#[derive(Debug, Default, Clone, Copy)]
struct BestCoverage {
    seen: bool,
    coverage: f64,
}

impl BestCoverage {
    fn update(&mut self, coverage: f64) {
        self.seen = true;
        if coverage > self.coverage {
            self.coverage = coverage;
        }
    }

    fn truncated(&self) -> bool {
        self.seen && self.coverage < FULL_LENGTH_COVERAGE
    }
}

fn truncation_label(gene: &str, coverage: f64) -> String {
    format!("{}-{:.0}%", gene, coverage)
}

/// Reports truncated MgrB/PmrB as `MgrB-NN%` / `PmrB-NN%`.
///
/// A gene is only reported when its best hit translated partially: a best
/// coverage of zero means the hit did not start at the gene start and is
/// not treated as evidence of truncation.
pub fn check_col_mutations(hits: &[AlignmentHit]) -> Result<Vec<String>, TypingError> {
    let mut mgrb = BestCoverage::default();
    let mut pmrb = BestCoverage::default();

    for hit in hits {
        let coverage = truncation_check(hit).coverage;
        match hit.query_name.as_str() {
            "mgrB" => mgrb.update(coverage),
            "pmrB" => pmrb.update(coverage),
            other => {
                return Err(TypingError::UnexpectedQuery {
                    scan: "colistin",
                    query: other.to_string(),
                })
            }
        }
    }

    let mut truncations = Vec::new();
    if mgrb.coverage > 0.0 && mgrb.truncated() {
        truncations.push(truncation_label("MgrB", mgrb.coverage));
    }
    if pmrb.coverage > 0.0 && pmrb.truncated() {
        truncations.push(truncation_label("PmrB", pmrb.coverage));
    }
    Ok(truncations)
}

// ============================================================================
// Porins
// ============================================================================

/// Loop 3 motifs of OmpK36 carrying the GD and TD insertions.
const OMPK36_GD_MOTIF: &str = "GDGDTY";
const OMPK36_TD_MOTIF: &str = "GDTDTY";

/// Reports OmpK36 loop insertions and truncated OmpK35/OmpK36.
///
/// Insertions are called from full-length OmpK36 hits. A porin that was hit
/// but never full length is reported as truncated, including `-0%`.
pub fn check_omp_mutations(hits: &[AlignmentHit]) -> Result<Vec<String>, TypingError> {
    let mut ompk35 = BestCoverage::default();
    let mut ompk36 = BestCoverage::default();
    let mut mutations = Vec::new();

    for hit in hits {
        let truncation = truncation_check(hit);
        match hit.query_name.as_str() {
            "OmpK35" => ompk35.update(truncation.coverage),
            "OmpK36" => {
                ompk36.update(truncation.coverage);
                if truncation.coverage >= FULL_LENGTH_COVERAGE {
                    if truncation.translation.contains(OMPK36_GD_MOTIF) {
                        mutations.push("OmpK36GD".to_string());
                    } else if truncation.translation.contains(OMPK36_TD_MOTIF) {
                        mutations.push("OmpK36TD".to_string());
                    }
                }
            }
            other => {
                return Err(TypingError::UnexpectedQuery {
                    scan: "porin",
                    query: other.to_string(),
                })
            }
        }
    }

    if ompk35.truncated() {
        mutations.push(truncation_label("OmpK35", ompk35.coverage));
    }
    if ompk36.truncated() {
        mutations.push(truncation_label("OmpK36", ompk36.coverage));
    }
    Ok(mutations)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::back_translate;

    fn hit(name: &str, query_length: usize, query_start: usize, seq: &str) -> AlignmentHit {
        let line = format!(
            "{name}\t{query_length}\t{query_start}\t{query_length}\t+\tcontig_1\t100000\t1000\t{end}\t{len}\t{len}\t60\tAS:i:{score}",
            end = 1000 + seq.len(),
            len = seq.len(),
            score = 2 * seq.len()
        );
        let mut hit = AlignmentHit::parse_line(&line).unwrap();
        hit.target_seq = Some(seq.to_string());
        hit
    }

    fn with_residue(protein: &str, pos: usize, residue: char) -> String {
        protein
            .chars()
            .enumerate()
            .map(|(i, c)| if i + 1 == pos { residue } else { c })
            .collect()
    }

    #[test]
    fn test_qrdr_wild_type() {
        let seq = back_translate(GYRA_REFERENCE);
        let hits = vec![hit("GyrA", seq.len(), 0, &seq)];
        assert!(check_qrdr_mutations(&hits).unwrap().is_empty());
    }

    #[test]
    fn test_qrdr_substitutions() {
        let gyra = with_residue(GYRA_REFERENCE, 83, 'I');
        let gyra = back_translate(&gyra);
        let parc = with_residue(PARC_REFERENCE, 84, 'K');
        let parc = back_translate(&parc);
        let hits = vec![
            hit("GyrA", gyra.len(), 0, &gyra),
            hit("ParC", parc.len(), 0, &parc),
        ];
        assert_eq!(check_qrdr_mutations(&hits).unwrap(), vec!["GyrA-83I", "ParC-84K"]);
    }

    #[test]
    fn test_qrdr_skips_partial_translation() {
        let seq = back_translate(&with_residue(GYRA_REFERENCE, 83, 'I'));
        // hit region ends early: no stop, fewer residues than 90% of the reference
        let partial = &seq[..150];
        let hits = vec![hit("GyrA", seq.len(), 0, partial)];
        assert!(check_qrdr_mutations(&hits).unwrap().is_empty());
    }

    #[test]
    fn test_qrdr_unexpected_query() {
        let seq = back_translate(GYRA_REFERENCE);
        let err = check_qrdr_mutations(&[hit("GyrB", seq.len(), 0, &seq)]).unwrap_err();
        assert!(matches!(err, TypingError::UnexpectedQuery { scan: "QRDR", .. }));
    }

    #[test]
    fn test_col_truncations() {
        // 20 codons + stop, truncated after 10
        let full = back_translate(&format!("M{}", "A".repeat(19)));
        let truncated = format!("{}TAA{}", &full[..30], &full[33..]);
        let hits = vec![
            hit("mgrB", full.len(), 0, &truncated),
            hit("pmrB", full.len(), 0, &full),
        ];
        assert_eq!(check_col_mutations(&hits).unwrap(), vec!["MgrB-50%"]);
    }

    #[test]
    fn test_col_zero_coverage_not_reported() {
        let full = back_translate(&format!("M{}", "A".repeat(19)));
        let hits = vec![hit("mgrB", full.len(), 3, &full[3..])];
        assert!(check_col_mutations(&hits).unwrap().is_empty());

        let err = check_col_mutations(&[hit("phoQ", full.len(), 0, &full)]).unwrap_err();
        assert!(matches!(err, TypingError::UnexpectedQuery { .. }));
    }

    #[test]
    fn test_col_best_hit_wins() {
        let full = back_translate(&format!("M{}", "A".repeat(19)));
        let truncated = format!("{}TAA{}", &full[..30], &full[33..]);
        let hits = vec![
            hit("mgrB", full.len(), 0, &truncated),
            hit("mgrB", full.len(), 0, &full),
        ];
        assert!(check_col_mutations(&hits).unwrap().is_empty());
    }

    #[test]
    fn test_omp_insertions() {
        let gd = back_translate(&format!("M{}GDGDTY{}", "A".repeat(20), "A".repeat(20)));
        let td = back_translate(&format!("M{}GDTDTY{}", "A".repeat(20), "A".repeat(20)));
        assert_eq!(
            check_omp_mutations(&[hit("OmpK36", gd.len(), 0, &gd)]).unwrap(),
            vec!["OmpK36GD"]
        );
        assert_eq!(
            check_omp_mutations(&[hit("OmpK36", td.len(), 0, &td)]).unwrap(),
            vec!["OmpK36TD"]
        );
    }

    #[test]
    fn test_omp_truncations() {
        let full = back_translate(&format!("M{}", "A".repeat(19)));
        let truncated = format!("{}TAA{}", &full[..30], &full[33..]);
        let hits = vec![
            hit("OmpK35", full.len(), 0, &truncated),
            hit("OmpK36", full.len(), 3, &full[3..]),
        ];
        assert_eq!(
            check_omp_mutations(&hits).unwrap(),
            vec!["OmpK35-50%", "OmpK36-0%"]
        );

        let hits = vec![hit("OmpK35", full.len(), 0, &full)];
        assert!(check_omp_mutations(&hits).unwrap().is_empty());
        assert!(check_omp_mutations(&[]).unwrap().is_empty());
    }
}
