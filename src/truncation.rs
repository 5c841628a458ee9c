//! Truncation Analysis Module
//!
//! Measures how much of a full-length reference CDS survives, at the amino
//! acid level, in the assembly region a hit aligned to. The reference is
//! assumed to end with a stop codon; the assembly region may not.

use crate::paf::AlignmentHit;
use crate::translate::translate_to_stop;

/// Amino-acid coverage at or above which a gene is reported as full length.
pub const FULL_LENGTH_COVERAGE: f64 = 90.0;

/// Outcome of a truncation check.
#[derive(Debug, Clone, PartialEq)]
pub struct Truncation {
    /// Label suffix, e.g. `-60%`. Empty for a full-length gene.
    pub suffix: String,
    /// Amino-acid coverage of the reference, in percent.
    pub coverage: f64,
    /// Translation of the hit region up to the first stop.
    pub translation: String,
}

impl Truncation {
    pub fn is_truncated(&self) -> bool {
        self.coverage < FULL_LENGTH_COVERAGE
    }
}

/// Checks whether a hit's gene is truncated at the amino-acid level.
///
/// A hit that does not start at the first base of the reference is treated
/// as an absent gene (`-0%`, coverage 0). Otherwise the translated target
/// region is compared with the reference length minus its stop codon.
///
/// # Examples
/// ```
/// use bactyper::paf::AlignmentHit;
/// use bactyper::truncation::truncation_check;
///
/// let hit = AlignmentHit::parse_line("g\t30\t5\t30\t+\tc\t100\t0\t25\t25\t25").unwrap();
/// let result = truncation_check(&hit);
/// assert_eq!(result.suffix, "-0%");
/// assert_eq!(result.coverage, 0.0);
/// ```
pub fn truncation_check(hit: &AlignmentHit) -> Truncation {
    if hit.query_start != 0 {
        return Truncation {
            suffix: "-0%".to_string(),
            coverage: 0.0,
            translation: String::new(),
        };
    }

    let expected_aa = hit.query_length.saturating_sub(3) / 3;
    let translation = hit
        .target_seq
        .as_deref()
        .map(translate_to_stop)
        .unwrap_or_default();
    let coverage = if expected_aa == 0 {
        0.0
    } else {
        100.0 * translation.chars().count() as f64 / expected_aa as f64
    };

    let suffix = if coverage >= FULL_LENGTH_COVERAGE {
        String::new()
    } else {
        format!("-{:.0}%", coverage)
    };

    Truncation {
        suffix,
        coverage,
        translation,
    }
}
