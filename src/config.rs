//! Configuration Module
//!
//! Threshold sets for the typing modules and the aligner settings. Each set
//! has a `Default` carrying the standard values and a `validate()` that the
//! binary calls before any work starts.

use crate::error::TypingError;

// ============================================================================
// Resistance Thresholds
// ============================================================================

/// Identity and coverage cut-offs for the resistance gene pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResistanceThresholds {
    /// Minimum percent identity for a reported hit.
    pub min_identity: f64,
    /// Minimum percent coverage for a reported hit.
    pub min_coverage: f64,
    /// Minimum percent identity for a hit to be considered at all.
    pub min_spurious_identity: f64,
    /// Minimum percent coverage for a hit to be considered at all.
    pub min_spurious_coverage: f64,
}

impl Default for ResistanceThresholds {
    fn default() -> Self {
        Self {
            min_identity: 90.0,
            min_coverage: 80.0,
            min_spurious_identity: 80.0,
            min_spurious_coverage: 40.0,
        }
    }
}

impl ResistanceThresholds {
    /// Checks ranges and that spurious cut-offs do not exceed reporting cut-offs.
    pub fn validate(&self) -> Result<(), TypingError> {
        check_open(self.min_identity, 50.0, 100.0, "--min-identity", "(50, 100)")?;
        check_open(self.min_coverage, 50.0, 100.0, "--min-coverage", "(50, 100)")?;
        check_open(
            self.min_spurious_identity,
            50.0,
            100.0,
            "--min-spurious-identity",
            "(50, 100)",
        )?;
        check_open(
            self.min_spurious_coverage,
            30.0,
            100.0,
            "--min-spurious-coverage",
            "(30, 100)",
        )?;

        if self.min_spurious_identity > self.min_identity {
            return Err(TypingError::InvalidThreshold {
                option: "--min-spurious-identity",
                range: "at most --min-identity",
                value: self.min_spurious_identity,
            });
        }
        if self.min_spurious_coverage > self.min_coverage {
            return Err(TypingError::InvalidThreshold {
                option: "--min-spurious-coverage",
                range: "at most --min-coverage",
                value: self.min_spurious_coverage,
            });
        }
        Ok(())
    }
}

// ============================================================================
// MLST Thresholds
// ============================================================================

/// Cut-offs for an MLST scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlstThresholds {
    /// Minimum percent identity for an allele hit.
    pub min_identity: f64,
    /// Minimum percent query coverage for an allele hit.
    pub min_coverage: f64,
    /// Exact allele matches needed before a sequence type is called.
    pub required_exact_matches: usize,
}

impl Default for MlstThresholds {
    fn default() -> Self {
        Self {
            min_identity: 90.0,
            min_coverage: 80.0,
            required_exact_matches: 3,
        }
    }
}

impl MlstThresholds {
    /// Thresholds with a scheme-specific exact-match requirement.
    pub fn with_required_exact_matches(required_exact_matches: usize) -> Self {
        Self {
            required_exact_matches,
            ..Self::default()
        }
    }

    /// Checks ranges against the number of genes in the scheme.
    pub fn validate(&self, gene_count: usize) -> Result<(), TypingError> {
        check_half_open(self.min_identity, "--mlst-min-identity")?;
        check_half_open(self.min_coverage, "--mlst-min-coverage")?;
        if self.required_exact_matches > gene_count {
            return Err(TypingError::InvalidThreshold {
                option: "required exact matches",
                range: "0 to the scheme's gene count",
                value: self.required_exact_matches as f64,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Assembly QC
// ============================================================================

/// Limits behind the contig statistics QC warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContigQcThresholds {
    /// N50 below this is flagged.
    pub min_n50: usize,
    /// Expected genome size range; unset bounds are not checked.
    pub min_genome_size: Option<usize>,
    pub max_genome_size: Option<usize>,
}

impl Default for ContigQcThresholds {
    fn default() -> Self {
        Self {
            min_n50: 10_000,
            min_genome_size: None,
            max_genome_size: None,
        }
    }
}

impl ContigQcThresholds {
    /// Checks that the genome size range is not inverted.
    pub fn validate(&self) -> Result<(), TypingError> {
        match (self.min_genome_size, self.max_genome_size) {
            (Some(min), Some(max)) if min > max => Err(TypingError::InvalidThreshold {
                option: "--min-genome-size",
                range: "at most --max-genome-size",
                value: min as f64,
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Aligner
// ============================================================================

/// minimap2 settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignerConfig {
    /// Executable name or path.
    pub executable: String,
    /// Preset passed with `-x`.
    pub preset: String,
    /// Threads per alignment.
    pub threads: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            executable: "minimap2".to_string(),
            preset: "map-ont".to_string(),
            threads: 1,
        }
    }
}

fn check_open(
    value: f64,
    low: f64,
    high: f64,
    option: &'static str,
    range: &'static str,
) -> Result<(), TypingError> {
    if value > low && value < high {
        Ok(())
    } else {
        Err(TypingError::InvalidThreshold { option, range, value })
    }
}

fn check_half_open(value: f64, option: &'static str) -> Result<(), TypingError> {
    if value > 50.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(TypingError::InvalidThreshold {
            option,
            range: "(50, 100]",
            value,
        })
    }
}
