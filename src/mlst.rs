//! MLST Resolution Module
//!
//! Resolves a sequence type from per-gene allele alignments and a profile
//! table. Works for any scheme: seven-gene chromosomal MLST as well as
//! virulence-locus schemes such as yersiniabactin or colibactin typing.
//!
//! # Algorithm
//! 1. Per gene, keep hits meeting the identity and coverage cut-offs, then
//!    those tied for best identity, then those tied for best alignment score.
//! 2. Score each profile by how many genes have a best hit with the
//!    profile's allele number. The first profile with the highest score wins.
//! 3. Pick one hit per gene, preferring the profile's allele, else the
//!    lowest allele number.
//! 4. Count exact full-length hits agreeing with the profile. Too few gives
//!    `NA`, all genes gives `ST<n>`, otherwise `ST<n>-<k>LV`.
//!
//! # Profile Table
//! ```text
//! ST    gapA  infB  mdh  pgi  phoE  rpoB  tonB  clonal_complex
//! 1     4     4     1    1    7     4     10    CC1
//! ```

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::aligner::Aligner;
use crate::config::MlstThresholds;
use crate::error::TypingError;
use crate::paf::AlignmentHit;
use crate::seqio::Assembly;

// ============================================================================
// Profiles
// ============================================================================

/// One sequence type and its allele numbers in scheme gene order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlstProfile {
    pub st: u64,
    pub alleles: Vec<u64>,
    /// Value of the extra descriptive column, if the scheme has one.
    pub extra: Option<String>,
}

/// A scheme's profile table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTable {
    /// Gene names in column order.
    pub gene_names: Vec<String>,
    /// Name of the extra descriptive column, e.g. `clonal_complex`.
    pub extra_column: Option<String>,
    pub profiles: Vec<MlstProfile>,
}

impl ProfileTable {
    /// Parses a tab-separated profile table.
    ///
    /// The first line is the header (`ST` then gene names). When
    /// `extra_column` names a header column, that column is kept as text
    /// instead of being treated as a gene.
    pub fn parse<R: BufRead>(reader: R, extra_column: Option<&str>) -> Result<Self, TypingError> {
        let mut lines = reader.lines().enumerate();

        let header = match lines.next() {
            Some((_, Ok(line))) => line,
            _ => {
                return Err(TypingError::MalformedTable {
                    line: 1,
                    reason: "missing profile header".to_string(),
                })
            }
        };
        let columns: Vec<&str> = header.trim_end().split('\t').collect();
        let extra_index = match extra_column {
            Some(name) => Some(columns.iter().position(|c| *c == name).ok_or_else(|| {
                TypingError::MalformedTable {
                    line: 1,
                    reason: format!("profile header has no '{name}' column"),
                }
            })?),
            None => None,
        };
        let gene_columns: Vec<usize> = (1..columns.len()).filter(|i| Some(*i) != extra_index).collect();
        let gene_names = gene_columns.iter().map(|&i| columns[i].to_string()).collect();

        let mut profiles = Vec::new();
        for (i, line) in lines {
            let line_no = i + 1;
            let line = line.map_err(|e| TypingError::MalformedTable {
                line: line_no,
                reason: e.to_string(),
            })?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() != columns.len() {
                return Err(TypingError::MalformedTable {
                    line: line_no,
                    reason: format!("expected {} columns, found {}", columns.len(), parts.len()),
                });
            }

            let number = |value: &str| {
                value.parse::<u64>().map_err(|_| TypingError::MalformedTable {
                    line: line_no,
                    reason: format!("'{value}' is not an allele or ST number"),
                })
            };
            profiles.push(MlstProfile {
                st: number(parts[0])?,
                alleles: gene_columns.iter().map(|&c| number(parts[c])).collect::<Result<_, _>>()?,
                extra: extra_index.map(|c| parts[c].to_string()),
            });
        }

        Ok(Self {
            gene_names,
            extra_column: extra_column.map(str::to_string),
            profiles,
        })
    }

    /// Loads a profile table from disk.
    pub fn load<P: AsRef<Path>>(path: P, extra_column: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open profile table: {}", path.display()))?;
        Self::parse(BufReader::new(file), extra_column)
            .with_context(|| format!("Invalid profile table: {}", path.display()))
    }
}

// ============================================================================
// Calling
// ============================================================================

/// Result of typing one assembly against one scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlstCall {
    /// `ST<n>`, `ST<n>-<k>LV` or `NA`.
    pub st: String,
    /// Extra column of the best profile (`NA` with no ST, `-` with no profile).
    pub extra: Option<String>,
    /// Per-gene allele labels in scheme order: `-`, `<n>` or `<n>*`.
    pub alleles: Vec<(String, String)>,
}

/// Allele number from an allele name: its digits, or 0 when there are none.
///
/// `gapA_12` gives 12. Numbers too large for a `u64` saturate at `u64::MAX`.
pub fn allele_number(name: &str) -> u64 {
    name.chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |n, d| n.saturating_mul(10).saturating_add(u64::from(d)))
}

fn hit_number(hit: &AlignmentHit) -> u64 {
    allele_number(&hit.query_name)
}

/// Hits passing the cut-offs that tie for best identity, then best score.
pub fn best_hits<'a>(hits: &'a [AlignmentHit], thresholds: &MlstThresholds) -> Vec<&'a AlignmentHit> {
    let passing: Vec<&AlignmentHit> = hits
        .iter()
        .filter(|h| {
            h.percent_identity() >= thresholds.min_identity
                && h.query_coverage() >= thresholds.min_coverage
        })
        .collect();

    let best_identity = passing
        .iter()
        .map(|h| h.percent_identity())
        .fold(f64::NEG_INFINITY, f64::max);
    let by_identity: Vec<&AlignmentHit> = passing
        .into_iter()
        .filter(|h| h.percent_identity() == best_identity)
        .collect();

    let best_score = by_identity
        .iter()
        .map(|h| h.alignment_score.unwrap_or(0))
        .max()
        .unwrap_or(0);
    by_identity
        .into_iter()
        .filter(|h| h.alignment_score.unwrap_or(0) == best_score)
        .collect()
}

/// The first profile with the most genes agreeing with a best hit.
///
/// Returns `None` when no profile agrees on any gene.
pub fn best_matching_profile<'a>(
    table: &'a ProfileTable,
    best_hits_per_gene: &[Vec<&AlignmentHit>],
) -> Option<&'a MlstProfile> {
    let mut best: Option<&MlstProfile> = None;
    let mut best_matches = 0;

    for profile in &table.profiles {
        let matches = profile
            .alleles
            .iter()
            .zip(best_hits_per_gene)
            .filter(|(allele, hits)| hits.iter().any(|h| hit_number(h) == **allele))
            .count();
        if matches > best_matches {
            best = Some(profile);
            best_matches = matches;
        }
    }
    best
}

fn choose_hit<'a>(hits: &[&'a AlignmentHit], st_allele: u64) -> Option<&'a AlignmentHit> {
    hits.iter()
        .find(|h| hit_number(h) == st_allele)
        .or_else(|| hits.iter().min_by_key(|h| hit_number(h)))
        .copied()
}

/// Calls the sequence type from each gene's alignment hits.
///
/// # Arguments
/// * `table` - The scheme's profile table
/// * `hits_per_gene` - All hits for each gene, in `table.gene_names` order
/// * `thresholds` - Hit cut-offs and the exact-match requirement
pub fn call_mlst(
    table: &ProfileTable,
    hits_per_gene: &[Vec<AlignmentHit>],
    thresholds: &MlstThresholds,
) -> MlstCall {
    let best_per_gene: Vec<Vec<&AlignmentHit>> = table
        .gene_names
        .iter()
        .enumerate()
        .map(|(i, _)| {
            hits_per_gene
                .get(i)
                .map(|hits| best_hits(hits, thresholds))
                .unwrap_or_default()
        })
        .collect();

    let profile = best_matching_profile(table, &best_per_gene);
    let st = profile.map(|p| p.st).unwrap_or(0);

    let mut exact_matches = 0;
    let mut lv_count = 0;
    let mut alleles = Vec::with_capacity(table.gene_names.len());

    for (i, gene) in table.gene_names.iter().enumerate() {
        let st_allele = profile.map(|p| p.alleles[i]).unwrap_or(0);
        let hit = choose_hit(&best_per_gene[i], st_allele);
        let number = hit.map(hit_number).unwrap_or(0);

        let label = match hit {
            None => "-".to_string(),
            Some(h) if h.is_exact() => number.to_string(),
            Some(_) => format!("{number}*"),
        };
        alleles.push((gene.clone(), label));

        if hit.is_some_and(AlignmentHit::is_exact) && number == st_allele {
            exact_matches += 1;
        } else {
            lv_count += 1;
        }
    }

    let resolved = exact_matches >= thresholds.required_exact_matches;
    let st_label = if !resolved {
        "NA".to_string()
    } else if lv_count == 0 {
        format!("ST{st}")
    } else {
        format!("ST{st}-{lv_count}LV")
    };

    let extra = table.extra_column.as_ref().map(|_| {
        if !resolved {
            "NA".to_string()
        } else {
            profile
                .and_then(|p| p.extra.clone())
                .unwrap_or_else(|| "-".to_string())
        }
    });

    MlstCall {
        st: st_label,
        extra,
        alleles,
    }
}

// ============================================================================
// Scheme
// ============================================================================

/// An MLST scheme on disk: `profiles.tsv` plus one `<gene>.fasta` per gene.
#[derive(Debug, Clone)]
pub struct MlstScheme {
    /// Scheme name, used as the module name.
    pub name: String,
    pub table: ProfileTable,
    /// Allele FASTA per gene, in `table.gene_names` order.
    pub allele_paths: Vec<PathBuf>,
    pub thresholds: MlstThresholds,
}

impl MlstScheme {
    /// Loads a scheme directory.
    pub fn load(
        name: &str,
        dir: &Path,
        extra_column: Option<&str>,
        thresholds: MlstThresholds,
    ) -> Result<Self> {
        let table = ProfileTable::load(dir.join("profiles.tsv"), extra_column)?;
        let allele_paths: Vec<PathBuf> = table
            .gene_names
            .iter()
            .map(|gene| dir.join(format!("{gene}.fasta")))
            .collect();
        if let Some(missing) = allele_paths.iter().find(|p| !p.is_file()) {
            anyhow::bail!("Allele file not found for scheme {}: {}", name, missing.display());
        }
        thresholds.validate(table.gene_names.len())?;

        Ok(Self {
            name: name.to_string(),
            table,
            allele_paths,
            thresholds,
        })
    }

    /// Output columns: `st`, the extra column if any, then one per gene.
    pub fn headers(&self) -> Vec<String> {
        std::iter::once("st".to_string())
            .chain(self.table.extra_column.clone())
            .chain(self.table.gene_names.iter().cloned())
            .collect()
    }

    /// Aligns every gene's alleles against the assembly and calls the ST.
    pub fn genotype(&self, assembly: &Assembly, aligner: &dyn Aligner) -> Result<MlstCall> {
        let hits_per_gene = self
            .allele_paths
            .iter()
            .map(|path| aligner.align(path, &assembly.path))
            .collect::<Result<Vec<_>>>()?;

        let call = call_mlst(&self.table, &hits_per_gene, &self.thresholds);
        debug!("{} {}: {}", self.name, assembly.name, call.st);
        Ok(call)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PROFILES: &str = "ST\tgapA\tinfB\tmdh\tclonal_complex\n\
                            1\t1\t1\t1\tCC1\n\
                            2\t1\t2\t2\tCC2\n\
                            3\t3\t3\t3\tCC3\n";

    fn table() -> ProfileTable {
        ProfileTable::parse(Cursor::new(PROFILES), Some("clonal_complex")).unwrap()
    }

    fn exact(name: &str) -> AlignmentHit {
        AlignmentHit::parse_line(&format!(
            "{name}\t450\t0\t450\t+\tcontig_1\t5000\t100\t550\t450\t450\t60\tAS:i:900"
        ))
        .unwrap()
    }

    fn inexact(name: &str, matches: usize, score: i64) -> AlignmentHit {
        AlignmentHit::parse_line(&format!(
            "{name}\t450\t0\t450\t+\tcontig_1\t5000\t100\t550\t{matches}\t450\t60\tAS:i:{score}"
        ))
        .unwrap()
    }

    fn thresholds(required: usize) -> MlstThresholds {
        MlstThresholds::with_required_exact_matches(required)
    }

    #[test]
    fn test_parse_profiles() {
        let table = table();
        assert_eq!(table.gene_names, vec!["gapA", "infB", "mdh"]);
        assert_eq!(table.profiles.len(), 3);
        assert_eq!(table.profiles[1].alleles, vec![1, 2, 2]);
        assert_eq!(table.profiles[1].extra.as_deref(), Some("CC2"));

        let plain = ProfileTable::parse(Cursor::new("ST\ta\tb\n7\t1\t2\n"), None).unwrap();
        assert_eq!(plain.gene_names, vec!["a", "b"]);
        assert_eq!(plain.profiles[0].extra, None);
    }

    #[test]
    fn test_parse_profiles_errors() {
        assert!(ProfileTable::parse(Cursor::new("ST\ta\n1\tx\n"), None).is_err());
        assert!(ProfileTable::parse(Cursor::new("ST\ta\tb\n1\t2\n"), None).is_err());
        assert!(ProfileTable::parse(Cursor::new("ST\ta\n"), Some("lineage")).is_err());
        assert!(ProfileTable::parse(Cursor::new(""), None).is_err());
    }

    #[test]
    fn test_allele_number() {
        assert_eq!(allele_number("gapA_12"), 12);
        assert_eq!(allele_number("rpoB_4"), 4);
        assert_eq!(allele_number("novel"), 0);
        assert_eq!(allele_number("gapA_007"), 7);
        assert_eq!(allele_number("gapA_123456789012345678901234"), u64::MAX);
    }

    #[test]
    fn test_best_hits_ties() {
        let hits = vec![
            inexact("gapA_1", 440, 850),
            inexact("gapA_2", 445, 860),
            inexact("gapA_3", 445, 860),
            inexact("gapA_4", 445, 855),
            inexact("gapA_5", 300, 500),
        ];
        let best: Vec<&str> = best_hits(&hits, &thresholds(3))
            .iter()
            .map(|h| h.query_name.as_str())
            .collect();
        assert_eq!(best, vec!["gapA_2", "gapA_3"]);
        assert!(best_hits(&[], &thresholds(3)).is_empty());
    }

    #[test]
    fn test_exact_st() {
        let hits = vec![vec![exact("gapA_1")], vec![exact("infB_2")], vec![exact("mdh_2")]];
        let call = call_mlst(&table(), &hits, &thresholds(3));
        assert_eq!(call.st, "ST2");
        assert_eq!(call.extra.as_deref(), Some("CC2"));
        assert_eq!(
            call.alleles,
            vec![
                ("gapA".to_string(), "1".to_string()),
                ("infB".to_string(), "2".to_string()),
                ("mdh".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_locus_variant() {
        let hits = vec![
            vec![exact("gapA_1")],
            vec![exact("infB_2")],
            vec![inexact("mdh_2", 449, 890)],
        ];
        let call = call_mlst(&table(), &hits, &thresholds(2));
        assert_eq!(call.st, "ST2-1LV");
        assert_eq!(call.alleles[2].1, "2*");

        let hits = vec![vec![exact("gapA_1")], vec![exact("infB_2")], vec![]];
        let call = call_mlst(&table(), &hits, &thresholds(2));
        assert_eq!(call.st, "ST2-1LV");
        assert_eq!(call.alleles[2].1, "-");
    }

    #[test]
    fn test_too_few_exact_matches_is_na() {
        let hits = vec![vec![exact("gapA_1")], vec![exact("infB_2")], vec![]];
        let call = call_mlst(&table(), &hits, &thresholds(3));
        assert_eq!(call.st, "NA");
        assert_eq!(call.extra.as_deref(), Some("NA"));
    }

    #[test]
    fn test_tied_hits_prefer_profile_allele() {
        // gapA tie between 3 and 1; profile ST3 agrees on every gene via allele 3
        let hits = vec![
            vec![exact("gapA_1"), exact("gapA_3")],
            vec![exact("infB_3")],
            vec![exact("mdh_3")],
        ];
        let call = call_mlst(&table(), &hits, &thresholds(3));
        assert_eq!(call.st, "ST3");
        assert_eq!(call.alleles[0].1, "3");
    }

    #[test]
    fn test_no_matching_profile_uses_lowest_allele() {
        let hits = vec![
            vec![exact("gapA_9"), exact("gapA_8")],
            vec![exact("infB_9")],
            vec![exact("mdh_9")],
        ];
        let call = call_mlst(&table(), &hits, &thresholds(0));
        assert_eq!(call.st, "ST0-3LV");
        assert_eq!(call.extra.as_deref(), Some("-"));
        assert_eq!(call.alleles[0].1, "8");
    }

    #[test]
    fn test_first_profile_wins_ties() {
        let hits = vec![vec![exact("gapA_1")], vec![], vec![]];
        let call = call_mlst(&table(), &hits, &thresholds(1));
        assert_eq!(call.st, "ST1-2LV");
    }

    #[test]
    fn test_scheme_headers() {
        let scheme = MlstScheme {
            name: "mlst".to_string(),
            allele_paths: Vec::new(),
            table: table(),
            thresholds: thresholds(3),
        };
        assert_eq!(scheme.headers(), vec!["st", "clonal_complex", "gapA", "infB", "mdh"]);

        let plain = MlstScheme {
            table: ProfileTable::parse(Cursor::new("ST\ta\tb\n7\t1\t2\n"), None).unwrap(),
            ..scheme
        };
        assert_eq!(plain.headers(), vec!["st", "a", "b"]);
        let call = call_mlst(&plain.table, &[vec![exact("a_1")], vec![exact("b_2")]], &thresholds(2));
        assert_eq!(call.st, "ST7");
        assert_eq!(call.extra, None);
    }
}
