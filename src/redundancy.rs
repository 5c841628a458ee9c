//! Redundancy Resolution Module
//!
//! Paralogous reference alleles often align to the same assembly locus.
//! This module keeps the single best hit per locus so one gene copy never
//! produces several calls.
//!
//! # Algorithm
//! 1. Rank hits by identity × alignment score × query coverage, highest first,
//!    breaking ties by query name.
//! 2. Walk the ranking and accept a hit unless it overlaps an accepted hit on
//!    the same contig and strand by more than [`OVERLAP_TOLERANCE`] bases.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::paf::{AlignmentHit, Strand};

/// Overlap, in target bases, above which two hits describe the same locus.
pub const OVERLAP_TOLERANCE: usize = 50;

/// Combined ranking value. Hits without an `AS:i` tag score zero.
pub fn hit_quality(hit: &AlignmentHit) -> f64 {
    let score = hit.alignment_score.unwrap_or(0) as f64;
    hit.percent_identity() * score * hit.query_coverage()
}

/// Number of target bases shared by two hits' half-open target ranges.
pub fn target_overlap(a: &AlignmentHit, b: &AlignmentHit) -> usize {
    let start = a.target_start.max(b.target_start);
    let end = a.target_end.min(b.target_end);
    end.saturating_sub(start)
}

fn same_locus(a: &AlignmentHit, b: &AlignmentHit) -> bool {
    a.strand == b.strand
        && a.target_name == b.target_name
        && target_overlap(a, b) > OVERLAP_TOLERANCE
}

fn rank(a: &AlignmentHit, b: &AlignmentHit) -> Ordering {
    hit_quality(b)
        .total_cmp(&hit_quality(a))
        .then_with(|| a.query_name.cmp(&b.query_name))
}

/// Removes hits that share a locus with a better hit.
///
/// The returned hits are in ranking order, best first.
pub fn cull_redundant_hits(mut hits: Vec<AlignmentHit>) -> Vec<AlignmentHit> {
    hits.sort_by(rank);

    // Accepted hits grouped by (contig, strand) to keep comparisons local
    let mut accepted: FxHashMap<(String, Strand), Vec<usize>> = FxHashMap::default();
    let mut kept: Vec<AlignmentHit> = Vec::with_capacity(hits.len());

    for hit in hits {
        let key = (hit.target_name.clone(), hit.strand);
        let group = accepted.entry(key).or_default();
        if group.iter().any(|&i| same_locus(&kept[i], &hit)) {
            continue;
        }
        group.push(kept.len());
        kept.push(hit);
    }

    kept
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(name: &str, strand: char, contig: &str, start: usize, end: usize, matches: usize, score: i64) -> AlignmentHit {
        let len = end - start;
        AlignmentHit::parse_line(&format!(
            "{name}\t{len}\t0\t{len}\t{strand}\t{contig}\t100000\t{start}\t{end}\t{matches}\t{len}\t60\tAS:i:{score}"
        ))
        .unwrap()
    }

    #[test]
    fn test_overlap() {
        let a = hit("a", '+', "c1", 100, 200, 100, 200);
        let b = hit("b", '+', "c1", 150, 300, 150, 300);
        assert_eq!(target_overlap(&a, &b), 50);
        assert_eq!(target_overlap(&b, &a), 50);

        let c = hit("c", '+', "c1", 300, 400, 100, 200);
        assert_eq!(target_overlap(&a, &c), 0);
    }

    #[test]
    fn test_keeps_best_of_overlapping_hits() {
        let hits = vec![
            hit("blaSHV-11", '+', "c1", 1000, 1861, 850, 1600),
            hit("blaSHV-1", '+', "c1", 1000, 1861, 861, 1722),
            hit("blaTEM-1", '+', "c1", 5000, 5861, 861, 1722),
        ];
        let kept = cull_redundant_hits(hits);
        let names: Vec<&str> = kept.iter().map(|h| h.query_name.as_str()).collect();
        assert_eq!(names, vec!["blaSHV-1", "blaTEM-1"]);
    }

    #[test]
    fn test_tolerance_boundary() {
        // exactly 50 bases of overlap is not redundant
        let hits = vec![
            hit("a", '+', "c1", 0, 100, 100, 200),
            hit("b", '+', "c1", 50, 150, 90, 150),
        ];
        assert_eq!(cull_redundant_hits(hits).len(), 2);

        let hits = vec![
            hit("a", '+', "c1", 0, 100, 100, 200),
            hit("b", '+', "c1", 49, 150, 90, 150),
        ];
        assert_eq!(cull_redundant_hits(hits).len(), 1);
    }

    #[test]
    fn test_strand_and_contig_are_separate_loci() {
        let hits = vec![
            hit("a", '+', "c1", 0, 500, 500, 1000),
            hit("b", '-', "c1", 0, 500, 500, 1000),
            hit("c", '+', "c2", 0, 500, 500, 1000),
        ];
        assert_eq!(cull_redundant_hits(hits).len(), 3);
    }

    #[test]
    fn test_ties_break_alphabetically() {
        let hits = vec![
            hit("geneB", '+', "c1", 0, 500, 500, 1000),
            hit("geneA", '+', "c1", 0, 500, 500, 1000),
        ];
        let kept = cull_redundant_hits(hits);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].query_name, "geneA");
    }

    #[test]
    fn test_survivor_is_never_dominated() {
        let hits = vec![
            hit("low", '+', "c1", 0, 400, 300, 500),
            hit("mid", '+', "c1", 100, 500, 380, 700),
            hit("high", '+', "c1", 200, 600, 400, 800),
        ];
        let originals = hits.clone();
        let kept = cull_redundant_hits(hits);
        for survivor in &kept {
            for other in &originals {
                if other.query_name != survivor.query_name && same_locus(survivor, other) {
                    assert!(hit_quality(survivor) >= hit_quality(other));
                }
            }
        }
        assert_eq!(kept[0].query_name, "high");
    }

    #[test]
    fn test_missing_score_ranks_last() {
        let mut unscored = hit("a", '+', "c1", 0, 500, 500, 0);
        unscored.alignment_score = None;
        let hits = vec![unscored, hit("b", '+', "c1", 0, 500, 450, 10)];
        let kept = cull_redundant_hits(hits);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].query_name, "b");
    }
}
