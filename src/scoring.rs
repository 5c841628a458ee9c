//! Summary Score Module
//!
//! Derived columns computed from other modules' results: resistance class
//! and gene counts from the resistance columns, and a virulence score from
//! the yersiniabactin, colibactin and aerobactin sequence types.

use rustc_hash::FxHashSet;

use crate::modules::ModuleResults;

/// Value marking an empty result column.
const EMPTY: &str = "-";
/// Sequence type of an unresolved locus.
const ABSENT_ST: &str = "NA";

/// Mutation columns that count as a resistance class.
const COUNTED_MUTATION_COLUMNS: [&str; 2] = ["Col_mutations", "Flq_mutations"];

/// Number of distinct resistance classes with at least one call.
///
/// Counts non-empty `*_acquired` columns plus `Col_mutations` and
/// `Flq_mutations`. `Bla_chr` and the other chromosomal or mutation columns
/// are intrinsic and not counted.
pub fn resistance_class_count(results: &ModuleResults) -> usize {
    results
        .iter()
        .filter(|(column, value)| {
            *value != EMPTY
                && (column.to_lowercase().ends_with("_acquired")
                    || COUNTED_MUTATION_COLUMNS.contains(column))
        })
        .map(|(column, _)| column.replace("_acquired", "").replace("_mutations", ""))
        .collect::<FxHashSet<_>>()
        .len()
}

/// Number of acquired gene calls across all `*_acquired` columns.
pub fn resistance_gene_count(results: &ModuleResults) -> usize {
    results
        .iter()
        .filter(|(column, value)| *value != EMPTY && column.to_lowercase().ends_with("_acquired"))
        .map(|(_, value)| value.split(';').count())
        .sum()
}

/// Virulence score from three locus calls (`NA` means absent).
///
/// | Loci present                  | Score |
/// |-------------------------------|-------|
/// | colibactin and aerobactin     | 5     |
/// | aerobactin and yersiniabactin | 4     |
/// | aerobactin                    | 3     |
/// | colibactin                    | 2     |
/// | yersiniabactin                | 1     |
/// | none                          | 0     |
pub fn virulence_score(ybt_st: &str, clb_st: &str, iuc_st: &str) -> u8 {
    let ybt = ybt_st != ABSENT_ST;
    let clb = clb_st != ABSENT_ST;
    let iuc = iuc_st != ABSENT_ST;

    match (ybt, clb, iuc) {
        (_, true, true) => 5,
        (true, false, true) => 4,
        (false, false, true) => 3,
        (_, true, false) => 2,
        (true, false, false) => 1,
        (false, false, false) => 0,
    }
}
