//! Global Protein Alignment Module
//!
//! Needleman-Wunsch alignment with affine gaps (Gotoh) scored with BLOSUM62,
//! used to place hit proteins onto wild-type reference numbering for
//! mutation calling.
//!
//! # Scoring
//! - Substitutions: BLOSUM62
//! - Gap open: -10, gap extend: -0.5 (a gap of length k costs -10 - 0.5·(k-1))
//! - End gaps are penalised like internal gaps
//!
//! Scores are kept internally as integers at twice their value so the half
//! point extension penalty stays exact.

// ============================================================================
// BLOSUM62
// ============================================================================

/// Residue order of [`BLOSUM62`] (NCBI packed order).
const BLOSUM62_ORDER: &[u8; 25] = b"ARNDCQEGHILKMFPSTWYVBJZX*";

const BLOSUM62_SIZE: usize = 25;

/// Index of `X`, used for any residue outside the matrix alphabet.
const UNKNOWN_RESIDUE: usize = 23;

/// BLOSUM62 matrix in NCBI packed order: ARNDCQEGHILKMFPSTWYVBJZX*
#[rustfmt::skip]
static BLOSUM62: [i8; BLOSUM62_SIZE * BLOSUM62_SIZE] = [
    //       A,  R,  N,  D,  C,  Q,  E,  G,  H,  I,  L,  K,  M,  F,  P,  S,  T,  W,  Y,  V,  B,  J,  Z,  X,  *
    /*A*/    4, -1, -2, -2,  0, -1, -1,  0, -2, -1, -1, -1, -1, -2, -1,  1,  0, -3, -2,  0, -2, -1, -1, -1, -4,
    /*R*/   -1,  5,  0, -2, -3,  1,  0, -2,  0, -3, -2,  2, -1, -3, -2, -1, -1, -3, -2, -3, -1, -2,  0, -1, -4,
    /*N*/   -2,  0,  6,  1, -3,  0,  0,  0,  1, -3, -3,  0, -2, -3, -2,  1,  0, -4, -2, -3,  4, -3,  0, -1, -4,
    /*D*/   -2, -2,  1,  6, -3,  0,  2, -1, -1, -3, -4, -1, -3, -3, -1,  0, -1, -4, -3, -3,  4, -3,  1, -1, -4,
    /*C*/    0, -3, -3, -3,  9, -3, -4, -3, -3, -1, -1, -3, -1, -2, -3, -1, -1, -2, -2, -1, -3, -1, -3, -1, -4,
    /*Q*/   -1,  1,  0,  0, -3,  5,  2, -2,  0, -3, -2,  1,  0, -3, -1,  0, -1, -2, -1, -2,  0, -2,  4, -1, -4,
    /*E*/   -1,  0,  0,  2, -4,  2,  5, -2,  0, -3, -3,  1, -2, -3, -1,  0, -1, -3, -2, -2,  1, -3,  4, -1, -4,
    /*G*/    0, -2,  0, -1, -3, -2, -2,  6, -2, -4, -4, -2, -3, -3, -2,  0, -2, -2, -3, -3, -1, -4, -2, -1, -4,
    /*H*/   -2,  0,  1, -1, -3,  0,  0, -2,  8, -3, -3, -1, -2, -1, -2, -1, -2, -2,  2, -3,  0, -3,  0, -1, -4,
    /*I*/   -1, -3, -3, -3, -1, -3, -3, -4, -3,  4,  2, -3,  1,  0, -3, -2, -1, -3, -1,  3, -3,  3, -3, -1, -4,
    /*L*/   -1, -2, -3, -4, -1, -2, -3, -4, -3,  2,  4, -2,  2,  0, -3, -2, -1, -2, -1,  1, -4,  3, -3, -1, -4,
    /*K*/   -1,  2,  0, -1, -3,  1,  1, -2, -1, -3, -2,  5, -1, -3, -1,  0, -1, -3, -2, -2,  0, -3,  1, -1, -4,
    /*M*/   -1, -1, -2, -3, -1,  0, -2, -3, -2,  1,  2, -1,  5,  0, -2, -1, -1, -1, -1,  1, -3,  2, -1, -1, -4,
    /*F*/   -2, -3, -3, -3, -2, -3, -3, -3, -1,  0,  0, -3,  0,  6, -4, -2, -2,  1,  3, -1, -3,  0, -3, -1, -4,
    /*P*/   -1, -2, -2, -1, -3, -1, -1, -2, -2, -3, -3, -1, -2, -4,  7, -1, -1, -4, -3, -2, -2, -3, -1, -1, -4,
    /*S*/    1, -1,  1,  0, -1,  0,  0,  0, -1, -2, -2,  0, -1, -2, -1,  4,  1, -3, -2, -2,  0, -2,  0, -1, -4,
    /*T*/    0, -1,  0, -1, -1, -1, -1, -2, -2, -1, -1, -1, -1, -2, -1,  1,  5, -2, -2,  0, -1, -1, -1, -1, -4,
    /*W*/   -3, -3, -4, -4, -2, -2, -3, -2, -2, -3, -2, -3, -1,  1, -4, -3, -2, 11,  2, -3, -4, -2, -2, -1, -4,
    /*Y*/   -2, -2, -2, -3, -2, -1, -2, -3,  2, -1, -1, -2, -1,  3, -3, -2, -2,  2,  7, -1, -3, -1, -2, -1, -4,
    /*V*/    0, -3, -3, -3, -1, -2, -2, -3, -3,  3,  1, -2,  1, -1, -2, -2,  0, -3, -1,  4, -3,  2, -2, -1, -4,
    /*B*/   -2, -1,  4,  4, -3,  0,  1, -1,  0, -3, -4,  0, -3, -3, -2,  0, -1, -4, -3, -3,  4, -3,  0, -1, -4,
    /*J*/   -1, -2, -3, -3, -1, -2, -3, -4, -3,  3,  3, -3,  2,  0, -3, -2, -1, -2, -1,  2, -3,  3, -3, -1, -4,
    /*Z*/   -1,  0,  0,  1, -3,  4,  4, -2,  0, -3, -3,  1, -1, -3, -1,  0, -1, -2, -2, -2,  0, -3,  4, -1, -4,
    /*X*/   -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -4,
    /***/   -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4,  1,
];

fn residue_index(aa: u8) -> usize {
    let aa = aa.to_ascii_uppercase();
    BLOSUM62_ORDER
        .iter()
        .position(|&r| r == aa)
        .unwrap_or(UNKNOWN_RESIDUE)
}

/// BLOSUM62 score for two residues. Unknown residues score as `X`.
pub fn blosum62_score(a: u8, b: u8) -> i32 {
    BLOSUM62[residue_index(a) * BLOSUM62_SIZE + residue_index(b)] as i32
}

// ============================================================================
// Global Alignment
// ============================================================================

/// Scores at twice their nominal value.
const GAP_OPEN_X2: i32 = -20;
const GAP_EXTEND_X2: i32 = -1;
const NEG_INF: i32 = i32::MIN / 4;

/// A gapped global alignment of a query protein onto a reference protein.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAlignment {
    /// Reference row, `-` for gaps.
    pub reference: String,
    /// Query row, `-` for gaps.
    pub query: String,
    /// Alignment score.
    pub score: f64,
}

impl GlobalAlignment {
    /// Query residue aligned to each reference residue, indexed by
    /// reference position minus one. Deleted residues are `-`.
    pub fn bases_per_ref_pos(&self) -> Vec<char> {
        self.reference
            .chars()
            .zip(self.query.chars())
            .filter(|&(r, _)| r != '-')
            .map(|(_, q)| q)
            .collect()
    }

    /// Query residue at a 1-based reference position.
    pub fn residue_at(&self, ref_pos: usize) -> Option<char> {
        if ref_pos == 0 {
            return None;
        }
        self.bases_per_ref_pos().get(ref_pos - 1).copied()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Match,
    RefGap,
    QueryGap,
}

/// Aligns `query` onto `reference` end to end.
///
/// On score ties the traceback prefers a substitution over a gap.
///
/// # Examples
/// ```
/// use bactyper::pairwise::global_align;
///
/// let aln = global_align("MSDLAREITPV", "MSDLAREITPV");
/// assert_eq!(aln.query, "MSDLAREITPV");
/// assert_eq!(aln.residue_at(3), Some('D'));
/// ```
pub fn global_align(reference: &str, query: &str) -> GlobalAlignment {
    let r = reference.as_bytes();
    let q = query.as_bytes();
    let (n, m) = (r.len(), q.len());
    let width = m + 1;
    let idx = |i: usize, j: usize| i * width + j;

    // sub: residue pairs, del: reference residue against a gap, ins: query residue against a gap
    let mut sub = vec![NEG_INF; (n + 1) * width];
    let mut del = vec![NEG_INF; (n + 1) * width];
    let mut ins = vec![NEG_INF; (n + 1) * width];

    sub[idx(0, 0)] = 0;
    for i in 1..=n {
        del[idx(i, 0)] = GAP_OPEN_X2 + (i as i32 - 1) * GAP_EXTEND_X2;
    }
    for j in 1..=m {
        ins[idx(0, j)] = GAP_OPEN_X2 + (j as i32 - 1) * GAP_EXTEND_X2;
    }

    for i in 1..=n {
        for j in 1..=m {
            let diag = idx(i - 1, j - 1);
            let up = idx(i - 1, j);
            let left = idx(i, j - 1);
            let pair = 2 * blosum62_score(r[i - 1], q[j - 1]);

            sub[idx(i, j)] = pair + sub[diag].max(del[diag]).max(ins[diag]);
            del[idx(i, j)] = (sub[up] + GAP_OPEN_X2)
                .max(del[up] + GAP_EXTEND_X2)
                .max(ins[up] + GAP_OPEN_X2);
            ins[idx(i, j)] = (sub[left] + GAP_OPEN_X2)
                .max(ins[left] + GAP_EXTEND_X2)
                .max(del[left] + GAP_OPEN_X2);
        }
    }

    let best_state = |k: usize| -> (State, i32) {
        let mut best = (State::Match, sub[k]);
        if del[k] > best.1 {
            best = (State::RefGap, del[k]);
        }
        if ins[k] > best.1 {
            best = (State::QueryGap, ins[k]);
        }
        best
    };

    let (mut state, score) = best_state(idx(n, m));
    let mut ref_row: Vec<u8> = Vec::with_capacity(n + m);
    let mut query_row: Vec<u8> = Vec::with_capacity(n + m);
    let (mut i, mut j) = (n, m);

    while i > 0 || j > 0 {
        match state {
            State::Match => {
                let prev = idx(i - 1, j - 1);
                ref_row.push(r[i - 1]);
                query_row.push(q[j - 1]);
                state = best_state(prev).0;
                i -= 1;
                j -= 1;
            }
            State::RefGap => {
                let here = del[idx(i, j)];
                let prev = idx(i - 1, j);
                ref_row.push(r[i - 1]);
                query_row.push(b'-');
                state = if sub[prev] != NEG_INF && sub[prev] + GAP_OPEN_X2 == here {
                    State::Match
                } else if del[prev] != NEG_INF && del[prev] + GAP_EXTEND_X2 == here {
                    State::RefGap
                } else {
                    State::QueryGap
                };
                i -= 1;
            }
            State::QueryGap => {
                let here = ins[idx(i, j)];
                let prev = idx(i, j - 1);
                ref_row.push(b'-');
                query_row.push(q[j - 1]);
                state = if sub[prev] != NEG_INF && sub[prev] + GAP_OPEN_X2 == here {
                    State::Match
                } else if ins[prev] != NEG_INF && ins[prev] + GAP_EXTEND_X2 == here {
                    State::QueryGap
                } else {
                    State::RefGap
                };
                j -= 1;
            }
        }
    }

    ref_row.reverse();
    query_row.reverse();

    GlobalAlignment {
        reference: String::from_utf8_lossy(&ref_row).into_owned(),
        query: String::from_utf8_lossy(&query_row).into_owned(),
        score: score as f64 / 2.0,
    }
}

// ============================================================================
// Tests
// ============================================================================
