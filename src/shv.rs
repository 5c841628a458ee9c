//! SHV Beta-Lactamase Mutation Module
//!
//! Calls SHV mutations relative to SHV-1 in Ambler numbering and derives the
//! beta-lactamase subclass they imply.
//!
//! # Sites
//! | Ambler positions        | Effect                         |
//! |-------------------------|--------------------------------|
//! | 238, 240, 164-179       | ESBL (164-179 is the omega loop) |
//! | 69, 130, 234, 235, 244, 275, 276 | inhibitor resistance  |
//! | 146                     | carbapenemase                  |
//! | 35                      | reported, no class effect      |
//!
//! Class precedence: `Bla_Carb` > `Bla_ESBL_inhR` > `Bla_ESBL` > `Bla_inhR`.

use std::ops::RangeInclusive;

use crate::pairwise::global_align;

/// SHV-1 protein (mature numbering starts at Ambler 26 after the signal peptide).
pub const SHV1_PROTEIN: &str = "MRYIRLCIISLLATLPLAVHASPQPLEQIKLSESQLSGRVGMIEMDLASGRTLTAWRADERFPMMSTFKVVLCGAVLARVDAGDEQLERKIHYRQQDLVDYSPVSEKHLADGMTVGELCAAAITMSDNSAANLLLATVGGPAGLTAFLRQIGDNVTRLDRWETELNEALPGDARDTTTPASMAATLRKLLTSQRLSARSQRQLLQWMVDDRVAGPLIRSVLPAGWFIADKTGAGERGARGIVALLGPNNKAERIVVIYLRDTPASMAERNQQIAGIGAALIEHWQR";

const OMEGA_LOOP: RangeInclusive<usize> = 164..=179;
const ESBL_SITES: [usize; 2] = [238, 240];
const INHIBITOR_SITES: [usize; 7] = [69, 130, 234, 235, 244, 275, 276];
const CARBAPENEMASE_SITES: [usize; 1] = [146];
const REPORTED_ONLY_SITES: [usize; 1] = [35];

/// Converts a 1-based SHV-1 sequence position to Ambler numbering.
///
/// Ambler numbering skips 239 and 253 in class A enzymes.
pub fn ambler_position(seq_pos: usize) -> usize {
    match seq_pos {
        0..=234 => seq_pos + 4,
        235..=247 => seq_pos + 5,
        _ => seq_pos + 6,
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// One substitution relative to SHV-1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShvMutation {
    /// Ambler position.
    pub position: usize,
    /// Residue found in the hit.
    pub residue: char,
}

impl ShvMutation {
    fn is_omega_loop(&self) -> bool {
        OMEGA_LOOP.contains(&self.position)
    }

    fn is_esbl(&self) -> bool {
        ESBL_SITES.contains(&self.position) || self.is_omega_loop()
    }

    fn is_inhibitor_resistance(&self) -> bool {
        INHIBITOR_SITES.contains(&self.position)
    }

    fn is_carbapenemase(&self) -> bool {
        CARBAPENEMASE_SITES.contains(&self.position)
    }

    fn is_class_changing(&self) -> bool {
        self.is_esbl() || self.is_inhibitor_resistance() || self.is_carbapenemase()
    }

    fn is_reported(&self) -> bool {
        self.is_class_changing() || REPORTED_ONLY_SITES.contains(&self.position)
    }
}

impl std::fmt::Display for ShvMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.position, self.residue)
    }
}

/// Substitutions of a protein against SHV-1 plus its omega-loop residues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShvProfile {
    /// Substitutions at catalogued sites, in position order. Deletions are skipped.
    pub mutations: Vec<ShvMutation>,
    /// Residues found at Ambler 164-179.
    pub omega_loop: String,
}

impl ShvProfile {
    /// Aligns a protein onto SHV-1 and records catalogued substitutions.
    pub fn from_protein(protein: &str) -> Self {
        let protein = protein.trim_end_matches('*');
        let aligned = global_align(SHV1_PROTEIN, protein).bases_per_ref_pos();

        let mut profile = ShvProfile::default();
        for (i, (wild_type, found)) in SHV1_PROTEIN.chars().zip(aligned).enumerate() {
            let position = ambler_position(i + 1);
            if found == '-' {
                continue;
            }
            if OMEGA_LOOP.contains(&position) {
                profile.omega_loop.push(found);
            }
            if found != wild_type {
                let mutation = ShvMutation { position, residue: found };
                if mutation.is_reported() {
                    profile.mutations.push(mutation);
                }
            }
        }
        profile
    }

    fn has_omega_loop_mutation(&self) -> bool {
        self.mutations.iter().any(ShvMutation::is_omega_loop)
    }

    /// Beta-lactamase subclass implied by the mutations, if any.
    pub fn implied_class(&self) -> Option<&'static str> {
        let carbapenemase = self.mutations.iter().any(ShvMutation::is_carbapenemase);
        let esbl = self.mutations.iter().any(ShvMutation::is_esbl);
        let inhibitor = self.mutations.iter().any(ShvMutation::is_inhibitor_resistance);

        match (carbapenemase, esbl, inhibitor) {
            (true, _, _) => Some("Bla_Carb"),
            (false, true, true) => Some("Bla_ESBL_inhR"),
            (false, true, false) => Some("Bla_ESBL"),
            (false, false, true) => Some("Bla_inhR"),
            (false, false, false) => None,
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Result of the SHV check for one hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ShvCall {
    /// Beta-lactamase subclass to report the hit under.
    pub bla_class: String,
    /// Catalogued mutations, for the `SHV_mutations` column.
    pub mutations: Vec<String>,
    /// Mutations responsible for a class change, appended to the allele label.
    pub class_changing: Vec<String>,
    /// Omega-loop residues, reported when the loop carries a mutation.
    pub omega_loop: Option<String>,
}

/// Classifies an SHV hit.
///
/// # Arguments
/// * `hit_protein` - Translation of the assembly region
/// * `allele_protein` - Translation of the matched reference allele
/// * `db_class` - Subclass recorded for the allele in the class table
/// * `exact_match` - Whether the hit matched the allele exactly (nucleotide or protein)
///
/// An exact hit keeps the table's subclass. Otherwise the subclass implied by
/// the hit's mutations is used when there is one, and mutations the allele
/// itself does not carry are reported as class changing.
pub fn check_shv_mutations(
    hit_protein: &str,
    allele_protein: &str,
    db_class: &str,
    exact_match: bool,
) -> ShvCall {
    let profile = ShvProfile::from_protein(hit_protein);
    let mutations = profile.mutations.iter().map(ToString::to_string).collect();
    let omega_loop = profile
        .has_omega_loop_mutation()
        .then(|| profile.omega_loop.clone());

    let mut call = ShvCall {
        bla_class: db_class.to_string(),
        mutations,
        class_changing: Vec::new(),
        omega_loop,
    };
    if exact_match {
        return call;
    }

    let implied = match profile.implied_class() {
        Some(class) if class != db_class => class,
        _ => return call,
    };

    let allele_mutations = ShvProfile::from_protein(allele_protein).mutations;
    call.bla_class = implied.to_string();
    call.class_changing = profile
        .mutations
        .iter()
        .filter(|m| m.is_class_changing() && !allele_mutations.contains(m))
        .map(ToString::to_string)
        .collect();
    call
}

// ============================================================================
// Tests
// ============================================================================
