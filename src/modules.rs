//! Typing Pipeline Module
//!
//! Each typing step is a [`TypingModule`]: it declares its output headers
//! and the modules it depends on, and turns one assembly into a
//! [`ModuleResults`] row. [`run_pipeline`] runs a fixed module list in order
//! and hands every module the results produced before it.
//!
//! # Modules
//! - [`ContigStatsModule`] - assembly size, N50 and QC warnings
//! - [`ResistanceModule`] - acquired genes and resistance mutations
//! - [`MlstModule`] - any MLST scheme directory
//! - [`ResistanceScoreModule`] - class and gene counts (needs `resistance`)
//! - [`VirulenceScoreModule`] - score from three virulence-locus schemes

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::aligner::Aligner;
use crate::config::{ContigQcThresholds, ResistanceThresholds};
use crate::contig_stats::ContigStats;
use crate::error::TypingError;
use crate::mlst::MlstScheme;
use crate::resistance::{genotype_resistance, ResistanceDb};
use crate::scoring::{resistance_class_count, resistance_gene_count, virulence_score};
use crate::seqio::Assembly;

// ============================================================================
// Results
// ============================================================================

/// One module's output for one assembly: column name to value, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleResults {
    columns: Vec<(String, String)>,
}

impl ModuleResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing an existing value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Results of the modules that already ran, keyed by module name.
pub type PriorResults = FxHashMap<String, ModuleResults>;

// ============================================================================
// Module Trait
// ============================================================================

/// A typing step in the pipeline.
pub trait TypingModule: Send + Sync {
    /// Module name, used as the output column prefix.
    fn name(&self) -> &str;

    /// Output columns, in order.
    fn headers(&self) -> Vec<String>;

    /// Modules that must run first.
    fn prerequisites(&self) -> Vec<String> {
        Vec::new()
    }

    fn run(
        &self,
        assembly: &Assembly,
        aligner: &dyn Aligner,
        prior: &PriorResults,
    ) -> Result<ModuleResults>;
}

/// Runs the modules in order for one assembly.
///
/// # Returns
/// Each module's name with its results, in module order.
///
/// # Errors
/// [`TypingError::MissingPrerequisite`] if a module's prerequisite has not
/// run earlier in the list; otherwise the first module failure.
pub fn run_pipeline(
    modules: &[Box<dyn TypingModule>],
    assembly: &Assembly,
    aligner: &dyn Aligner,
) -> Result<Vec<(String, ModuleResults)>> {
    let mut prior = PriorResults::default();
    let mut ordered = Vec::with_capacity(modules.len());

    for module in modules {
        if let Some(missing) = module
            .prerequisites()
            .into_iter()
            .find(|p| !prior.contains_key(p))
        {
            return Err(TypingError::MissingPrerequisite {
                module: module.name().to_string(),
                prerequisite: missing,
            }
            .into());
        }

        debug!("{}: running {}", assembly.name, module.name());
        let results = module.run(assembly, aligner, &prior)?;
        prior.insert(module.name().to_string(), results.clone());
        ordered.push((module.name().to_string(), results));
    }

    Ok(ordered)
}

/// Results of a named prerequisite. The pipeline guarantees it exists.
fn prerequisite<'a>(prior: &'a PriorResults, module: &str, name: &str) -> Result<&'a ModuleResults> {
    prior.get(name).ok_or_else(|| {
        TypingError::MissingPrerequisite {
            module: module.to_string(),
            prerequisite: name.to_string(),
        }
        .into()
    })
}

// ============================================================================
// Contig Statistics
// ============================================================================

pub struct ContigStatsModule {
    thresholds: ContigQcThresholds,
}

impl ContigStatsModule {
    pub const NAME: &'static str = "contig_stats";

    pub fn new(thresholds: ContigQcThresholds) -> Self {
        Self { thresholds }
    }
}

impl TypingModule for ContigStatsModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn headers(&self) -> Vec<String> {
        ["contig_count", "n50", "largest_contig", "total_size", "ambiguous_bases", "qc_warnings"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    fn run(&self, assembly: &Assembly, _aligner: &dyn Aligner, _prior: &PriorResults) -> Result<ModuleResults> {
        let stats = ContigStats::from_assembly(assembly);
        let warnings = stats.qc_warnings(&self.thresholds);

        let mut results = ModuleResults::new();
        results.insert("contig_count", stats.contig_count.to_string());
        results.insert("n50", stats.n50.to_string());
        results.insert("largest_contig", stats.largest_contig.to_string());
        results.insert("total_size", stats.total_size.to_string());
        results.insert("ambiguous_bases", stats.ambiguous_label());
        results.insert(
            "qc_warnings",
            if warnings.is_empty() { "-".to_string() } else { warnings.join(",") },
        );
        Ok(results)
    }
}

// ============================================================================
// Resistance
// ============================================================================

pub struct ResistanceModule {
    db: ResistanceDb,
    thresholds: ResistanceThresholds,
}

impl ResistanceModule {
    pub const NAME: &'static str = "resistance";

    pub fn new(db: ResistanceDb, thresholds: ResistanceThresholds) -> Self {
        Self { db, thresholds }
    }
}

impl TypingModule for ResistanceModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn headers(&self) -> Vec<String> {
        self.db.headers().to_vec()
    }

    fn run(&self, assembly: &Assembly, aligner: &dyn Aligner, _prior: &PriorResults) -> Result<ModuleResults> {
        genotype_resistance(assembly, aligner, &self.db, &self.thresholds)
    }
}

// ============================================================================
// MLST
// ============================================================================

pub struct MlstModule {
    scheme: MlstScheme,
}

impl MlstModule {
    pub fn new(scheme: MlstScheme) -> Self {
        Self { scheme }
    }
}

impl TypingModule for MlstModule {
    fn name(&self) -> &str {
        &self.scheme.name
    }

    fn headers(&self) -> Vec<String> {
        self.scheme.headers()
    }

    fn run(&self, assembly: &Assembly, aligner: &dyn Aligner, _prior: &PriorResults) -> Result<ModuleResults> {
        let call = self.scheme.genotype(assembly, aligner)?;

        let mut results = ModuleResults::new();
        results.insert("st", call.st);
        if let (Some(column), Some(extra)) = (&self.scheme.table.extra_column, call.extra) {
            results.insert(column.clone(), extra);
        }
        for (gene, label) in call.alleles {
            results.insert(gene, label);
        }
        Ok(results)
    }
}

// ============================================================================
// Scores
// ============================================================================

/// Counts of acquired resistance classes and genes.
pub struct ResistanceScoreModule;

impl ResistanceScoreModule {
    pub const NAME: &'static str = "resistance_score";
}

impl TypingModule for ResistanceScoreModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn headers(&self) -> Vec<String> {
        vec![
            "num_resistance_classes".to_string(),
            "num_resistance_genes".to_string(),
        ]
    }

    fn prerequisites(&self) -> Vec<String> {
        vec![ResistanceModule::NAME.to_string()]
    }

    fn run(&self, _assembly: &Assembly, _aligner: &dyn Aligner, prior: &PriorResults) -> Result<ModuleResults> {
        let resistance = prerequisite(prior, Self::NAME, ResistanceModule::NAME)?;
        let mut results = ModuleResults::new();
        results.insert("num_resistance_classes", resistance_class_count(resistance).to_string());
        results.insert("num_resistance_genes", resistance_gene_count(resistance).to_string());
        Ok(results)
    }
}

/// Virulence score from the yersiniabactin, colibactin and aerobactin schemes.
pub struct VirulenceScoreModule {
    ybt: String,
    clb: String,
    iuc: String,
}

impl VirulenceScoreModule {
    pub const NAME: &'static str = "virulence_score";

    /// # Arguments
    /// Module names of the yersiniabactin, colibactin and aerobactin schemes.
    pub fn new(ybt: impl Into<String>, clb: impl Into<String>, iuc: impl Into<String>) -> Self {
        Self {
            ybt: ybt.into(),
            clb: clb.into(),
            iuc: iuc.into(),
        }
    }
}

impl TypingModule for VirulenceScoreModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn headers(&self) -> Vec<String> {
        vec!["virulence_score".to_string()]
    }

    fn prerequisites(&self) -> Vec<String> {
        vec![self.ybt.clone(), self.clb.clone(), self.iuc.clone()]
    }

    fn run(&self, _assembly: &Assembly, _aligner: &dyn Aligner, prior: &PriorResults) -> Result<ModuleResults> {
        let st = |scheme: &str| -> Result<String> {
            let results = prerequisite(prior, Self::NAME, scheme)?;
            Ok(results.get("st").unwrap_or("NA").to_string())
        };
        let score = virulence_score(&st(&self.ybt)?, &st(&self.clb)?, &st(&self.iuc)?);

        let mut results = ModuleResults::new();
        results.insert("virulence_score", score.to_string());
        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
