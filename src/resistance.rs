//! Resistance Genotyping Module
//!
//! Classifies resistance gene hits into per-class result columns.
//!
//! # Pipeline
//! ```text
//! align catalog → identity filter → cull redundant hits → per hit:
//!   1. coverage gate (spurious floor, hits below are dropped)
//!   2. exact / protein-rescued / inexact
//!   3. class table lookup, SHV subclass for beta-lactamases
//!   4. label: allele [^ | * ? -NN%] [ +mutations]
//!   5. bucket: class column, truncated_resistance_hits or spurious_resistance_hits
//! ```
//! Then the QRDR, colistin and porin scans add their mutation columns.
//!
//! # Database Directory
//! - `CARD_AMR_clustered.csv` - class table
//! - `CARD_v3.1.13.fasta` - reference alleles
//! - `QRDR_120.fasta`, `MgrB_and_PmrB.fasta`, `OmpK.fasta` - marker genes (optional)

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::aligner::{align_filtered, Aligner};
use crate::config::ResistanceThresholds;
use crate::error::TypingError;
use crate::modules::ModuleResults;
use crate::mutations::{check_col_mutations, check_omp_mutations, check_qrdr_mutations};
use crate::paf::AlignmentHit;
use crate::redundancy::cull_redundant_hits;
use crate::seqio::{load_records, Assembly, FastaRecord, SequenceMap};
use crate::shv::check_shv_mutations;
use crate::translate::{
    find_exact_aa_match, translate_nucl_to_prot, translate_references, ReferenceProtein,
};
use crate::truncation::{truncation_check, FULL_LENGTH_COVERAGE};

pub const CLASS_TABLE_FILE: &str = "CARD_AMR_clustered.csv";
pub const REFERENCE_FILE: &str = "CARD_v3.1.13.fasta";
pub const QRDR_FILE: &str = "QRDR_120.fasta";
pub const COLISTIN_FILE: &str = "MgrB_and_PmrB.fasta";
pub const PORIN_FILE: &str = "OmpK.fasta";

pub const TRUNCATED_COLUMN: &str = "truncated_resistance_hits";
pub const SPURIOUS_COLUMN: &str = "spurious_resistance_hits";

/// Minimum number of comma-separated fields in a class table row.
const CLASS_TABLE_FIELDS: usize = 13;

const DEFAULT_BLA_CLASSES: [&str; 6] = [
    "Bla",
    "Bla_inhR",
    "Bla_ESBL",
    "Bla_ESBL_inhR",
    "Bla_Carb",
    "Bla_chr",
];

// ============================================================================
// Result Columns
// ============================================================================

/// Mutation columns filled by the SHV check and the marker scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationColumn {
    Shv,
    Omp,
    Col,
    Flq,
    /// Any other `*_mutations` class from the class table.
    Other(String),
}

impl MutationColumn {
    pub const BUILT_IN: [MutationColumn; 4] = [
        MutationColumn::Shv,
        MutationColumn::Omp,
        MutationColumn::Col,
        MutationColumn::Flq,
    ];

    pub fn from_name(name: &str) -> Self {
        match name {
            "SHV_mutations" => MutationColumn::Shv,
            "Omp_mutations" => MutationColumn::Omp,
            "Col_mutations" => MutationColumn::Col,
            "Flq_mutations" => MutationColumn::Flq,
            other => MutationColumn::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MutationColumn::Shv => "SHV_mutations",
            MutationColumn::Omp => "Omp_mutations",
            MutationColumn::Col => "Col_mutations",
            MutationColumn::Flq => "Flq_mutations",
            MutationColumn::Other(name) => name,
        }
    }
}

/// A resistance result column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultColumn {
    /// Acquired genes of a class, rendered `<class>_acquired`.
    Acquired(String),
    /// Chromosomal genes, for classes ending in `_chr`.
    Chromosomal(String),
    Mutations(MutationColumn),
    Truncated,
    Spurious,
}

impl ResultColumn {
    /// Column for a resolved class name.
    pub fn for_class(class: &str) -> Self {
        if class.ends_with("_chr") {
            ResultColumn::Chromosomal(class.to_string())
        } else if class.ends_with("_mutations") {
            ResultColumn::Mutations(MutationColumn::from_name(class))
        } else {
            ResultColumn::Acquired(class.to_string())
        }
    }

    /// Output header for this column.
    pub fn header(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResultColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultColumn::Acquired(class) => write!(f, "{class}_acquired"),
            ResultColumn::Chromosomal(class) => write!(f, "{class}"),
            ResultColumn::Mutations(column) => write!(f, "{}", column.name()),
            ResultColumn::Truncated => write!(f, "{TRUNCATED_COLUMN}"),
            ResultColumn::Spurious => write!(f, "{SPURIOUS_COLUMN}"),
        }
    }
}

// ============================================================================
// Hit Accumulator
// ============================================================================

/// Labels collected for one assembly, keyed by column.
#[derive(Debug, Default, Clone)]
pub struct HitAccumulator {
    labels: FxHashMap<ResultColumn, Vec<String>>,
}

impl HitAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: ResultColumn, label: impl Into<String>) {
        self.labels.entry(column).or_default().push(label.into());
    }

    /// Adds several labels. An empty iterator leaves the column absent.
    pub fn extend<I>(&mut self, column: ResultColumn, labels: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut labels = labels.into_iter().peekable();
        if labels.peek().is_some() {
            self.labels.entry(column).or_default().extend(labels);
        }
    }

    pub fn labels(&self, column: &ResultColumn) -> &[String] {
        self.labels.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Renders one value per header: sorted labels joined by `;`, or `-`.
    ///
    /// # Errors
    /// [`TypingError::UnknownResultColumn`] if any collected column is not
    /// among `headers`.
    pub fn finish(self, headers: &[String]) -> Result<ModuleResults, TypingError> {
        let mut rendered: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (column, labels) in self.labels {
            let header = column.header();
            if !headers.contains(&header) {
                return Err(TypingError::UnknownResultColumn { column: header });
            }
            rendered.entry(header).or_default().extend(labels);
        }

        let mut results = ModuleResults::new();
        for header in headers {
            let value = match rendered.get_mut(header) {
                Some(labels) if !labels.is_empty() => {
                    labels.sort();
                    labels.join(";")
                }
                _ => "-".to_string(),
            };
            results.insert(header.clone(), value);
        }
        Ok(results)
    }
}

// ============================================================================
// Class Table
// ============================================================================

/// Class table metadata for one reference sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResistanceGeneRecord {
    /// Allele symbol used in labels, e.g. `SHV-1`.
    pub allele: String,
    /// Resistance class, e.g. `Bla` or `AGly`.
    pub class: String,
    /// Beta-lactamase subclass, e.g. `Bla_chr`. `NA` for other classes.
    pub bla_class: String,
}

/// The resistance class table.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    records: FxHashMap<String, ResistanceGeneRecord>,
    /// Generic classes, sorted, without `Bla`, mutation columns appended.
    pub res_classes: Vec<String>,
    /// Beta-lactamase subclasses in first-seen order.
    pub bla_classes: Vec<String>,
}

impl ClassTable {
    /// Parses the comma-separated class table. The first line is a header.
    ///
    /// Reference ids are `cluster__gene_class__allele__seqid`, matching the
    /// FASTA headers of the reference catalog.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, TypingError> {
        let mut records = FxHashMap::default();
        let mut res_classes: Vec<String> = Vec::new();
        let mut bla_classes: Vec<String> = DEFAULT_BLA_CLASSES.iter().map(|c| c.to_string()).collect();

        for (i, line) in reader.lines().enumerate().skip(1) {
            let line_no = i + 1;
            let line = line.map_err(|e| TypingError::MalformedTable {
                line: line_no,
                reason: e.to_string(),
            })?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < CLASS_TABLE_FIELDS {
                return Err(TypingError::MalformedTable {
                    line: line_no,
                    reason: format!(
                        "expected at least {CLASS_TABLE_FIELDS} fields, found {}",
                        fields.len()
                    ),
                });
            }

            let (cluster, class, gene, allele, seq_id) =
                (fields[0], fields[2], fields[3], fields[4], fields[5]);
            let mut bla_class = fields[12];
            if class == "Bla" && bla_class == "NA" {
                bla_class = "Bla";
            }

            let id = format!("{cluster}__{gene}_{class}__{allele}__{seq_id}");
            records.insert(
                id,
                ResistanceGeneRecord {
                    allele: allele.to_string(),
                    class: class.to_string(),
                    bla_class: bla_class.to_string(),
                },
            );
            if !res_classes.iter().any(|c| c == class) {
                res_classes.push(class.to_string());
            }
            if !bla_classes.iter().any(|c| c == bla_class) {
                bla_classes.push(bla_class.to_string());
            }
        }

        res_classes.sort();
        res_classes.retain(|c| c != "Bla");
        bla_classes.retain(|c| c != "NA");
        for column in &MutationColumn::BUILT_IN {
            if !res_classes.iter().any(|c| c == column.name()) {
                res_classes.push(column.name().to_string());
            }
        }

        Ok(Self {
            records,
            res_classes,
            bla_classes,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open class table: {}", path.display()))?;
        Self::parse(BufReader::new(file))
            .with_context(|| format!("Invalid class table: {}", path.display()))
    }

    pub fn get(&self, id: &str) -> Option<&ResistanceGeneRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Output headers.
    ///
    /// Acquired class columns first, then `Bla_chr`, then the mutation
    /// columns, then the truncated and spurious columns.
    pub fn headers(&self) -> Vec<String> {
        let classes = self.res_classes.iter().chain(&self.bla_classes);
        let (chromosomal, other): (Vec<&String>, Vec<&String>) =
            classes.partition(|c| c.as_str() == "Bla_chr");
        let ordered = other.into_iter().chain(chromosomal);
        let (mutations, rest): (Vec<&String>, Vec<&String>) =
            ordered.partition(|c| c.contains("_mutations"));

        rest.into_iter()
            .chain(mutations)
            .map(|c| ResultColumn::for_class(c).header())
            .chain([
                ResultColumn::Truncated.header(),
                ResultColumn::Spurious.header(),
            ])
            .collect()
    }
}

// ============================================================================
// Database
// ============================================================================

/// Marker gene FASTA files for the ancillary scans.
#[derive(Debug, Clone, Default)]
pub struct ResistanceMarkers {
    pub qrdr: Option<PathBuf>,
    pub colistin: Option<PathBuf>,
    pub porin: Option<PathBuf>,
}

impl ResistanceMarkers {
    /// Marker files present in `dir`.
    pub fn discover(dir: &Path) -> Self {
        let existing = |file: &str| Some(dir.join(file)).filter(|p| p.is_file());
        Self {
            qrdr: existing(QRDR_FILE),
            colistin: existing(COLISTIN_FILE),
            porin: existing(PORIN_FILE),
        }
    }
}

/// Everything the resistance pipeline reads, loaded once per run.
#[derive(Debug, Clone)]
pub struct ResistanceDb {
    pub table: ClassTable,
    /// Reference catalog handed to the aligner.
    pub reference_fasta: PathBuf,
    pub markers: ResistanceMarkers,
    references: Vec<ReferenceProtein>,
    protein_index: FxHashMap<String, usize>,
    headers: Vec<String>,
}

impl ResistanceDb {
    /// Loads a database directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let table = ClassTable::load(dir.join(CLASS_TABLE_FILE))?;
        let reference_fasta = dir.join(REFERENCE_FILE);
        let records = load_records(&reference_fasta)?;
        let db = Self::from_parts(table, reference_fasta, &records, ResistanceMarkers::discover(dir));
        debug!(
            "Loaded {} class table entries and {} reference alleles",
            db.table.len(),
            db.references.len()
        );
        Ok(db)
    }

    /// Builds a database from already loaded parts.
    pub fn from_parts(
        table: ClassTable,
        reference_fasta: PathBuf,
        records: &[FastaRecord],
        markers: ResistanceMarkers,
    ) -> Self {
        let references = translate_references(records);
        let protein_index = references
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        let headers = table.headers();
        Self {
            table,
            reference_fasta,
            markers,
            references,
            protein_index,
            headers,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn references(&self) -> &[ReferenceProtein] {
        &self.references
    }

    /// Class table record for a reference id.
    pub fn record(&self, id: &str) -> Result<&ResistanceGeneRecord, TypingError> {
        self.table.get(id).ok_or_else(|| TypingError::UnknownReference {
            name: id.to_string(),
        })
    }

    /// Translated protein of a reference allele.
    pub fn protein(&self, id: &str) -> Option<&str> {
        self.protein_index
            .get(id)
            .map(|&i| self.references[i].protein.as_str())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Percent of the query spanned on the target.
fn target_query_coverage(hit: &AlignmentHit) -> f64 {
    if hit.query_length == 0 {
        return 0.0;
    }
    100.0 * hit.target_span() as f64 / hit.query_length as f64
}

/// Classifies catalog hits for one assembly.
///
/// # Arguments
/// * `hits` - Catalog hits with target sequences attached
/// * `contigs` - Assembly contigs, for boundary-extended exact matching
/// * `db` - Class table and reference proteins
/// * `thresholds` - Reporting and spurious cut-offs
///
/// # Errors
/// [`TypingError::UnknownReference`] when a hit's reference is not in the
/// class table.
pub fn classify_resistance_hits(
    hits: Vec<AlignmentHit>,
    contigs: &SequenceMap,
    db: &ResistanceDb,
    thresholds: &ResistanceThresholds,
) -> Result<HitAccumulator, TypingError> {
    let hits = cull_redundant_hits(hits);
    debug!("{} resistance hits after culling", hits.len());

    let mut acc = HitAccumulator::new();
    for mut hit in hits {
        let coverage = target_query_coverage(&hit);
        if coverage < thresholds.min_spurious_coverage {
            debug!("Discarding {} (coverage {:.1}%)", hit, coverage);
            continue;
        }

        let identity = hit.percent_identity();
        let (exact_match, rescued) = if identity < 100.0 {
            match find_exact_aa_match(&hit, contigs, db.references()) {
                Some(name) => {
                    debug!("Exact protein match for {}: {}", hit, name);
                    hit.rename_query(name);
                    (true, true)
                }
                None => (false, false),
            }
        } else {
            (true, false)
        };

        let record = db.record(&hit.query_name)?;
        let mut class = record.class.clone();
        let mut bla_class = record.bla_class.clone();
        let mut class_changing = Vec::new();

        if record.allele.starts_with("SHV-") {
            if let Some(target_seq) = hit.target_seq.as_deref() {
                let hit_protein = translate_nucl_to_prot(target_seq);
                let allele_protein = db.protein(&hit.query_name).unwrap_or_default();
                let shv = check_shv_mutations(&hit_protein, allele_protein, &bla_class, exact_match);

                acc.extend(ResultColumn::Mutations(MutationColumn::Shv), shv.mutations);
                if let Some(loop_seq) = shv.omega_loop {
                    acc.push(
                        ResultColumn::Mutations(MutationColumn::Shv),
                        format!("omega-loop={loop_seq}"),
                    );
                }
                bla_class = shv.bla_class;
                class_changing = shv.class_changing;
            }
        }
        if class == "Bla" {
            class = bla_class;
        }

        let mut label = record.allele.clone();
        let mut trunc_coverage = 100.0;
        if rescued {
            label.push('^');
        } else {
            if identity < 100.0 {
                label.push('*');
            }
            if hit.target_length < hit.query_length {
                label.push('?');
            }
            let truncation = truncation_check(&hit);
            label.push_str(&truncation.suffix);
            trunc_coverage = truncation.coverage;
        }
        if !class_changing.is_empty() {
            label.push_str(" +");
            label.push_str(&class_changing.join(" +"));
        }

        let reportable =
            coverage >= thresholds.min_coverage && identity >= thresholds.min_identity;
        let column = if reportable && trunc_coverage >= FULL_LENGTH_COVERAGE {
            ResultColumn::for_class(&class)
        } else if reportable {
            ResultColumn::Truncated
        } else {
            ResultColumn::Spurious
        };
        debug!("{} -> {} ({})", hit, label, column);
        acc.push(column, label);
    }

    Ok(acc)
}

/// Aligns a marker set and attaches target sequences.
fn marker_hits(
    aligner: &dyn Aligner,
    markers: &Path,
    assembly: &Assembly,
    min_identity: f64,
) -> Result<Vec<AlignmentHit>> {
    Ok(align_filtered(aligner, markers, &assembly.path, Some(min_identity), None)?
        .into_iter()
        .map(|hit| hit.with_sequences(&assembly.contigs, None))
        .collect())
}

/// Runs the whole resistance pipeline for one assembly.
pub fn genotype_resistance(
    assembly: &Assembly,
    aligner: &dyn Aligner,
    db: &ResistanceDb,
    thresholds: &ResistanceThresholds,
) -> Result<ModuleResults> {
    let hits: Vec<AlignmentHit> = align_filtered(
        aligner,
        &db.reference_fasta,
        &assembly.path,
        Some(thresholds.min_spurious_identity),
        None,
    )?
    .into_iter()
    .map(|hit| hit.with_sequences(&assembly.contigs, None))
    .collect();

    let mut acc = classify_resistance_hits(hits, &assembly.contigs, db, thresholds)?;

    if let Some(qrdr) = &db.markers.qrdr {
        let hits = marker_hits(aligner, qrdr, assembly, thresholds.min_identity)?;
        acc.extend(
            ResultColumn::Mutations(MutationColumn::Flq),
            check_qrdr_mutations(&hits)?,
        );
    }
    if let Some(colistin) = &db.markers.colistin {
        let hits = cull_redundant_hits(marker_hits(aligner, colistin, assembly, thresholds.min_identity)?);
        acc.extend(
            ResultColumn::Mutations(MutationColumn::Col),
            check_col_mutations(&hits)?,
        );
    }
    if let Some(porin) = &db.markers.porin {
        let hits = cull_redundant_hits(marker_hits(aligner, porin, assembly, thresholds.min_identity)?);
        acc.extend(
            ResultColumn::Mutations(MutationColumn::Omp),
            check_omp_mutations(&hits)?,
        );
    }

    let results = acc.finish(db.headers())?;
    Ok(results)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::MockAligner;
    use crate::mutations::GYRA_REFERENCE;
    use crate::seqio::reverse_complement;
    use crate::shv::{ambler_position, SHV1_PROTEIN};
    use crate::translate::back_translate;
    use std::io::Cursor;

    const SHV1_ID: &str = "1__SHV_Bla__SHV-1__100";
    const SHV12_ID: &str = "1__SHV_Bla__SHV-12__101";
    const TEM1_ID: &str = "2__TEM_Bla__TEM-1__200";
    const AAC_ID: &str = "3__aac3-IIa_AGly__aac(3)-IIa__300";

    const CLASS_TABLE: &str = "\
clusterid,queryID,class,gene,allele,seqID,accession,positions,size,multi_gene,multi_cluster,bla_description,bla_class
1,q1,Bla,SHV,SHV-1,100,acc,1-861,861,no,no,SHV,Bla_chr
1,q2,Bla,SHV,SHV-12,101,acc,1-861,861,no,no,SHV,Bla_ESBL
2,q3,Bla,TEM,TEM-1,200,acc,1-861,861,no,no,TEM,NA
3,q4,AGly,aac3-IIa,aac(3)-IIa,300,acc,1-861,861,no,no,NA,NA
";

    fn shv1_with(changes: &[(usize, char)]) -> String {
        SHV1_PROTEIN
            .chars()
            .enumerate()
            .map(|(i, wt)| {
                let pos = ambler_position(i + 1);
                changes
                    .iter()
                    .find(|(p, _)| *p == pos)
                    .map(|(_, aa)| *aa)
                    .unwrap_or(wt)
            })
            .collect()
    }

    fn tem1() -> String {
        back_translate(&format!("M{}", "KSTAVLE".repeat(20)))
    }

    fn aac() -> String {
        back_translate(&format!("M{}", "DWRNGQ".repeat(25)))
    }

    fn table() -> ClassTable {
        ClassTable::parse(Cursor::new(CLASS_TABLE)).unwrap()
    }

    fn db() -> ResistanceDb {
        let records = vec![
            FastaRecord { name: SHV1_ID.into(), seq: back_translate(SHV1_PROTEIN) },
            FastaRecord { name: SHV12_ID.into(), seq: back_translate(&shv1_with(&[(35, 'Q'), (238, 'S'), (240, 'K')])) },
            FastaRecord { name: TEM1_ID.into(), seq: tem1() },
            FastaRecord { name: AAC_ID.into(), seq: aac() },
        ];
        ResistanceDb::from_parts(
            table(),
            PathBuf::from("catalog.fasta"),
            &records,
            ResistanceMarkers::default(),
        )
    }

    /// A contig carrying `gene` between 500 bases of flank on each side.
    fn contigs_with(gene: &str) -> SequenceMap {
        let flank = "C".repeat(500);
        let mut contigs = SequenceMap::default();
        contigs.insert("contig_1".to_string(), format!("{flank}{gene}{flank}"));
        contigs
    }

    /// A full-length hit of `query` (length `query_len`) over `gene` at the
    /// centre of `contigs_with(gene)`.
    fn hit_on(query: &str, query_len: usize, gene: &str, strand: char, matches: usize) -> AlignmentHit {
        let contigs = contigs_with(gene);
        let line = format!(
            "{query}\t{query_len}\t0\t{query_len}\t{strand}\tcontig_1\t{contig_len}\t500\t{end}\t{matches}\t{len}\t60\tAS:i:{score}",
            contig_len = gene.len() + 1000,
            end = 500 + gene.len(),
            len = gene.len(),
            score = 2 * matches
        );
        AlignmentHit::parse_line(&line).unwrap().with_sequences(&contigs, None)
    }

    fn classify(hit: AlignmentHit, gene: &str) -> ModuleResults {
        let db = db();
        classify_resistance_hits(vec![hit], &contigs_with(gene), &db, &ResistanceThresholds::default())
            .unwrap()
            .finish(db.headers())
            .unwrap()
    }

    #[test]
    fn test_result_columns() {
        assert_eq!(ResultColumn::for_class("AGly").header(), "AGly_acquired");
        assert_eq!(ResultColumn::for_class("Bla_chr").header(), "Bla_chr");
        assert_eq!(
            ResultColumn::for_class("SHV_mutations"),
            ResultColumn::Mutations(MutationColumn::Shv)
        );
        assert_eq!(
            ResultColumn::for_class("Tgc_mutations"),
            ResultColumn::Mutations(MutationColumn::Other("Tgc_mutations".into()))
        );
        assert_eq!(ResultColumn::Spurious.header(), "spurious_resistance_hits");
    }

    #[test]
    fn test_class_table_parse() {
        let table = table();
        assert_eq!(table.len(), 4);
        let tem = table.get(TEM1_ID).unwrap();
        assert_eq!(tem.allele, "TEM-1");
        assert_eq!(tem.bla_class, "Bla");
        assert_eq!(table.get(AAC_ID).unwrap().class, "AGly");
        assert_eq!(
            table.res_classes,
            vec!["AGly", "SHV_mutations", "Omp_mutations", "Col_mutations", "Flq_mutations"]
        );
        assert_eq!(
            table.bla_classes,
            vec!["Bla", "Bla_inhR", "Bla_ESBL", "Bla_ESBL_inhR", "Bla_Carb", "Bla_chr"]
        );
    }

    #[test]
    fn test_class_table_rejects_short_rows() {
        let text = "header\n1,q,Bla,SHV,SHV-1\n";
        let err = ClassTable::parse(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, TypingError::MalformedTable { line: 2, .. }));
    }

    #[test]
    fn test_headers() {
        assert_eq!(
            table().headers(),
            vec![
                "AGly_acquired",
                "Bla_acquired",
                "Bla_inhR_acquired",
                "Bla_ESBL_acquired",
                "Bla_ESBL_inhR_acquired",
                "Bla_Carb_acquired",
                "Bla_chr",
                "SHV_mutations",
                "Omp_mutations",
                "Col_mutations",
                "Flq_mutations",
                "truncated_resistance_hits",
                "spurious_resistance_hits",
            ]
        );
    }

    #[test]
    fn test_accumulator_rejects_unknown_column() {
        let mut acc = HitAccumulator::new();
        acc.push(ResultColumn::Acquired("Tet".into()), "tet(A)");
        let err = acc.finish(&["AGly_acquired".to_string()]).unwrap_err();
        assert!(matches!(err, TypingError::UnknownResultColumn { column } if column == "Tet_acquired"));
    }

    #[test]
    fn test_accumulator_sorts_and_fills() {
        let mut acc = HitAccumulator::new();
        acc.push(ResultColumn::Acquired("AGly".into()), "strB");
        acc.push(ResultColumn::Acquired("AGly".into()), "aac(3)-IIa");
        acc.extend(ResultColumn::Mutations(MutationColumn::Shv), Vec::new());
        let headers = vec!["AGly_acquired".to_string(), "SHV_mutations".to_string()];
        let results = acc.finish(&headers).unwrap();
        assert_eq!(results.get("AGly_acquired"), Some("aac(3)-IIa;strB"));
        assert_eq!(results.get("SHV_mutations"), Some("-"));
    }

    #[test]
    fn test_shv1_exact_is_chromosomal() {
        let gene = back_translate(SHV1_PROTEIN);
        let results = classify(hit_on(SHV1_ID, gene.len(), &gene, '+', gene.len()), &gene);
        assert_eq!(results.get("Bla_chr"), Some("SHV-1"));
        assert_eq!(results.get("SHV_mutations"), Some("-"));
        assert_eq!(results.get("Bla_ESBL_acquired"), Some("-"));
    }

    #[test]
    fn test_shv1_omega_loop_mutation_is_esbl() {
        let gene = back_translate(&shv1_with(&[(174, 'R')]));
        let results = classify(hit_on(SHV1_ID, gene.len(), &gene, '+', gene.len() - 1), &gene);
        assert_eq!(results.get("Bla_ESBL_acquired"), Some("SHV-1* +174R"));
        assert_eq!(results.get("SHV_mutations"), Some("174R;omega-loop=RWETELNEALRGDARD"));
        assert_eq!(results.get("Bla_chr"), Some("-"));
    }

    #[test]
    fn test_shv1_238y_forward_and_reverse() {
        let gene = back_translate(&shv1_with(&[(238, 'Y')]));
        let forward = classify(hit_on(SHV1_ID, gene.len(), &gene, '+', gene.len() - 2), &gene);
        assert_eq!(forward.get("Bla_ESBL_acquired"), Some("SHV-1* +238Y"));
        assert_eq!(forward.get("SHV_mutations"), Some("238Y"));

        let rc = reverse_complement(&gene);
        let reverse = classify(hit_on(SHV1_ID, gene.len(), &rc, '-', gene.len() - 2), &rc);
        assert_eq!(reverse, forward);
    }

    #[test]
    fn test_shv12_exact_keeps_table_class() {
        let gene = back_translate(&shv1_with(&[(35, 'Q'), (238, 'S'), (240, 'K')]));
        let results = classify(hit_on(SHV12_ID, gene.len(), &gene, '+', gene.len()), &gene);
        assert_eq!(results.get("Bla_ESBL_acquired"), Some("SHV-12"));
        assert_eq!(results.get("SHV_mutations"), Some("238S;240K;35Q"));
    }

    #[test]
    fn test_synonymous_change_is_protein_rescued() {
        // GCT -> GCC keeps alanine
        let gene = tem1().replacen("GCT", "GCC", 1);
        let results = classify(hit_on(TEM1_ID, gene.len(), &gene, '+', gene.len() - 1), &gene);
        assert_eq!(results.get("Bla_acquired"), Some("TEM-1^"));
    }

    #[test]
    fn test_truncated_hit() {
        let full = tem1();
        // stop codon after 70 residues
        let gene = format!("{}TAA{}", &full[..210], &full[213..]);
        let results = classify(hit_on(TEM1_ID, full.len(), &gene, '+', full.len() - 1), &gene);
        assert_eq!(results.get("truncated_resistance_hits"), Some("TEM-1*-50%"));
        assert_eq!(results.get("Bla_acquired"), Some("-"));
    }

    #[test]
    fn test_spurious_and_discarded_hits() {
        let db = db();
        let thresholds = ResistanceThresholds::default();
        let full = aac();
        let contigs = contigs_with(&full);

        // 60% of the gene at 95% identity: above the spurious floor only
        let part = 456 * 6 / 10;
        let line = format!(
            "{AAC_ID}\t456\t0\t{part}\t+\tcontig_1\t1456\t500\t{end}\t{m}\t{part}\t60\tAS:i:300",
            end = 500 + part,
            m = part * 95 / 100
        );
        let spurious = AlignmentHit::parse_line(&line).unwrap().with_sequences(&contigs, None);

        // 30% of the gene: below the spurious coverage floor
        let line = format!(
            "{AAC_ID}\t456\t0\t136\t+\tcontig_1\t1456\t800\t936\t136\t136\t60\tAS:i:272"
        );
        let dropped = AlignmentHit::parse_line(&line).unwrap().with_sequences(&contigs, None);

        let results = classify_resistance_hits(vec![spurious, dropped], &contigs, &db, &thresholds)
            .unwrap()
            .finish(db.headers())
            .unwrap();
        assert_eq!(results.get("spurious_resistance_hits"), Some("aac(3)-IIa*-60%"));
        assert_eq!(results.get("AGly_acquired"), Some("-"));
    }

    #[test]
    fn test_short_contig_flag() {
        let gene = aac();
        let contigs = contigs_with(&gene);
        let line = format!(
            "{AAC_ID}\t{len}\t0\t{len}\t+\tcontig_1\t100\t500\t{end}\t{len}\t{len}\t60\tAS:i:900",
            len = gene.len(),
            end = 500 + gene.len()
        );
        let hit = AlignmentHit::parse_line(&line).unwrap().with_sequences(&contigs, None);
        let results = classify(hit, &gene);
        assert_eq!(results.get("AGly_acquired"), Some("aac(3)-IIa?"));
    }

    #[test]
    fn test_unknown_reference_is_fatal() {
        let gene = aac();
        let hit = hit_on("9__foo_Tet__tet(A)__9", gene.len(), &gene, '+', gene.len());
        let err = classify_resistance_hits(
            vec![hit],
            &contigs_with(&gene),
            &db(),
            &ResistanceThresholds::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TypingError::UnknownReference { .. }));
    }

    #[test]
    fn test_genotype_resistance_with_markers() {
        let shv = back_translate(SHV1_PROTEIN);
        let gyra_protein: String = GYRA_REFERENCE
            .chars()
            .enumerate()
            .map(|(i, c)| if i + 1 == 83 { 'F' } else { c })
            .collect();
        let gyra = back_translate(&gyra_protein);

        let flank = "C".repeat(500);
        let mut contigs = SequenceMap::default();
        contigs.insert("contig_1".to_string(), format!("{flank}{shv}{flank}"));
        contigs.insert("contig_2".to_string(), format!("{flank}{gyra}{flank}"));
        let assembly = Assembly {
            name: "sample".to_string(),
            path: PathBuf::from("sample.fasta"),
            contigs,
        };

        let mut db = db();
        db.markers.qrdr = Some(PathBuf::from("qrdr.fasta"));

        let shv_line = format!(
            "{SHV1_ID}\t{len}\t0\t{len}\t+\tcontig_1\t{cl}\t500\t{end}\t{len}\t{len}\t60\tAS:i:1700",
            len = shv.len(),
            cl = shv.len() + 1000,
            end = 500 + shv.len()
        );
        let gyra_line = format!(
            "GyrA\t{len}\t0\t{len}\t+\tcontig_2\t{cl}\t500\t{end}\t{m}\t{len}\t60\tAS:i:700",
            len = gyra.len(),
            cl = gyra.len() + 1000,
            end = 500 + gyra.len(),
            m = gyra.len() - 2
        );
        let aligner = MockAligner::default()
            .with_hits(Path::new("catalog.fasta"), &shv_line)
            .with_hits(Path::new("qrdr.fasta"), &gyra_line);

        let results =
            genotype_resistance(&assembly, &aligner, &db, &ResistanceThresholds::default()).unwrap();
        assert_eq!(results.get("Bla_chr"), Some("SHV-1"));
        assert_eq!(results.get("Flq_mutations"), Some("GyrA-83F"));
        assert_eq!(results.get("Col_mutations"), Some("-"));
        assert_eq!(results.len(), db.headers().len());
    }
}
