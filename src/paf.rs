//! PAF (Pairwise mApping Format) Parser Module
//!
//! Parses minimap2 PAF output into [`AlignmentHit`] records. In this crate the
//! query is always a reference allele (resistance gene, MLST allele, marker)
//! and the target is an assembly contig.
//!
//! # PAF Format (first 11 columns are required)
//! ```text
//! Col  Type    Description
//! 1    string  Query sequence name
//! 2    int     Query sequence length
//! 3    int     Query start (0-based)
//! 4    int     Query end
//! 5    char    Relative strand: '+' or '-'
//! 6    string  Target sequence name
//! 7    int     Target sequence length
//! 8    int     Target start
//! 9    int     Target end
//! 10   int     Number of matching bases
//! 11   int     Alignment block length
//! 12   int     Mapping quality (ignored)
//! 13+  tags    cg:Z:<cigar>, AS:i:<score>, ...
//! ```
//!
//! # Example Usage
//! ```
//! use bactyper::paf::AlignmentHit;
//!
//! let hit = AlignmentHit::parse_line(
//!     "gapA_2\t450\t0\t450\t+\tcontig_1\t5000\t100\t550\t450\t450\t60\tAS:i:900",
//! ).unwrap();
//! assert!(hit.is_exact());
//! assert_eq!(hit.alignment_score, Some(900));
//! ```

use anyhow::Result;
use std::fmt;
use std::io::BufRead;

use crate::error::TypingError;
use crate::seqio::{reverse_complement, SequenceMap};

const MIN_FIELDS: usize = 11;

// ============================================================================
// Strand
// ============================================================================

/// Relative strand of the query on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    fn parse(field: &str) -> Result<Self, TypingError> {
        match field {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            other => Err(TypingError::InvalidField {
                field: "strand",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

// ============================================================================
// Alignment Hit
// ============================================================================

/// One pairwise alignment between a reference query and an assembly contig.
///
/// Identity and coverage are always derived from the raw counts so they can
/// never disagree with them.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentHit {
    /// Query (reference allele) name.
    pub query_name: String,
    /// Query length.
    pub query_length: usize,
    /// Query start, 0-based.
    pub query_start: usize,
    /// Query end, exclusive.
    pub query_end: usize,
    /// Relative strand.
    pub strand: Strand,
    /// Target (contig) name.
    pub target_name: String,
    /// Target length.
    pub target_length: usize,
    /// Target start, 0-based.
    pub target_start: usize,
    /// Target end, exclusive.
    pub target_end: usize,
    /// Number of matching bases.
    pub matching_bases: usize,
    /// Alignment block length.
    pub aligned_bases: usize,
    /// CIGAR from the `cg:Z:` tag.
    pub cigar: Option<String>,
    /// Alignment score from the `AS:i:` tag.
    pub alignment_score: Option<i64>,
    /// Aligned query region, when attached.
    pub query_seq: Option<String>,
    /// Aligned target region on the query's strand, when attached.
    pub target_seq: Option<String>,
}

impl AlignmentHit {
    /// Parses a hit from a tab-separated PAF line.
    ///
    /// # Errors
    /// Returns [`TypingError::MalformedAlignment`] when the line has fewer
    /// than 11 fields and [`TypingError::InvalidField`] when a numeric or
    /// strand column cannot be parsed.
    pub fn parse_line(line: &str) -> Result<Self, TypingError> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() < MIN_FIELDS {
            return Err(TypingError::MalformedAlignment { fields: fields.len() });
        }

        let mut cigar = None;
        let mut alignment_score = None;
        for tag in &fields[MIN_FIELDS..] {
            if let Some(value) = tag.strip_prefix("cg:Z:") {
                cigar = Some(value.to_string());
            } else if let Some(value) = tag.strip_prefix("AS:i:") {
                alignment_score = Some(value.parse().map_err(|_| TypingError::InvalidField {
                    field: "alignment score",
                    value: value.to_string(),
                })?);
            }
        }

        Ok(Self {
            query_name: fields[0].to_string(),
            query_length: parse_count(fields[1], "query length")?,
            query_start: parse_count(fields[2], "query start")?,
            query_end: parse_count(fields[3], "query end")?,
            strand: Strand::parse(fields[4])?,
            target_name: fields[5].to_string(),
            target_length: parse_count(fields[6], "target length")?,
            target_start: parse_count(fields[7], "target start")?,
            target_end: parse_count(fields[8], "target end")?,
            matching_bases: parse_count(fields[9], "matching bases")?,
            aligned_bases: parse_count(fields[10], "alignment block length")?,
            cigar,
            alignment_score,
            query_seq: None,
            target_seq: None,
        })
    }

    /// Percent identity: 100 × matching / aligned bases (0 for an empty block).
    pub fn percent_identity(&self) -> f64 {
        if self.aligned_bases == 0 {
            return 0.0;
        }
        100.0 * self.matching_bases as f64 / self.aligned_bases as f64
    }

    /// Percent of the query covered by the alignment.
    pub fn query_coverage(&self) -> f64 {
        if self.query_length == 0 {
            return 0.0;
        }
        100.0 * self.query_span() as f64 / self.query_length as f64
    }

    /// Percent of the target covered by the alignment.
    pub fn target_coverage(&self) -> f64 {
        if self.target_length == 0 {
            return 0.0;
        }
        100.0 * self.target_span() as f64 / self.target_length as f64
    }

    /// Aligned query length.
    pub fn query_span(&self) -> usize {
        self.query_end.saturating_sub(self.query_start)
    }

    /// Aligned target length.
    pub fn target_span(&self) -> usize {
        self.target_end.saturating_sub(self.target_start)
    }

    /// True for a full-length hit with no mismatches or gaps.
    pub fn is_exact(&self) -> bool {
        self.matching_bases == self.aligned_bases && self.query_span() == self.query_length
    }

    /// Replaces the query identity after an exact protein match.
    pub fn rename_query(&mut self, name: impl Into<String>) {
        self.query_name = name.into();
    }

    /// Attaches the aligned target region (reverse-complemented for
    /// reverse-strand hits) and, when query sequences are given, the aligned
    /// query region.
    ///
    /// Coordinates outside the loaded sequences leave the field unset.
    pub fn with_sequences(mut self, contigs: &SequenceMap, queries: Option<&SequenceMap>) -> Self {
        self.target_seq = contigs
            .get(&self.target_name)
            .and_then(|contig| contig.get(self.target_start..self.target_end))
            .map(|region| match self.strand {
                Strand::Forward => region.to_string(),
                Strand::Reverse => reverse_complement(region),
            });
        self.query_seq = queries
            .and_then(|q| q.get(&self.query_name))
            .and_then(|seq| seq.get(self.query_start..self.query_end))
            .map(str::to_string);
        self
    }
}

impl fmt::Display for AlignmentHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}({}), {}:{}-{} ({:.3}%)",
            self.query_name,
            self.query_start,
            self.query_end,
            self.strand,
            self.target_name,
            self.target_start,
            self.target_end,
            self.percent_identity()
        )
    }
}

fn parse_count(value: &str, field: &'static str) -> Result<usize, TypingError> {
    value.parse().map_err(|_| TypingError::InvalidField {
        field,
        value: value.to_string(),
    })
}

// ============================================================================
// PAF Reader
// ============================================================================

/// Sequential reader for PAF data.
///
/// Skips empty lines. Implements Iterator for convenient use in for loops.
pub struct PafReader<R: BufRead> {
    reader: R,
    line_buf: String,
}

impl<R: BufRead> PafReader<R> {
    /// Wraps any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(512),
        }
    }

    /// Reads the next hit.
    ///
    /// # Returns
    /// - `Ok(Some(hit))` - Successfully read a hit
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O or parsing error
    pub fn read_next(&mut self) -> Result<Option<AlignmentHit>> {
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                return Ok(None);
            }

            let line = self.line_buf.trim_end();
            if !line.is_empty() {
                return Ok(Some(AlignmentHit::parse_line(line)?));
            }
        }
    }
}

impl<R: BufRead> Iterator for PafReader<R> {
    type Item = Result<AlignmentHit>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(hit)) => Some(Ok(hit)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Parses every non-empty line of PAF text.
pub fn parse_paf(text: &str) -> Result<Vec<AlignmentHit>> {
    PafReader::new(text.as_bytes()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LINE: &str = "A\t1000\t50\t150\t+\tC\t5000\t60\t160\t100\t100\t60\tcg:Z:100=\tAS:i:200";

    #[test]
    fn test_parse_line() {
        let hit = AlignmentHit::parse_line(LINE).unwrap();

        assert_eq!(hit.query_name, "A");
        assert_eq!(hit.query_length, 1000);
        assert_eq!(hit.query_start, 50);
        assert_eq!(hit.query_end, 150);
        assert_eq!(hit.strand, Strand::Forward);
        assert_eq!(hit.target_name, "C");
        assert_eq!(hit.target_length, 5000);
        assert_eq!(hit.target_start, 60);
        assert_eq!(hit.target_end, 160);
        assert_eq!(hit.matching_bases, 100);
        assert_eq!(hit.aligned_bases, 100);
        assert_eq!(hit.cigar.as_deref(), Some("100="));
        assert_eq!(hit.alignment_score, Some(200));
    }

    #[test]
    fn test_eleven_fields_accepted() {
        let hit = AlignmentHit::parse_line("q\t10\t0\t10\t-\tt\t20\t0\t10\t9\t10").unwrap();
        assert_eq!(hit.strand, Strand::Reverse);
        assert_eq!(hit.cigar, None);
        assert_eq!(hit.alignment_score, None);
    }

    #[test]
    fn test_malformed_line() {
        let err = AlignmentHit::parse_line("incomplete\tline").unwrap_err();
        assert!(matches!(err, TypingError::MalformedAlignment { fields: 2 }));

        let err = AlignmentHit::parse_line("q\tx\t0\t10\t+\tt\t20\t0\t10\t9\t10").unwrap_err();
        assert!(matches!(err, TypingError::InvalidField { field: "query length", .. }));
    }

    #[test]
    fn test_derived_metrics() {
        let hit = AlignmentHit::parse_line(LINE).unwrap();
        assert_eq!(hit.percent_identity(), 100.0);
        assert_eq!(hit.query_coverage(), 10.0);
        assert_eq!(hit.target_coverage(), 2.0);
        assert!(!hit.is_exact());

        let hit = AlignmentHit::parse_line("q\t100\t0\t100\t+\tt\t500\t0\t100\t95\t100").unwrap();
        assert_eq!(hit.percent_identity(), 95.0);
        assert!(!hit.is_exact());

        let hit = AlignmentHit::parse_line("q\t100\t0\t100\t+\tt\t500\t0\t100\t100\t100").unwrap();
        assert!(hit.is_exact());
    }

    #[test]
    fn test_display() {
        let hit = AlignmentHit::parse_line(LINE).unwrap();
        assert_eq!(hit.to_string(), "A:50-150(+), C:60-160 (100.000%)");
    }

    #[test]
    fn test_with_sequences_reverse_strand() {
        let mut contigs = SequenceMap::default();
        contigs.insert("t".to_string(), "AAAACCCGTTT".to_string());
        let mut queries = SequenceMap::default();
        queries.insert("q".to_string(), "CGGGA".to_string());

        let hit = AlignmentHit::parse_line("q\t5\t0\t4\t-\tt\t11\t4\t8\t4\t4")
            .unwrap()
            .with_sequences(&contigs, Some(&queries));
        assert_eq!(hit.target_seq.as_deref(), Some("CGGG"));
        assert_eq!(hit.query_seq.as_deref(), Some("CGGG"));

        let hit = AlignmentHit::parse_line("q\t5\t0\t4\t+\tmissing\t11\t4\t8\t4\t4")
            .unwrap()
            .with_sequences(&contigs, None);
        assert_eq!(hit.target_seq, None);
        assert_eq!(hit.query_seq, None);
    }

    #[test]
    fn test_rename_query() {
        let mut hit = AlignmentHit::parse_line(LINE).unwrap();
        hit.rename_query("B");
        assert_eq!(hit.query_name, "B");
    }

    #[test]
    fn test_reader_skips_blank_lines() {
        let text = format!("{LINE}\n\n{LINE}\n");
        let hits: Vec<AlignmentHit> = PafReader::new(Cursor::new(text))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hits.len(), 2);

        assert_eq!(parse_paf(&format!("{LINE}\n")).unwrap().len(), 1);
        let err = parse_paf("bad\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TypingError>(),
            Some(TypingError::MalformedAlignment { .. })
        ));
    }
}
