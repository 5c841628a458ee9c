//! Sequence I/O Module
//!
//! Reads FASTA files (plain or gzip-compressed) holding assembly contigs and
//! reference allele catalogs, and provides the nucleotide helpers shared by
//! the typing code.
//!
//! # Examples
//! ```no_run
//! use bactyper::seqio::FastaReader;
//!
//! let mut reader = FastaReader::open("assembly.fasta.gz").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} bp", record.name, record.seq.len());
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Contig name to sequence lookup.
pub type SequenceMap = FxHashMap<String, String>;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ============================================================================
// FASTA Format
// ============================================================================

/// A FASTA record containing sequence name and nucleotide sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Sequence identifier (text after '>' up to first whitespace).
    pub name: String,
    /// Sequence, concatenated from all sequence lines.
    pub seq: String,
}

/// Sequential reader for FASTA data.
///
/// Handles multi-line sequences and strips trailing whitespace.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line_buf: String,
    current_name: Option<String>,
}

impl FastaReader<Box<dyn BufRead + Send>> {
    /// Opens a FASTA file, detecting gzip compression from the magic bytes.
    ///
    /// # Arguments
    /// * `path` - Path to the FASTA file (plain or gzipped)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open FASTA: {}", path.display()))?;

        let mut magic = [0u8; 2];
        let is_gzip = file.read(&mut magic).map(|n| n == 2 && magic == GZIP_MAGIC)?;
        let file = File::open(path)
            .with_context(|| format!("Failed to reopen FASTA: {}", path.display()))?;

        let reader: Box<dyn BufRead + Send> = if is_gzip {
            Box::new(BufReader::with_capacity(1024 * 1024, MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(1024 * 1024, file))
        };
        Self::new(reader)
    }
}

impl<R: BufRead> FastaReader<R> {
    /// Wraps any buffered reader, consuming up to the first header line.
    pub fn new(reader: R) -> Result<Self> {
        let mut fasta = Self {
            reader,
            line_buf: String::with_capacity(256),
            current_name: None,
        };

        // Skip anything before the first header
        loop {
            fasta.line_buf.clear();
            if fasta.reader.read_line(&mut fasta.line_buf)? == 0 {
                break;
            }
            if fasta.line_buf.starts_with('>') {
                fasta.current_name = Some(header_name(&fasta.line_buf));
                break;
            }
        }

        Ok(fasta)
    }

    /// Reads the next FASTA record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O error occurred
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        let name = match self.current_name.take() {
            Some(n) => n,
            None => return Ok(None),
        };

        let mut seq = String::with_capacity(4096);

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if self.line_buf.starts_with('>') {
                self.current_name = Some(header_name(&self.line_buf));
                break;
            }
            seq.push_str(self.line_buf.trim());
        }

        Ok(Some(FastaRecord { name, seq }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn header_name(line: &str) -> String {
    line[1..].split_whitespace().next().unwrap_or("").to_string()
}

/// Loads every record of a FASTA file in file order, upper-casing sequences.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<FastaRecord>> {
    let path = path.as_ref();
    FastaReader::open(path)?
        .map(|record| {
            record.map(|mut r| {
                r.seq.make_ascii_uppercase();
                r
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to read FASTA: {}", path.display()))
}

/// Loads a FASTA file into a name to sequence map, upper-casing sequences.
pub fn load_sequences<P: AsRef<Path>>(path: P) -> Result<SequenceMap> {
    Ok(load_records(path)?
        .into_iter()
        .map(|r| (r.name, r.seq))
        .collect())
}

// ============================================================================
// Assembly
// ============================================================================

/// A genome assembly: its path on disk and its contigs.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Sample name derived from the file name.
    pub name: String,
    /// Path handed to the aligner.
    pub path: PathBuf,
    /// Contig sequences keyed by contig name.
    pub contigs: SequenceMap,
}

impl Assembly {
    /// Loads and validates an assembly.
    ///
    /// # Errors
    /// Fails if the file cannot be read, holds no contigs, or holds a
    /// zero-length contig.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contigs = load_sequences(path)?;
        if contigs.is_empty() {
            anyhow::bail!("Invalid assembly (no contigs): {}", path.display());
        }
        if let Some(empty) = contigs.iter().find_map(|(name, seq)| seq.is_empty().then_some(name)) {
            anyhow::bail!(
                "Invalid assembly (zero-length contig '{}'): {}",
                empty,
                path.display()
            );
        }

        Ok(Self {
            name: assembly_name(path),
            path: path.to_path_buf(),
            contigs,
        })
    }
}

/// Strips gzip and FASTA extensions from a file name.
pub fn assembly_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Some(stripped) = name.strip_suffix(".gz") {
        name = stripped.to_string();
    }
    for ext in [".fasta", ".fna", ".fas", ".fa"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    name
}

// ============================================================================
// Nucleotide Helpers
// ============================================================================

/// Returns the reverse complement of a nucleotide sequence.
///
/// Case is preserved; anything other than A, C, G, T or N becomes N.
pub fn reverse_complement(seq: &str) -> String {
    seq.chars()
        .rev()
        .map(|c| match c {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            'a' => 't',
            't' => 'a',
            'c' => 'g',
            'g' => 'c',
            'n' => 'n',
            _ => 'N',
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
