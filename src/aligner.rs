//! Aligner Module
//!
//! Seam between the typing logic and the external aligner. Modules only see
//! the [`Aligner`] trait; the binary plugs in [`Minimap2`], tests plug in a
//! canned aligner.
//!
//! # Invocation
//! ```text
//! minimap2 --eqx -c -x <preset> -t <threads> <assembly> <queries>
//! ```
//! `--eqx` gives `=`/`X` CIGAR operations and `-c` computes base-level
//! alignments so the `cg:Z` and `AS:i` tags are present.

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::AlignerConfig;
use crate::error::TypingError;
use crate::paf::{parse_paf, AlignmentHit};

/// Aligns a FASTA of reference sequences against an assembly.
pub trait Aligner: Send + Sync {
    /// Returns every reported hit with the reference sequences as queries
    /// and the assembly contigs as targets.
    fn align(&self, queries: &Path, assembly: &Path) -> Result<Vec<AlignmentHit>>;
}

/// Locates an executable by absolute path or on `PATH`.
pub fn find_executable(name: &str) -> Result<PathBuf, TypingError> {
    let path = Path::new(name);
    if path.is_absolute() && path.is_file() {
        return Ok(path.to_path_buf());
    }

    if let Ok(paths) = env::var("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if full_path.is_file() {
                return Ok(full_path);
            }
        }
    }

    Err(TypingError::MissingExecutable {
        name: name.to_string(),
    })
}

// ============================================================================
// minimap2
// ============================================================================

/// Runs minimap2 as a child process per alignment.
#[derive(Debug, Clone)]
pub struct Minimap2 {
    executable: PathBuf,
    preset: String,
    threads: usize,
}

impl Minimap2 {
    /// Resolves the executable and captures the settings.
    pub fn new(config: &AlignerConfig) -> Result<Self, TypingError> {
        Ok(Self {
            executable: find_executable(&config.executable)?,
            preset: config.preset.clone(),
            threads: config.threads.max(1),
        })
    }
}

impl Aligner for Minimap2 {
    fn align(&self, queries: &Path, assembly: &Path) -> Result<Vec<AlignmentHit>> {
        let output = Command::new(&self.executable)
            .args(["--eqx", "-c", "-x", &self.preset, "-t", &self.threads.to_string()])
            .arg(assembly)
            .arg(queries)
            .stdin(Stdio::null())
            .output()
            .context("Failed to run minimap2")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "minimap2 failed aligning {} to {} (exit code {:?}): {}",
                queries.display(),
                assembly.display(),
                output.status.code(),
                stderr.trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("minimap2 output is not UTF-8")?;
        let hits = parse_paf(&stdout)
            .with_context(|| format!("Invalid minimap2 output for {}", queries.display()))?;
        debug!(
            "{} hits for {} against {}",
            hits.len(),
            queries.display(),
            assembly.display()
        );
        Ok(hits)
    }
}

/// Aligns and keeps hits meeting the optional identity and query coverage
/// cut-offs (both inclusive).
pub fn align_filtered(
    aligner: &dyn Aligner,
    queries: &Path,
    assembly: &Path,
    min_identity: Option<f64>,
    min_coverage: Option<f64>,
) -> Result<Vec<AlignmentHit>> {
    let hits = aligner.align(queries, assembly)?;
    Ok(hits
        .into_iter()
        .filter(|h| min_identity.map_or(true, |min| h.percent_identity() >= min))
        .filter(|h| min_coverage.map_or(true, |min| h.query_coverage() >= min))
        .collect())
}

// ============================================================================
// Test Support
// ============================================================================

/// Returns canned hits keyed by the queries path.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MockAligner {
    hits: rustc_hash::FxHashMap<PathBuf, Vec<AlignmentHit>>,
}

#[cfg(test)]
impl MockAligner {
    pub(crate) fn with_hits(mut self, queries: &Path, paf: &str) -> Self {
        let hits = parse_paf(paf).unwrap();
        self.hits.entry(queries.to_path_buf()).or_default().extend(hits);
        self
    }
}

#[cfg(test)]
impl Aligner for MockAligner {
    fn align(&self, queries: &Path, _assembly: &Path) -> Result<Vec<AlignmentHit>> {
        Ok(self.hits.get(queries).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAF: &str = "a\t100\t0\t100\t+\tc1\t1000\t0\t100\t100\t100\t60\tAS:i:200\n\
                       b\t100\t0\t50\t+\tc1\t1000\t200\t250\t50\t50\t60\tAS:i:100\n\
                       c\t100\t0\t100\t+\tc1\t1000\t400\t500\t85\t100\t60\tAS:i:120\n";

    #[test]
    fn test_missing_executable() {
        let err = find_executable("bactyper-no-such-aligner").unwrap_err();
        assert!(matches!(err, TypingError::MissingExecutable { .. }));

        let config = AlignerConfig {
            executable: "bactyper-no-such-aligner".to_string(),
            ..Default::default()
        };
        assert!(Minimap2::new(&config).is_err());
    }

    #[test]
    fn test_align_filtered() {
        let queries = Path::new("genes.fasta");
        let aligner = MockAligner::default().with_hits(queries, PAF);
        let assembly = Path::new("asm.fasta");

        let all = align_filtered(&aligner, queries, assembly, None, None).unwrap();
        assert_eq!(all.len(), 3);

        let identity = align_filtered(&aligner, queries, assembly, Some(90.0), None).unwrap();
        let names: Vec<&str> = identity.iter().map(|h| h.query_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let both = align_filtered(&aligner, queries, assembly, Some(80.0), Some(80.0)).unwrap();
        let names: Vec<&str> = both.iter().map(|h| h.query_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);

        assert!(align_filtered(&aligner, Path::new("other.fasta"), assembly, None, None)
            .unwrap()
            .is_empty());
    }
}
