//! bactyper - Genotyping of Bacterial Genome Assemblies
//!
//! Reports assembly QC statistics, aligns reference catalogs (resistance genes, MLST alleles, marker genes)
//! against assembly contigs and interprets the hits: redundancy culling,
//! amino-acid level exact matching and truncation, resistance class
//! bucketing with SHV and QRDR mutation calls, and MLST profile resolution.
//!
//! # Modules
//! - `error`: Domain error type
//! - `config`: Threshold sets and aligner settings
//! - `seqio`: FASTA I/O with gzip support, assemblies
//! - `contig_stats`: Assembly size, N50 and QC warnings
//! - `paf`: PAF (Pairwise mApping Format) parsing into alignment hits
//! - `aligner`: Aligner trait and the minimap2 runner
//! - `redundancy`: Overlapping hit culling
//! - `translate`: Bacterial translation and exact protein matching
//! - `truncation`: Amino-acid coverage of hits
//! - `pairwise`: BLOSUM62 global protein alignment
//! - `shv`: SHV beta-lactamase mutation calling
//! - `mutations`: QRDR, colistin and porin scans
//! - `resistance`: Resistance class table and hit classification
//! - `mlst`: MLST profile resolution
//! - `scoring`: Resistance counts and virulence score
//! - `modules`: Typing module trait and pipeline

pub mod error;
pub mod config;
pub mod seqio;
pub mod contig_stats;
pub mod paf;
pub mod aligner;
pub mod redundancy;
pub mod translate;
pub mod truncation;
pub mod pairwise;
pub mod shv;
pub mod mutations;
pub mod resistance;
pub mod mlst;
pub mod scoring;
pub mod modules;
