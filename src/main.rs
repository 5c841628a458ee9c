use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use bactyper::aligner::Minimap2;
use bactyper::config::{AlignerConfig, ContigQcThresholds, MlstThresholds, ResistanceThresholds};
use bactyper::mlst::MlstScheme;
use bactyper::modules::{
    run_pipeline, ContigStatsModule, MlstModule, ModuleResults, ResistanceModule, ResistanceScoreModule,
    TypingModule, VirulenceScoreModule,
};
use bactyper::resistance::ResistanceDb;
use bactyper::seqio::Assembly;

/// Scheme names whose calls feed the virulence score.
const VIRULENCE_SCHEMES: [&str; 3] = ["ybst", "cbst", "abst"];

fn parse_percent(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=100.0).contains(&val) {
        Err(format!("Percentage must be between 0 and 100, got {}", val))
    } else {
        Ok(val)
    }
}

/// An MLST scheme given as `NAME=DIR:REQUIRED[:EXTRA]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MlstArg {
    name: String,
    dir: PathBuf,
    required_exact_matches: usize,
    extra_column: Option<String>,
}

fn parse_mlst_scheme(s: &str) -> Result<MlstArg, String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=DIR:REQUIRED[:EXTRA], got {}", s))?;
    if name.is_empty() {
        return Err(format!("Missing scheme name in {}", s));
    }

    let mut parts = rest.splitn(3, ':');
    let dir = parts.next().filter(|d| !d.is_empty());
    let required = parts.next();
    let extra = parts.next().filter(|e| !e.is_empty());

    let (dir, required) = match (dir, required) {
        (Some(dir), Some(required)) => (dir, required),
        _ => return Err(format!("Expected NAME=DIR:REQUIRED[:EXTRA], got {}", s)),
    };
    let required_exact_matches = required
        .parse()
        .map_err(|_| format!("Invalid required exact match count: {}", required))?;

    Ok(MlstArg {
        name: name.to_string(),
        dir: PathBuf::from(dir),
        required_exact_matches,
        extra_column: extra.map(str::to_string),
    })
}

#[derive(Parser)]
#[command(name = "bactyper")]
#[command(version)]
#[command(about = "Genotyping of bacterial genome assemblies")]
#[command(long_about = r#"
bactyper - genotyping of bacterial genome assemblies

Aligns reference catalogs against each assembly with minimap2 and reports:
  - contig count, N50, total size, ambiguous bases and QC warnings
  - acquired resistance genes by class, with SHV, QRDR, colistin and porin mutations
  - MLST sequence types for every --mlst scheme
  - resistance class/gene counts and a virulence score

MODULES:
  contig_stats       Always enabled
  resistance         Enabled by -d/--database (CARD_AMR_clustered.csv, CARD_v3.1.13.fasta,
                     optional QRDR_120.fasta, MgrB_and_PmrB.fasta, OmpK.fasta)
  resistance_score   Enabled with resistance
  <NAME>             One per --mlst NAME=DIR:REQUIRED[:EXTRA]; DIR holds profiles.tsv
                     and <gene>.fasta per gene
  virulence_score    Enabled when schemes named ybst, cbst and abst are all given

OUTPUT:
  One TSV row per assembly. Columns are named <module>__<column>.

EXAMPLES:
  bactyper -a *.fasta -d db/amr -o results.tsv
  bactyper -a asm.fna.gz --mlst mlst=db/mlst:3:clonal_complex --mlst ybst=db/ybt:2 -o out.tsv
"#)]
struct Args {
    #[arg(short = 'a', long, value_name = "FILE", num_args = 1.., required = true, help_heading = "Input")]
    assemblies: Vec<PathBuf>,

    #[arg(short = 'd', long, value_name = "DIR", help_heading = "Input")]
    database: Option<PathBuf>,

    #[arg(long = "mlst", value_name = "NAME=DIR:REQUIRED[:EXTRA]",
          value_parser = parse_mlst_scheme, help_heading = "Input")]
    mlst: Vec<MlstArg>,

    #[arg(short = 'o', long, value_name = "FILE", help_heading = "Output")]
    output: PathBuf,

    #[arg(short = 'v', long, help_heading = "Output")]
    verbose: bool,

    #[arg(long = "min-identity", value_name = "PERCENT", default_value = "90.0",
          value_parser = parse_percent, help_heading = "Resistance")]
    min_identity: f64,

    #[arg(long = "min-coverage", value_name = "PERCENT", default_value = "80.0",
          value_parser = parse_percent, help_heading = "Resistance")]
    min_coverage: f64,

    #[arg(long = "min-spurious-identity", value_name = "PERCENT", default_value = "80.0",
          value_parser = parse_percent, help_heading = "Resistance")]
    min_spurious_identity: f64,

    #[arg(long = "min-spurious-coverage", value_name = "PERCENT", default_value = "40.0",
          value_parser = parse_percent, help_heading = "Resistance")]
    min_spurious_coverage: f64,

    #[arg(long = "mlst-min-identity", value_name = "PERCENT", default_value = "90.0",
          value_parser = parse_percent, help_heading = "MLST")]
    mlst_min_identity: f64,

    #[arg(long = "mlst-min-coverage", value_name = "PERCENT", default_value = "80.0",
          value_parser = parse_percent, help_heading = "MLST")]
    mlst_min_coverage: f64,

    #[arg(long = "min-n50", value_name = "BASES", default_value = "10000", help_heading = "QC")]
    min_n50: usize,

    #[arg(long = "min-genome-size", value_name = "BASES", help_heading = "QC")]
    min_genome_size: Option<usize>,

    #[arg(long = "max-genome-size", value_name = "BASES", help_heading = "QC")]
    max_genome_size: Option<usize>,

    #[arg(long, value_name = "PATH", default_value = "minimap2", help_heading = "Runtime")]
    minimap2: String,

    #[arg(long, value_name = "PRESET", default_value = "map-ont", help_heading = "Runtime")]
    preset: String,

    #[arg(short = 't', long, value_name = "NUM", default_value = "0", help_heading = "Runtime")]
    threads: usize,
}

impl Args {
    fn qc_thresholds(&self) -> ContigQcThresholds {
        ContigQcThresholds {
            min_n50: self.min_n50,
            min_genome_size: self.min_genome_size,
            max_genome_size: self.max_genome_size,
        }
    }

    fn resistance_thresholds(&self) -> ResistanceThresholds {
        ResistanceThresholds {
            min_identity: self.min_identity,
            min_coverage: self.min_coverage,
            min_spurious_identity: self.min_spurious_identity,
            min_spurious_coverage: self.min_spurious_coverage,
        }
    }

    fn mlst_thresholds(&self, required_exact_matches: usize) -> MlstThresholds {
        MlstThresholds {
            min_identity: self.mlst_min_identity,
            min_coverage: self.mlst_min_coverage,
            required_exact_matches,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "bactyper=debug,info"
    } else {
        "bactyper=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Sizes the global rayon pool. Returns false, with a warning, when the pool
/// was already initialized.
fn init_thread_pool(threads: usize) -> bool {
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not size the thread pool to {} threads: {}", threads, e);
            false
        }
    }
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    init_logging(args.verbose);
    let start_time = Instant::now();

    if args.threads == 0 {
        args.threads = num_cpus::get();
    }

    let modules = build_modules(&args)?;

    let aligner = Minimap2::new(&AlignerConfig {
        executable: args.minimap2.clone(),
        preset: args.preset.clone(),
        threads: 1,
    })?;

    init_thread_pool(args.threads);

    let assemblies = deduplicate_paths(&args.assemblies);
    info!(
        "Typing {} assembly(ies) with {} module(s) on {} threads",
        assemblies.len(),
        modules.len(),
        args.threads
    );

    let rows = assemblies
        .par_iter()
        .map(|path| -> Result<(String, Vec<(String, ModuleResults)>)> {
            let assembly = Assembly::load(path)?;
            debug!("{}: {} contigs", assembly.name, assembly.contigs.len());
            let results = run_pipeline(&modules, &assembly, &aligner)
                .with_context(|| format!("Typing failed for {}", path.display()))?;
            Ok((assembly.name, results))
        })
        .collect::<Result<Vec<_>>>()?;

    output_results(&args.output, &modules, &rows)?;

    info!(
        "Wrote {} row(s) to {} in {:.1}s",
        rows.len(),
        args.output.display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Builds the module list: contig stats and resistance first, then MLST
/// schemes, then scores.
fn build_modules(args: &Args) -> Result<Vec<Box<dyn TypingModule>>> {
    let mut modules: Vec<Box<dyn TypingModule>> = Vec::new();

    let qc = args.qc_thresholds();
    qc.validate()?;
    modules.push(Box::new(ContigStatsModule::new(qc)));

    if let Some(database) = &args.database {
        let thresholds = args.resistance_thresholds();
        thresholds.validate()?;
        let db = ResistanceDb::load(database)?;
        modules.push(Box::new(ResistanceModule::new(db, thresholds)));
        modules.push(Box::new(ResistanceScoreModule));
    }

    let mut names = FxHashSet::default();
    for scheme in &args.mlst {
        if !names.insert(scheme.name.as_str()) {
            anyhow::bail!("MLST scheme name given twice: {}", scheme.name);
        }
        let thresholds = args.mlst_thresholds(scheme.required_exact_matches);
        let loaded = MlstScheme::load(
            &scheme.name,
            &scheme.dir,
            scheme.extra_column.as_deref(),
            thresholds,
        )?;
        debug!(
            "Loaded scheme {}: {} genes, {} profiles",
            loaded.name,
            loaded.table.gene_names.len(),
            loaded.table.profiles.len()
        );
        modules.push(Box::new(MlstModule::new(loaded)));
    }

    if VIRULENCE_SCHEMES.iter().all(|name| names.contains(name)) {
        let [ybt, clb, iuc] = VIRULENCE_SCHEMES;
        modules.push(Box::new(VirulenceScoreModule::new(ybt, clb, iuc)));
    }

    Ok(modules)
}

/// Drops repeated paths, keeping the first occurrence.
fn deduplicate_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = FxHashSet::default();
    paths
        .iter()
        .filter(|p| seen.insert(p.as_path()))
        .cloned()
        .collect()
}

fn header_row(modules: &[Box<dyn TypingModule>]) -> Vec<String> {
    std::iter::once("assembly".to_string())
        .chain(modules.iter().flat_map(|m| {
            m.headers()
                .into_iter()
                .map(move |h| format!("{}__{}", m.name(), h))
        }))
        .collect()
}

fn format_row(
    modules: &[Box<dyn TypingModule>],
    name: &str,
    results: &[(String, ModuleResults)],
) -> Vec<String> {
    let mut row = vec![name.to_string()];
    for (module, (_, values)) in modules.iter().zip(results) {
        for header in module.headers() {
            row.push(values.get(&header).unwrap_or("-").to_string());
        }
    }
    row
}

fn output_results(
    path: &Path,
    modules: &[Box<dyn TypingModule>],
    rows: &[(String, Vec<(String, ModuleResults)>)],
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output: {}", path.display()))?;
    let mut output = BufWriter::new(file);

    writeln!(output, "{}", header_row(modules).join("\t"))?;
    for (name, results) in rows {
        writeln!(output, "{}", format_row(modules, name, results).join("\t"))?;
    }
    output.flush()?;
    Ok(())
}
