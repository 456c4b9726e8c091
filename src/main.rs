use clap::{Parser, ValueEnum};
use quartet_scores::config::{EnumerationMode, ScoringConfig};
use quartet_scores::error::QuartetError;
use quartet_scores::io::{read_evaluation_trees, read_reference_tree, write_annotated_newick, write_scores_tsv};
use quartet_scores::memory::available_memory_or_unlimited;
use quartet_scores::pipeline::score_trees;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use tracing::level_filters::LevelFilter;

/// Score the inner edges of a reference tree by the quartet topologies of a
/// set of evaluation trees (LQ-IC, QP-IC, EQP-IC) and write the reference
/// tree annotated with the scores.
#[derive(Parser, Debug)]
#[command(name = "quartet-scores", version, about = "Quartet-based branch support for a reference tree")]
struct Args {
    /// Reference tree (Newick or NEXUS, optionally .gz)
    #[arg(short = 'r', long = "reference")]
    reference: PathBuf,

    /// Evaluation trees (Newick, one per `;`, or a NEXUS/BEAST .trees file, optionally .gz)
    #[arg(short = 'e', long = "evaluation")]
    evaluation: PathBuf,

    /// Output path for the annotated Newick tree
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Also write a per-edge score table (TSV, gzip if the path ends in .gz)
    #[arg(long = "scores-tsv")]
    scores_tsv: Option<PathBuf>,

    /// Worker threads, 0 for one per core
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    threads: usize,

    /// Use the sparse lookup table even if the dense one fits in memory
    #[arg(long = "low-memory", default_value_t = false)]
    low_memory: bool,

    /// Enumeration of bifurcating reference trees: node-pairs | quartets
    #[arg(long = "mode", value_enum, default_value_t = ModeArg::NodePairs)]
    mode: ModeArg,

    /// Burn-in by number of trees (drop first N evaluation trees)
    #[arg(long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Quiet mode: only warnings and errors on stderr
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,

    /// Verbose mode: debug messages on stderr
    #[arg(short = 'v', long = "verbose", default_value_t = false, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    NodePairs,
    Quartets,
}

impl From<ModeArg> for EnumerationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::NodePairs => EnumerationMode::NodePairs,
            ModeArg::Quartets => EnumerationMode::Quartets,
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.quiet {
        LevelFilter::WARN
    } else if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Read trees
    let t0 = Instant::now();
    let reference = match read_reference_tree(&args.reference) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to read reference tree {:?}: {e}", args.reference);
            std::process::exit(2);
        }
    };
    let evaluation = match read_evaluation_trees(&args.evaluation, args.burnin_trees) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to read evaluation trees {:?}: {e}", args.evaluation);
            std::process::exit(2);
        }
    };
    info!(
        secs = t0.elapsed().as_secs_f64(),
        leaves = reference.leaf_count(),
        evaluation_trees = evaluation.len(),
        "Read input trees"
    );

    let config = ScoringConfig::default()
        .with_threads(args.threads)
        .with_low_memory(args.low_memory)
        .with_mode(args.mode.into());

    let t1 = Instant::now();
    let scores = match score_trees(&reference, &evaluation, &config, available_memory_or_unlimited) {
        Ok(s) => s,
        Err(e @ QuartetError::InsufficientMemory { .. }) => {
            error!("{e}; try fewer taxa or a machine with more memory");
            std::process::exit(3);
        }
        Err(e) => {
            error!("Scoring failed: {e}");
            std::process::exit(3);
        }
    };
    info!(secs = t1.elapsed().as_secs_f64(), "Scored {} edges", scores.edge_count());

    let t2 = Instant::now();
    if let Err(e) = write_annotated_newick(&args.output, &reference, &scores) {
        exit_write_failed(&args.output, e);
    }
    if let Some(path) = &args.scores_tsv
        && let Err(e) = write_scores_tsv(path, &reference, &scores)
    {
        exit_write_failed(path, e);
    }
    info!(secs = t2.elapsed().as_secs_f64(), "Wrote output {:?}", args.output);
}

fn exit_write_failed(output: &Path, e: std::io::Error) -> ! {
    error!("Failed to write output {output:?}: {e}");
    std::process::exit(4);
}
