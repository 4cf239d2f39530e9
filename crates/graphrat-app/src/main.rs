//! Command-line driver: parse flags, load the graph and rat files, run the
//! simulation, and keep the snapshot stream on stdout free of diagnostics.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use graphrat_core::cluster::run_cluster;
use graphrat_core::{DEFAULT_SEED, Graph, NullSink, Population, SimConfig, StreamSink, UpdateMode};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "graphrat",
    version,
    about = "Weighted random walks of a rat population over a lattice graph"
)]
struct Cli {
    /// Graph file
    #[arg(short = 'g', value_name = "GFILE")]
    graph: PathBuf,
    /// Initial rat position file
    #[arg(short = 'r', value_name = "RFILE")]
    rats: PathBuf,
    /// Number of simulation steps
    #[arg(short = 'n', value_name = "STEPS", default_value_t = 1)]
    steps: u64,
    /// Global RNG seed
    #[arg(short = 's', value_name = "SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Update discipline: s(ynchronous), r(at order), or b(atched)
    #[arg(short = 'u', value_name = "UPDT", value_enum, default_value_t = ModeArg::Batched)]
    update: ModeArg,
    /// Quiet mode: suppress the snapshot stream
    #[arg(short = 'q')]
    quiet: bool,
    /// Snapshot every INT steps
    #[arg(
        short = 'i',
        value_name = "INT",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,
    /// Number of cooperating workers
    #[arg(
        long = "workers",
        value_name = "COUNT",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    workers: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    #[value(name = "s")]
    Synchronous,
    #[value(name = "r")]
    Rat,
    #[value(name = "b")]
    Batched,
}

impl From<ModeArg> for UpdateMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Synchronous => Self::Synchronous,
            ModeArg::Rat => Self::RatOrder,
            ModeArg::Batched => Self::Batched,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let kind = err.kind();
            let _ = err.print();
            return if matches!(kind, ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };
    init_tracing();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let started = Instant::now();
    let graph = load_graph(&cli.graph)?;
    let population = load_rats(&graph, &cli.rats, cli.seed)?;
    let nrat = population.len();
    let config = SimConfig {
        global_seed: cli.seed,
        mode: cli.update.into(),
        steps: cli.steps,
        snapshot_interval: cli.interval,
        ..SimConfig::default()
    };
    let workers = usize::try_from(cli.workers).unwrap_or(1);

    if cli.quiet {
        run_cluster(graph, population, config, workers, &mut NullSink)?;
    } else {
        let mut sink = StreamSink::new(io::BufWriter::new(io::stdout().lock()));
        run_cluster(graph, population, config, workers, &mut sink)?;
    }

    info!(
        steps = cli.steps,
        rats = nrat,
        seconds = started.elapsed().as_secs_f64(),
        "simulation finished"
    );
    Ok(())
}

fn load_graph(path: &Path) -> Result<Arc<Graph>> {
    let file = File::open(path)
        .with_context(|| format!("couldn't open graph file {}", path.display()))?;
    let graph = Graph::from_reader(BufReader::new(file))
        .with_context(|| format!("couldn't load graph file {}", path.display()))?;
    Ok(Arc::new(graph))
}

fn load_rats(graph: &Arc<Graph>, path: &Path, seed: u64) -> Result<Population> {
    let file = File::open(path)
        .with_context(|| format!("couldn't open rat position file {}", path.display()))?;
    Population::from_reader(graph, BufReader::new(file), seed)
        .with_context(|| format!("couldn't load rat position file {}", path.display()))
}
