use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "cemc CLI - Cluster-expansion Monte Carlo with incremental correlation functions and solute cluster tracking.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used for full correlation function recomputations.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run Metropolis sampling on a cluster-expansion model. Canonical by default,
    /// semi-grand-canonical when chemical potentials are given.
    Run(RunArgs),
    /// Print the correlation functions, energy and solute clusters of a model's configuration.
    Inspect(InspectArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the model description (TOML): lattice, clusters, basis functions and ECIs.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub model: PathBuf,

    /// Path to the run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write every recorded sample to this CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    // --- Sampling Overrides ---
    /// Override the sampling temperature in kelvin.
    #[arg(short = 'T', long, value_name = "KELVIN")]
    pub temperature: Option<f64>,

    /// Override the number of sampling sweeps.
    #[arg(short = 'n', long, value_name = "NUM")]
    pub sweeps: Option<usize>,

    /// Override the number of equilibration sweeps.
    #[arg(long, value_name = "NUM")]
    pub equilibration_sweeps: Option<usize>,

    /// Override the number of sweeps between two recorded samples.
    #[arg(long, value_name = "NUM")]
    pub sample_interval: Option<usize>,

    /// Seed for the random number generator. Runs with the same seed are reproducible.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Compare incremental and fully recomputed correlation functions every NUM sweeps.
    #[arg(long, value_name = "NUM")]
    pub consistency_check_interval: Option<usize>,

    /// Chemical potential of a singlet in eV, e.g., --mu c1_0=-0.1. Can be repeated.
    /// Any chemical potential switches to semi-grand-canonical sampling.
    #[arg(long = "mu", value_name = "SINGLET=EV")]
    pub chemical_potentials: Vec<String>,

    // --- Cluster Constraint Overrides ---
    /// Cluster defining solute adjacency. Can be repeated.
    #[arg(long = "cluster", value_name = "NAME")]
    pub cluster_names: Vec<String>,

    /// Species counted as solute. Can be repeated.
    #[arg(long = "element", value_name = "SYMBOL")]
    pub elements: Vec<String>,

    /// Reject every move that would split the solutes into more than one cluster.
    #[arg(long)]
    pub forbid_new_clusters: bool,

    /// Override configuration values, e.g., -S sampling.temperature=800
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to the model description (TOML).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub model: PathBuf,

    /// Cluster defining solute adjacency. Can be repeated.
    #[arg(long = "cluster", value_name = "NAME")]
    pub cluster_names: Vec<String>,

    /// Species counted as solute. Can be repeated.
    #[arg(long = "element", value_name = "SYMBOL")]
    pub elements: Vec<String>,

    /// Print every tracked correlation function, not only those with an ECI.
    #[arg(long)]
    pub all: bool,
}
