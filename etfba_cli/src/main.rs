//! Command-line interface for etfba
//!
//! # Usage
//!
//! ```bash
//! # Build a network from reaction rows and persist it
//! etfba convert rows.json network.bin
//!
//! # Solve the optimization described by a request file
//! etfba optimize --model network.bin --request request.json --output results.json
//!
//! # Flux and Gibbs energy ranges within 1% of a known optimum
//! etfba variability --model network.bin --request ranges.json
//!
//! # Show the stoichiometric matrix
//! etfba matrix rows.json
//! ```
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::info;
use serde::{Deserialize, Serialize};

use etfba_core::configuration::Configuration;
use etfba_core::formulate::options::OptimizeOptions;
use etfba_core::formulate::outcome::{solve_with_retries, SolveOutcome};
use etfba_core::formulate::variability::VariabilityKind;
use etfba_core::formulate::OptimizationKind;
use etfba_core::metabolic_model::model::NetworkModel;
use etfba_core::optimize::solvers::SolverChain;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON file overriding the default configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a network from a JSON file of reaction rows and save it as a blob
    Convert {
        rows: PathBuf,
        output: PathBuf,
    },
    /// Solve one optimization of a network
    Optimize {
        /// Network, either reaction rows (.json) or a saved blob
        #[arg(short, long)]
        model: PathBuf,

        /// JSON file with the kind of analysis and its options
        #[arg(short, long)]
        request: PathBuf,

        /// Where to write the results as JSON, printed when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Find how far fluxes and Gibbs energies can move near an optimum
    Variability {
        /// Network, either reaction rows (.json) or a saved blob
        #[arg(short, long)]
        model: PathBuf,

        /// JSON file with the kind of analysis, its options and the optimum
        #[arg(short, long)]
        request: PathBuf,

        /// Where to write the ranges as JSON, printed when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the stoichiometric matrix and the end metabolites of a network
    Matrix {
        model: PathBuf,

        /// Split reversible reactions into forward and backward columns
        #[arg(long)]
        total: bool,
    },
}

/// What to solve
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Request {
    kind: OptimizationKind,
    #[serde(default)]
    options: OptimizeOptions,
    /// Overrides the configured number of attempts for nonlinear solves
    max_attempts: Option<usize>,
}

/// Which ranges to find
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VariabilityRequest {
    kind: VariabilityKind,
    #[serde(default)]
    options: OptimizeOptions,
    objective_value: f64,
    #[serde(default = "default_gamma")]
    gamma: f64,
}

fn default_gamma() -> f64 {
    0.99
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn read_config(path: Option<&Path>) -> Result<Configuration> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading configuration {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing configuration {}", path.display()))
        }
        None => Ok(Configuration::default()),
    }
}

fn read_network(path: &Path, config: &Configuration) -> Result<NetworkModel> {
    let is_rows = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let network = if is_rows {
        NetworkModel::read_json(path, config)
            .with_context(|| format!("reading reaction rows {}", path.display()))?
    } else {
        NetworkModel::load(path).with_context(|| format!("loading network {}", path.display()))?
    };
    info!(
        "Network has {} reactions and {} metabolites",
        network.reactions().len(),
        network.metabolites().len()
    );
    Ok(network)
}

fn convert(rows: &Path, output: &Path, config: &Configuration) -> Result<()> {
    let network = read_network(rows, config)?;
    network
        .save(output)
        .with_context(|| format!("saving network to {}", output.display()))?;
    info!("Saved network to {}", output.display());
    Ok(())
}

fn optimize(model: &Path, request: &Path, output: Option<&Path>, config: Configuration) -> Result<()> {
    let network = read_network(model, &config)?;
    let text = fs::read_to_string(request)
        .with_context(|| format!("reading request {}", request.display()))?;
    let request: Request = serde_json::from_str(&text)
        .with_context(|| format!("parsing request {}", request.display()))?;
    let max_attempts = request.max_attempts.unwrap_or(config.max_solve_attempts);

    let formulator = network.optimize_with(request.kind, request.options, config)?;
    let solver = SolverChain::default_chain();
    let results = match solve_with_retries(&formulator, &solver, max_attempts)? {
        SolveOutcome::Optimal(results) => results,
        SolveOutcome::Infeasible => bail!("{} problem is infeasible", request.kind),
        SolveOutcome::SolverError(reason) => bail!("{} solve failed: {reason}", request.kind),
    };

    write_json(&results, output)
}

fn variability(model: &Path, request: &Path, output: Option<&Path>, config: Configuration) -> Result<()> {
    let network = read_network(model, &config)?;
    let text = fs::read_to_string(request)
        .with_context(|| format!("reading request {}", request.display()))?;
    let request: VariabilityRequest = serde_json::from_str(&text)
        .with_context(|| format!("parsing request {}", request.display()))?;

    let analyzer = network.evaluate_variability_with(
        request.kind,
        request.options,
        request.objective_value,
        request.gamma,
        config,
    )?;
    let ranges = analyzer
        .evaluate(&SolverChain::default_chain())
        .with_context(|| format!("{} failed", request.kind))?;
    write_json(&ranges, output)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing results to {}", path.display()))?;
            info!("Wrote results to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn matrix(model: &Path, total: bool, config: &Configuration) -> Result<()> {
    let network = read_network(model, config)?;
    let matrix = if total {
        network.total_stoichiometric_matrix()
    } else {
        network.stoichiometric_matrix()
    };
    let columns: Vec<&str> = matrix.column_ids().collect();
    println!("\t{}", columns.join("\t"));
    for metabolite_id in matrix.metabolite_ids() {
        let row: Vec<String> = columns
            .iter()
            .map(|column_id| matrix.get(metabolite_id, column_id).to_string())
            .collect();
        println!("{metabolite_id}\t{}", row.join("\t"));
    }
    let mut end_metabolites: Vec<&String> = network.end_metabolites().iter().collect();
    end_metabolites.sort();
    println!(
        "end metabolites: {}",
        end_metabolites
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = read_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Convert { rows, output } => convert(rows, output, &config),
        Commands::Optimize {
            model,
            request,
            output,
        } => optimize(model, request, output.as_deref(), config),
        Commands::Variability {
            model,
            request,
            output,
        } => variability(model, request, output.as_deref(), config),
        Commands::Matrix { model, total } => matrix(model, *total, &config),
    }
}
