#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use qadmm_api::{AdmmParameters, AdmmResult, ConvexBackend, HeuristicSolver, QuboBackend};
use qadmm_core::math::Scalar;
use qadmm_io::{read_json_problem, write_result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qadmm")]
#[command(version, about = "ADMM heuristic for mixed-binary quadratic programs")]
struct Cli {
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Solve {
        #[arg(long)]
        problem: PathBuf,
        #[arg(long, default_value = "exhaustive")]
        qubo: QuboArg,
        #[arg(long, default_value = "active-set")]
        convex: ConvexArg,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        tol: Option<f64>,
        #[arg(long)]
        max_iters: Option<usize>,
        /// Wall-clock limit in seconds.
        #[arg(long)]
        time_limit: Option<f64>,
        #[arg(long)]
        rho: Option<f64>,
        #[arg(long)]
        beta: Option<f64>,
        #[arg(long)]
        factor_c: Option<f64>,
        #[arg(long)]
        two_block: bool,
        #[arg(long)]
        warm_start: bool,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the full result as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    Check {
        #[arg(long)]
        problem: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum QuboArg {
    Exhaustive,
    Annealing,
}

impl From<QuboArg> for QuboBackend {
    fn from(arg: QuboArg) -> QuboBackend {
        match arg {
            QuboArg::Exhaustive => QuboBackend::Exhaustive,
            QuboArg::Annealing => QuboBackend::Annealing,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ConvexArg {
    ActiveSet,
    Admm,
}

impl From<ConvexArg> for ConvexBackend {
    fn from(arg: ConvexArg) -> ConvexBackend {
        match arg {
            ConvexArg::ActiveSet => ConvexBackend::ActiveSet,
            ConvexArg::Admm => ConvexBackend::Admm,
        }
    }
}

/// Command-line overrides applied on top of the parameters stored in the problem file.
struct Overrides {
    tol: Option<f64>,
    max_iters: Option<usize>,
    time_limit: Option<f64>,
    rho: Option<f64>,
    beta: Option<f64>,
    factor_c: Option<f64>,
    two_block: bool,
    warm_start: bool,
}

impl Overrides {
    fn apply(&self, params: &mut AdmmParameters<Scalar>) -> Result<()> {
        if let Some(tolerance) = self.tol {
            params.tolerance = tolerance as Scalar;
        }
        if let Some(iters) = self.max_iters {
            params.max_iterations = iters;
        }
        if let Some(limit) = self.time_limit {
            params.max_time =
                Some(Duration::try_from_secs_f64(limit).context("time limit must be a non-negative number of seconds")?);
        }
        if let Some(rho) = self.rho {
            params.rho_initial = rho as Scalar;
        }
        if let Some(beta) = self.beta {
            params.beta = beta as Scalar;
        }
        if let Some(factor_c) = self.factor_c {
            params.factor_c = factor_c as Scalar;
        }
        if self.two_block {
            params.three_block = false;
        }
        if self.warm_start {
            params.warm_start = true;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.log_json);
    match cli.command {
        Commands::Solve {
            problem,
            qubo,
            convex,
            seed,
            tol,
            max_iters,
            time_limit,
            rho,
            beta,
            factor_c,
            two_block,
            warm_start,
            output,
            json,
        } => {
            let overrides = Overrides {
                tol,
                max_iters,
                time_limit,
                rho,
                beta,
                factor_c,
                two_block,
                warm_start,
            };
            solve_command(problem, qubo.into(), convex.into(), seed, &overrides, output, json)
        }
        Commands::Check { problem } => check_command(problem),
    }
}

fn initialize_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .try_init()
            .ok();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    }
}

fn solve_command(
    path: PathBuf,
    qubo: QuboBackend,
    convex: ConvexBackend,
    seed: u64,
    overrides: &Overrides,
    output: Option<PathBuf>,
    output_json: bool,
) -> Result<()> {
    let problem = read_json_problem(&path)?;
    let mut params = problem.parameters.unwrap_or_default();
    overrides.apply(&mut params)?;
    info!(path = %path.display(), ?qubo, ?convex, "loaded problem");

    let solver = HeuristicSolver::new()
        .params(params)
        .qubo_backend(qubo, seed)
        .convex_backend(convex);
    let result = solver
        .solve(&problem.model)
        .with_context(|| format!("failed to solve {:?}", path))?;
    emit_result(&result, output, output_json)
}

fn emit_result(result: &AdmmResult<Scalar>, output: Option<PathBuf>, output_json: bool) -> Result<()> {
    if output_json {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer_pretty(&mut handle, result)?;
        handle.write_all(b"\n")?;
        handle.flush()?;
    } else {
        println!(
            "termination: {}\nobjective: {:.6}\nfeasible: {}\niterations: {}\nbinary: {:?}\ncontinuous: {:?}",
            result.termination,
            result.objective_value,
            result.feasible,
            result.iterations,
            result.binary,
            result.continuous
        );
        if let Some(message) = &result.failure {
            println!("failure: {message}");
        }
    }
    if let Some(path) = output {
        write_result(path, result)?;
    }
    Ok(())
}

fn check_command(path: PathBuf) -> Result<()> {
    let problem = read_json_problem(&path)?;
    problem.model.validate().context("model validation failed")?;
    if let Some(params) = &problem.parameters {
        params
            .validate()
            .map_err(anyhow::Error::msg)
            .context("parameter validation failed")?;
    }
    println!(
        "model validation succeeded: {} binary, {} continuous variables",
        problem.model.num_binary, problem.model.num_continuous
    );
    Ok(())
}
