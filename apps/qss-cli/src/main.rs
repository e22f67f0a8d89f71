use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use qss_project::{ProjectError, Scenario, compile_scenario};
use qss_sim::{SimError, SimOptions, SimRecord, run_network};
use qss_solver::StepperRegistry;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "qss-cli")]
#[command(about = "QSS CLI - quantized-state integration of scenario files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate scenario file syntax and structure
    Validate {
        /// Path to the scenario file (YAML, or JSON by extension)
        scenario_path: PathBuf,
    },
    /// List available steppers
    Solvers,
    /// Run a scenario
    Run {
        /// Path to the scenario file
        scenario_path: PathBuf,
        /// Stepper to use instead of the scenario's
        #[arg(long)]
        solver: Option<String>,
        /// Error tolerance to use instead of the scenario's
        #[arg(long)]
        tolerance: Option<f64>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a scenario once per tolerance and compare event counts
    Sweep {
        /// Path to the scenario file
        scenario_path: PathBuf,
        /// Comma-separated error tolerances
        #[arg(long, value_delimiter = ',', required = true)]
        tolerances: Vec<f64>,
    },
}

fn main() -> CliResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Solvers => cmd_solvers(),
        Commands::Run {
            scenario_path,
            solver,
            tolerance,
            output,
        } => cmd_run(&scenario_path, solver, tolerance, output.as_deref()),
        Commands::Sweep {
            scenario_path,
            tolerances,
        } => cmd_sweep(&scenario_path, &tolerances),
    }
}

fn cmd_validate(scenario_path: &Path) -> CliResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = qss_project::load(scenario_path)?;
    println!(
        "✓ Scenario '{}' is valid ({} integrators)",
        scenario.name,
        scenario.integrators.len()
    );
    Ok(())
}

fn cmd_solvers() -> CliResult<()> {
    println!("Available steppers:");
    for name in StepperRegistry::with_builtin().names() {
        println!("  {}", name);
    }
    Ok(())
}

fn run_scenario(
    scenario: &Scenario,
    solver: Option<&str>,
    tolerance: Option<f64>,
) -> CliResult<SimRecord> {
    let (mut director, nodes) = compile_scenario(scenario)?;
    if let Some(solver) = solver {
        tracing::debug!(solver, "overriding scenario stepper");
        director.select_stepper_kind(solver);
    }
    if let Some(tolerance) = tolerance {
        tracing::debug!(tolerance, "overriding scenario error tolerance");
        director.set_error_tolerance(tolerance)?;
    }
    Ok(run_network(director, &nodes, &SimOptions::default())?)
}

fn cmd_run(
    scenario_path: &Path,
    solver: Option<String>,
    tolerance: Option<f64>,
    output: Option<&Path>,
) -> CliResult<()> {
    let scenario = qss_project::load(scenario_path)?;
    eprintln!("Running scenario: {}", scenario.name);

    let start = Instant::now();
    let record = run_scenario(&scenario, solver.as_deref(), tolerance)?;
    let elapsed = start.elapsed().as_secs_f64();

    match output {
        Some(path) => {
            let mut file = io::BufWriter::new(std::fs::File::create(path)?);
            write_csv(&mut file, &record)?;
            file.flush()?;
            eprintln!("✓ Wrote {} samples to {}", record.samples.len(), path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            write_csv(&mut lock, &record)?;
        }
    }

    eprintln!("✓ Simulation completed in {:.3}s", elapsed);
    eprintln!("  End time: {}", record.end_time);
    eprintln!("  Firings: {}", record.firings);
    for (name, stats) in record.names.iter().zip(&record.stats) {
        eprintln!(
            "  {}: {} outputs, {} quantization events, {} rate events",
            name, stats.outputs, stats.quantization_events, stats.rate_events
        );
    }
    record.timings.print_summary();
    Ok(())
}

fn write_csv(out: &mut impl Write, record: &SimRecord) -> io::Result<()> {
    writeln!(out, "time,integrator,value")?;
    for sample in &record.samples {
        writeln!(
            out,
            "{},{},{}",
            sample.time, record.names[sample.actor], sample.value
        )?;
    }
    Ok(())
}

fn cmd_sweep(scenario_path: &Path, tolerances: &[f64]) -> CliResult<()> {
    let scenario = qss_project::load(scenario_path)?;
    println!("Sweeping scenario: {}", scenario.name);

    let results: Vec<(f64, CliResult<SimRecord>)> = tolerances
        .par_iter()
        .map(|&tolerance| (tolerance, run_scenario(&scenario, None, Some(tolerance))))
        .collect();

    println!("{:>12}  {:>12}  {:>10}", "tolerance", "q-events", "outputs");
    for (tolerance, result) in results {
        let record = result?;
        let outputs: u64 = record.stats.iter().map(|s| s.outputs).sum();
        println!(
            "{:>12.3e}  {:>12}  {:>10}",
            tolerance,
            record.total_quantization_events(),
            outputs
        );
    }
    Ok(())
}
