mod cleanup;
mod config;
mod logline;
mod metrics;
mod orchestrator;
mod pipeline;
mod prompt;
mod report;
mod runner;
mod scanner;
mod signals;
mod watchdog;

use clap::{Parser, Subcommand};
use config::{BenchConfig, PolyModulusDegree, ProcessCount};
use pipeline::{CycleSummary, PipelineError};
use signals::Shutdown;
use std::path::PathBuf;

/// Run a benchmark binary across parallel processes and aggregate the
/// per-process timing logs into a single report.
#[derive(Parser, Debug)]
#[command(name = "benchfan", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file path
    #[arg(short, long, global = true, default_value = "benchfan.toml")]
    config: PathBuf,

    /// Log directory (overrides config)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Report file (overrides config)
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Leave log files in place after the report is written
    #[arg(long, global = true)]
    keep_logs: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug logging (per-process spawn details, scanned files)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run benchmark cycles, prompting for settings unless given (default)
    Run {
        /// Number of parallel benchmark processes
        #[arg(short = 'n', long, requires = "degree")]
        processes: Option<u32>,

        /// poly_modulus_degree passed to the benchmark
        #[arg(short, long, requires = "processes")]
        degree: Option<PolyModulusDegree>,

        /// Benchmark binary (overrides config)
        #[arg(long)]
        binary: Option<String>,

        /// Per-process deadline in seconds, 0 for none (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Aggregate the logs already in the log directory
    Aggregate {
        /// Also print the aggregate results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every log file in the log directory
    Clean,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(dir) = cli.log_dir {
        config.logs.dir = dir;
    }
    if let Some(path) = cli.report {
        config.report.path = path;
    }

    let command = cli.command.unwrap_or(Command::Run {
        processes: None,
        degree: None,
        binary: None,
        timeout: None,
    });

    if let Command::Run {
        binary, timeout, ..
    } = &command
    {
        if let Some(binary) = binary {
            config.runner.command = binary.clone();
        }
        if let Some(timeout) = timeout {
            config.orchestrator.timeout_secs = *timeout;
        }
    }

    if cli.dry_run {
        println!("benchfan v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("{config:#?}");
        println!(
            "Max parallel processes on this host: {}",
            config.orchestrator.effective_max_processes()
        );
        println!("Dry run mode, not running.");
        return Ok(());
    }

    match command {
        Command::Run {
            processes, degree, ..
        } => run_benchmarks(&config, processes, degree, cli.keep_logs).await,
        Command::Aggregate { json } => {
            let aggregation = pipeline::aggregate_and_report(&config, cli.keep_logs)?;
            if json {
                match serde_json::to_string_pretty(&aggregation) {
                    Ok(out) => println!("{out}"),
                    Err(e) => tracing::warn!(error = %e, "failed to serialize aggregation"),
                }
            }
            print_done(&config);
            Ok(())
        }
        Command::Clean => {
            let removed = cleanup::clear(&config.logs.dir)?;
            println!("Removed {removed} log file(s) from {}.", config.logs.dir.display());
            Ok(())
        }
    }
}

/// One cycle when both settings are given on the command line, otherwise
/// prompt and run cycles until the operator enters 0.
async fn run_benchmarks(
    config: &BenchConfig,
    processes: Option<u32>,
    degree: Option<PolyModulusDegree>,
    keep_logs: bool,
) -> Result<(), PipelineError> {
    let max_processes = config.orchestrator.effective_max_processes();
    let shutdown = Shutdown::install();

    if let (Some(processes), Some(degree)) = (processes, degree) {
        let processes = ProcessCount::new(processes, max_processes)?;
        let summary = pipeline::run_cycle(config, processes, degree, &shutdown, keep_logs).await?;
        log_summary(&summary);
        print_done(config);
        return Ok(());
    }

    loop {
        let request = prompt::ask_interruptible(
            move || {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                let mut output = std::io::stdout();
                prompt::ask(&mut input, &mut output, max_processes)
            },
            &shutdown,
        )
        .await?;
        let Some(request) = request else {
            return Err(PipelineError::Interrupted);
        };

        match request {
            prompt::Request::Exit => return Ok(()),
            prompt::Request::Run { processes, degree } => {
                let summary =
                    pipeline::run_cycle(config, processes, degree, &shutdown, keep_logs).await?;
                log_summary(&summary);
                print_done(config);
            }
        }
    }
}

fn log_summary(summary: &CycleSummary) {
    tracing::info!(
        processes = summary.fan_out.outcomes.len(),
        succeeded = summary.fan_out.succeeded(),
        metrics = summary.aggregation.results.len(),
        per_core = summary.aggregation.per_core_task_estimate,
        "benchmark cycle complete"
    );
    let failed = summary.fan_out.failed().count();
    if failed > 0 {
        tracing::warn!(
            failed,
            total = summary.fan_out.outcomes.len(),
            "some benchmark processes failed; report covers the logs they left"
        );
    }
}

fn print_done(config: &BenchConfig) {
    println!(
        "Ok, Done. Please check the report at {}.\n",
        config.report.path.display()
    );
}
