use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use calcit::auth::SharedSecret;
use calcit::config::{
    local_hostname, resolve_share_dir, worker_name_prefix, CoordinatorConfig, DispatchConfig,
    QueueServerConfig, RemoteShell, ServerEndpoint, WorkerConfig, DEFAULT_PORT,
};
use calcit::coordinator::{Coordinator, RunReport};
use calcit::dispatch::{RemoteDispatcher, WorkerLauncher};
use calcit::error::CalcitError;
use calcit::jobs::{load_job_file, prepare_jobs};
use calcit::shutdown::install_shutdown_handler;
use calcit::worker::{LocalPool, PoolMode, Worker, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "calcit")]
#[command(version)]
#[command(about = "Run batches of independent shell jobs across worker nodes")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Coordinate a run: serve the queues, start workers, collect results
    Run(RunArgs),

    /// Run a pool of workers on this node until the job queue is empty
    Pool(PoolArgs),

    /// Run a single worker until the job queue is empty
    Worker(WorkerArgs),
}

// =============================================================================
// Run Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct RunArgs {
    /// Job manifest: a .json array of jobs, or one command per line
    #[arg(long)]
    jobs: PathBuf,

    /// Worker nodes (comma-separated hostnames)
    #[arg(long, value_delimiter = ',')]
    nodes: Vec<String>,

    /// Number of workers started on each node
    #[arg(long, default_value = "1")]
    jobs_per_node: usize,

    /// Port the queue server listens on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Shared secret for the queue server, or "auto" to generate one
    #[arg(long, default_value = "auto")]
    secret: String,

    /// Remote shell used to reach the nodes (only "ssh" is supported)
    #[arg(long, default_value = "ssh")]
    remote_shell: String,

    /// Directory the workers are launched from (must be shared with the nodes)
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Directory holding the worker script templates
    #[arg(long, env = "CALCIT_SHARE")]
    share_dir: Option<PathBuf>,

    /// Hostname the workers use to reach this machine
    #[arg(long)]
    advertise_host: Option<String>,

    /// Path of the calcit binary on the worker nodes
    #[arg(long)]
    worker_bin: Option<PathBuf>,

    /// Run this many workers locally instead of dispatching to nodes
    #[arg(long, conflicts_with = "nodes")]
    local: Option<usize>,

    /// Give up if no result arrives within this many seconds
    #[arg(long)]
    result_timeout_secs: Option<u64>,

    /// Seconds to wait before closing the queue server
    #[arg(long, default_value = "3")]
    shutdown_grace_secs: u64,

    /// Only print the jobs that would be run
    #[arg(long)]
    dry_run: bool,

    /// Output format for the final report
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Worker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ConnectArgs {
    /// Queue server host
    #[arg(long)]
    host: String,

    /// Queue server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Shared secret of the queue server
    #[arg(long, env = "CALCIT_SECRET", hide_env_values = true)]
    secret: String,

    /// Milliseconds to wait after each job before pushing its result
    #[arg(long, default_value = "0")]
    post_delay_ms: u64,
}

impl ConnectArgs {
    fn worker_config(&self) -> WorkerConfig {
        let endpoint = ServerEndpoint::new(
            self.host.clone(),
            self.port,
            SharedSecret::new(self.secret.clone()),
        );
        WorkerConfig::new(endpoint).with_post_delay(Duration::from_millis(self.post_delay_ms))
    }
}

#[derive(Parser, Debug)]
struct PoolArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Number of workers to run
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Run workers as tasks in this process instead of child processes
    #[arg(long)]
    in_process: bool,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Worker name used in logs and results
    #[arg(long)]
    name: Option<String>,
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_coordinator(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let remote_shell: RemoteShell = args.remote_shell.parse()?;
    if args.local.is_none() && args.nodes.is_empty() && !args.dry_run {
        return Err(CalcitError::Config("no workers: pass --nodes or --local".to_string()).into());
    }

    let specs = load_job_file(&args.jobs)?;
    let jobs = prepare_jobs(&specs)?;

    let secret: SharedSecret = args.secret.parse()?;
    let bind_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let server = QueueServerConfig::new(bind_addr, secret)
        .with_shutdown_grace(Duration::from_secs(args.shutdown_grace_secs));

    let mut config = CoordinatorConfig::new(server).with_dry_run(args.dry_run);
    if let Some(timeout) = args.result_timeout_secs {
        config = config.with_result_timeout(Duration::from_secs(timeout));
    }

    let launcher: Box<dyn WorkerLauncher> = match args.local {
        Some(workers) => {
            config = config.with_advertise_host(
                args.advertise_host.unwrap_or_else(|| "127.0.0.1".to_string()),
            );
            Box::new(LocalPool::new(workers))
        }
        None => {
            config =
                config.with_advertise_host(args.advertise_host.unwrap_or_else(local_hostname));
            let worker_bin = match args.worker_bin {
                Some(bin) => bin,
                None => std::env::current_exe()?,
            };
            let work_dir = std::fs::canonicalize(&args.workdir)?;
            Box::new(RemoteDispatcher::new(DispatchConfig {
                nodes: args.nodes,
                jobs_per_node: args.jobs_per_node,
                work_dir,
                share_dir: resolve_share_dir(args.share_dir.as_deref()),
                remote_shell,
                worker_bin,
            }))
        }
    };

    tracing::info!(
        jobs = jobs.len(),
        port = args.port,
        advertise_host = %config.advertise_host,
        dry_run = config.dry_run,
        "Starting calcit run"
    );

    let cancel = install_shutdown_handler();
    let report = Coordinator::new(config)
        .run(jobs, launcher.as_ref(), cancel)
        .await?;

    print_report(&report, &args.output)?;
    if !report.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_pool(args: PoolArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if args.in_process {
        PoolMode::InProcess
    } else {
        PoolMode::Process {
            program: std::env::current_exe()?,
        }
    };

    let config = args.connect.worker_config();
    let summary = WorkerPool::new(config, args.workers).run(&mode).await;
    if summary.failed > 0 {
        return Err(format!("{} of {} workers failed", summary.failed, summary.workers).into());
    }
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args
        .connect
        .worker_config()
        .with_name(args.name.unwrap_or_else(worker_name_prefix));

    let worker = Worker::connect(&config).await?;
    worker.run().await?;
    Ok(())
}

fn print_report(
    report: &RunReport,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            println!("Run {}", report.outcome);
            println!("{}", "=".repeat(40));
            println!(
                "Completed: {} of {} jobs",
                report.completed, report.submitted
            );
            if !report.results.is_empty() {
                println!();
                println!("{:<30} {:>10}  WORKER", "JOB", "SECONDS");
                println!("{}", "-".repeat(60));
                for result in &report.results {
                    println!(
                        "{:<30} {:>10.2}  {}",
                        result.identifier, result.elapsed_seconds, result.worker
                    );
                }
            }
            if !report.missing.is_empty() {
                println!();
                println!("Missing results:");
                for identifier in &report.missing {
                    println!("  {}", identifier);
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Exit status for failures detected before anything was run.
const EXIT_CONFIGURATION: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Run(run_args) => run_coordinator(run_args).await,
        Commands::Pool(pool_args) => run_pool(pool_args).await,
        Commands::Worker(worker_args) => run_worker(worker_args).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<CalcitError>() {
            Some(err) if err.is_configuration() => {
                tracing::error!(error = %err, "Invalid configuration, nothing was run");
                std::process::exit(EXIT_CONFIGURATION);
            }
            _ => {
                tracing::error!(error = %e, "calcit failed");
                std::process::exit(1);
            }
        }
    }
}
