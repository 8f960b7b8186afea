use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cinder::config::{SchedulerConfig, WatcherConfig, WorkerConfig};
use cinder::error::CinderError;
use cinder::protocol::{client, Message};
use cinder::scheduler::Scheduler;
use cinder::shutdown::shutdown_token;
use cinder::watcher::Watcher;
use cinder::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "cinder")]
#[command(version)]
#[command(about = "A minimal continuous-integration cluster")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the scheduler
    Scheduler(SchedulerArgs),

    /// Start a worker agent
    Worker(WorkerArgs),

    /// Watch a repository and submit new commits for testing
    Watcher(WatcherArgs),

    /// Submit a single commit for testing
    Submit {
        /// Commit hash to test
        commit: String,

        #[command(flatten)]
        client: ClientArgs,
    },

    /// Check whether the scheduler is alive
    Status {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Subcommand Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SchedulerArgs {
    /// Host to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory for per-commit result files
    #[arg(long, default_value = ".")]
    results_dir: PathBuf,

    /// Interval between worker health sweeps, in milliseconds
    #[arg(long, default_value = "5000")]
    probe_interval_ms: u64,

    /// Interval between pending-commit recovery sweeps, in milliseconds
    #[arg(long, default_value = "5000")]
    retry_interval_ms: u64,

    /// Timeout applied to every outbound request, in milliseconds
    #[arg(long, default_value = "2000")]
    request_timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Host to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on; 0 picks an ephemeral port
    #[arg(long, default_value = "0")]
    port: u16,

    /// Host other processes should use to reach this worker
    #[arg(long, default_value = "127.0.0.1")]
    advertise_host: String,

    /// Scheduler address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    scheduler_addr: String,

    /// Path to the repository working copy to test in
    #[arg(long)]
    repo: PathBuf,

    /// Command run through `sh -c` to execute the project's tests
    #[arg(long, default_value = "cargo test")]
    test_command: String,

    /// Version-control executable
    #[arg(long, default_value = "git")]
    git_executable: String,

    /// Interval between scheduler liveness probes, in milliseconds
    #[arg(long, default_value = "5000")]
    probe_interval_ms: u64,

    /// Timeout applied to every outbound request, in milliseconds
    #[arg(long, default_value = "2000")]
    request_timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct WatcherArgs {
    /// Scheduler address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    scheduler_addr: String,

    /// Path to the repository working copy to watch
    #[arg(long)]
    repo: PathBuf,

    /// Version-control executable
    #[arg(long, default_value = "git")]
    git_executable: String,

    /// Interval between repository polls, in milliseconds
    #[arg(long, default_value = "5000")]
    poll_interval_ms: u64,

    /// Timeout applied to every outbound request, in milliseconds
    #[arg(long, default_value = "2000")]
    request_timeout_ms: u64,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Scheduler address (host:port)
    #[arg(long, short = 'a', default_value = "127.0.0.1:8080")]
    addr: String,

    /// Timeout for the request, in milliseconds
    #[arg(long, default_value = "2000")]
    request_timeout_ms: u64,
}

// =============================================================================
// Entry Points
// =============================================================================

#[tokio::main]
async fn main() -> cinder::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Scheduler(args) => run_scheduler(args).await,
        Commands::Worker(args) => run_worker(args).await,
        Commands::Watcher(args) => run_watcher(args).await,
        Commands::Submit { commit, client } => submit(commit, client).await,
        Commands::Status { client } => status(client).await,
    }
}

async fn run_scheduler(args: SchedulerArgs) -> cinder::Result<()> {
    let config = SchedulerConfig {
        listen_addr: SocketAddr::new(args.host, args.port),
        results_dir: args.results_dir,
        probe_interval: Duration::from_millis(args.probe_interval_ms),
        retry_interval: Duration::from_millis(args.retry_interval_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
    };

    let scheduler = Scheduler::bind(config).await?;
    scheduler.run(shutdown_token()).await
}

async fn run_worker(args: WorkerArgs) -> cinder::Result<()> {
    let config = WorkerConfig {
        listen_addr: SocketAddr::new(args.host, args.port),
        advertise_host: args.advertise_host,
        scheduler_addr: args.scheduler_addr,
        repo_path: args.repo,
        test_command: args.test_command,
        git_executable: args.git_executable,
        probe_interval: Duration::from_millis(args.probe_interval_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
    };

    let worker = Worker::bind(config).await?;
    worker.run(shutdown_token()).await
}

async fn run_watcher(args: WatcherArgs) -> cinder::Result<()> {
    let config = WatcherConfig {
        scheduler_addr: args.scheduler_addr,
        repo_path: args.repo,
        git_executable: args.git_executable,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
    };

    Watcher::new(config)?.run(shutdown_token()).await
}

async fn submit(commit: String, args: ClientArgs) -> cinder::Result<()> {
    let limit = Duration::from_millis(args.request_timeout_ms);
    match client::request(&args.addr, &Message::Test(commit.clone()), limit).await? {
        Message::Okay => {
            println!("Tests scheduled for {}", commit);
            Ok(())
        }
        Message::Fail => {
            println!("No idle worker, {} queued for retry", commit);
            Ok(())
        }
        other => Err(CinderError::UnexpectedReply(
            args.addr,
            format!("{:?}", other),
        )),
    }
}

async fn status(args: ClientArgs) -> cinder::Result<()> {
    let limit = Duration::from_millis(args.request_timeout_ms);
    match client::request(&args.addr, &Message::Status, limit).await {
        Ok(Message::Okay) => {
            println!("Scheduler at {} is alive", args.addr);
            Ok(())
        }
        _ => {
            eprintln!("Scheduler at {} is not answering", args.addr);
            std::process::exit(1);
        }
    }
}
