use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Scheduler process configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub listen_addr: SocketAddr,
    /// Directory receiving one result file per completed commit.
    pub results_dir: PathBuf,
    /// Interval between health-monitor sweeps over the worker registry.
    pub probe_interval: Duration,
    /// Interval between recovery attempts for pending commits.
    pub retry_interval: Duration,
    /// Bound applied to every outbound probe or assignment exchange.
    pub request_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:8080"
                .parse()
                .expect("default listen address is valid"),
            results_dir: PathBuf::from("."),
            probe_interval: Duration::from_secs(5),
            retry_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Worker agent configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address the agent listens on; port 0 asks the OS for an ephemeral port.
    pub listen_addr: SocketAddr,
    /// Host peers should use to reach this agent; paired with the bound port.
    pub advertise_host: String,
    pub scheduler_addr: String,
    /// Working copy the test pipeline operates in.
    pub repo_path: PathBuf,
    /// Command handed to `sh -c` to run the project's tests.
    pub test_command: String,
    /// Version-control executable driving the pipeline's preparation steps.
    pub git_executable: String,
    /// Interval between scheduler liveness probes.
    pub probe_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:0"
                .parse()
                .expect("default listen address is valid"),
            advertise_host: "127.0.0.1".to_string(),
            scheduler_addr: "127.0.0.1:8080".to_string(),
            repo_path: PathBuf::from("."),
            test_command: "cargo test".to_string(),
            git_executable: "git".to_string(),
            probe_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
        }
    }
}

/// Repository watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub scheduler_addr: String,
    /// Working copy polled for new commits.
    pub repo_path: PathBuf,
    pub git_executable: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            scheduler_addr: "127.0.0.1:8080".to_string(),
            repo_path: PathBuf::from("."),
            git_executable: "git".to_string(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(2),
        }
    }
}
