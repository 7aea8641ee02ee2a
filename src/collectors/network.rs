use crate::collectors::NetworkProber;
use crate::config::NetworkCheckConfig;
use crate::report::{NetworkResult, OrderedMap};
use async_trait::async_trait;
use futures::future::join_all;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, warn};

#[cfg(windows)]
const PING_COUNT_FLAG: &str = "-n";
#[cfg(not(windows))]
const PING_COUNT_FLAG: &str = "-c";

/// What a single echo request ended with. The report only keeps
/// `is_up()`, the rest goes to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Reachable,
    Unreachable,
    TimedOut,
    ToolMissing,
    Failed,
}

impl PingOutcome {
    pub fn is_up(self) -> bool {
        matches!(self, Self::Reachable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
    TimedOut,
}

impl PortState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

#[derive(Debug, Clone)]
pub struct SystemNetwork {
    ping_command: String,
    ping_timeout: Duration,
    port_timeout: Duration,
}

impl SystemNetwork {
    pub fn new(ping_command: impl Into<String>, ping_timeout: Duration, port_timeout: Duration) -> Self {
        Self {
            ping_command: ping_command.into(),
            ping_timeout,
            port_timeout,
        }
    }

    pub fn from_config(cfg: &NetworkCheckConfig) -> Self {
        Self::new(cfg.ping_command.clone(), cfg.ping_timeout(), cfg.port_timeout())
    }
}

#[async_trait]
impl NetworkProber for SystemNetwork {
    async fn ping(&self, host: &str) -> PingOutcome {
        if host.starts_with('-') {
            return PingOutcome::Failed;
        }

        let spawned = Command::new(&self.ping_command)
            .args([PING_COUNT_FLAG, "1", host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) if err.kind() == ErrorKind::NotFound => return PingOutcome::ToolMissing,
            Err(err) => {
                debug!(host = %host, command = %self.ping_command, error = %err, "ping spawn failed");
                return PingOutcome::Failed;
            }
        };

        match time::timeout(self.ping_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => PingOutcome::Reachable,
            Ok(Ok(_)) => PingOutcome::Unreachable,
            Ok(Err(err)) => {
                debug!(host = %host, error = %err, "ping wait failed");
                PingOutcome::Failed
            }
            Err(_elapsed) => PingOutcome::TimedOut,
        }
    }

    async fn connect(&self, host: &str, port: u16) -> PortState {
        match time::timeout(self.port_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => PortState::Open,
            Ok(Err(err)) => {
                debug!(host = %host, port, error = %err, "tcp connect failed");
                PortState::Closed
            }
            Err(_elapsed) => PortState::TimedOut,
        }
    }
}

pub async fn ping_host(prober: &dyn NetworkProber, host: &str) -> bool {
    let outcome = prober.ping(host).await;
    if !outcome.is_up() {
        warn!(host = %host, outcome = ?outcome, "ping failed");
    }
    outcome.is_up()
}

pub async fn check_port(prober: &dyn NetworkProber, host: &str, port: u16) -> bool {
    let state = prober.connect(host, port).await;
    if !state.is_open() {
        warn!(host = %host, port, state = ?state, "port check failed");
    }
    state.is_open()
}

/// Runs every ping and port check concurrently, at most `max_concurrency` at
/// a time. Result keys follow the order of `hosts` and `ports`.
pub async fn run_network_checks(
    prober: &dyn NetworkProber,
    hosts: &[String],
    ports: &OrderedMap<String, Vec<u16>>,
    max_concurrency: usize,
) -> NetworkResult {
    let limiter = Semaphore::new(max_concurrency.max(1));
    let limiter = &limiter;

    let pings = hosts.iter().map(|host| async move {
        let _permit = limiter.acquire().await.ok();
        (host.clone(), ping_host(prober, host).await)
    });

    let port_checks = ports
        .iter()
        .flat_map(|(host, ports)| ports.iter().map(move |port| (host, *port)))
        .map(|(host, port)| async move {
            let _permit = limiter.acquire().await.ok();
            (host, port, check_port(prober, host, port).await)
        });

    let (pinged, probed) = tokio::join!(join_all(pings), join_all(port_checks));

    let mut port_results: OrderedMap<String, OrderedMap<u16, bool>> = ports
        .keys()
        .map(|host| (host.clone(), OrderedMap::new()))
        .collect();
    for (host, port, open) in probed {
        if let Some(per_host) = port_results.get_mut(host.as_str()) {
            per_host.insert(port, open);
        }
    }

    NetworkResult {
        ping_results: pinged.into_iter().collect(),
        port_results,
    }
}
