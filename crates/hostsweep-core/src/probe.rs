//! Liveness probing ahead of a collection run

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use hostsweep_exec::RemoteExecutor;
use hostsweep_exec::shell::quote as shell_quote;

use crate::target::TargetSet;

/// One liveness check against one host
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str) -> bool;
}

/// ICMP echo through the system `ping` (iputils flags)
pub struct PingProber {
    executor: Arc<dyn RemoteExecutor>,
    timeout: Duration,
}

impl PingProber {
    pub fn new(executor: Arc<dyn RemoteExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    fn command(&self, host: &str) -> String {
        // -W takes whole seconds
        let wait = self.timeout.as_secs().max(1);
        format!("ping -c 1 -W {wait} {}", shell_quote(host))
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, host: &str) -> bool {
        let budget = self.timeout + Duration::from_secs(1);
        match self.executor.run_with_timeout(&self.command(host), budget).await {
            Ok(result) => result.success(),
            Err(e) => {
                debug!(host = %host, error = %e, "ping could not run");
                false
            }
        }
    }
}

/// TCP connect to a management port.
///
/// A refused connection still proves the host is up.
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str) -> bool {
        match timeout(self.timeout, TcpStream::connect((host, self.port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => e.kind() == ErrorKind::ConnectionRefused,
            Err(_elapsed) => false,
        }
    }
}

/// Receives one online/offline verdict per probed host
pub trait StatusReporter: Send + Sync {
    fn report(&self, host: &str, online: bool);
}

/// Prints `<host> is online` / `<host> is offline` to stdout
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn report(&self, host: &str, online: bool) {
        if online {
            println!("{host} is online");
        } else {
            println!("{host} is offline");
        }
    }
}

/// Emits verdicts as tracing events
#[derive(Debug, Default)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, host: &str, online: bool) {
        info!(host = %host, online, "probe result");
    }
}

/// Narrows a target set to hosts that answer a probe.
///
/// Hosts are probed one after another.
pub struct ConnectivityFilter {
    prober: Arc<dyn Prober>,
    reporter: Arc<dyn StatusReporter>,
}

impl ConnectivityFilter {
    pub fn new(prober: Arc<dyn Prober>, reporter: Arc<dyn StatusReporter>) -> Self {
        Self { prober, reporter }
    }

    /// Keep hosts where any of `probe_count` probes succeeds (at least one is sent).
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn filter(&self, targets: &TargetSet, probe_count: u32) -> TargetSet {
        let attempts = probe_count.max(1);
        let mut online = TargetSet::new();

        for host in targets.iter() {
            let mut alive = false;
            for _ in 0..attempts {
                if self.prober.probe(host).await {
                    alive = true;
                    break;
                }
            }
            self.reporter.report(host, alive);
            if alive {
                online.insert(host);
            }
        }

        info!(
            online = online.len(),
            offline = targets.len() - online.len(),
            "connectivity filter finished"
        );
        online
    }
}
