//! Concurrent fan-out of a collection operation across a target set

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::outcome::{HostOutcome, Outcome, Record};
use crate::target::TargetSet;

/// Per-host unit of work supplied by a report.
///
/// Return [`CollectError::Connect`] when the host could not be reached and
/// [`CollectError::Operation`] when it was reached but the query failed.
#[async_trait]
pub trait CollectionOperation: Send + Sync {
    async fn collect(&self, hostname: &str) -> Result<Vec<Record>, CollectError>;

    /// Name used in logs
    fn name(&self) -> &str {
        "collection"
    }
}

/// [`CollectionOperation`] backed by an async closure
pub struct FnOperation<F> {
    name: String,
    f: F,
}

/// Wrap an async closure taking the hostname
pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> FnOperation<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Record>, CollectError>> + Send + 'static,
{
    FnOperation {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> CollectionOperation for FnOperation<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Record>, CollectError>> + Send + 'static,
{
    async fn collect(&self, hostname: &str) -> Result<Vec<Record>, CollectError> {
        (self.f)(hostname.to_string()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs one operation against every host with bounded concurrency.
///
/// Every host yields exactly one [`HostOutcome`]; a slow, failing or
/// panicking host never affects the others.
#[derive(Debug, Clone)]
pub struct FleetCollector {
    max_in_flight: usize,
    host_timeout: Duration,
}

impl Default for FleetCollector {
    fn default() -> Self {
        Self::from_config(&CollectorConfig::default())
    }
}

impl FleetCollector {
    /// `max_in_flight` is clamped to at least one
    #[must_use]
    pub fn new(max_in_flight: usize, host_timeout: Duration) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            host_timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(config.max_in_flight, config.host_timeout())
    }

    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Collect from every target. An empty set yields an empty vector.
    #[instrument(skip_all, fields(operation = op.name(), targets = targets.len()))]
    pub async fn collect(
        &self,
        targets: &TargetSet,
        op: Arc<dyn CollectionOperation>,
    ) -> Vec<HostOutcome> {
        if targets.is_empty() {
            return Vec::new();
        }

        let slots = Arc::new(Semaphore::new(self.max_in_flight));
        let mut handles = Vec::with_capacity(targets.len());

        for host in targets.iter() {
            let hostname = host.to_string();
            let op = Arc::clone(&op);
            let slots = Arc::clone(&slots);
            let host_timeout = self.host_timeout;

            let handle = tokio::spawn(async move {
                let Ok(_permit) = slots.acquire_owned().await else {
                    return HostOutcome::collection_error(hostname, "collector shut down");
                };
                collect_host(hostname, op.as_ref(), host_timeout).await
            });

            handles.push((host.to_string(), handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (hostname, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(host = %hostname, error = %e, "collection task panicked");
                    outcomes.push(HostOutcome::collection_error(
                        hostname,
                        format!("collection task failed: {e}"),
                    ));
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            succeeded,
            failed = outcomes.len() - succeeded,
            "collection finished"
        );

        outcomes
    }
}

async fn collect_host(
    hostname: String,
    op: &dyn CollectionOperation,
    host_timeout: Duration,
) -> HostOutcome {
    let start = Instant::now();

    let outcome = match timeout(host_timeout, op.collect(&hostname)).await {
        Ok(result) => HostOutcome::from_result(hostname, result),
        Err(_) => HostOutcome::connect_failure(
            hostname,
            format!("no response within {host_timeout:?}"),
        ),
    };

    match &outcome.outcome {
        Outcome::Success(rows) => debug!(
            host = %outcome.hostname,
            rows = rows.len(),
            elapsed = ?start.elapsed(),
            "host collected"
        ),
        Outcome::ConnectFailure(detail) => {
            warn!(host = %outcome.hostname, error = %detail, "host unreachable");
        }
        Outcome::CollectionError(detail) => {
            warn!(host = %outcome.hostname, error = %detail, "collection failed on host");
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::outcome::FailureKind;

    fn hosts(names: &[&str]) -> TargetSet {
        names.iter().collect()
    }

    #[tokio::test]
    async fn test_empty_targets_yield_nothing() {
        let op = Arc::new(from_fn("never", |_host: String| async {
            Err(CollectError::operation("must not be called"))
        }));
        let outcomes = FleetCollector::default().collect(&TargetSet::new(), op).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_failures_stay_with_their_host() {
        let op = Arc::new(from_fn("mixed", |host: String| async move {
            match host.as_str() {
                "down" => Err(CollectError::connect("connection refused")),
                "broken" => Err(CollectError::operation("no such table: programs")),
                _ => Ok(vec![Record::new(host.clone()).with("Status", "ok")]),
            }
        }));

        let outcomes = FleetCollector::new(4, Duration::from_secs(5))
            .collect(&hosts(&["up", "down", "broken"]), op)
            .await;

        assert_eq!(outcomes.len(), 3);
        let kind = |name: &str| {
            outcomes
                .iter()
                .find(|o| o.hostname == name)
                .map(HostOutcome::failure_kind)
                .unwrap()
        };
        assert_eq!(kind("up"), None);
        assert_eq!(kind("down"), Some(FailureKind::ConnectFailure));
        assert_eq!(kind("broken"), Some(FailureKind::CollectionError));
    }

    #[tokio::test]
    async fn test_timeout_is_a_connect_failure() {
        let op = Arc::new(from_fn("slow", |host: String| async move {
            if host == "h2" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(vec![Record::new(host)])
        }));

        let outcomes = FleetCollector::new(8, Duration::from_millis(100))
            .collect(&hosts(&["h1", "h2", "h3"]), op)
            .await;

        assert_eq!(outcomes.len(), 3);
        let h2 = outcomes.iter().find(|o| o.hostname == "h2").unwrap();
        assert_eq!(h2.failure_kind(), Some(FailureKind::ConnectFailure));
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
    }

    #[tokio::test]
    async fn test_panicking_operation_is_attributed() {
        let op = Arc::new(from_fn("panicky", |host: String| async move {
            if host == "boom" {
                panic!("operation bug");
            }
            Ok(Vec::new())
        }));

        let outcomes = FleetCollector::new(2, Duration::from_secs(5))
            .collect(&hosts(&["boom", "fine"]), op)
            .await;

        let boom = outcomes.iter().find(|o| o.hostname == "boom").unwrap();
        assert_eq!(boom.failure_kind(), Some(FailureKind::CollectionError));
        assert!(outcomes.iter().any(|o| o.hostname == "fine" && o.is_success()));
    }

    #[tokio::test]
    async fn test_in_flight_reaches_but_never_exceeds_limit() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let op = {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            Arc::new(from_fn("counted", move |host: String| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(vec![Record::new(host)])
                }
            }))
        };

        let targets: TargetSet = (0..10).map(|i| format!("host-{i}")).collect();
        let start = Instant::now();
        let outcomes = FleetCollector::new(3, Duration::from_secs(5))
            .collect(&targets, op)
            .await;
        let elapsed = start.elapsed();

        assert_eq!(outcomes.len(), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        // four waves of 50ms; one host at a time would take 500ms
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_queued_hosts_keep_their_full_timeout() {
        let op = Arc::new(from_fn("steady", |host: String| async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok(vec![Record::new(host)])
        }));

        // the last host waits 160ms for its slot, longer than the budget
        let outcomes = FleetCollector::new(1, Duration::from_millis(150))
            .collect(&hosts(&["q1", "q2", "q3"]), op)
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(HostOutcome::is_success), "{outcomes:?}");
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(FleetCollector::new(0, Duration::from_secs(1)).max_in_flight(), 1);
    }
}
