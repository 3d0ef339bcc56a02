//! Splitting per-host outcomes into report rows and errored hosts

use std::fmt;

use crate::outcome::{FailureKind, HostOutcome, Outcome, Record};

/// A host that produced no data, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErroredHost {
    pub hostname: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// Aggregate of one collection run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionResult {
    /// Rows from successful hosts, stably sorted by hostname
    pub rows: Vec<Record>,
    /// Hosts that succeeded, including ones that returned no rows; sorted,
    /// each listed once
    pub succeeded_hosts: Vec<String>,
    /// Hosts that failed, sorted by hostname
    pub errored_hosts: Vec<ErroredHost>,
}

impl CollectionResult {
    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary {
            reported: self.succeeded_hosts.len(),
            errored: self.errored_hosts.len(),
            rows: self.rows.len(),
        }
    }

    /// Rebuild the per-host outcomes this result was partitioned from
    #[must_use]
    pub fn to_outcomes(&self) -> Vec<HostOutcome> {
        let mut outcomes: Vec<HostOutcome> = self
            .succeeded_hosts
            .iter()
            .map(|host| {
                let rows = self
                    .rows
                    .iter()
                    .filter(|r| r.hostname == *host)
                    .cloned()
                    .collect();
                HostOutcome::success(host.clone(), rows)
            })
            .collect();

        outcomes.extend(self.errored_hosts.iter().map(|e| match e.kind {
            FailureKind::ConnectFailure => {
                HostOutcome::connect_failure(e.hostname.clone(), e.detail.clone())
            }
            FailureKind::CollectionError => {
                HostOutcome::collection_error(e.hostname.clone(), e.detail.clone())
            }
        }));

        outcomes
    }
}

/// Counts shown to the operator after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub reported: usize,
    pub errored: usize,
    pub rows: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hosts reported data, {} hosts errored ({} rows)",
            self.reported, self.errored, self.rows
        )
    }
}

/// Partition outcomes into rows and errored hosts.
///
/// Every row is attributed to the host whose outcome carried it, so a row's
/// `hostname` always matches the host it was collected from.
pub fn partition<I>(outcomes: I) -> CollectionResult
where
    I: IntoIterator<Item = HostOutcome>,
{
    let mut result = CollectionResult::default();

    for HostOutcome { hostname, outcome } in outcomes {
        match outcome {
            Outcome::Success(rows) => {
                result.rows.extend(rows.into_iter().map(|mut row| {
                    row.hostname.clone_from(&hostname);
                    row
                }));
                result.succeeded_hosts.push(hostname);
            }
            Outcome::ConnectFailure(detail) => result.errored_hosts.push(ErroredHost {
                hostname,
                kind: FailureKind::ConnectFailure,
                detail,
            }),
            Outcome::CollectionError(detail) => result.errored_hosts.push(ErroredHost {
                hostname,
                kind: FailureKind::CollectionError,
                detail,
            }),
        }
    }

    // sort_by is stable: rows of one host keep their collection order
    result.rows.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    result.succeeded_hosts.sort();
    // repeated successes for one host merge into a single entry
    result.succeeded_hosts.dedup();
    result.errored_hosts.sort_by(|a, b| a.hostname.cmp(&b.hostname));

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(host: &str, name: &str) -> Record {
        Record::new(host).with("Name", name)
    }

    fn sample() -> Vec<HostOutcome> {
        vec![
            HostOutcome::success("ws-3", vec![app("ws-3", "vim"), app("ws-3", "curl")]),
            HostOutcome::connect_failure("ws-2", "no response within 120s"),
            HostOutcome::success("ws-1", vec![app("ws-1", "git")]),
            HostOutcome::collection_error("ws-0", "osqueryi not found"),
            HostOutcome::success("ws-4", Vec::new()),
        ]
    }

    #[test]
    fn test_rows_sorted_with_stable_ties() {
        let result = partition(sample());

        let rows: Vec<(&str, &str)> = result
            .rows
            .iter()
            .map(|r| (r.hostname.as_str(), r.get("Name").unwrap()))
            .collect();
        assert_eq!(rows, vec![("ws-1", "git"), ("ws-3", "vim"), ("ws-3", "curl")]);
    }

    #[test]
    fn test_partition_is_total_and_disjoint() {
        let result = partition(sample());

        assert_eq!(result.succeeded_hosts, vec!["ws-1", "ws-3", "ws-4"]);
        let errored: Vec<&str> = result
            .errored_hosts
            .iter()
            .map(|e| e.hostname.as_str())
            .collect();
        assert_eq!(errored, vec!["ws-0", "ws-2"]);
        assert_eq!(result.errored_hosts[1].kind, FailureKind::ConnectFailure);
        assert_eq!(
            result.succeeded_hosts.len() + result.errored_hosts.len(),
            sample().len()
        );
    }

    #[test]
    fn test_repartition_is_idempotent() {
        let once = partition(sample());
        let twice = partition(once.to_outcomes());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_repeated_host_merges_and_stays_idempotent() {
        let once = partition(vec![
            HostOutcome::success("a", vec![app("a", "1")]),
            HostOutcome::success("a", vec![app("a", "2")]),
        ]);
        assert_eq!(once.succeeded_hosts, vec!["a"]);
        assert_eq!(once.rows.len(), 2);

        let twice = partition(once.to_outcomes());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rows_take_outcome_hostname() {
        let result = partition(vec![HostOutcome::success(
            "10.0.0.7",
            vec![Record::new("WS-007").with("OS", "Debian")],
        )]);
        assert_eq!(result.rows[0].hostname, "10.0.0.7");
    }

    #[test]
    fn test_empty_input() {
        let result = partition(Vec::new());
        assert!(result.rows.is_empty());
        assert!(result.errored_hosts.is_empty());
        assert_eq!(result.summary().to_string(), "0 hosts reported data, 0 hosts errored (0 rows)");
    }
}
