//! hostsweep-core: target resolution and fan-out collection engine
//!
//! Resolves a target specification to a host set, optionally narrows it to
//! reachable hosts, runs a collection operation against every host with
//! bounded concurrency, and partitions the outcomes for a report sink.

pub mod collector;
pub mod config;
pub mod directory;
pub mod error;
pub mod outcome;
pub mod partition;
pub mod probe;
pub mod report;
pub mod target;

pub use collector::{CollectionOperation, FleetCollector, FnOperation, from_fn};
pub use config::{CollectorConfig, DirectoryConfig, ProbeConfig, ProbeMethod};
pub use directory::{
    DirectoryService, LdapSearchDirectory, SearchContext, StaticDirectory, computer_prefix_filter,
};
pub use error::{CollectError, DirectoryError, ReportError, ResolutionError};
pub use outcome::{FailureKind, HostOutcome, Outcome, Record};
pub use partition::{CollectionResult, ErroredHost, Summary, partition};
pub use probe::{
    ConnectivityFilter, ConsoleReporter, PingProber, Prober, StatusReporter, TcpProber,
    TracingReporter,
};
pub use report::{CsvReportSink, OutputMode, ReportPaths, ReportSink, TableReportSink};
pub use target::{LOCALHOST, TargetResolver, TargetSet, TargetSpec, is_local_sentinel};
