//! Subcommand pipelines: resolve, probe, collect, partition, report

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use hostsweep_core::{
    CollectError, CollectionOperation, ConnectivityFilter, ConsoleReporter, FleetCollector,
    LdapSearchDirectory, OutputMode, PingProber, ProbeMethod, Prober, Record, SearchContext,
    TargetResolver, TargetSet, TargetSpec, TcpProber, from_fn, partition,
};
use hostsweep_exec::LocalExecutor;
use hostsweep_inventory::{
    AssetInfoOperation, CommandOperation, DefaultExecutorFactory, ExecutorFactory,
    InstalledSoftwareOperation,
};
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::{CollectArgs, ReportArgs, TargetArgs};

const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Runs subcommands against one loaded configuration
pub(crate) struct Sweep {
    config: Config,
}

impl Sweep {
    pub(crate) fn new(config: Config) -> Self {
        Self { config }
    }

    /// Config values first, then command-line overrides, then the ambient domain
    fn search_context(&self, args: &TargetArgs) -> SearchContext {
        let directory = &self.config.directory;
        let mut context = SearchContext::new();

        if let Some(base) = args.search_base.as_ref().or(directory.search_base.as_ref()) {
            context = context.with_search_base(base.as_str());
        }
        if let Some(domain) = args.domain.as_ref().or(directory.domain.as_ref()) {
            context = context.with_domain(domain.as_str());
        }
        context.with_ambient_domain(Path::new(RESOLV_CONF))
    }

    fn resolver(&self, args: &TargetArgs) -> TargetResolver {
        let directory = &self.config.directory;
        let mut ldap = LdapSearchDirectory::new(Arc::new(LocalExecutor::new()))
            .with_extra_args(directory.ldapsearch_args.clone())
            .with_timeout(directory.ldapsearch_timeout());
        if let Some(uri) = &directory.ldap_uri {
            ldap = ldap.with_uri(uri.as_str());
        }
        TargetResolver::new(Arc::new(ldap), self.search_context(args))
    }

    async fn targets(&self, args: &TargetArgs) -> Result<TargetSet> {
        let spec = TargetSpec::parse(&args.target);
        let targets = self.resolver(args).resolve(&spec).await?;
        info!(count = targets.len(), "resolved targets");
        if targets.is_empty() {
            warn!(target = %args.target, "no hosts matched");
        }
        Ok(targets)
    }

    fn prober(&self) -> Arc<dyn Prober> {
        let probe = &self.config.probe;
        match probe.method {
            ProbeMethod::Ping => Arc::new(PingProber::new(
                Arc::new(LocalExecutor::new()),
                probe.timeout(),
            )),
            ProbeMethod::Tcp => Arc::new(TcpProber::new(probe.tcp_port, probe.timeout())),
        }
    }

    fn probe_count(&self, flag: Option<u32>) -> u32 {
        flag.unwrap_or(self.config.probe.count)
    }

    fn factory(&self) -> Arc<dyn ExecutorFactory> {
        Arc::new(DefaultExecutorFactory::new(self.config.ssh.clone()))
    }

    fn host_timeout(&self, report: &ReportArgs) -> Duration {
        report
            .timeout
            .map_or_else(|| self.config.collector.host_timeout(), Duration::from_secs)
    }

    /// `hostsweep resolve`
    pub(crate) async fn resolve(&self, args: &TargetArgs) -> Result<ExitCode> {
        let targets = self.targets(args).await?;
        for host in targets.iter() {
            println!("{host}");
        }
        Ok(exit_code(!targets.is_empty()))
    }

    /// `hostsweep ping`
    pub(crate) async fn ping(
        &self,
        target: &TargetArgs,
        report: &ReportArgs,
        probe_count: Option<u32>,
    ) -> Result<ExitCode> {
        let targets = self.targets(target).await?;
        let op = ping_operation(self.prober(), self.probe_count(probe_count));
        self.collect(&targets, report, op).await
    }

    /// `hostsweep asset`
    pub(crate) async fn asset(&self, args: &CollectArgs) -> Result<ExitCode> {
        let op =
            AssetInfoOperation::new(self.factory()).with_timeout(self.host_timeout(&args.report));
        self.run(args, Arc::new(op)).await
    }

    /// `hostsweep software`
    pub(crate) async fn software(&self, args: &CollectArgs) -> Result<ExitCode> {
        let op = InstalledSoftwareOperation::new(self.factory())
            .with_timeout(self.host_timeout(&args.report));
        self.run(args, Arc::new(op)).await
    }

    /// `hostsweep exec`
    pub(crate) async fn exec(
        &self,
        args: &CollectArgs,
        command: &str,
        column: &str,
    ) -> Result<ExitCode> {
        let op = CommandOperation::new(self.factory(), command)
            .with_column(column)
            .with_timeout(self.host_timeout(&args.report));
        self.run(args, Arc::new(op)).await
    }

    async fn run(&self, args: &CollectArgs, op: Arc<dyn CollectionOperation>) -> Result<ExitCode> {
        let mut targets = self.targets(&args.target).await?;

        if args.probe {
            let filter = ConnectivityFilter::new(self.prober(), Arc::new(ConsoleReporter));
            targets = filter
                .filter(&targets, self.probe_count(args.probe_count))
                .await;
            info!(online = targets.len(), "liveness filter applied");
        }

        self.collect(&targets, &args.report, op).await
    }

    #[instrument(skip_all, fields(operation = op.name(), hosts = targets.len()))]
    async fn collect(
        &self,
        targets: &TargetSet,
        report: &ReportArgs,
        op: Arc<dyn CollectionOperation>,
    ) -> Result<ExitCode> {
        let max_in_flight = report
            .concurrency
            .unwrap_or(self.config.collector.max_in_flight);
        let collector = FleetCollector::new(max_in_flight, self.host_timeout(report));

        let result = partition(collector.collect(targets, op).await);

        OutputMode::parse(&report.output).sink().emit(&result)?;
        println!("{}", result.summary());

        if result.rows.is_empty() {
            warn!("no rows collected");
        }
        Ok(exit_code(!result.rows.is_empty()))
    }
}

fn exit_code(produced: bool) -> ExitCode {
    if produced {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// One `Status` row per host that answers within `count` probes
fn ping_operation(prober: Arc<dyn Prober>, count: u32) -> Arc<dyn CollectionOperation> {
    Arc::new(from_fn("ping", move |host: String| {
        let prober = Arc::clone(&prober);
        async move {
            for _ in 0..count.max(1) {
                if prober.probe(&host).await {
                    return Ok(vec![Record::new(host.as_str()).with("Status", "online")]);
                }
            }
            Err(CollectError::connect("no reply to liveness probe"))
        }
    }))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct UpHosts(&'static [&'static str]);

    #[async_trait]
    impl Prober for UpHosts {
        async fn probe(&self, host: &str) -> bool {
            self.0.contains(&host)
        }
    }

    fn target_args(search_base: Option<&str>, domain: Option<&str>) -> TargetArgs {
        TargetArgs {
            target: String::new(),
            search_base: search_base.map(str::to_string),
            domain: domain.map(str::to_string),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.directory.domain = Some("corp.example.com".into());
        let sweep = Sweep::new(config);

        let from_config = sweep.search_context(&target_args(None, None));
        assert_eq!(
            from_config.search_root().as_deref(),
            Some("DC=corp,DC=example,DC=com")
        );

        let from_flag = sweep.search_context(&target_args(None, Some("lab.example.org")));
        assert_eq!(from_flag.domain(), Some("lab.example.org"));

        let base = sweep.search_context(&target_args(Some("OU=Labs,DC=corp"), None));
        assert_eq!(base.search_root().as_deref(), Some("OU=Labs,DC=corp"));
    }

    #[tokio::test]
    async fn test_ping_operation() {
        let op = ping_operation(Arc::new(UpHosts(&["up"])), 2);

        let rows = op.collect("up").await.unwrap();
        assert_eq!(rows[0].get("Status"), Some("online"));

        let err = op.collect("down").await.unwrap_err();
        assert!(matches!(err, CollectError::Connect(_)));
    }

    #[tokio::test]
    async fn test_empty_target_is_this_machine() {
        let sweep = Sweep::new(Config::default());
        let targets = sweep.targets(&target_args(None, None)).await.unwrap();
        assert_eq!(targets.iter().collect::<Vec<_>>(), vec!["127.0.0.1"]);
    }
}
