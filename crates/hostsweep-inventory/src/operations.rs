//! Built-in collection operations

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use hostsweep_core::{CollectError, CollectionOperation, Record};
use hostsweep_exec::RemoteExecutor;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::InventoryError;
use crate::factory::ExecutorFactory;
use crate::osquery::OsqueryClient;
use crate::query::queries;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Close the session and hand back whatever the operation produced
async fn close<T>(executor: &dyn RemoteExecutor, host: &str, result: T) -> T {
    if let Err(e) = executor.disconnect().await {
        debug!(host = %host, error = %e, "disconnect failed");
    }
    result
}

/// One row per host describing OS, hardware and uptime
pub struct AssetInfoOperation {
    factory: Arc<dyn ExecutorFactory>,
    timeout: Duration,
}

impl AssetInfoOperation {
    pub fn new(factory: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            factory,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-query timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct OsVersionRow {
    name: String,
    version: String,
    #[serde(default)]
    platform: String,
    #[serde(default)]
    arch: String,
}

#[derive(Deserialize)]
struct SystemInfoRow {
    hostname: String,
    #[serde(default)]
    cpu_brand: String,
    #[serde(default)]
    cpu_logical_cores: String,
    #[serde(default)]
    physical_memory: String,
    #[serde(default)]
    hardware_vendor: String,
    #[serde(default)]
    hardware_model: String,
    #[serde(default)]
    hardware_serial: String,
}

#[derive(Deserialize)]
struct UptimeRow {
    total_seconds: String,
}

#[derive(Deserialize)]
struct KernelRow {
    version: String,
}

async fn asset_record(client: &OsqueryClient, host: &str) -> Result<Record, InventoryError> {
    let os: OsVersionRow = client.query_one(&queries::os_version()).await?;
    let sys: SystemInfoRow = client.query_one(&queries::system_info()).await?;
    let uptime: Option<UptimeRow> = client.query(&queries::uptime()).await?.into_iter().next();
    let kernel: Option<KernelRow> = client
        .query(&queries::kernel_info())
        .await?
        .into_iter()
        .next();

    let uptime = uptime
        .and_then(|r| r.total_seconds.parse::<u64>().ok())
        .map(format_uptime)
        .unwrap_or_default();
    let memory = sys
        .physical_memory
        .parse::<u64>()
        .map(format_gib)
        .unwrap_or_default();

    Ok(Record::new(host)
        .with("ComputerName", sys.hostname)
        .with("OS", os.name)
        .with("Version", os.version)
        .with("Platform", os.platform)
        .with("Arch", os.arch)
        .with("Kernel", kernel.map(|k| k.version).unwrap_or_default())
        .with("Uptime", uptime)
        .with("CPU", sys.cpu_brand.trim())
        .with("Cores", sys.cpu_logical_cores)
        .with("Memory", memory)
        .with("Vendor", sys.hardware_vendor.trim())
        .with("Model", sys.hardware_model.trim())
        .with("Serial", sys.hardware_serial.trim()))
}

fn format_uptime(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    format!("{days}d {hours}h {minutes}m")
}

#[allow(clippy::cast_precision_loss)]
fn format_gib(bytes: u64) -> String {
    format!("{:.1} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

#[async_trait]
impl CollectionOperation for AssetInfoOperation {
    #[instrument(skip(self), fields(operation = "asset"))]
    async fn collect(&self, hostname: &str) -> Result<Vec<Record>, CollectError> {
        let executor = self.factory.executor_for(hostname)?;
        let client = OsqueryClient::new(Arc::clone(&executor)).with_timeout(self.timeout);

        let result = asset_record(&client, hostname).await;
        let record = close(executor.as_ref(), hostname, result).await?;
        Ok(vec![record])
    }

    fn name(&self) -> &str {
        "asset"
    }
}

/// One row per installed package
pub struct InstalledSoftwareOperation {
    factory: Arc<dyn ExecutorFactory>,
    timeout: Duration,
}

impl InstalledSoftwareOperation {
    pub fn new(factory: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            factory,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct PackageRow {
    name: String,
    version: String,
    #[serde(default)]
    arch: String,
    #[serde(default)]
    install_time: Option<String>,
}

impl PackageRow {
    fn into_record(self, host: &str, source: &str) -> Record {
        let installed = self
            .install_time
            .and_then(|t| t.parse::<i64>().ok())
            .filter(|ts| *ts > 0)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        Record::new(host)
            .with("Name", self.name)
            .with("Version", self.version)
            .with("Arch", self.arch)
            .with("Source", source)
            .with("Installed", installed)
    }
}

/// deb first; rpm when the deb table is missing or empty
async fn package_records(
    client: &OsqueryClient,
    host: &str,
) -> Result<Vec<Record>, InventoryError> {
    match client.query::<PackageRow>(&queries::deb_packages()).await {
        Ok(rows) if !rows.is_empty() => {
            return Ok(rows.into_iter().map(|r| r.into_record(host, "deb")).collect());
        }
        Ok(_) | Err(InventoryError::TableNotAvailable(_)) => {
            debug!(host = %host, "no deb packages, trying rpm");
        }
        Err(e) => return Err(e),
    }

    let rows = client.query::<PackageRow>(&queries::rpm_packages()).await?;
    Ok(rows.into_iter().map(|r| r.into_record(host, "rpm")).collect())
}

#[async_trait]
impl CollectionOperation for InstalledSoftwareOperation {
    #[instrument(skip(self), fields(operation = "software"))]
    async fn collect(&self, hostname: &str) -> Result<Vec<Record>, CollectError> {
        let executor = self.factory.executor_for(hostname)?;
        let client = OsqueryClient::new(Arc::clone(&executor)).with_timeout(self.timeout);

        let result = package_records(&client, hostname).await;
        let records = close(executor.as_ref(), hostname, result).await?;
        debug!(host = %hostname, count = records.len(), "collected packages");
        Ok(records)
    }

    fn name(&self) -> &str {
        "software"
    }
}

/// Runs an arbitrary shell command; one row per non-blank output line.
///
/// A non-zero exit status is reported as a collection error carrying the
/// command's stderr.
pub struct CommandOperation {
    factory: Arc<dyn ExecutorFactory>,
    command: String,
    column: String,
    timeout: Duration,
}

impl CommandOperation {
    pub fn new(factory: Arc<dyn ExecutorFactory>, command: impl Into<String>) -> Self {
        Self {
            factory,
            command: command.into(),
            column: "Output".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Report column holding each output line
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CollectionOperation for CommandOperation {
    #[instrument(skip(self), fields(operation = "exec"))]
    async fn collect(&self, hostname: &str) -> Result<Vec<Record>, CollectError> {
        let executor = self.factory.executor_for(hostname)?;

        let result = executor.run_with_timeout(&self.command, self.timeout).await;
        let output = close(executor.as_ref(), hostname, result).await?.into_success()?;

        Ok(output
            .stdout_lines()
            .map(|line| Record::new(hostname).with(self.column.as_str(), line))
            .collect())
    }

    fn name(&self) -> &str {
        "exec"
    }
}

#[cfg(test)]
mod tests {
    use hostsweep_exec::ExecError;

    use super::*;
    use crate::osquery::testing::ScriptedExecutor;

    struct FixedFactory(Arc<ScriptedExecutor>);

    impl ExecutorFactory for FixedFactory {
        fn executor_for(&self, _host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
            Ok(self.0.clone())
        }
    }

    fn factory(executor: ScriptedExecutor) -> Arc<dyn ExecutorFactory> {
        Arc::new(FixedFactory(Arc::new(executor)))
    }

    #[tokio::test]
    async fn test_asset_info_single_row() {
        let executor = ScriptedExecutor::new()
            .answer(
                "FROM os_version",
                0,
                r#"[{"name":"Ubuntu","version":"24.04 LTS","platform":"ubuntu","arch":"x86_64"}]"#,
                "",
            )
            .answer(
                "FROM system_info",
                0,
                concat!(
                    r#"[{"hostname":"ws-001","cpu_brand":"Intel Xeon ","cpu_logical_cores":"8","#,
                    r#""physical_memory":"17179869184","hardware_vendor":"Dell","#,
                    r#""hardware_model":"OptiPlex","hardware_serial":"ABC123"}]"#,
                ),
                "",
            )
            .answer("FROM uptime", 0, r#"[{"total_seconds":"93784"}]"#, "")
            .answer("FROM kernel_info", 0, r#"[{"version":"6.8.0"}]"#, "");

        let rows = AssetInfoOperation::new(factory(executor))
            .collect("ws-001")
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.hostname, "ws-001");
        assert_eq!(row.get("OS"), Some("Ubuntu"));
        assert_eq!(row.get("Uptime"), Some("1d 2h 3m"));
        assert_eq!(row.get("Memory"), Some("16.0 GiB"));
        assert_eq!(row.get("CPU"), Some("Intel Xeon"));
        assert_eq!(row.get("Kernel"), Some("6.8.0"));
    }

    #[tokio::test]
    async fn test_asset_info_without_osquery_is_collection_error() {
        let executor =
            ScriptedExecutor::new().answer("osqueryi", 127, "", "sh: 1: osqueryi: not found");

        let err = AssetInfoOperation::new(factory(executor))
            .collect("ws-001")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Operation(ref m) if m.contains("osquery not found")));
    }

    #[tokio::test]
    async fn test_software_falls_back_to_rpm() {
        let executor = ScriptedExecutor::new()
            .answer("FROM deb_packages", 1, "", "Error: no such table: deb_packages")
            .answer(
                "FROM rpm_packages",
                0,
                concat!(
                    r#"[{"name":"bash","version":"5.2.26","arch":"x86_64","#,
                    r#""install_time":"1700000000"}]"#,
                ),
                "",
            );

        let rows = InstalledSoftwareOperation::new(factory(executor))
            .collect("rh-01")
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Name"), Some("bash"));
        assert_eq!(rows[0].get("Source"), Some("rpm"));
        assert_eq!(rows[0].get("Installed"), Some("2023-11-14 22:13:20"));
    }

    #[tokio::test]
    async fn test_software_prefers_deb() {
        let executor = ScriptedExecutor::new().answer(
            "FROM deb_packages",
            0,
            concat!(
                r#"[{"name":"bash","version":"5.2","arch":"amd64"},"#,
                r#"{"name":"curl","version":"8.5","arch":"amd64"}]"#,
            ),
            "",
        );

        let rows = InstalledSoftwareOperation::new(factory(executor))
            .collect("deb-01")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.get("Source") == Some("deb")));
        assert_eq!(rows[1].get("Installed"), Some(""));
    }

    #[tokio::test]
    async fn test_command_one_row_per_line() {
        let executor =
            ScriptedExecutor::new().answer("who", 0, "alice pts/0\n\n  bob pts/1  \n", "");

        let rows = CommandOperation::new(factory(executor), "who")
            .with_column("Session")
            .collect("ws-001")
            .await
            .unwrap();

        let sessions: Vec<_> = rows.iter().filter_map(|r| r.get("Session")).collect();
        assert_eq!(sessions, vec!["alice pts/0", "bob pts/1"]);
    }

    #[tokio::test]
    async fn test_command_nonzero_exit_is_collection_error() {
        let executor = ScriptedExecutor::new().answer("false", 1, "", "nope");

        let err = CommandOperation::new(factory(executor), "false")
            .collect("ws-001")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Operation(_)));
    }

    #[tokio::test]
    async fn test_command_transport_failure_is_connect_failure() {
        let executor = ScriptedExecutor::new()
            .fail("uptime", ExecError::ConnectionFailed("no route to host".into()));

        let err = CommandOperation::new(factory(executor), "uptime")
            .collect("ws-001")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Connect(_)));
    }
}
