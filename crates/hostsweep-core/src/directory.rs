//! Directory-service lookup of computer objects by name prefix

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, instrument, warn};

use hostsweep_exec::RemoteExecutor;
use hostsweep_exec::shell::quote as shell_quote;

use crate::error::DirectoryError;

/// Exit status a shell reports for a missing command
const COMMAND_NOT_FOUND: i32 = 127;

/// `LDAP_SIZELIMIT_EXCEEDED`
const SIZE_LIMIT_EXCEEDED: i32 = 4;

/// Page size requested with the simple paged results control; matches the
/// Active Directory `MaxPageSize` default
const PAGE_SIZE: u32 = 1000;

/// Where directory searches are rooted.
///
/// An explicit search base wins; otherwise the base is derived from a DNS
/// domain (`corp.example.com` becomes `DC=corp,DC=example,DC=com`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchContext {
    search_base: Option<String>,
    domain: Option<String>,
}

impl SearchContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_search_base(mut self, base: impl Into<String>) -> Self {
        self.search_base = Some(base.into()).filter(|b: &String| !b.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into()).filter(|d: &String| !d.trim().is_empty());
        self
    }

    /// Fill in the domain from a resolver configuration file when none is set.
    ///
    /// A missing or unreadable file leaves the context unchanged.
    #[must_use]
    pub fn with_ambient_domain(mut self, resolv_conf: &Path) -> Self {
        if self.domain.is_none() {
            self.domain = std::fs::read_to_string(resolv_conf)
                .ok()
                .and_then(|content| domain_from_resolv_conf(&content));
            debug!(domain = ?self.domain, path = %resolv_conf.display(), "ambient domain");
        }
        self
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Search root for prefix queries, if one can be determined
    #[must_use]
    pub fn search_root(&self) -> Option<String> {
        self.search_base
            .clone()
            .or_else(|| self.domain.as_deref().and_then(domain_to_base_dn))
    }
}

/// `corp.example.com` -> `DC=corp,DC=example,DC=com`
#[must_use]
pub fn domain_to_base_dn(domain: &str) -> Option<String> {
    let labels: Vec<&str> = domain
        .trim()
        .trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .collect();

    if labels.is_empty() {
        return None;
    }

    Some(
        labels
            .iter()
            .map(|l| format!("DC={l}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// `domain` line, else first `search` entry
fn domain_from_resolv_conf(content: &str) -> Option<String> {
    let mut search = None;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("domain") => {
                if let Some(domain) = parts.next() {
                    return Some(domain.to_string());
                }
            }
            Some("search") if search.is_none() => {
                search = parts.next().map(str::to_string);
            }
            _ => {}
        }
    }

    search
}

/// LDAP filter matching computer objects whose name starts with `prefix`
#[must_use]
pub fn computer_prefix_filter(prefix: &str) -> String {
    format!(
        "(&(objectCategory=Computer)(name={}*))",
        escape_filter_value(prefix)
    )
}

/// RFC 4515 value escaping
fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Lookup of computer names in a directory
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Names of every computer object under `search_root` starting with `prefix`
    async fn find_computers_by_prefix(
        &self,
        search_root: &str,
        prefix: &str,
    ) -> Result<Vec<String>, DirectoryError>;
}

/// Fixed list of computer names, matched case-insensitively like AD does.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: Vec<String>,
}

impl StaticDirectory {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl DirectoryService for StaticDirectory {
    async fn find_computers_by_prefix(
        &self,
        _search_root: &str,
        prefix: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .names
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect())
    }
}

/// Queries a directory with OpenLDAP's `ldapsearch`.
///
/// Without extra arguments `ldapsearch` binds with SASL/GSSAPI, which picks up
/// the operator's Kerberos ticket on a domain-joined machine.
pub struct LdapSearchDirectory {
    executor: Arc<dyn RemoteExecutor>,
    uri: Option<String>,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl LdapSearchDirectory {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            uri: None,
            extra_args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// LDAP server URI (`-H`); defaults to the ldap.conf setting
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Extra `ldapsearch` arguments, e.g. `-x -D <binddn> -y <passfile>`
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_command(&self, search_root: &str, prefix: &str) -> String {
        let mut cmd = format!("ldapsearch -LLL -Q -o ldif-wrap=no -E pr={PAGE_SIZE}/noprompt");
        if let Some(uri) = &self.uri {
            cmd.push_str(" -H ");
            cmd.push_str(&shell_quote(uri));
        }
        for arg in &self.extra_args {
            cmd.push(' ');
            cmd.push_str(&shell_quote(arg));
        }
        cmd.push_str(" -b ");
        cmd.push_str(&shell_quote(search_root));
        cmd.push(' ');
        cmd.push_str(&shell_quote(&computer_prefix_filter(prefix)));
        cmd.push_str(" name");
        cmd
    }
}

#[async_trait]
impl DirectoryService for LdapSearchDirectory {
    #[instrument(skip(self))]
    async fn find_computers_by_prefix(
        &self,
        search_root: &str,
        prefix: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let cmd = self.build_command(search_root, prefix);

        let result = self
            .executor
            .run_with_timeout(&cmd, self.timeout)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if result.status == COMMAND_NOT_FOUND {
            return Err(DirectoryError::Unavailable(
                "ldapsearch not found on PATH".to_string(),
            ));
        }
        if result.status == SIZE_LIMIT_EXCEEDED {
            let returned = parse_ldif_names(&result.stdout).map_or(0, |names| names.len());
            warn!(prefix = %prefix, returned, "directory size limit exceeded");
            return Err(DirectoryError::Truncated { returned });
        }
        if !result.success() {
            return Err(DirectoryError::QueryFailed {
                status: result.status,
                message: result.stderr.trim().to_string(),
            });
        }

        let names = parse_ldif_names(&result.stdout)?;
        debug!(matches = names.len(), "directory query completed");
        Ok(names)
    }
}

/// Extract `name` attribute values from LDIF output
fn parse_ldif_names(ldif: &str) -> Result<Vec<String>, DirectoryError> {
    // unfold continuation lines (leading single space)
    let mut lines: Vec<String> = Vec::new();
    for raw in ldif.lines() {
        match (raw.strip_prefix(' '), lines.last_mut()) {
            (Some(rest), Some(prev)) => prev.push_str(rest),
            _ => lines.push(raw.to_string()),
        }
    }

    let mut names = Vec::new();
    for line in &lines {
        let Some((attr, value)) = line.split_once(':') else {
            continue;
        };
        if !attr.eq_ignore_ascii_case("name") {
            continue;
        }
        let name = match value.strip_prefix(':') {
            Some(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| DirectoryError::Malformed(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| DirectoryError::Malformed(e.to_string()))?
            }
            None => value.trim().to_string(),
        };
        if !name.is_empty() {
            names.push(name);
        }
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use hostsweep_exec::{CommandResult, ExecError};

    use super::*;

    #[test]
    fn test_search_root_prefers_explicit_base() {
        let ctx = SearchContext::new()
            .with_domain("corp.example.com")
            .with_search_base("OU=Workstations,DC=corp,DC=example,DC=com");
        assert_eq!(
            ctx.search_root().as_deref(),
            Some("OU=Workstations,DC=corp,DC=example,DC=com")
        );
    }

    #[test]
    fn test_search_root_from_domain() {
        let ctx = SearchContext::new().with_domain("corp.example.com.");
        assert_eq!(
            ctx.search_root().as_deref(),
            Some("DC=corp,DC=example,DC=com")
        );
        assert_eq!(SearchContext::new().search_root(), None);
        assert_eq!(SearchContext::new().with_domain("  ").search_root(), None);
    }

    #[test]
    fn test_ambient_domain_from_resolv_conf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# generated").unwrap();
        writeln!(file, "nameserver 10.0.0.2").unwrap();
        writeln!(file, "search ad.example.org example.org").unwrap();
        file.flush().unwrap();

        let ctx = SearchContext::new().with_ambient_domain(file.path());
        assert_eq!(ctx.domain(), Some("ad.example.org"));

        let explicit = SearchContext::new()
            .with_domain("lab.local")
            .with_ambient_domain(file.path());
        assert_eq!(explicit.domain(), Some("lab.local"));
    }

    #[test]
    fn test_domain_line_wins_over_search() {
        let content = "search other.example\ndomain corp.example\n";
        assert_eq!(
            domain_from_resolv_conf(content).as_deref(),
            Some("corp.example")
        );
    }

    #[test]
    fn test_prefix_filter_escapes_specials() {
        assert_eq!(
            computer_prefix_filter("WS-"),
            "(&(objectCategory=Computer)(name=WS-*))"
        );
        assert_eq!(
            computer_prefix_filter("a*(b)\\"),
            "(&(objectCategory=Computer)(name=a\\2a\\28b\\29\\5c*))"
        );
    }

    #[test]
    fn test_parse_ldif_names() {
        let ldif = "dn: CN=WS-001,OU=PCs,DC=corp,DC=example\nname: WS-001\n\n\
                    dn: CN=WS-002,OU=PCs,DC=corp,DC=example\nName: WS-002\n\n\
                    dn: CN=x\nname:: V1MtMDAz\n";
        assert_eq!(
            parse_ldif_names(ldif).unwrap(),
            vec!["WS-001", "WS-002", "WS-003"]
        );
    }

    #[test]
    fn test_parse_ldif_unfolds_continuations() {
        let ldif = "dn: CN=LONG\nname: LONG-HOST\n -042\n";
        assert_eq!(parse_ldif_names(ldif).unwrap(), vec!["LONG-HOST-042"]);
    }

    #[test]
    fn test_parse_ldif_rejects_bad_base64() {
        assert!(matches!(
            parse_ldif_names("name:: !!!\n"),
            Err(DirectoryError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_static_directory_is_case_insensitive() {
        let dir = StaticDirectory::new(["WS-001", "ws-002", "SRV-01"]);
        let found = dir.find_computers_by_prefix("DC=x", "Ws-").await.unwrap();
        assert_eq!(found, vec!["WS-001", "ws-002"]);
    }

    struct CannedExecutor {
        status: i32,
        stdout: &'static str,
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteExecutor for CannedExecutor {
        async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
            self.seen.lock().unwrap().push(cmd.to_string());
            Ok(CommandResult {
                status: self.status,
                stdout: self.stdout.to_string(),
                stderr: "Can't contact LDAP server".to_string(),
                duration: Duration::from_millis(1),
            })
        }

        async fn run_with_timeout(
            &self,
            cmd: &str,
            _timeout: Duration,
        ) -> Result<CommandResult, ExecError> {
            self.run(cmd).await
        }

        fn executor_type(&self) -> &'static str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_ldapsearch_command_and_parse() {
        let executor = Arc::new(CannedExecutor {
            status: 0,
            stdout: "dn: CN=WS-001,DC=corp\nname: WS-001\n",
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let dir = LdapSearchDirectory::new(executor.clone()).with_uri("ldaps://dc01.corp");

        let names = dir
            .find_computers_by_prefix("DC=corp", "WS-")
            .await
            .unwrap();
        assert_eq!(names, vec!["WS-001"]);

        let seen = executor.seen.lock().unwrap();
        assert_eq!(
            seen[0],
            "ldapsearch -LLL -Q -o ldif-wrap=no -E pr=1000/noprompt -H 'ldaps://dc01.corp' \
             -b 'DC=corp' \
             '(&(objectCategory=Computer)(name=WS-*))' name"
        );
    }

    #[tokio::test]
    async fn test_ldapsearch_failure_status() {
        let executor = Arc::new(CannedExecutor {
            status: 255,
            stdout: "",
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let dir = LdapSearchDirectory::new(executor);

        let err = dir
            .find_computers_by_prefix("DC=corp", "WS-")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::QueryFailed { status: 255, .. }));
    }

    #[tokio::test]
    async fn test_size_limit_is_reported_as_truncation() {
        let executor = Arc::new(CannedExecutor {
            status: 4,
            stdout: "dn: CN=WS-001,DC=corp\nname: WS-001\n\n\
                     dn: CN=WS-002,DC=corp\nname: WS-002\n",
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let dir = LdapSearchDirectory::new(executor);

        let err = dir
            .find_computers_by_prefix("DC=corp", "WS-")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Truncated { returned: 2 }));
        assert!(err.to_string().contains("truncated"));
    }
}
