//! Engine configuration sections
//!
//! Loaded from the `[directory]`, `[collector]` and `[probe]` tables of the
//! hostsweep config file; every field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Directory lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Explicit search base DN; overrides `domain`
    pub search_base: Option<String>,
    /// DNS domain used to derive the search base
    pub domain: Option<String>,
    /// LDAP server URI passed to `ldapsearch -H`
    pub ldap_uri: Option<String>,
    /// Extra `ldapsearch` arguments (bind options)
    #[serde(default)]
    pub ldapsearch_args: Vec<String>,
    #[serde(default = "default_ldapsearch_timeout_secs")]
    pub ldapsearch_timeout_secs: u64,
}

fn default_ldapsearch_timeout_secs() -> u64 {
    30
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            search_base: None,
            domain: None,
            ldap_uri: None,
            ldapsearch_args: Vec::new(),
            ldapsearch_timeout_secs: default_ldapsearch_timeout_secs(),
        }
    }
}

impl DirectoryConfig {
    #[must_use]
    pub fn ldapsearch_timeout(&self) -> Duration {
        Duration::from_secs(self.ldapsearch_timeout_secs)
    }
}

/// Fan-out settings for collection runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Hosts collected at the same time
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Budget for one host, counted once it gets a slot
    #[serde(default = "default_host_timeout_secs")]
    pub host_timeout_secs: u64,
}

fn default_max_in_flight() -> usize {
    32
}

fn default_host_timeout_secs() -> u64 {
    120
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            host_timeout_secs: default_host_timeout_secs(),
        }
    }
}

impl CollectorConfig {
    #[must_use]
    pub fn host_timeout(&self) -> Duration {
        Duration::from_secs(self.host_timeout_secs)
    }
}

/// How liveness is probed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// ICMP echo via the system `ping`
    #[default]
    Ping,
    /// TCP connect to `tcp_port`
    Tcp,
}

/// Connectivity probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probes per host; one success keeps the host
    #[serde(default = "default_probe_count")]
    pub count: u32,
    #[serde(default)]
    pub method: ProbeMethod,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// Per-probe timeout
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_probe_count() -> u32 {
    1
}

fn default_tcp_port() -> u16 {
    22
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: default_probe_count(),
            method: ProbeMethod::default(),
            tcp_port: default_tcp_port(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
