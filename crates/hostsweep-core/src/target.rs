//! Target specifications and their resolution into host sets

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::directory::{DirectoryService, SearchContext};
use crate::error::ResolutionError;

/// Canonical name every local sentinel resolves to
pub const LOCALHOST: &str = "127.0.0.1";

/// True for the inputs that mean "this machine": empty, `127.0.0.1`, `localhost`
#[must_use]
pub fn is_local_sentinel(input: &str) -> bool {
    let input = input.trim();
    input.is_empty() || input == LOCALHOST || input.eq_ignore_ascii_case("localhost")
}

/// Which hosts a run should target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Concrete hostnames, used as given
    Literal(Vec<String>),
    /// Comma-separated name prefixes looked up in the directory
    Prefix(String),
    /// File with one hostname per line
    FilePath(PathBuf),
}

impl TargetSpec {
    /// Classify raw command-line input.
    ///
    /// Local sentinels become a literal `127.0.0.1`, an existing file becomes
    /// a host list, and anything else is treated as prefixes.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if is_local_sentinel(trimmed) {
            return TargetSpec::Literal(vec![LOCALHOST.to_string()]);
        }
        let path = Path::new(trimmed);
        if path.is_file() {
            return TargetSpec::FilePath(path.to_path_buf());
        }
        TargetSpec::Prefix(trimmed.to_string())
    }
}

/// Deduplicated set of hostnames; blank entries are never stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet(BTreeSet<String>);

impl TargetSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `{127.0.0.1}`
    #[must_use]
    pub fn local() -> Self {
        std::iter::once(LOCALHOST).collect()
    }

    /// Add a host; returns false for blanks and duplicates
    pub fn insert(&mut self, host: &str) -> bool {
        let host = host.trim();
        !host.is_empty() && self.0.insert(host.to_string())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(host)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TargetSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TargetSet::new();
        set.extend(iter);
        set
    }
}

impl<S: AsRef<str>> Extend<S> for TargetSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for host in iter {
            self.insert(host.as_ref());
        }
    }
}

impl IntoIterator for TargetSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Turns a [`TargetSpec`] into a [`TargetSet`]
pub struct TargetResolver {
    directory: Arc<dyn DirectoryService>,
    context: SearchContext,
}

impl TargetResolver {
    pub fn new(directory: Arc<dyn DirectoryService>, context: SearchContext) -> Self {
        Self { directory, context }
    }

    /// Resolve a specification.
    ///
    /// An empty set is a valid result; callers decide whether it is actionable.
    ///
    /// # Errors
    /// - `NoSearchRoot` when a prefix needs a lookup and the context has no root
    /// - `HostFile` when a host-list file cannot be read
    /// - `Directory` when a prefix query fails
    #[instrument(skip(self))]
    pub async fn resolve(&self, spec: &TargetSpec) -> Result<TargetSet, ResolutionError> {
        let targets = match spec {
            TargetSpec::Literal(hosts) => hosts.iter().collect(),
            TargetSpec::FilePath(path) => read_host_file(path).await?,
            TargetSpec::Prefix(input) if is_local_sentinel(input) => TargetSet::local(),
            TargetSpec::Prefix(input) => self.resolve_prefixes(input).await?,
        };

        info!(targets = targets.len(), "targets resolved");
        Ok(targets)
    }

    async fn resolve_prefixes(&self, input: &str) -> Result<TargetSet, ResolutionError> {
        let tokens: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let mut targets = TargetSet::new();
        if tokens.is_empty() {
            return Ok(targets);
        }

        let root = self
            .context
            .search_root()
            .ok_or_else(|| ResolutionError::NoSearchRoot(input.to_string()))?;

        for token in tokens {
            let matches = self
                .directory
                .find_computers_by_prefix(&root, token)
                .await
                .map_err(|source| ResolutionError::Directory {
                    prefix: token.to_string(),
                    source,
                })?;
            debug!(prefix = %token, matches = matches.len(), "prefix lookup");
            targets.extend(matches);
        }

        Ok(targets)
    }
}

async fn read_host_file(path: &Path) -> Result<TargetSet, ResolutionError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ResolutionError::HostFile {
            path: path.to_path_buf(),
            source,
        })?;

    // files saved by Windows editors may start with a BOM
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    Ok(content.lines().collect())
}
