//! SQL query builder for osquery

use std::fmt;

/// osquery SQL query
#[derive(Debug, Clone)]
pub struct Query {
    select: Vec<String>,
    from: String,
    order_by: Option<String>,
    limit: Option<usize>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            select: vec!["*".to_string()],
            from: table.into(),
            order_by: None,
            limit: None,
        }
    }

    /// Table the query reads from
    #[must_use]
    pub fn table(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn build(&self) -> String {
        use std::fmt::Write;

        let mut sql = format!("SELECT {} FROM {}", self.select.join(", "), self.from);

        if let Some(ref order) = self.order_by {
            let _ = write!(sql, " ORDER BY {order}");
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        sql
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Queries behind the built-in operations
pub mod queries {
    use super::Query;

    #[must_use]
    pub fn os_version() -> Query {
        Query::new("os_version")
            .select(&["name", "version", "platform", "arch"])
            .limit(1)
    }

    #[must_use]
    pub fn system_info() -> Query {
        Query::new("system_info")
            .select(&[
                "hostname",
                "cpu_brand",
                "cpu_logical_cores",
                "physical_memory",
                "hardware_vendor",
                "hardware_model",
                "hardware_serial",
            ])
            .limit(1)
    }

    #[must_use]
    pub fn uptime() -> Query {
        Query::new("uptime").select(&["total_seconds"]).limit(1)
    }

    #[must_use]
    pub fn kernel_info() -> Query {
        Query::new("kernel_info").select(&["version"]).limit(1)
    }

    #[must_use]
    pub fn deb_packages() -> Query {
        Query::new("deb_packages")
            .select(&["name", "version", "arch"])
            .order_by("name")
    }

    #[must_use]
    pub fn rpm_packages() -> Query {
        Query::new("rpm_packages")
            .select(&["name", "version", "arch", "install_time"])
            .order_by("name")
    }
}
