//! Report sinks: CSV files or a terminal table

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use comfy_table::{Cell, Color, Table};
use tracing::info;

use crate::error::ReportError;
use crate::outcome::Record;
use crate::partition::CollectionResult;

/// First column of every report
pub const HOSTNAME_COLUMN: &str = "Hostname";

/// Where a report goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Render a table on the terminal
    Interactive,
    /// Write files next to this path stem
    Files(PathBuf),
}

impl OutputMode {
    /// `"n"` (any case) or empty selects the table view; anything else is a stem
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("n") {
            OutputMode::Interactive
        } else {
            OutputMode::Files(PathBuf::from(input))
        }
    }

    /// Sink for this mode
    #[must_use]
    pub fn sink(&self) -> Box<dyn ReportSink> {
        match self {
            OutputMode::Interactive => Box::new(TableReportSink),
            OutputMode::Files(stem) => Box::new(CsvReportSink::new(stem)),
        }
    }
}

/// Consumer of a finished collection result
pub trait ReportSink {
    /// # Errors
    /// Returns `ReportError` when the output cannot be written
    fn emit(&self, result: &CollectionResult) -> Result<(), ReportError>;
}

/// `Hostname` followed by every other column in first-seen order
#[must_use]
pub fn columns(rows: &[Record]) -> Vec<String> {
    let mut columns = vec![HOSTNAME_COLUMN.to_string()];
    for row in rows {
        for (column, _) in &row.fields {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.clone());
            }
        }
    }
    columns
}

fn row_values<'a>(row: &'a Record, columns: &[String]) -> Vec<&'a str> {
    columns
        .iter()
        .map(|c| {
            if c == HOSTNAME_COLUMN {
                row.hostname.as_str()
            } else {
                row.get(c).unwrap_or("")
            }
        })
        .collect()
}

/// Files written by [`CsvReportSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// Main report, one line per row
    pub report: PathBuf,
    /// Errored hostnames, one per line; usable as a host-list file
    pub errored_list: PathBuf,
    /// Errored hosts with failure kind and detail
    pub errors: PathBuf,
}

/// Writes `<stem>.csv`, `<stem>_errored.txt` and `<stem>_errors.csv`
#[derive(Debug, Clone)]
pub struct CsvReportSink {
    stem: PathBuf,
}

impl CsvReportSink {
    /// A trailing `.csv` on the stem is dropped
    pub fn new(stem: impl AsRef<Path>) -> Self {
        let stem = stem.as_ref();
        let stem = match stem.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => stem.with_extension(""),
            _ => stem.to_path_buf(),
        };
        Self { stem }
    }

    #[must_use]
    pub fn paths(&self) -> ReportPaths {
        ReportPaths {
            report: with_suffix(&self.stem, ".csv"),
            errored_list: with_suffix(&self.stem, "_errored.txt"),
            errors: with_suffix(&self.stem, "_errors.csv"),
        }
    }
}

impl ReportSink for CsvReportSink {
    fn emit(&self, result: &CollectionResult) -> Result<(), ReportError> {
        let paths = self.paths();

        write_file(&paths.report, |out| {
            let columns = columns(&result.rows);
            write_csv_line(out, columns.iter().map(String::as_str))?;
            for row in &result.rows {
                write_csv_line(out, row_values(row, &columns))?;
            }
            Ok(())
        })?;

        write_file(&paths.errored_list, |out| {
            for errored in &result.errored_hosts {
                writeln!(out, "{}", errored.hostname)?;
            }
            Ok(())
        })?;

        write_file(&paths.errors, |out| {
            write_csv_line(out, [HOSTNAME_COLUMN, "Kind", "Detail"])?;
            for errored in &result.errored_hosts {
                let kind = errored.kind.to_string();
                write_csv_line(
                    out,
                    [errored.hostname.as_str(), kind.as_str(), errored.detail.as_str()],
                )?;
            }
            Ok(())
        })?;

        info!(
            report = %paths.report.display(),
            errored = %paths.errored_list.display(),
            rows = result.rows.len(),
            "report written"
        );
        Ok(())
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn write_file<F>(path: &Path, body: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let wrap = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(wrap)?);
    body(&mut out).map_err(wrap)?;
    out.flush().map_err(wrap)
}

fn write_csv_line<'a, W, I>(out: &mut W, fields: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a str>,
{
    let line: Vec<String> = fields.into_iter().map(csv_field).collect();
    // CRLF keeps spreadsheet tools happy
    write!(out, "{}\r\n", line.join(","))
}

/// RFC 4180 quoting
fn csv_field(value: &str) -> String {
    let needs_quotes = value.contains([',', '"', '\n', '\r'])
        || value.starts_with(' ')
        || value.ends_with(' ');
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Prints the report as a terminal table
#[derive(Debug, Default, Clone, Copy)]
pub struct TableReportSink;

impl TableReportSink {
    /// Rows table, followed by an errored-hosts table when any host failed
    #[must_use]
    pub fn render(&self, result: &CollectionResult) -> String {
        let columns = columns(&result.rows);
        let mut table = Table::new();
        table.set_header(columns.iter().map(|c| Cell::new(c).fg(Color::Cyan)));
        for row in &result.rows {
            table.add_row(row_values(row, &columns));
        }

        let mut rendered = table.to_string();

        if !result.errored_hosts.is_empty() {
            let mut errors = Table::new();
            errors.set_header(vec![
                Cell::new(HOSTNAME_COLUMN).fg(Color::Red),
                Cell::new("Kind").fg(Color::Red),
                Cell::new("Detail").fg(Color::Red),
            ]);
            for errored in &result.errored_hosts {
                errors.add_row(vec![
                    errored.hostname.clone(),
                    errored.kind.to_string(),
                    errored.detail.clone(),
                ]);
            }
            rendered.push_str("\n\n");
            rendered.push_str(&errors.to_string());
        }

        rendered
    }
}

impl ReportSink for TableReportSink {
    fn emit(&self, result: &CollectionResult) -> Result<(), ReportError> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", self.render(result)).map_err(ReportError::Terminal)
    }
}
