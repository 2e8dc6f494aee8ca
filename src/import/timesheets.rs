//! Timesheet CSV parsing: fuzzy header mapping and duplicate detection.
//!
//! Exported timesheets arrive with wildly inconsistent headers, so each
//! required column is resolved through an alias dictionary after
//! normalization (lowercase, separators collapsed to spaces). Rows are
//! validated individually; a bad row is reported and skipped, it does not
//! fail the file. Duplicates are detected on (member email, work date),
//! both within the file and — by the handler — against existing entries.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

const MEMBER_ALIASES: &[&str] = &[
    "member",
    "member email",
    "email",
    "employee",
    "employee email",
    "resource",
    "team member",
    "name",
];

const DATE_ALIASES: &[&str] = &["date", "work date", "day", "worked on", "entry date"];

const HOURS_ALIASES: &[&str] = &["hours", "hrs", "hours worked", "time", "effort", "quantity", "qty"];

const NOTES_ALIASES: &[&str] = &["notes", "note", "comment", "comments", "description"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];

pub const MAX_HOURS_PER_DAY: u32 = 24;

#[derive(Debug, PartialEq)]
pub enum ImportError {
    Empty,
    MissingColumns(Vec<&'static str>),
    Malformed(String),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Empty => write!(f, "CSV file is empty"),
            ImportError::MissingColumns(cols) => {
                write!(f, "Could not locate required columns: {}", cols.join(", "))
            }
            ImportError::Malformed(msg) => write!(f, "Malformed CSV: {}", msg),
        }
    }
}

impl std::error::Error for ImportError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub member: usize,
    pub date: usize,
    pub hours: usize,
    pub notes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// 1-based line number in the file (header is line 1).
    pub line: usize,
    pub member_email: String,
    pub work_date: NaiveDate,
    pub hours: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true;
    for c in raw.trim().chars() {
        let mapped = if c.is_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            ' '
        };
        if mapped == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(mapped);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| aliases.contains(&h.as_str()))
}

pub fn map_headers(record: &csv::StringRecord) -> Result<ColumnMap, ImportError> {
    let headers: Vec<String> = record.iter().map(normalize_header).collect();

    let member = find_column(&headers, MEMBER_ALIASES);
    let date = find_column(&headers, DATE_ALIASES);
    let hours = find_column(&headers, HOURS_ALIASES);

    let mut missing = Vec::new();
    if member.is_none() {
        missing.push("member");
    }
    if date.is_none() {
        missing.push("date");
    }
    if hours.is_none() {
        missing.push("hours");
    }
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    Ok(ColumnMap {
        member: member.unwrap_or_default(),
        date: date.unwrap_or_default(),
        hours: hours.unwrap_or_default(),
        notes: find_column(&headers, NOTES_ALIASES),
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_row(record: &csv::StringRecord, map: &ColumnMap, line: usize) -> Result<ParsedRow, String> {
    let member_email = record
        .get(map.member)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    if member_email.is_empty() {
        return Err("missing member email".to_string());
    }

    let raw_date = record.get(map.date).unwrap_or_default();
    let work_date =
        parse_date(raw_date).ok_or_else(|| format!("unparsable date '{}'", raw_date.trim()))?;

    let raw_hours = record.get(map.hours).unwrap_or_default().trim().to_string();
    let hours: Decimal = raw_hours
        .parse()
        .map_err(|_| format!("unparsable hours '{}'", raw_hours))?;
    if hours <= Decimal::ZERO || hours > Decimal::from(MAX_HOURS_PER_DAY) {
        return Err(format!("hours out of range '{}'", raw_hours));
    }

    let notes = map
        .notes
        .and_then(|i| record.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(ParsedRow {
        line,
        member_email,
        work_date,
        hours,
        notes,
    })
}

#[derive(Debug, Default)]
pub struct ParsedFile {
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
    pub file_duplicates: Vec<RowError>,
}

/// Parses a whole CSV document. Rows repeating an earlier (member, date)
/// pair within the same file are reported as duplicates and dropped.
pub fn parse_file(data: &str) -> Result<ParsedFile, ImportError> {
    if data.trim().is_empty() {
        return Err(ImportError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ImportError::Malformed(e.to_string()))?
        .clone();
    let map = map_headers(&headers)?;

    let mut parsed = ParsedFile::default();
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                parsed.errors.push(RowError {
                    line,
                    message: format!("unreadable row: {}", e),
                });
                continue;
            }
        };

        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        match parse_row(&record, &map, line) {
            Ok(row) => {
                let key = (row.member_email.clone(), row.work_date);
                if seen.insert(key) {
                    parsed.rows.push(row);
                } else {
                    parsed.file_duplicates.push(RowError {
                        line,
                        message: format!(
                            "duplicate entry for {} on {}",
                            row.member_email, row.work_date
                        ),
                    });
                }
            }
            Err(message) => parsed.errors.push(RowError { line, message }),
        }
    }

    Ok(parsed)
}
