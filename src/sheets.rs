use crate::calc::{GradingPeriod, RoomConfig};
use crate::settings::{ColumnNames, Settings};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// A decoded CSV export: trimmed headers plus rows padded to header width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// One student's line from a room score sheet. Cells keep sheet order.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub student_id: String,
    pub display_name: String,
    pub room: String,
    cells: Vec<(String, String)>,
}

impl StudentRow {
    pub fn new(
        student_id: impl Into<String>,
        display_name: impl Into<String>,
        room: impl Into<String>,
        cells: Vec<(String, String)>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            display_name: display_name.into(),
            room: room.into(),
            cells,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> + Clone + '_ {
        self.cells.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    #[allow(dead_code)]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == column)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RoomData {
    pub room: String,
    pub config: RoomConfig,
    pub students: Vec<StudentRow>,
}

/// Why a room could not be loaded. Each maps to its own IPC error code.
#[derive(Debug)]
pub enum LoadError {
    RoomNotFound(String),
    ConfigNotFound(String),
    Source(anyhow::Error),
    BadCsv(anyhow::Error),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::RoomNotFound(_) => "room_not_found",
            LoadError::ConfigNotFound(_) => "config_not_found",
            LoadError::Source(_) => "source_fetch_failed",
            LoadError::BadCsv(_) => "bad_csv",
        }
    }

    pub fn message(&self) -> String {
        match self {
            LoadError::RoomNotFound(room) => format!("no score sheet configured for room {}", room),
            LoadError::ConfigNotFound(room) => format!("config sheet has no row for room {}", room),
            LoadError::Source(e) | LoadError::BadCsv(e) => format!("{:#}", e),
        }
    }
}

/// Splits CSV text into records. Handles quoted fields, doubled quotes,
/// quoted line breaks and CRLF endings.
pub fn parse_csv_records(text: &str) -> Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    let mut line = 1usize;

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    buf.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    buf.push(ch);
                }
                _ => buf.push(ch),
            }
            continue;
        }
        match ch {
            '"' if buf.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut buf)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut buf));
                records.push(std::mem::take(&mut record));
                line += 1;
            }
            _ => buf.push(ch),
        }
    }
    if in_quotes {
        bail!("unterminated quoted field starting before line {}", line);
    }
    if !buf.is_empty() || !record.is_empty() {
        record.push(buf);
        records.push(record);
    }
    Ok(records)
}

pub fn parse_csv(text: &str) -> Result<SheetTable> {
    let mut records = parse_csv_records(text)?.into_iter();
    let Some(header) = records.next() else {
        return Ok(SheetTable::default());
    };
    let headers: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for mut r in records {
        if r.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        r.resize(width, String::new());
        rows.push(r);
    }
    Ok(SheetTable { headers, rows })
}

/// Numeric cells exported as `213.0` are normalised to `213`, matching how
/// room ids are typed in the settings file.
fn normalize_room_id(raw: &str) -> String {
    let t = raw.trim();
    if let Some((whole, frac)) = t.split_once('.') {
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if digits(whole) && digits(frac) && frac.bytes().all(|b| b == b'0') {
            return whole.to_string();
        }
    }
    t.to_string()
}

/// Builds one `RoomConfig` per `SheetName`. Blank or non-numeric scale cells
/// leave that period unconfigured.
pub fn parse_room_configs(table: &SheetTable) -> Result<Vec<(String, RoomConfig)>> {
    let sheet_col = table
        .column("SheetName")
        .ok_or_else(|| anyhow!("config sheet has no SheetName column"))?;
    let subject_col = table.column("SubjectName");
    let scale_cols: Vec<(GradingPeriod, usize)> = GradingPeriod::ALL
        .into_iter()
        .filter_map(|p| table.column(p.scale_key()).map(|i| (p, i)))
        .collect();

    let mut out = Vec::new();
    for row in &table.rows {
        let room = normalize_room_id(&row[sheet_col]);
        if room.is_empty() {
            continue;
        }
        let subject = subject_col
            .map(|i| row[i].trim().to_string())
            .unwrap_or_default();
        let mut cfg = RoomConfig::new(subject);
        for (period, idx) in &scale_cols {
            let cell = row[*idx].trim();
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) if v.is_finite() => cfg = cfg.with_scale(*period, v),
                _ => tracing::warn!(room = %room, period = %period, cell, "ignoring non-numeric scale"),
            }
        }
        out.push((room, cfg));
    }
    Ok(out)
}

pub fn find_room_config(configs: Vec<(String, RoomConfig)>, room: &str) -> Option<RoomConfig> {
    let mut matches = configs.into_iter().filter(|(r, _)| r == room);
    let first = matches.next().map(|(_, c)| c);
    let extra = matches.count();
    if extra > 0 {
        tracing::warn!(room, extra, "duplicate config rows; using the first");
    }
    first
}

pub fn parse_student_rows(table: &SheetTable, columns: &ColumnNames) -> Vec<StudentRow> {
    let email_col = table.column(&columns.email);
    let name_col = table.column(&columns.name);
    let room_col = table.column(&columns.room);
    if email_col.is_none() {
        tracing::warn!(column = %columns.email, "score sheet has no email column");
    }

    table
        .rows
        .iter()
        .map(|row| {
            let email = email_col.map(|i| row[i].trim()).unwrap_or("");
            let student_id = email.split('@').next().unwrap_or("").trim().to_string();
            let display_name = name_col.map(|i| row[i].trim().to_string()).unwrap_or_default();
            let room = room_col.map(|i| normalize_room_id(&row[i])).unwrap_or_default();
            let cells = table
                .headers
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            StudentRow::new(student_id, display_name, room, cells)
        })
        .collect()
}

/// Reads a sheet export from an `http(s)://` URL, a `file://` URL or a path.
pub fn fetch_text(location: &str) -> Result<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("building http client")?;
        let resp = client
            .get(location)
            .send()
            .with_context(|| format!("GET {}", location))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("GET {} returned {}", location, status);
        }
        return resp.text().with_context(|| format!("reading body of {}", location));
    }
    let path = location.strip_prefix("file://").unwrap_or(location);
    std::fs::read_to_string(Path::new(path)).with_context(|| format!("reading {}", path))
}

/// Fetches the config sheet and the room's score sheet.
pub fn load_room(settings: &Settings, room: &str) -> Result<RoomData, LoadError> {
    let Some(location) = settings.room_location(room) else {
        return Err(LoadError::RoomNotFound(room.to_string()));
    };

    let config_text = fetch_text(&settings.config_url).map_err(LoadError::Source)?;
    let config_table = parse_csv(&config_text)
        .context("decoding config sheet")
        .map_err(LoadError::BadCsv)?;
    let configs = parse_room_configs(&config_table).map_err(LoadError::BadCsv)?;
    let Some(config) = find_room_config(configs, room) else {
        return Err(LoadError::ConfigNotFound(room.to_string()));
    };

    let scores_text = fetch_text(location).map_err(LoadError::Source)?;
    let scores_table = parse_csv(&scores_text)
        .with_context(|| format!("decoding score sheet for room {}", room))
        .map_err(LoadError::BadCsv)?;
    let students = parse_student_rows(&scores_table, &settings.columns);

    tracing::info!(room, students = students.len(), "loaded room sheets");
    Ok(RoomData {
        room: room.to_string(),
        config,
        students,
    })
}
