//! CSV reading and writing for the ledger table.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs;
use std::path::{Path, PathBuf};

use super::schema::{self, LegacyColumns, LegacyTable, SchemaVersion};
use crate::types::CouponRecord;

/// Rows as found on disk, before any migration.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRows {
    Current(Vec<CouponRecord>),
    Legacy(LegacyTable),
}

impl TableRows {
    pub fn version(&self) -> SchemaVersion {
        match self {
            TableRows::Current(_) => SchemaVersion::V2,
            TableRows::Legacy(_) => SchemaVersion::V1,
        }
    }
}

/// Parse table text of either schema version.
pub fn parse_table(text: &str) -> Result<TableRows> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let version = SchemaVersion::detect(text.lines().next())?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader.headers().context("Failed to read table header")?.clone();
    let mut raw_rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record: StringRecord =
            result.with_context(|| format!("Failed to read row {}", i + 1))?;
        raw_rows.push(record);
    }

    match version {
        SchemaVersion::V2 => {
            schema::check_header_v2(&header)?;
            let rows = raw_rows
                .iter()
                .enumerate()
                .map(|(i, r)| schema::parse_row_v2(r, i + 1))
                .collect::<Result<Vec<_>>>()?;
            Ok(TableRows::Current(rows))
        }
        SchemaVersion::V1 => {
            let cols = LegacyColumns::from_header(&header)?;
            let rows = raw_rows
                .iter()
                .enumerate()
                .map(|(i, r)| schema::parse_row_v1(r, &cols, i + 1))
                .collect::<Result<Vec<_>>>()?;
            Ok(TableRows::Legacy(LegacyTable {
                rows,
                has_top_ups: cols.has_top_ups(),
            }))
        }
    }
}

/// Read and parse a table file.
pub fn read_table(path: &Path) -> Result<TableRows> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger table {}", path.display()))?;
    parse_table(&text).with_context(|| format!("Failed to parse ledger table {}", path.display()))
}

/// Render records as current-version table text.
pub fn render_table(records: &[CouponRecord]) -> Result<String> {
    let mut out = schema::marker_line();
    out.push('\n');

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(schema::HEADER_V2)?;
    for record in records {
        writer.write_record(schema::row_v2(record))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush table writer: {e}"))?;
    out.push_str(&String::from_utf8(bytes).context("Table is not valid UTF-8")?);
    Ok(out)
}

/// A file written next to its destination, not yet moved into place.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    /// Write `contents` to `<path>.tmp`.
    pub fn write(path: &Path, contents: &[u8]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
        Ok(Self {
            tmp,
            target: path.to_path_buf(),
        })
    }

    /// Rename the temp file over the destination.
    pub fn commit(self) -> Result<()> {
        fs::rename(&self.tmp, &self.target)
            .with_context(|| format!("Failed to move {} into place", self.target.display()))
    }

    /// Remove the temp file, leaving the destination untouched.
    pub fn discard(self) {
        let _ = fs::remove_file(&self.tmp);
    }
}
