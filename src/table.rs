//! CSV boundary for the raw and cleaned tables.
//!
//! Both tables are validated against an explicit column set when read, so a
//! malformed file fails here with [`Error::Schema`] instead of deep inside a
//! later stage.

use crate::error::{Error, Result};
use crate::types::{CleanedDocument, RawRow};
use csv::StringRecord;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Columns the collector writes, in order
pub const RAW_COLUMNS: [&str; 6] = ["source", "type", "post_id", "author", "text", "url"];

/// Columns of the cleaned table, in order
pub const CLEANED_COLUMNS: [&str; 2] = ["post_id", "text"];

/// Read and validate a raw table
pub fn read_raw_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| record_error(e, path))?.clone();
    require_columns(&headers, &RAW_COLUMNS, path)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<RawRow>().enumerate() {
        let row = result.map_err(|e| record_error(e, path))?;
        if row.post_id.trim().is_empty() {
            // Line numbers are 1-based and the header takes line 1
            return Err(Error::Schema(format!(
                "{}: row {} has an empty post_id",
                path.display(),
                idx + 2
            )));
        }
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "read raw table");
    Ok(rows)
}

/// Read and validate a cleaned table; post ids must be unique
pub fn read_cleaned(path: &Path) -> Result<Vec<CleanedDocument>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| record_error(e, path))?.clone();
    require_columns(&headers, &CLEANED_COLUMNS, path)?;

    let mut seen = HashSet::new();
    let mut documents = Vec::new();
    for (idx, result) in reader.deserialize::<CleanedDocument>().enumerate() {
        let doc = result.map_err(|e| record_error(e, path))?;
        if doc.post_id.trim().is_empty() {
            return Err(Error::Schema(format!(
                "{}: row {} has an empty post_id",
                path.display(),
                idx + 2
            )));
        }
        if !seen.insert(doc.post_id.clone()) {
            return Err(Error::Schema(format!(
                "{}: post_id '{}' appears more than once",
                path.display(),
                doc.post_id
            )));
        }
        documents.push(doc);
    }

    debug!(path = %path.display(), documents = documents.len(), "read cleaned table");
    Ok(documents)
}

/// Write a cleaned table, replacing the destination only once fully written
pub fn write_cleaned(path: &Path, documents: &[CleanedDocument]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    // Written by hand so an empty table still carries its header
    writer.write_record(CLEANED_COLUMNS)?;
    for doc in documents {
        writer.write_record([doc.post_id.as_str(), doc.text.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))?;

    write_atomic(path, &bytes)
}

/// Write bytes to a sibling temp file, then rename over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path)?;
    if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}

pub(crate) fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("Not a file path: {}", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(file))
}

fn require_columns(headers: &StringRecord, required: &[&str], path: &Path) -> Result<()> {
    let present: HashSet<&str> = headers.iter().collect();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !present.contains(col))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "{}: missing required columns: {}",
            path.display(),
            missing.join(", ")
        )))
    }
}

/// I/O failures stay I/O; anything else means the record does not fit the schema
fn record_error(err: csv::Error, path: &Path) -> Error {
    if err.is_io_error() {
        Error::Csv(err)
    } else {
        Error::Schema(format!("{}: {}", path.display(), err))
    }
}
