//! Delimited file persistence.
//!
//! Files are written as UTF-8 with a byte-order mark so spreadsheet tools
//! pick the right encoding. Reads tolerate the mark being present or not.

use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

pub const BOM: &[u8] = b"\xEF\xBB\xBF";

const ID_COLUMN: &str = "ID_Producto";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path:?}: {error}")]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to write {path:?}: {error}")]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("malformed table {path:?}: {error}")]
    Csv { path: PathBuf, error: csv::Error },
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(BOM).unwrap_or(bytes)
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(StoreError::Read {
            path: path.to_owned(),
            error,
        }),
    }
}

fn csv_error(path: &Path) -> impl Fn(csv::Error) -> StoreError + '_ {
    move |error| StoreError::Csv {
        path: path.to_owned(),
        error,
    }
}

fn write_error(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |error| StoreError::Write {
        path: path.to_owned(),
        error,
    }
}

/// Product ids already recorded in `path`.
///
/// A missing file, an empty file, or one without an id column all mean
/// nothing has been recorded yet.
pub fn read_known_ids(path: &Path) -> Result<HashSet<String>, StoreError> {
    let Some(bytes) = read_bytes(path)? else {
        return Ok(HashSet::new());
    };
    let body = strip_bom(&bytes);
    if body.iter().all(u8::is_ascii_whitespace) {
        warn!(path = %path.display(), "table exists but is empty, starting from scratch");
        return Ok(HashSet::new());
    }
    let mut reader = csv::Reader::from_reader(body);
    let headers = reader.headers().map_err(csv_error(path))?.clone();
    let Some(column) = headers.iter().position(|name| name == ID_COLUMN) else {
        warn!(path = %path.display(), "table has no {ID_COLUMN} column, starting from scratch");
        return Ok(HashSet::new());
    };
    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        if let Some(id) = record.get(column).filter(|id| !id.is_empty()) {
            ids.insert(id.to_owned());
        }
    }
    Ok(ids)
}

/// Deserialize every row of `path`.
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let bytes = read_bytes(path)?.ok_or_else(|| StoreError::Read {
        path: path.to_owned(),
        error: std::io::ErrorKind::NotFound.into(),
    })?;
    csv::Reader::from_reader(strip_bom(&bytes))
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_error(path))
}

/// Append rows to `path`, creating it with a BOM and header if needed.
pub fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize, StoreError> {
    let fresh = std::fs::metadata(path)
        .map(|meta| meta.len() == 0)
        .unwrap_or(true);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_error(path))?;
    if fresh {
        file.write_all(BOM).map_err(write_error(path))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file);
    for row in rows {
        writer.serialize(row).map_err(csv_error(path))?;
    }
    writer.flush().map_err(write_error(path))?;
    Ok(rows.len())
}

/// Replace `path` with a table of string cells.
pub fn write_table<H, R>(path: &Path, headers: H, rows: R) -> Result<(), StoreError>
where
    H: IntoIterator,
    H::Item: AsRef<[u8]>,
    R: IntoIterator<Item = Vec<String>>,
{
    let mut file = File::create(path).map_err(write_error(path))?;
    file.write_all(BOM).map_err(write_error(path))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(headers).map_err(csv_error(path))?;
    for row in rows {
        writer.write_record(&row).map_err(csv_error(path))?;
    }
    writer.flush().map_err(write_error(path))
}

/// Row count and distinct ids of a catalog table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows: usize,
    pub unique_ids: usize,
}

pub fn table_stats(path: &Path) -> Result<TableStats, StoreError> {
    let Some(bytes) = read_bytes(path)? else {
        return Ok(TableStats::default());
    };
    let mut reader = csv::Reader::from_reader(strip_bom(&bytes));
    let column = reader
        .headers()
        .map_err(csv_error(path))?
        .iter()
        .position(|name| name == ID_COLUMN);
    let mut rows = 0;
    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        rows += 1;
        if let Some(id) = column.and_then(|column| record.get(column)) {
            ids.insert(id.to_owned());
        }
    }
    Ok(TableStats {
        rows,
        unique_ids: ids.len(),
    })
}
