//! CSV bar loading.
//!
//! Expects a header row with `timestamp, open, high, low, close, volume`
//! (case-insensitive, any order). Every other column whose non-empty cells
//! all parse as numbers becomes a per-bar feature; empty cells leave the
//! feature absent on that bar. Ordering and finiteness are checked later,
//! when an environment is built from the bars.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use tradesim_core::domain::MarketBar;

const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}: invalid timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("row {row}: invalid {column} value '{value}'")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("no data rows")]
    Empty,
}

/// Load bars from a CSV file.
pub fn load_bars_csv(path: impl AsRef<Path>) -> Result<Vec<MarketBar>, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars_csv(io::BufReader::new(file))?;
    info!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Parse bars from any CSV reader.
pub fn read_bars_csv<R: io::Read>(reader: R) -> Result<Vec<MarketBar>, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    let mut required = [0usize; 6];
    for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or(LoadError::MissingColumn(name))?;
    }

    let records = csv_reader
        .records()
        .collect::<Result<Vec<csv::StringRecord>, _>>()?;
    if records.is_empty() {
        return Err(LoadError::Empty);
    }

    let feature_columns: Vec<usize> = (0..headers.len())
        .filter(|i| !required.contains(i))
        .filter(|&i| {
            records.iter().all(|r| {
                let cell = r.get(i).unwrap_or("");
                cell.is_empty() || cell.parse::<f64>().is_ok()
            })
        })
        .collect();
    debug!(
        features = ?feature_columns.iter().map(|&i| headers[i].as_str()).collect::<Vec<_>>(),
        "csv feature columns"
    );

    let mut bars = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        // Header is line 1
        let row = idx + 2;
        let cell = |col: usize| record.get(col).unwrap_or("");
        let number = |col: usize| -> Result<f64, LoadError> {
            cell(col).parse::<f64>().map_err(|_| LoadError::InvalidNumber {
                row,
                column: headers[col].clone(),
                value: cell(col).to_string(),
            })
        };

        let raw_ts = cell(required[0]);
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::InvalidTimestamp {
            row,
            value: raw_ts.to_string(),
        })?;

        let mut bar = MarketBar::new(
            timestamp,
            number(required[1])?,
            number(required[2])?,
            number(required[3])?,
            number(required[4])?,
            number(required[5])?,
        );
        for &col in &feature_columns {
            if let Ok(value) = cell(col).parse::<f64>() {
                bar = bar.with_feature(headers[col].clone(), value);
            }
        }
        bars.push(bar);
    }
    Ok(bars)
}

/// Accepts ISO-8601 date-times (with or without offset), plain dates, and
/// Unix epochs in seconds or milliseconds.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    let epoch: i64 = value.parse().ok()?;
    // Anything past year ~5138 in seconds is taken as milliseconds
    let dt = if epoch.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    };
    dt.map(|d| d.naive_utc())
}

/// BLAKE3 over every bar's timestamp, OHLCV and features, in order.
pub fn dataset_hash(bars: &[MarketBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.and_utc().timestamp_millis().to_le_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_le_bytes());
        }
        for (name, v) in &bar.features {
            hasher.update(name.as_bytes());
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
