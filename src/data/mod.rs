//! OHLCV bar cache: CSV files plus a JSON manifest side-file.
//!
//! The on-disk layout is a stable external format shared with the data
//! collection pipeline: one CSV per `(symbol, timeframe)` named
//! `{symbol with '/' replaced by '_'}_{timeframe}.csv`, header row
//! `datetime,open,high,low,close,volume`, `datetime` in ISO-8601 with
//! timezone. The cache is read-only during optimization; workers may share
//! it freely.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Candle, sort_candles};

/// Manifest file name, stored next to the cache CSVs.
const MANIFEST_FILE: &str = ".cache_manifest.json";

/// Errors from cache file I/O.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DataError {
    /// Filesystem error while reading or writing a cache file
    #[error("Cache I/O error for {}: {source}", path.display())]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// CSV row could not be parsed
    #[error("Malformed cache row in {}: {reason}", path.display())]
    MalformedRow {
        /// Path that failed
        path: PathBuf,
        /// What was wrong with the row
        reason: String,
    },
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Per-series metadata tracked in the cache manifest.
///
/// Not required for correctness of optimization; the manifest exists so the
/// data pipeline can answer coverage questions without parsing CSVs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ManifestEntry {
    /// First candle timestamp (Unix seconds)
    pub first_timestamp: i64,
    /// Last candle timestamp (Unix seconds)
    pub last_timestamp: i64,
    /// Number of candles in the file
    pub candle_count: usize,
    /// When this entry was last written (ISO-8601)
    pub last_updated: String,
    /// Exchange the data was sourced from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_exchange: Option<String>,
    /// Data-quality grade assigned by the offline scorer, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_grade: Option<String>,
}

/// Path of the cache file for a `(symbol, timeframe)` pair.
pub fn cache_path(cache_dir: &Path, symbol: &str, timeframe: &str) -> PathBuf {
    let filename = format!("{}_{}.csv", symbol.replace('/', "_"), timeframe);
    cache_dir.join(filename)
}

/// Read cached bars for a `(symbol, timeframe)` pair.
///
/// Returns all stored bars sorted and deduplicated by timestamp, or an empty
/// vector when no cache file exists. Timestamps are parsed as ISO-8601 and
/// normalized to UTC.
pub fn read_cache(cache_dir: &Path, symbol: &str, timeframe: &str) -> Result<Vec<Candle>> {
    let path = cache_path(cache_dir, symbol, timeframe);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(&path).map_err(|e| csv_error(&path, e))?;
    let mut candles = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| csv_error(&path, e))?;
        if record.len() < 6 {
            return Err(DataError::MalformedRow {
                path: path.clone(),
                reason: format!("expected 6 fields, got {}", record.len()),
            });
        }
        let timestamp = parse_datetime(&path, &record[0])?;
        candles.push(Candle {
            timestamp,
            open: parse_field(&path, &record[1], "open")?,
            high: parse_field(&path, &record[2], "high")?,
            low: parse_field(&path, &record[3], "low")?,
            close: parse_field(&path, &record[4], "close")?,
            volume: parse_field(&path, &record[5], "volume")?,
        });
    }

    Ok(sort_candles(candles))
}

/// Write bars to the cache file and update the manifest.
///
/// Empty series are ignored (the existing file, if any, is left untouched).
pub fn write_cache(
    cache_dir: &Path,
    symbol: &str,
    timeframe: &str,
    candles: &[Candle],
    source_exchange: Option<&str>,
) -> Result<()> {
    if candles.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(cache_dir).map_err(|e| io_error(cache_dir, e))?;

    let path = cache_path(cache_dir, symbol, timeframe);
    let mut writer = csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))?;
    writer
        .write_record(["datetime", "open", "high", "low", "close", "volume"])
        .map_err(|e| csv_error(&path, e))?;

    for candle in candles {
        let dt = Utc
            .timestamp_opt(candle.timestamp, 0)
            .single()
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        writer
            .write_record([
                dt.as_str(),
                &candle.open.to_string(),
                &candle.high.to_string(),
                &candle.low.to_string(),
                &candle.close.to_string(),
                &candle.volume.to_string(),
            ])
            .map_err(|e| csv_error(&path, e))?;
    }
    writer.flush().map_err(|e| io_error(&path, e))?;

    update_manifest(cache_dir, symbol, timeframe, candles, source_exchange)
}

/// Read the cache manifest, or an empty map when none exists or it is
/// corrupted (a corrupt manifest is recreated on the next write).
pub fn read_manifest(cache_dir: &Path) -> BTreeMap<String, ManifestEntry> {
    let path = cache_dir.join(MANIFEST_FILE);
    let Ok(raw) = fs::read_to_string(&path) else {
        return BTreeMap::new();
    };
    match serde_json::from_str(&raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt cache manifest, ignoring");
            BTreeMap::new()
        }
    }
}

/// Update the manifest entry for one series.
///
/// The manifest is rewritten atomically (write to a temp file, then rename)
/// so concurrent readers never observe a torn file.
fn update_manifest(
    cache_dir: &Path,
    symbol: &str,
    timeframe: &str,
    candles: &[Candle],
    source_exchange: Option<&str>,
) -> Result<()> {
    let mut manifest = read_manifest(cache_dir);
    let key = format!("{symbol}_{timeframe}");
    manifest.insert(
        key,
        ManifestEntry {
            first_timestamp: candles[0].timestamp,
            last_timestamp: candles[candles.len() - 1].timestamp,
            candle_count: candles.len(),
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source_exchange: source_exchange.map(str::to_string),
            quality_grade: None,
        },
    );

    let path = cache_dir.join(MANIFEST_FILE);
    let tmp = cache_dir.join(format!("{MANIFEST_FILE}.tmp"));
    let raw = serde_json::to_string_pretty(&manifest)
        .map_err(|e| io_error(&path, std::io::Error::other(e)))?;
    fs::write(&tmp, raw).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> DataError {
    DataError::Io { path: path.to_path_buf(), source }
}

fn csv_error(path: &Path, source: csv::Error) -> DataError {
    DataError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(source),
    }
}

fn parse_datetime(path: &Path, raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc).timestamp())
        .map_err(|e| DataError::MalformedRow {
            path: path.to_path_buf(),
            reason: format!("bad datetime '{raw}': {e}"),
        })
}

fn parse_field(path: &Path, raw: &str, name: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|e| DataError::MalformedRow {
        path: path.to_path_buf(),
        reason: format!("bad {name} '{raw}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: 1_577_836_800 + i as i64 * 86_400, // 2020-01-01 + i days
                open: 100.0 + i as f64,
                high: 101.5 + i as f64,
                low: 99.25 + i as f64,
                close: 100.5 + i as f64,
                volume: 1000.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn test_cache_path_replaces_slash() {
        let path = cache_path(Path::new("data/cache"), "BTC/USD", "1h");
        assert_eq!(path, PathBuf::from("data/cache/BTC_USD_1h.csv"));
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let candles = make_candles(10);
        write_cache(dir.path(), "BTC/USD", "1d", &candles, Some("coinbase")).unwrap();

        let restored = read_cache(dir.path(), "BTC/USD", "1d").unwrap();
        assert_eq!(restored.len(), candles.len());
        for (a, b) in candles.iter().zip(&restored) {
            assert_eq!(a.timestamp, b.timestamp);
            assert!((a.open - b.open).abs() < 1e-9 * a.open.abs());
            assert!((a.close - b.close).abs() < 1e-9 * a.close.abs());
            assert!((a.volume - b.volume).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let candles = read_cache(dir.path(), "ETH/USD", "1h").unwrap();
        assert!(candles.is_empty());
    }

    #[test]
    fn test_manifest_tracks_series() {
        let dir = tempfile::tempdir().unwrap();
        let candles = make_candles(5);
        write_cache(dir.path(), "BTC/USD", "1d", &candles, Some("coinbase")).unwrap();

        let manifest = read_manifest(dir.path());
        let entry = manifest.get("BTC/USD_1d").unwrap();
        assert_eq!(entry.candle_count, 5);
        assert_eq!(entry.first_timestamp, candles[0].timestamp);
        assert_eq!(entry.last_timestamp, candles[4].timestamp);
        assert_eq!(entry.source_exchange.as_deref(), Some("coinbase"));
    }

    #[test]
    fn test_read_sorts_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let mut candles = make_candles(4);
        candles.swap(0, 3);
        candles.push(candles[1]); // duplicate timestamp
        write_cache(dir.path(), "BTC/USD", "1d", &candles, None).unwrap();

        let restored = read_cache(dir.path(), "BTC/USD", "1d").unwrap();
        assert_eq!(restored.len(), 4);
        assert!(restored.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}
