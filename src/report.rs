//! Walk-forward results output: windows CSV and per-bucket JSON lines.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde_json::Value;

use crate::backtesting::BacktestMetrics;
use crate::walkforward::WalkForwardResults;

/// Result type for report writers
pub type Result<T> = std::result::Result<T, io::Error>;

/// Metric field names in their serialized (sorted) order.
fn metric_field_names(metrics: &BacktestMetrics) -> Vec<String> {
    match serde_json::to_value(metrics) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Metric values aligned to `fields`; non-finite values spell themselves out
/// (`inf`) instead of disappearing into JSON null.
fn metric_values(metrics: &BacktestMetrics, fields: &[String]) -> Vec<String> {
    let Ok(Value::Object(map)) = serde_json::to_value(metrics) else {
        return vec![String::new(); fields.len()];
    };
    fields
        .iter()
        .map(|field| match map.get(field) {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) => "inf".to_string(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
        .collect()
}

/// Write one CSV row per walk-forward window.
///
/// Row layout: run identity (symbol, timeframe, period, fitness, serialized
/// filter configuration), window bounds, best parameters as JSON, then every
/// in-sample metric prefixed `is_` and every out-of-sample metric prefixed
/// `oos_`. Failed windows leave the `oos_` columns empty.
pub fn write_windows_csv(path: &Path, results: &[WalkForwardResults]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(io::Error::other)?;

    // Field list comes from any metrics instance; the record shape is fixed.
    let probe = results
        .iter()
        .flat_map(|r| r.window_results.iter())
        .map(|w| &w.in_sample_metrics)
        .next();
    let fields = probe.map(metric_field_names).unwrap_or_default();

    let mut header = vec![
        "symbol".to_string(),
        "timeframe".to_string(),
        "period".to_string(),
        "fitness_function".to_string(),
        "filter_config".to_string(),
        "window_index".to_string(),
        "in_sample_start".to_string(),
        "in_sample_end".to_string(),
        "out_sample_start".to_string(),
        "out_sample_end".to_string(),
        "best_parameters".to_string(),
    ];
    header.extend(fields.iter().map(|f| format!("is_{f}")));
    header.extend(fields.iter().map(|f| format!("oos_{f}")));
    writer.write_record(&header).map_err(io::Error::other)?;

    for result in results {
        let filter_config =
            serde_json::to_string(&result.filter_config).unwrap_or_else(|_| "{}".to_string());
        for window in &result.window_results {
            let mut row = vec![
                result.symbol.clone(),
                result.timeframe.clone(),
                result.period.clone(),
                result.fitness_function.clone(),
                filter_config.clone(),
                window.window_index.to_string(),
                window.in_sample_start.format("%Y-%m-%d").to_string(),
                window.in_sample_end.format("%Y-%m-%d").to_string(),
                window.out_sample_start.format("%Y-%m-%d").to_string(),
                window.out_sample_end.format("%Y-%m-%d").to_string(),
                serde_json::to_string(&window.best_parameters)
                    .unwrap_or_else(|_| "{}".to_string()),
            ];
            row.extend(metric_values(&window.in_sample_metrics, &fields));
            match &window.out_sample_metrics {
                Some(oos) => row.extend(metric_values(oos, &fields)),
                None => row.extend(std::iter::repeat_n(String::new(), fields.len())),
            }
            writer.write_record(&row).map_err(io::Error::other)?;
        }
    }

    writer.flush()
}

/// Write one JSON object per result bucket, newline-delimited.
pub fn write_metrics_jsonl(path: &Path, results: &[WalkForwardResults]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for result in results {
        let line = serde_json::to_string(result).map_err(io::Error::other)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}
