//! Walk-forward period specification parser.
//!
//! A period spec is `"X/Y"` — in-sample duration over out-of-sample
//! duration. Each side is `<int><unit>` with unit Y (365 days), M (30),
//! W (7), D (1), or no unit (days). `"1Y/6M"` → `(365, 180)`.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Result, WalkForwardError};

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*([YyMmWwDd]?)$").expect("duration regex is valid"));

/// Parse one duration token (`"1Y"`, `"6M"`, `"90"`, …) into days.
fn parse_duration_days(token: &str, spec: &str) -> Result<i64> {
    let captures = DURATION_RE
        .captures(token.trim())
        .ok_or_else(|| WalkForwardError::InvalidPeriod(spec.to_string()))?;

    let count: i64 = captures[1]
        .parse()
        .map_err(|_| WalkForwardError::InvalidPeriod(spec.to_string()))?;
    let per_unit = match captures.get(2).map(|m| m.as_str()) {
        Some("Y") | Some("y") => 365,
        Some("M") | Some("m") => 30,
        Some("W") | Some("w") => 7,
        Some("D") | Some("d") | Some("") | None => 1,
        _ => return Err(WalkForwardError::InvalidPeriod(spec.to_string())),
    };

    let days = count * per_unit;
    if days <= 0 {
        return Err(WalkForwardError::InvalidPeriod(spec.to_string()));
    }
    Ok(days)
}

/// Parse a period spec into `(in_sample_days, out_of_sample_days)`.
pub fn parse_period(spec: &str) -> Result<(i64, i64)> {
    let mut parts = spec.trim().splitn(2, '/');
    let (Some(is_part), Some(oos_part)) = (parts.next(), parts.next()) else {
        return Err(WalkForwardError::InvalidPeriod(spec.to_string()));
    };
    Ok((parse_duration_days(is_part, spec)?, parse_duration_days(oos_part, spec)?))
}
