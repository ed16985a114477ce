use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;

const DAY_SECONDS: i64 = 24 * 60 * 60;

/// Parses an age literal such as `30d`, `2m` or `1y` into seconds.
/// A month counts as 30 days and a year as 365 days.
pub fn parse_age_literal_to_seconds(age_literal: &str) -> Result<i64> {
    let literal = age_literal.trim().to_lowercase();
    let mut chars = literal.chars();
    let unit = chars.next_back().map(String::from).unwrap_or_default();
    let value = chars.as_str();

    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        bail!(
            "Invalid age cap format: {}. Expected format: Nm, Nd, or Ny (e.g., '1m', '30d', '1y')",
            age_literal
        );
    }
    let value: i64 = value.parse()?;

    let days = match unit.as_str() {
        "m" => 30,
        "d" => 1,
        "y" => 365,
        _ => bail!(
            "Invalid age cap format: {}. Expected format: Nm, Nd, or Ny (e.g., '1m', '30d', '1y')",
            age_literal
        ),
    };
    value
        .checked_mul(days * DAY_SECONDS)
        .ok_or_else(|| anyhow::anyhow!("Age cap too large: {}", age_literal))
}

/// Parses a feed date (RFC 2822, then RFC 3339) into a unix timestamp.
/// Empty or unparseable input yields the current time.
pub fn convert_date_str_to_timestamp(date_str: &str) -> i64 {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return Utc::now().timestamp();
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return dt.timestamp();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return dt.timestamp();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_utc().timestamp();
    }

    warn!("Could not parse date '{}', using current time", date_str);
    Utc::now().timestamp()
}
