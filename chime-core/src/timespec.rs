//! Conversion between the `HH:mm` daily-time shorthand and six-field cron
//! expressions.
//!
//! Six-field cron (`sec min hour day month weekday`) is the canonical
//! storage form. `HH:mm` is an input and display convenience that maps to
//! exactly one cron shape, the daily `0 M H * * *`; everything else is
//! entered and shown as raw cron.

use std::str::FromStr;

use chrono_tz::Tz;
use cron::Schedule;

use crate::errors::ChimeError;

/// Parse `H:mm` / `HH:mm` into `(hour, minute)`.
///
/// Strict on purpose: ASCII digits only (no signs, no padding), minutes are
/// always two digits, no surrounding whitespace.
pub fn parse_hhmm(input: &str) -> Option<(u8, u8)> {
    let (h, m) = input.split_once(':')?;
    let hour = parse_field(h, 23)?;
    if m.len() != 2 {
        return None;
    }
    let minute = parse_field(m, 59)?;
    Some((hour, minute))
}

fn parse_field(s: &str, max: u8) -> Option<u8> {
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u8 = s.parse().ok()?;
    (value <= max).then_some(value)
}

/// Convert `HH:mm` into the canonical daily recurrence `0 M H * * *`.
pub fn hhmm_to_cron(input: &str) -> Option<String> {
    let (hour, minute) = parse_hhmm(input)?;
    Some(format!("0 {minute} {hour} * * *"))
}

/// Display-only inverse of [`hhmm_to_cron`].
///
/// Recovers `HH:mm` from the exact daily pattern and nothing else:
/// weekday-restricted, stepped, listed or non-zero-second expressions yield
/// `None` and are shown raw. Never attempts to abbreviate.
pub fn cron_to_hhmm(expr: &str) -> Option<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let [sec, minute, hour, dom, month, dow] = fields.as_slice() else {
        return None;
    };
    if *sec != "0" || *dom != "*" || *month != "*" || *dow != "*" {
        return None;
    }
    let minute = parse_field(minute, 59)?;
    let hour = parse_field(hour, 23)?;
    Some(format!("{hour:02}:{minute:02}"))
}

/// Validate a six-field cron expression.
///
/// The schedule parser also accepts 7-field (with year) expressions, so the
/// field count is checked separately to keep the stored form uniform.
pub fn validate_cron(expr: &str) -> Result<(), ChimeError> {
    let fields = expr.split_whitespace().count();
    if fields != 6 {
        return Err(ChimeError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 6 fields (sec min hour day month weekday), found {fields}"),
        });
    }
    Schedule::from_str(expr).map_err(|e| ChimeError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Rewrite a daily-pattern expression into its canonical spelling, so that
/// `0 05 9 * * *` and `0 5 9 * * *` store identically and the exported
/// `time = HH:mm` form re-imports to the exact stored string. Expressions
/// outside the daily pattern pass through untouched.
pub fn canonicalize_cron(expr: &str) -> String {
    cron_to_hhmm(expr)
        .and_then(|hhmm| hhmm_to_cron(&hhmm))
        .unwrap_or_else(|| expr.to_string())
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ChimeError> {
    name.parse()
        .map_err(|_| ChimeError::InvalidTimezone(name.to_string()))
}
