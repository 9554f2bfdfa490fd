//! Chainage codec
//!
//! Chainage markers are encoded as `<zero-padded km>K+<metres>`, e.g. `007K+250` for
//! 7.250 km. Computed chainages are emitted as `<value>K` rounded to three decimals
//! (`7.25K`), which is the externally visible representation.

use crate::{LocateError, Result};

/// Separator between the kilometre and metre parts of a mile string
const SEPARATOR: &str = "K+";

/// Parse a mile string such as `007K+250` into kilometres
///
/// Leading zeros of the kilometre part are ignored and a missing metre part counts as
/// zero. Anything that is not made of ASCII digits fails with [`LocateError::Format`].
pub fn parse_chainage(input: &str) -> Result<f64> {
    let format_error = || LocateError::Format {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    let (km, metres) = match trimmed.split_once(SEPARATOR) {
        Some((km, metres)) => (km, metres),
        None => (trimmed, ""),
    };

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if km.is_empty() && metres.is_empty() || !is_digits(km) || !is_digits(metres) {
        return Err(format_error());
    }

    let km = km.trim_start_matches('0');
    let km = if km.is_empty() { "0" } else { km };
    let metres = if metres.is_empty() { "0" } else { metres };

    format!("{km}.{metres}")
        .parse::<f64>()
        .map_err(|_| format_error())
}

/// Format kilometres as the external chainage label, e.g. `7.25K`
///
/// The value is rounded to three decimals and printed without trailing zeros.
pub fn format_chainage(km: f64) -> String {
    let rounded = (km * 1000.0).round() / 1000.0;
    // Avoid printing "-0K"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded}K")
}
