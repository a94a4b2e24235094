// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Duration strings
//!
//! Check plans carry intervals and timeouts in the compact form used across
//! the CI ecosystem: `1h0m0s`, `1m0s`, `10s`, `1.5s`, `250ms`.

use std::time::Duration;

use crate::errors::{CheckflowError, CheckflowResult};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Format a duration, e.g. 60s -> "1m0s", 10s -> "10s", 10ms -> "10ms"
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();

    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{}ns", nanos);
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}µs", decimal(nanos, NANOS_PER_MICRO, 3));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos, NANOS_PER_MILLI, 6));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = u128::from(total_secs % 60) * NANOS_PER_SEC + u128::from(d.subsec_nanos());

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&format!("{}s", decimal(seconds, NANOS_PER_SEC, 9)));
    out
}

/// Render `value / unit` with the fraction's trailing zeros dropped
fn decimal(value: u128, unit: u128, digits: usize) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }

    let frac = format!("{:0width$}", frac, width = digits);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parse a duration such as "1h30m", "1.5s", "10ms" or "0"
pub fn parse_duration(input: &str) -> CheckflowResult<Duration> {
    let invalid = |reason: &str| CheckflowError::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("empty string"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = match unit {
            "ns" => 1,
            "us" | "µs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid(&format!("unknown unit '{}'", unit))),
        };

        total = scaled(number, scale)
            .map_err(invalid)?
            .checked_add(total)
            .ok_or_else(|| invalid("out of range"))?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| invalid("out of range"))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// `number * scale` in nanoseconds, keeping fractional digits exact
fn scaled(number: &str, scale: u128) -> Result<u128, &'static str> {
    const MALFORMED: &str = "malformed number";
    const OUT_OF_RANGE: &str = "out of range";

    let (whole, frac) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if (whole.is_empty() && frac.is_empty()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MALFORMED);
    }

    // Only digits reach here, so a parse failure is an overflow
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| OUT_OF_RANGE)?
    };
    let mut value = whole.checked_mul(scale).ok_or(OUT_OF_RANGE)?;

    let mut place = scale;
    for digit in frac.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        value = value
            .checked_add(u128::from(digit - b'0') * place)
            .ok_or(OUT_OF_RANGE)?;
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_whole_units() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1m0s");
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h2m5s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_format_sub_second() {
        assert_eq!(format_duration(Duration::from_millis(10)), "10ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_micros(2)), "2µs");
        assert_eq!(format_duration(Duration::from_nanos(42)), "42ns");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
        assert_eq!(parse_duration("1m0s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ten seconds").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("1..5s").is_err());
        assert!(parse_duration("1.0000000000.5ns").is_err());
    }

    #[test]
    fn test_parse_rejects_overflow_without_panicking() {
        let out_of_range = |input: &str| {
            matches!(
                parse_duration(input),
                Err(CheckflowError::InvalidDuration { ref reason, .. }) if reason == "out of range"
            )
        };

        assert!(out_of_range("90000000000000000000000000h90000000000000000000000000h"));
        assert!(out_of_range("340282366920938463463374607431768211456ns"));
        assert!(out_of_range("99999999999999999999999999999h"));
        assert!(out_of_range("18446744073709551616s"));
        assert!(out_of_range("340282366920938463463374607431768211455ns1ns"));
        assert!(check_every_is_rejected("90000000000000000000000000h1s"));
    }

    fn check_every_is_rejected(value: &str) -> bool {
        crate::check::check_interval(Some(value), Duration::from_secs(60)).is_err()
    }

    #[test]
    fn test_format_then_parse_agree() {
        for d in [
            Duration::from_secs(90),
            Duration::from_millis(10),
            Duration::from_secs(7322),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
