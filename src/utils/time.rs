//! Time and timestamp utilities

use chrono::{DateTime, Utc};

use crate::error::ParseError;

/// Current Unix timestamp in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds for one unit suffix
fn unit_millis(unit: char) -> Option<i64> {
    match unit {
        's' => Some(1_000),
        'm' => Some(60_000),
        'h' => Some(3_600_000),
        'd' => Some(86_400_000),
        'w' => Some(604_800_000),
        _ => None,
    }
}

/// Parse a human time span such as `30m`, `1h`, `7d` or `1w2d12h`
///
/// Each term is a number (decimals allowed, `1.5h`) followed by one of
/// `s m h d w`. Terms are summed. Case-insensitive.
pub fn parse_duration(input: &str) -> Result<i64, ParseError> {
    let input = input.trim().to_ascii_lowercase();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut total: i64 = 0;
    let mut number = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }
        if ch.is_whitespace() || ch == ',' {
            continue;
        }

        let unit = unit_millis(ch).ok_or(ParseError::UnknownUnit(ch))?;
        if number.is_empty() {
            return Err(ParseError::MissingNumber(ch));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| ParseError::InvalidNumber(number.clone()))?;
        let millis = value * unit as f64;
        if !millis.is_finite() || millis > i64::MAX as f64 {
            return Err(ParseError::Overflow);
        }
        total = total
            .checked_add(millis.round() as i64)
            .ok_or(ParseError::Overflow)?;
        number.clear();
    }

    if !number.is_empty() {
        return Err(ParseError::MissingUnit(number));
    }

    Ok(total)
}

/// UTC wall-clock rendering of a millisecond timestamp
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{}ms", millis))
}

/// Short relative age, e.g. `4.25h ago`
pub fn format_age(millis: i64, now: i64) -> String {
    let age = (now - millis).max(0) as f64;
    let (value, unit) = if age >= 86_400_000.0 {
        (age / 86_400_000.0, "d")
    } else if age >= 3_600_000.0 {
        (age / 3_600_000.0, "h")
    } else if age >= 60_000.0 {
        (age / 60_000.0, "m")
    } else {
        (age / 1_000.0, "s")
    };
    format!("{:.2}{} ago", value, unit)
}
