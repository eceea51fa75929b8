//! Duration strings in the `300ms` / `1.5s` / `1m30s` notation.
//!
//! Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. Every
//! component needs a unit except the bare string `"0"`. Negative values
//! are rejected: nothing in this service can wait for a negative time.

use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Fraction digits beyond this precision cannot change a nanosecond count.
const MAX_FRACTION_DIGITS: usize = 18;

/// Reasons a duration string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// The string is empty.
    #[error("empty duration")]
    Empty,

    /// The string starts with a minus sign.
    #[error("negative durations are not allowed")]
    Negative,

    /// A numeric component is malformed.
    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    /// A numeric component has no unit.
    #[error("missing unit after {0:?}")]
    MissingUnit(String),

    /// A unit suffix is not recognized.
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),

    /// The total does not fit in 64 bits of nanoseconds.
    #[error("duration out of range")]
    Overflow,
}

/// Parses a duration string such as `"5s"`, `"250ms"` or `"1h15m"`.
///
/// # Errors
///
/// Returns a [`DurationError`] describing the first malformed component.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(DurationError::Negative);
    }
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationError::InvalidNumber(trimmed.to_string()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        if number.is_empty() {
            return Err(DurationError::InvalidNumber(rest.to_string()));
        }

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(number.to_string()));
        }

        let component = component_nanos(number, unit_nanos(unit)?)?;
        total = total
            .checked_add(component)
            .ok_or(DurationError::Overflow)?;
        rest = next;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| DurationError::Overflow)
}

fn unit_nanos(unit: &str) -> Result<u128, DurationError> {
    match unit {
        "ns" => Ok(1),
        "us" | "µs" | "μs" => Ok(NANOS_PER_MICRO),
        "ms" => Ok(NANOS_PER_MILLI),
        "s" => Ok(NANOS_PER_SEC),
        "m" => Ok(NANOS_PER_MIN),
        "h" => Ok(NANOS_PER_HOUR),
        other => Err(DurationError::UnknownUnit(other.to_string())),
    }
}

fn component_nanos(number: &str, unit: u128) -> Result<u128, DurationError> {
    let invalid = || DurationError::InvalidNumber(number.to_string());

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| DurationError::Overflow)?
    };
    let mut nanos = whole.checked_mul(unit).ok_or(DurationError::Overflow)?;

    if !fraction.is_empty() {
        let digits = fraction.get(..MAX_FRACTION_DIGITS).unwrap_or(fraction);
        let value: u128 = digits.parse().map_err(|_| invalid())?;
        let exponent = u32::try_from(digits.len()).map_err(|_| invalid())?;
        let scale = 10u128.pow(exponent);
        nanos = nanos
            .checked_add(value.saturating_mul(unit) / scale)
            .ok_or(DurationError::Overflow)?;
    }

    Ok(nanos)
}
