//! Text to host value conversion for scalar cells.
//!
//! The text reader handles nesting itself and hands every scalar leaf to a
//! [`TextCaster`]. [`DefaultTextCaster`] understands the server's default
//! output styles (ISO dates, `postgres` interval style, `t`/`f` booleans).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Result, ScanError};
use crate::literal::decode_blob_hex;
use crate::logical::{
    Date, Interval, LogicalType, TimeTz, Timestamp, Value, MICROS_PER_DAY, MICROS_PER_SECOND,
};

/// Converts one text cell to a typed host value.
pub trait TextCaster {
    fn cast(&self, text: &str, target: &LogicalType) -> Result<Value>;
}

/// Casts using the server's default text output formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTextCaster;

impl TextCaster for DefaultTextCaster {
    fn cast(&self, text: &str, target: &LogicalType) -> Result<Value> {
        let fail = || ScanError::conversion(text, target);
        let trimmed = text.trim();
        let value = match target {
            LogicalType::Boolean => Value::Boolean(parse_bool(trimmed).ok_or_else(fail)?),
            LogicalType::TinyInt => Value::TinyInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::SmallInt => Value::SmallInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::Integer => Value::Integer(trimmed.parse().map_err(|_| fail())?),
            LogicalType::BigInt => Value::BigInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::HugeInt => Value::HugeInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::UTinyInt => Value::UTinyInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::USmallInt => Value::USmallInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::UInteger => Value::UInteger(trimmed.parse().map_err(|_| fail())?),
            LogicalType::UBigInt => Value::UBigInt(trimmed.parse().map_err(|_| fail())?),
            LogicalType::Float => Value::Float(parse_float(trimmed).ok_or_else(fail)? as f32),
            LogicalType::Double => Value::Double(parse_float(trimmed).ok_or_else(fail)?),
            LogicalType::Decimal { width, scale } => Value::Decimal {
                value: parse_decimal(trimmed, *width, *scale).ok_or_else(fail)?,
                width: *width,
                scale: *scale,
            },
            LogicalType::Varchar | LogicalType::Bit => Value::Varchar(text.to_string()),
            LogicalType::Blob => Value::Blob(decode_blob_hex(trimmed)?),
            LogicalType::Date => Value::Date(parse_date(trimmed).ok_or_else(fail)?),
            LogicalType::Time => Value::Time(parse_time(trimmed).ok_or_else(fail)?),
            LogicalType::TimeTz => Value::TimeTz(parse_time_tz(trimmed).ok_or_else(fail)?),
            LogicalType::Timestamp
            | LogicalType::TimestampSec
            | LogicalType::TimestampMs
            | LogicalType::TimestampNs => {
                Value::Timestamp(parse_timestamp(trimmed, false).ok_or_else(fail)?)
            }
            LogicalType::TimestampTz => {
                Value::TimestampTz(parse_timestamp(trimmed, true).ok_or_else(fail)?)
            }
            LogicalType::Interval => Value::Interval(parse_interval(trimmed).ok_or_else(fail)?),
            LogicalType::Uuid => {
                let uuid = uuid::Uuid::parse_str(trimmed).map_err(|_| fail())?;
                Value::uuid_from_u128(uuid.as_u128())
            }
            LogicalType::Enum { labels, .. } => {
                let index = labels
                    .iter()
                    .position(|label| label == text)
                    .ok_or_else(|| {
                        ScanError::Conversion(format!("Could not map enum value \"{}\"", text))
                    })?;
                Value::Enum(index as u32)
            }
            nested => {
                return Err(ScanError::Internal(format!(
                    "nested type {} reached the scalar caster",
                    nested
                )))
            }
        };
        Ok(value)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" | "inf" => Some(f64::INFINITY),
        "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

/// Parse a plain decimal string into an integer scaled by `10^scale`,
/// rounding half away from zero on the first dropped digit.
pub fn parse_decimal(text: &str, width: u8, scale: u8) -> Option<i128> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut value: i128 = 0;
    for b in int_part.bytes() {
        value = value.checked_mul(10)?.checked_add((b - b'0') as i128)?;
    }
    let frac = frac_part.as_bytes();
    for i in 0..scale as usize {
        let d = frac.get(i).map_or(0, |b| (b - b'0') as i128);
        value = value.checked_mul(10)?.checked_add(d)?;
    }
    if frac.get(scale as usize).is_some_and(|b| *b >= b'5') {
        value = value.checked_add(1)?;
    }
    if value >= 10i128.checked_pow(width as u32)? {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// ISO date with optional ` BC` suffix, or `±infinity`.
pub fn parse_date(text: &str) -> Option<Date> {
    match text {
        "infinity" => return Some(Date::INFINITY),
        "-infinity" => return Some(Date::NEG_INFINITY),
        _ => {}
    }
    let date = parse_naive_date(text)?;
    Some(Date::from_naive(date))
}

fn parse_naive_date(text: &str) -> Option<NaiveDate> {
    let (body, bc) = match text.strip_suffix(" BC") {
        Some(body) => (body, true),
        None => (text, false),
    };
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").ok()?;
    if bc {
        // 1 BC is year 0
        use chrono::Datelike;
        date.with_year(1 - date.year())
    } else {
        Some(date)
    }
}

/// `HH:MM:SS[.ffffff]` as microseconds since midnight; `24:00:00` allowed.
pub fn parse_time(text: &str) -> Option<i64> {
    if text == "24:00:00" {
        return Some(MICROS_PER_DAY);
    }
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()?;
    Some(time.num_seconds_from_midnight() as i64 * MICROS_PER_SECOND + (time.nanosecond() / 1000) as i64)
}

/// Split `<value><+|-><offset>` where the offset is `HH[:MM[:SS]]`.
fn split_offset(text: &str, min_pos: usize) -> Option<(&str, i32)> {
    let pos = text.rfind(['+', '-'])?;
    if pos < min_pos {
        return None;
    }
    let (body, offset) = text.split_at(pos);
    let sign = if offset.starts_with('-') { -1 } else { 1 };
    let mut seconds = 0;
    for (i, part) in offset[1..].split(':').enumerate() {
        if i > 2 {
            return None;
        }
        let n: i32 = part.parse().ok()?;
        seconds += n * [3600, 60, 1][i];
    }
    Some((body, sign * seconds))
}

/// `HH:MM:SS[.f]±HH[:MM]`.
pub fn parse_time_tz(text: &str) -> Option<TimeTz> {
    let (body, offset_seconds) = split_offset(text, 1)?;
    Some(TimeTz {
        micros: parse_time(body)?,
        offset_seconds,
    })
}

/// `YYYY-MM-DD HH:MM:SS[.f]`, with a trailing zone offset when `with_zone`.
/// Zoned values are normalized to UTC.
pub fn parse_timestamp(text: &str, with_zone: bool) -> Option<Timestamp> {
    match text {
        "infinity" => return Some(Timestamp::INFINITY),
        "-infinity" => return Some(Timestamp::NEG_INFINITY),
        _ => {}
    }
    let (text, bc) = match text.strip_suffix(" BC") {
        Some(body) => (body, true),
        None => (text, false),
    };
    let (body, offset_seconds) = if with_zone {
        // the date part has its own dashes; the offset comes after the time
        split_offset(text, 11).unwrap_or((text, 0))
    } else {
        (text, 0)
    };
    let normalized = body.replacen('T', " ", 1);
    let naive = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok()?;
    let naive = if bc {
        use chrono::Datelike;
        naive.with_year(1 - naive.year())?
    } else {
        naive
    };
    let days = (naive.date() - epoch()).num_days();
    let micros = days
        .checked_mul(MICROS_PER_DAY)?
        .checked_add(naive.time().num_seconds_from_midnight() as i64 * MICROS_PER_SECOND)?
        .checked_add((naive.time().nanosecond() / 1000) as i64)?
        .checked_sub(offset_seconds as i64 * MICROS_PER_SECOND)?;
    Some(Timestamp(micros))
}

/// Interval in `postgres` output style, e.g. `1 year 2 mons -3 days 04:05:06.5`.
///
/// Also accepts spelled-out units (`months`, `microseconds`, `hours`, ...).
pub fn parse_interval(text: &str) -> Option<Interval> {
    let mut result = Interval::default();
    let mut tokens = text.split_whitespace().peekable();
    let mut saw_any = false;
    while let Some(token) = tokens.next() {
        saw_any = true;
        if token.contains(':') {
            result.micros = result.micros.checked_add(parse_clock(token)?)?;
            continue;
        }
        let amount: f64 = token.parse().ok()?;
        let unit = tokens.next()?.trim_end_matches(',').to_ascii_lowercase();
        let unit = unit.trim_end_matches('s');
        match unit {
            "year" | "yr" => result.months = result.months.checked_add((amount * 12.0) as i32)?,
            "mon" | "month" => result.months = result.months.checked_add(amount as i32)?,
            "week" => result.days = result.days.checked_add((amount * 7.0) as i32)?,
            "day" => result.days = result.days.checked_add(amount as i32)?,
            "hour" | "hr" => result.micros += (amount * 3600.0 * MICROS_PER_SECOND as f64) as i64,
            "min" | "minute" => result.micros += (amount * 60.0 * MICROS_PER_SECOND as f64) as i64,
            "sec" | "second" => result.micros += (amount * MICROS_PER_SECOND as f64) as i64,
            "millisecond" | "m" => result.micros += (amount * 1000.0) as i64,
            "microsecond" | "u" => result.micros += amount as i64,
            _ => return None,
        }
    }
    saw_any.then_some(result)
}

/// `[+-]HH:MM:SS[.f]` as signed microseconds.
fn parse_clock(token: &str) -> Option<i64> {
    let (sign, body) = match token.as_bytes().first()? {
        b'-' => (-1, &token[1..]),
        b'+' => (1, &token[1..]),
        _ => (1, token),
    };
    let mut parts = body.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next().unwrap_or("0").parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let micros = (hours * 3600 + minutes * 60) * MICROS_PER_SECOND
        + (seconds * MICROS_PER_SECOND as f64).round() as i64;
    Some(sign * micros)
}
