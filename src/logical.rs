//! Host logical types and values.
//!
//! This is the type system of the engine that consumes the batches. Remote
//! types are bridged onto it by [`crate::type_bridge`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime};

/// Unix day number of 2000-01-01, the remote server's date epoch.
pub const REMOTE_EPOCH_DAYS: i32 = 10_957;

/// Microseconds between 1970-01-01 and 2000-01-01.
pub const REMOTE_EPOCH_MICROS: i64 = 946_684_800_000_000;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

// ============================================================================
// Logical Types
// ============================================================================

/// A host logical type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    HugeInt,
    UTinyInt,
    USmallInt,
    UInteger,
    UBigInt,
    Float,
    Double,
    Decimal { width: u8, scale: u8 },
    Varchar,
    Blob,
    Bit,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    TimestampSec,
    TimestampMs,
    TimestampNs,
    Interval,
    Uuid,
    /// Enumeration; values are stored as the index of their label.
    Enum {
        name: Option<String>,
        labels: Arc<[String]>,
    },
    List(Box<LogicalType>),
    Struct {
        name: Option<String>,
        fields: Vec<(String, LogicalType)>,
    },
    Map(Box<LogicalType>, Box<LogicalType>),
    Union(Vec<(String, LogicalType)>),
}

impl LogicalType {
    /// Maximum width of a fixed-point decimal.
    pub const MAX_DECIMAL_WIDTH: u8 = 38;

    pub fn list(child: LogicalType) -> Self {
        LogicalType::List(Box::new(child))
    }

    pub fn decimal(width: u8, scale: u8) -> Self {
        LogicalType::Decimal { width, scale }
    }

    /// Anonymous struct from `(name, type)` pairs.
    pub fn struct_of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, LogicalType)>,
        S: Into<String>,
    {
        LogicalType::Struct {
            name: None,
            fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }

    pub fn list_child(&self) -> Option<&LogicalType> {
        match self {
            LogicalType::List(child) => Some(child),
            _ => None,
        }
    }

    pub fn struct_fields(&self) -> Option<&[(String, LogicalType)]> {
        match self {
            LogicalType::Struct { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Number of nested LIST levels, e.g. 2 for `INTEGER[][]`.
    pub fn list_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let LogicalType::List(child) = current {
            depth += 1;
            current = child;
        }
        depth
    }

    /// Whether literals of this type are written without quotes in SQL.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt
                | LogicalType::SmallInt
                | LogicalType::Integer
                | LogicalType::BigInt
                | LogicalType::HugeInt
                | LogicalType::UTinyInt
                | LogicalType::USmallInt
                | LogicalType::UInteger
                | LogicalType::UBigInt
                | LogicalType::Float
                | LogicalType::Double
                | LogicalType::Decimal { .. }
        )
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            LogicalType::List(_)
                | LogicalType::Struct { .. }
                | LogicalType::Map(..)
                | LogicalType::Union(_)
        )
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Boolean => write!(f, "BOOLEAN"),
            LogicalType::TinyInt => write!(f, "TINYINT"),
            LogicalType::SmallInt => write!(f, "SMALLINT"),
            LogicalType::Integer => write!(f, "INTEGER"),
            LogicalType::BigInt => write!(f, "BIGINT"),
            LogicalType::HugeInt => write!(f, "HUGEINT"),
            LogicalType::UTinyInt => write!(f, "UTINYINT"),
            LogicalType::USmallInt => write!(f, "USMALLINT"),
            LogicalType::UInteger => write!(f, "UINTEGER"),
            LogicalType::UBigInt => write!(f, "UBIGINT"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Decimal { width, scale } => write!(f, "DECIMAL({},{})", width, scale),
            LogicalType::Varchar => write!(f, "VARCHAR"),
            LogicalType::Blob => write!(f, "BLOB"),
            LogicalType::Bit => write!(f, "BIT"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Time => write!(f, "TIME"),
            LogicalType::TimeTz => write!(f, "TIME WITH TIME ZONE"),
            LogicalType::Timestamp => write!(f, "TIMESTAMP"),
            LogicalType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            LogicalType::TimestampSec => write!(f, "TIMESTAMP_S"),
            LogicalType::TimestampMs => write!(f, "TIMESTAMP_MS"),
            LogicalType::TimestampNs => write!(f, "TIMESTAMP_NS"),
            LogicalType::Interval => write!(f, "INTERVAL"),
            LogicalType::Uuid => write!(f, "UUID"),
            LogicalType::Enum { name: Some(name), .. } => write!(f, "{}", name),
            LogicalType::Enum { labels, .. } => {
                write!(f, "ENUM(")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}'", label.replace('\'', "''"))?;
                }
                write!(f, ")")
            }
            LogicalType::List(child) => write!(f, "{}[]", child),
            LogicalType::Struct { fields, .. } => {
                write!(f, "STRUCT(")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", name, ty)?;
                }
                write!(f, ")")
            }
            LogicalType::Map(key, value) => write!(f, "MAP({}, {})", key, value),
            LogicalType::Union(members) => {
                write!(f, "UNION(")?;
                for (i, (name, ty)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", name, ty)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Temporal Values
// ============================================================================

/// Days since 1970-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub i32);

impl Date {
    pub const INFINITY: Date = Date(i32::MAX);
    pub const NEG_INFINITY: Date = Date(-i32::MAX);

    /// Convert a day offset from the remote epoch (2000-01-01).
    pub fn from_remote_days(days: i32) -> Self {
        Date(days.wrapping_add(REMOTE_EPOCH_DAYS))
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        Date((date - epoch).num_days() as i32)
    }

    pub fn to_naive(self) -> Option<NaiveDate> {
        if !self.is_finite() {
            return None;
        }
        NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(Duration::days(self.0 as i64))
    }

    pub fn is_finite(self) -> bool {
        self != Date::INFINITY && self != Date::NEG_INFINITY
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Date::INFINITY => write!(f, "infinity"),
            Date::NEG_INFINITY => write!(f, "-infinity"),
            _ => match self.to_naive() {
                Some(date) => {
                    let bc = write_ymd(f, date)?;
                    if bc {
                        f.write_str(" BC")?;
                    }
                    Ok(())
                }
                None => write!(f, "{} days", self.0),
            },
        }
    }
}

/// Microseconds since 1970-01-01 00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const INFINITY: Timestamp = Timestamp(i64::MAX);
    pub const NEG_INFINITY: Timestamp = Timestamp(-i64::MAX);

    /// Convert a microsecond offset from the remote epoch (2000-01-01).
    pub fn from_remote_micros(micros: i64) -> Self {
        Timestamp(micros.wrapping_add(REMOTE_EPOCH_MICROS))
    }

    pub fn is_finite(self) -> bool {
        self != Timestamp::INFINITY && self != Timestamp::NEG_INFINITY
    }
}

impl Timestamp {
    /// Server text form with `zone` after the time. The era marker goes
    /// last, as in `0044-03-15 12:00:00+00 BC`.
    fn write_with_zone(&self, f: &mut fmt::Formatter<'_>, zone: &str) -> fmt::Result {
        match *self {
            Timestamp::INFINITY => write!(f, "infinity"),
            Timestamp::NEG_INFINITY => write!(f, "-infinity"),
            _ => match DateTime::from_timestamp_micros(self.0) {
                Some(ts) => {
                    let bc = write_ymd(f, ts.date_naive())?;
                    f.write_str(" ")?;
                    write_time(f, self.0.rem_euclid(MICROS_PER_DAY))?;
                    f.write_str(zone)?;
                    if bc {
                        f.write_str(" BC")?;
                    }
                    Ok(())
                }
                None => write!(f, "{} microseconds", self.0),
            },
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_with_zone(f, "")
    }
}

/// Write `YYYY-MM-DD` the way the server prints it: at least four year
/// digits, no sign, BC years counted from 1. Returns whether the caller
/// must append the BC marker.
fn write_ymd(f: &mut fmt::Formatter<'_>, date: NaiveDate) -> Result<bool, fmt::Error> {
    let year = date.year();
    let (shown, bc) = if year > 0 { (year, false) } else { (1 - year, true) };
    write!(f, "{:04}-{:02}-{:02}", shown, date.month(), date.day())?;
    Ok(bc)
}

/// Time of day with a UTC offset in seconds (east of Greenwich is positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeTz {
    pub micros: i64,
    pub offset_seconds: i32,
}

impl fmt::Display for TimeTz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_time(f, self.micros)?;
        let sign = if self.offset_seconds < 0 { '-' } else { '+' };
        let abs = self.offset_seconds.unsigned_abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)?;
        if abs % 60 != 0 {
            write!(f, ":{:02}", abs % 60)?;
        }
        Ok(())
    }
}

/// Calendar interval. Months, days and microseconds are kept apart, as on
/// the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} months {} days {} microseconds",
            self.months, self.days, self.micros
        )
    }
}

fn write_time(f: &mut fmt::Formatter<'_>, micros: i64) -> fmt::Result {
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let frac = micros.rem_euclid(MICROS_PER_SECOND);
    // 24:00:00 is a valid remote time and has no chrono representation
    if secs >= 86_400 {
        return write!(f, "24:00:00");
    }
    match NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, (frac * 1000) as u32) {
        Some(time) if frac == 0 => write!(f, "{}", time.format("%H:%M:%S")),
        Some(time) => write!(f, "{}", time.format("%H:%M:%S%.6f")),
        None => write!(f, "{} microseconds", micros),
    }
}

// ============================================================================
// Values
// ============================================================================

/// A single host value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    HugeInt(i128),
    UTinyInt(u8),
    USmallInt(u16),
    UInteger(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    /// Scaled integer: the value is `value / 10^scale`.
    Decimal { value: i128, width: u8, scale: u8 },
    Varchar(String),
    Blob(Vec<u8>),
    Date(Date),
    /// Microseconds since midnight.
    Time(i64),
    TimeTz(TimeTz),
    Timestamp(Timestamp),
    TimestampTz(Timestamp),
    Interval(Interval),
    /// Ordering-compatible 128-bit UUID (upper half sign bit flipped).
    Uuid(i128),
    /// Index into the enum's label list.
    Enum(u32),
    List(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is written bare (unquoted) in SQL text.
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::TinyInt(_)
            | Value::SmallInt(_)
            | Value::Integer(_)
            | Value::BigInt(_)
            | Value::HugeInt(_)
            | Value::UTinyInt(_)
            | Value::USmallInt(_)
            | Value::UInteger(_)
            | Value::UBigInt(_)
            | Value::Decimal { .. } => true,
            Value::Float(v) => v.is_finite(),
            Value::Double(v) => v.is_finite(),
            _ => false,
        }
    }

    /// Build a UUID value from its canonical 128-bit big-endian form.
    pub fn uuid_from_u128(raw: u128) -> Self {
        Value::Uuid((raw ^ (1u128 << 127)) as i128)
    }

    /// Canonical 128-bit form of a UUID value.
    pub fn uuid_to_u128(stored: i128) -> u128 {
        (stored as u128) ^ (1u128 << 127)
    }

    /// Integer view used by the row-id and unsigned paths.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::TinyInt(v) => Some(v as i128),
            Value::SmallInt(v) => Some(v as i128),
            Value::Integer(v) => Some(v as i128),
            Value::BigInt(v) => Some(v as i128),
            Value::HugeInt(v) => Some(v),
            Value::UTinyInt(v) => Some(v as i128),
            Value::USmallInt(v) => Some(v as i128),
            Value::UInteger(v) => Some(v as i128),
            Value::UBigInt(v) => Some(v as i128),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::HugeInt(v) => write!(f, "{}", v),
            Value::UTinyInt(v) => write!(f, "{}", v),
            Value::USmallInt(v) => write!(f, "{}", v),
            Value::UInteger(v) => write!(f, "{}", v),
            Value::UBigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write_float(f, *v as f64),
            Value::Double(v) => write_float(f, *v),
            Value::Decimal { value, scale, .. } => write_decimal(f, *value, *scale),
            Value::Varchar(s) => write!(f, "{}", s),
            Value::Blob(bytes) => {
                write!(f, "\\x")?;
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(micros) => write_time(f, *micros),
            Value::TimeTz(t) => write!(f, "{}", t),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::TimestampTz(ts) => ts.write_with_zone(f, "+00"),
            Value::Interval(i) => write!(f, "{}", i),
            Value::Uuid(v) => write!(
                f,
                "{}",
                uuid::Uuid::from_u128(Value::uuid_to_u128(*v)).hyphenated()
            ),
            Value::Enum(index) => write!(f, "{}", index),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        write!(f, "NaN")
    } else if v.is_infinite() {
        write!(f, "{}", if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{}", v)
    }
}

fn write_decimal(f: &mut fmt::Formatter<'_>, value: i128, scale: u8) -> fmt::Result {
    if scale == 0 {
        return write!(f, "{}", value);
    }
    let divisor = 10u128.pow(scale as u32);
    let abs = value.unsigned_abs();
    let sign = if value < 0 { "-" } else { "" };
    write!(
        f,
        "{}{}.{:0width$}",
        sign,
        abs / divisor,
        abs % divisor,
        width = scale as usize
    )
}
