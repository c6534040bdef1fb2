//! Columnar batches.
//!
//! A [`ColumnarBatch`] is a fixed-capacity set of column vectors, each with
//! its own validity bitmap. Readers append values row by row; the consumer
//! calls [`ColumnarBatch::reset`] between reads, which keeps every buffer's
//! allocation.

use crate::error::{Result, ScanError};
use crate::logical::{Date, Interval, LogicalType, TimeTz, Timestamp, Value};

// ============================================================================
// Validity
// ============================================================================

/// Null bitmap; a set bit means the row is valid.
#[derive(Debug, Clone, Default)]
pub struct ValidityMask {
    bits: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            bits: Vec::with_capacity(rows.div_ceil(64)),
            len: 0,
        }
    }

    pub fn push(&mut self, valid: bool) {
        let (word, bit) = (self.len / 64, self.len % 64);
        if word == self.bits.len() {
            self.bits.push(0);
        }
        if valid {
            self.bits[word] |= 1 << bit;
        }
        self.len += 1;
    }

    #[inline]
    pub fn is_valid(&self, row: usize) -> bool {
        row < self.len && self.bits[row / 64] & (1 << (row % 64)) != 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn null_count(&self) -> usize {
        self.len - self.bits.iter().map(|w| w.count_ones() as usize).sum::<usize>()
    }

    pub fn clear(&mut self) {
        self.bits.clear();
        self.len = 0;
    }
}

// ============================================================================
// Column Data
// ============================================================================

/// Physical storage of one column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Boolean(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Int128(Vec<i128>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Varchar(Vec<String>),
    Blob(Vec<Vec<u8>>),
    Interval(Vec<Interval>),
    TimeTz(Vec<TimeTz>),
    /// `(offset, length)` into the child vector per row.
    List {
        entries: Vec<(usize, usize)>,
        child: Box<ColumnVector>,
    },
    Struct(Vec<ColumnVector>),
}

impl ColumnData {
    fn for_type(ty: &LogicalType, capacity: usize) -> Self {
        match ty {
            LogicalType::Boolean => ColumnData::Boolean(Vec::with_capacity(capacity)),
            LogicalType::TinyInt => ColumnData::Int8(Vec::with_capacity(capacity)),
            LogicalType::SmallInt => ColumnData::Int16(Vec::with_capacity(capacity)),
            LogicalType::Integer | LogicalType::Date => {
                ColumnData::Int32(Vec::with_capacity(capacity))
            }
            LogicalType::BigInt
            | LogicalType::Time
            | LogicalType::Timestamp
            | LogicalType::TimestampTz
            | LogicalType::TimestampSec
            | LogicalType::TimestampMs
            | LogicalType::TimestampNs => ColumnData::Int64(Vec::with_capacity(capacity)),
            LogicalType::HugeInt | LogicalType::Uuid => {
                ColumnData::Int128(Vec::with_capacity(capacity))
            }
            LogicalType::UTinyInt => ColumnData::UInt8(Vec::with_capacity(capacity)),
            LogicalType::USmallInt => ColumnData::UInt16(Vec::with_capacity(capacity)),
            LogicalType::UInteger | LogicalType::Enum { .. } => {
                ColumnData::UInt32(Vec::with_capacity(capacity))
            }
            LogicalType::UBigInt => ColumnData::UInt64(Vec::with_capacity(capacity)),
            LogicalType::Float => ColumnData::Float32(Vec::with_capacity(capacity)),
            LogicalType::Double => ColumnData::Float64(Vec::with_capacity(capacity)),
            LogicalType::Decimal { width, .. } => match width {
                0..=4 => ColumnData::Int16(Vec::with_capacity(capacity)),
                5..=9 => ColumnData::Int32(Vec::with_capacity(capacity)),
                10..=18 => ColumnData::Int64(Vec::with_capacity(capacity)),
                _ => ColumnData::Int128(Vec::with_capacity(capacity)),
            },
            LogicalType::Varchar | LogicalType::Bit => {
                ColumnData::Varchar(Vec::with_capacity(capacity))
            }
            LogicalType::Blob => ColumnData::Blob(Vec::with_capacity(capacity)),
            LogicalType::Interval => ColumnData::Interval(Vec::with_capacity(capacity)),
            LogicalType::TimeTz => ColumnData::TimeTz(Vec::with_capacity(capacity)),
            LogicalType::List(child) => ColumnData::List {
                entries: Vec::with_capacity(capacity),
                child: Box::new(ColumnVector::new(child, capacity)),
            },
            LogicalType::Struct { fields, .. } => ColumnData::Struct(
                fields
                    .iter()
                    .map(|(_, t)| ColumnVector::new(t, capacity))
                    .collect(),
            ),
            LogicalType::Map(key, value) => ColumnData::List {
                entries: Vec::with_capacity(capacity),
                child: Box::new(ColumnVector::new(
                    &LogicalType::struct_of([
                        ("key", (**key).clone()),
                        ("value", (**value).clone()),
                    ]),
                    capacity,
                )),
            },
            LogicalType::Union(members) => ColumnData::Struct(
                members
                    .iter()
                    .map(|(_, t)| ColumnVector::new(t, capacity))
                    .collect(),
            ),
        }
    }

    fn clear(&mut self) {
        match self {
            ColumnData::Boolean(v) => v.clear(),
            ColumnData::Int8(v) => v.clear(),
            ColumnData::Int16(v) => v.clear(),
            ColumnData::Int32(v) => v.clear(),
            ColumnData::Int64(v) => v.clear(),
            ColumnData::Int128(v) => v.clear(),
            ColumnData::UInt8(v) => v.clear(),
            ColumnData::UInt16(v) => v.clear(),
            ColumnData::UInt32(v) => v.clear(),
            ColumnData::UInt64(v) => v.clear(),
            ColumnData::Float32(v) => v.clear(),
            ColumnData::Float64(v) => v.clear(),
            ColumnData::Varchar(v) => v.clear(),
            ColumnData::Blob(v) => v.clear(),
            ColumnData::Interval(v) => v.clear(),
            ColumnData::TimeTz(v) => v.clear(),
            ColumnData::List { entries, child } => {
                entries.clear();
                child.clear();
            }
            ColumnData::Struct(children) => children.iter_mut().for_each(ColumnVector::clear),
        }
    }

    fn push_default(&mut self) {
        match self {
            ColumnData::Boolean(v) => v.push(false),
            ColumnData::Int8(v) => v.push(0),
            ColumnData::Int16(v) => v.push(0),
            ColumnData::Int32(v) => v.push(0),
            ColumnData::Int64(v) => v.push(0),
            ColumnData::Int128(v) => v.push(0),
            ColumnData::UInt8(v) => v.push(0),
            ColumnData::UInt16(v) => v.push(0),
            ColumnData::UInt32(v) => v.push(0),
            ColumnData::UInt64(v) => v.push(0),
            ColumnData::Float32(v) => v.push(0.0),
            ColumnData::Float64(v) => v.push(0.0),
            ColumnData::Varchar(v) => v.push(String::new()),
            ColumnData::Blob(v) => v.push(Vec::new()),
            ColumnData::Interval(v) => v.push(Interval::default()),
            ColumnData::TimeTz(v) => v.push(TimeTz {
                micros: 0,
                offset_seconds: 0,
            }),
            ColumnData::List { entries, child } => entries.push((child.len(), 0)),
            ColumnData::Struct(children) => {
                for child in children {
                    child.push_null();
                }
            }
        }
    }
}

// ============================================================================
// Column Vector
// ============================================================================

/// One column: logical type, physical data and validity.
#[derive(Debug, Clone)]
pub struct ColumnVector {
    logical_type: LogicalType,
    data: ColumnData,
    validity: ValidityMask,
}

fn mismatch(ty: &LogicalType, value: &Value) -> ScanError {
    ScanError::Internal(format!("cannot store {:?} in a {} column", value, ty))
}

fn narrow<T: TryFrom<i128>>(value: i128, ty: &LogicalType) -> Result<T> {
    T::try_from(value)
        .map_err(|_| ScanError::Conversion(format!("{} is out of range for {}", value, ty)))
}

impl ColumnVector {
    pub fn new(logical_type: &LogicalType, capacity: usize) -> Self {
        Self {
            data: ColumnData::for_type(logical_type, capacity),
            logical_type: logical_type.clone(),
            validity: ValidityMask::with_capacity(capacity),
        }
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.logical_type
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.validity.clear();
    }

    pub fn push_null(&mut self) {
        self.data.push_default();
        self.validity.push(false);
    }

    /// Append one value. The value's variant must match the column type.
    pub fn push(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }
        let ty = &self.logical_type;
        match (&mut self.data, value) {
            (ColumnData::Boolean(v), Value::Boolean(x)) => v.push(x),
            (ColumnData::Int8(v), Value::TinyInt(x)) => v.push(x),
            (ColumnData::Int16(v), Value::SmallInt(x)) => v.push(x),
            (ColumnData::Int32(v), Value::Integer(x)) => v.push(x),
            (ColumnData::Int32(v), Value::Date(d)) => v.push(d.0),
            (ColumnData::Int64(v), Value::BigInt(x)) => v.push(x),
            (ColumnData::Int64(v), Value::Time(x)) => v.push(x),
            (ColumnData::Int64(v), Value::Timestamp(ts) | Value::TimestampTz(ts)) => v.push(ts.0),
            (ColumnData::Int128(v), Value::HugeInt(x) | Value::Uuid(x)) => v.push(x),
            (ColumnData::UInt8(v), Value::UTinyInt(x)) => v.push(x),
            (ColumnData::UInt16(v), Value::USmallInt(x)) => v.push(x),
            (ColumnData::UInt32(v), Value::UInteger(x) | Value::Enum(x)) => v.push(x),
            (ColumnData::UInt64(v), Value::UBigInt(x)) => v.push(x),
            (ColumnData::Float32(v), Value::Float(x)) => v.push(x),
            (ColumnData::Float64(v), Value::Double(x)) => v.push(x),
            (ColumnData::Int16(v), Value::Decimal { value, .. }) => v.push(narrow(value, ty)?),
            (ColumnData::Int32(v), Value::Decimal { value, .. }) => v.push(narrow(value, ty)?),
            (ColumnData::Int64(v), Value::Decimal { value, .. }) => v.push(narrow(value, ty)?),
            (ColumnData::Int128(v), Value::Decimal { value, .. }) => v.push(value),
            (ColumnData::Varchar(v), Value::Varchar(s)) => v.push(s),
            (ColumnData::Blob(v), Value::Blob(b)) => v.push(b),
            (ColumnData::Interval(v), Value::Interval(i)) => v.push(i),
            (ColumnData::TimeTz(v), Value::TimeTz(t)) => v.push(t),
            (ColumnData::List { entries, child }, Value::List(items)) => {
                let offset = child.len();
                let len = items.len();
                for item in items {
                    child.push(item)?;
                }
                entries.push((offset, len));
            }
            (ColumnData::Struct(children), Value::Struct(fields)) => {
                if fields.len() != children.len() {
                    return Err(ScanError::Internal(format!(
                        "struct value has {} fields, column {} has {}",
                        fields.len(),
                        ty,
                        children.len()
                    )));
                }
                for (child, (_, field)) in children.iter_mut().zip(fields) {
                    child.push(field)?;
                }
            }
            (_, value) => return Err(mismatch(ty, &value)),
        }
        self.validity.push(true);
        Ok(())
    }

    /// Read back one row as a value.
    pub fn get(&self, row: usize) -> Value {
        if !self.validity.is_valid(row) {
            return Value::Null;
        }
        let ty = &self.logical_type;
        match &self.data {
            ColumnData::Boolean(v) => Value::Boolean(v[row]),
            ColumnData::Int8(v) => Value::TinyInt(v[row]),
            ColumnData::Int16(v) => match ty {
                LogicalType::Decimal { width, scale } => Value::Decimal {
                    value: v[row] as i128,
                    width: *width,
                    scale: *scale,
                },
                _ => Value::SmallInt(v[row]),
            },
            ColumnData::Int32(v) => match ty {
                LogicalType::Date => Value::Date(Date(v[row])),
                LogicalType::Decimal { width, scale } => Value::Decimal {
                    value: v[row] as i128,
                    width: *width,
                    scale: *scale,
                },
                _ => Value::Integer(v[row]),
            },
            ColumnData::Int64(v) => match ty {
                LogicalType::Time => Value::Time(v[row]),
                LogicalType::TimestampTz => Value::TimestampTz(Timestamp(v[row])),
                LogicalType::Timestamp
                | LogicalType::TimestampSec
                | LogicalType::TimestampMs
                | LogicalType::TimestampNs => Value::Timestamp(Timestamp(v[row])),
                LogicalType::Decimal { width, scale } => Value::Decimal {
                    value: v[row] as i128,
                    width: *width,
                    scale: *scale,
                },
                _ => Value::BigInt(v[row]),
            },
            ColumnData::Int128(v) => match ty {
                LogicalType::Uuid => Value::Uuid(v[row]),
                LogicalType::Decimal { width, scale } => Value::Decimal {
                    value: v[row],
                    width: *width,
                    scale: *scale,
                },
                _ => Value::HugeInt(v[row]),
            },
            ColumnData::UInt8(v) => Value::UTinyInt(v[row]),
            ColumnData::UInt16(v) => Value::USmallInt(v[row]),
            ColumnData::UInt32(v) => match ty {
                LogicalType::Enum { .. } => Value::Enum(v[row]),
                _ => Value::UInteger(v[row]),
            },
            ColumnData::UInt64(v) => Value::UBigInt(v[row]),
            ColumnData::Float32(v) => Value::Float(v[row]),
            ColumnData::Float64(v) => Value::Double(v[row]),
            ColumnData::Varchar(v) => Value::Varchar(v[row].clone()),
            ColumnData::Blob(v) => Value::Blob(v[row].clone()),
            ColumnData::Interval(v) => Value::Interval(v[row]),
            ColumnData::TimeTz(v) => Value::TimeTz(v[row]),
            ColumnData::List { entries, child } => {
                let (offset, len) = entries[row];
                Value::List((offset..offset + len).map(|i| child.get(i)).collect())
            }
            ColumnData::Struct(children) => {
                let names: Vec<String> = match ty {
                    LogicalType::Struct { fields, .. } | LogicalType::Union(fields) => {
                        fields.iter().map(|(n, _)| n.clone()).collect()
                    }
                    _ => Vec::new(),
                };
                Value::Struct(
                    children
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (names.get(i).cloned().unwrap_or_default(), c.get(row)))
                        .collect(),
                )
            }
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

/// A fixed-capacity set of columns filled in place by a reader.
#[derive(Debug, Clone)]
pub struct ColumnarBatch {
    columns: Vec<ColumnVector>,
    capacity: usize,
    len: usize,
}

impl ColumnarBatch {
    pub fn new(types: &[LogicalType], capacity: usize) -> Self {
        Self {
            columns: types.iter().map(|t| ColumnVector::new(t, capacity)).collect(),
            capacity,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &ColumnVector {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut ColumnVector {
        &mut self.columns[index]
    }

    pub fn columns(&self) -> &[ColumnVector] {
        &self.columns
    }

    /// Mark the row just written to every column as complete.
    pub fn finish_row(&mut self) {
        debug_assert!(self.columns.iter().all(|c| c.len() == self.len + 1));
        self.len += 1;
    }

    /// Empty every column, keeping allocations.
    pub fn reset(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
        self.len = 0;
    }

    /// Convenience accessor for tests and consumers.
    pub fn value(&self, column: usize, row: usize) -> Value {
        self.columns[column].get(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_mask() {
        let mut mask = ValidityMask::with_capacity(130);
        for i in 0..130 {
            mask.push(i % 3 != 0);
        }
        assert_eq!(mask.len(), 130);
        assert!(!mask.is_valid(0));
        assert!(mask.is_valid(1));
        assert!(mask.is_valid(128));
        assert!(!mask.is_valid(129));
        assert_eq!(mask.null_count(), 44);
        assert!(!mask.is_valid(500));
    }

    #[test]
    fn test_push_and_get_scalars() {
        let mut batch = ColumnarBatch::new(&[LogicalType::Integer, LogicalType::Varchar], 4);
        batch.column_mut(0).push(Value::Integer(7)).unwrap();
        batch.column_mut(1).push(Value::Null).unwrap();
        batch.finish_row();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.value(0, 0), Value::Integer(7));
        assert_eq!(batch.value(1, 0), Value::Null);
    }

    #[test]
    fn test_decimal_storage_narrowing() {
        let mut col = ColumnVector::new(&LogicalType::decimal(4, 2), 2);
        assert!(matches!(col.data(), ColumnData::Int16(_)));
        col.push(Value::Decimal {
            value: 9999,
            width: 4,
            scale: 2,
        })
        .unwrap();
        assert!(col
            .push(Value::Decimal {
                value: 100_000,
                width: 4,
                scale: 2
            })
            .is_err());
        assert_eq!(
            col.get(0),
            Value::Decimal {
                value: 9999,
                width: 4,
                scale: 2
            }
        );
    }

    #[test]
    fn test_nested_list_of_struct() {
        let point = LogicalType::struct_of([("x", LogicalType::Double), ("y", LogicalType::Double)]);
        let mut col = ColumnVector::new(&LogicalType::list(point), 2);
        let p = |x: f64, y: f64| {
            Value::Struct(vec![
                ("x".to_string(), Value::Double(x)),
                ("y".to_string(), Value::Double(y)),
            ])
        };
        col.push(Value::List(vec![p(1.0, 2.0), Value::Null])).unwrap();
        col.push(Value::List(vec![])).unwrap();
        assert_eq!(col.get(0), Value::List(vec![p(1.0, 2.0), Value::Null]));
        assert_eq!(col.get(1), Value::List(vec![]));
    }

    #[test]
    fn test_type_mismatch_is_internal_error() {
        let mut col = ColumnVector::new(&LogicalType::Integer, 1);
        assert!(matches!(
            col.push(Value::Varchar("x".into())),
            Err(ScanError::Internal(_))
        ));
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut batch = ColumnarBatch::new(&[LogicalType::BigInt], 1024);
        for i in 0..1024 {
            batch.column_mut(0).push(Value::BigInt(i)).unwrap();
            batch.finish_row();
        }
        assert!(batch.is_full());
        let cap_before = match batch.column(0).data() {
            ColumnData::Int64(v) => v.capacity(),
            _ => unreachable!(),
        };
        batch.reset();
        assert!(batch.is_empty());
        let cap_after = match batch.column(0).data() {
            ColumnData::Int64(v) => v.capacity(),
            _ => unreachable!(),
        };
        assert_eq!(cap_before, cap_after);
    }
}
