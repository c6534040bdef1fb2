//! Binary COPY reader.
//!
//! Stream layout: the 11-byte signature, an i32 flags word and an i32
//! header-extension length (extension skipped), then tuples. Each tuple is an
//! i16 field count followed by `(i32 length, bytes)` per field, length -1
//! meaning NULL. A field count of -1 is the trailer. All integers are network
//! byte order.

use bytes::{Buf, Bytes};
use tracing::{trace, warn};

use crate::batch::ColumnarBatch;
use crate::error::{Result, ScanError};
use crate::literal::pack_row_id;
use crate::logical::{Date, Interval, LogicalType, TimeTz, Timestamp, Value};
use crate::pg::numeric::{decode_f64, decode_scaled, read_numeric};
use crate::pg::protocol::{
    read_bytes, read_f32, read_f64, read_i16, read_i32, read_i64, read_u16, read_u32, read_u64,
    read_u8, COPY_SIGNATURE,
};
use crate::pg::{PgError, RemoteConnection};
use crate::type_bridge::{ResolvedType, TypeAnnotation, TypeHint};

use super::{child_annotation, enum_index, geometry_value, list_child, ReadResult, ReaderState, ResultReader};

const JSONB_VERSION: u8 = 1;

/// Reads `COPY ... TO STDOUT (FORMAT "binary")` output.
pub struct BinaryResultReader<C: RemoteConnection> {
    conn: C,
    columns: Vec<ResolvedType>,
    state: ReaderState,
    /// Unconsumed part of the current CopyData chunk.
    chunk: Bytes,
}

impl<C: RemoteConnection> BinaryResultReader<C> {
    /// `columns` are the projected column types in query order.
    pub fn new(conn: C, columns: Vec<ResolvedType>) -> Self {
        Self {
            conn,
            columns,
            state: ReaderState::Uninitialized,
            chunk: Bytes::new(),
        }
    }

    pub fn columns(&self) -> &[ResolvedType] {
        &self.columns
    }

    /// Make sure the current chunk has data. Returns false at end of copy.
    fn fill_chunk(&mut self) -> Result<bool> {
        while !self.chunk.has_remaining() {
            match self.conn.next_copy_data()? {
                Some(data) => self.chunk = data,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn read_header(&mut self) -> Result<()> {
        if !self.fill_chunk()? {
            return Err(PgError::Truncated {
                context: "copy header",
            }
            .into());
        }
        let signature = read_bytes(&mut self.chunk, COPY_SIGNATURE.len(), "copy signature")?;
        if signature.as_ref() != COPY_SIGNATURE {
            return Err(PgError::Protocol(format!(
                "expected binary COPY signature, received {:02x?}",
                signature.as_ref()
            ))
            .into());
        }
        let _flags = read_i32(&mut self.chunk, "copy header flags")?;
        let extension_len = read_i32(&mut self.chunk, "copy header extension length")?;
        if extension_len < 0 {
            return Err(PgError::Protocol(format!(
                "negative copy header extension length {}",
                extension_len
            ))
            .into());
        }
        read_bytes(&mut self.chunk, extension_len as usize, "copy header extension")?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.state = ReaderState::Drained;
        self.chunk = Bytes::new();
        self.conn.finish_copy()?;
        Ok(())
    }

    /// Decode one tuple into the batch. Returns false on the trailer.
    fn read_tuple(&mut self, batch: &mut ColumnarBatch) -> Result<bool> {
        if !self.fill_chunk()? {
            // the server ended the copy without sending a trailer
            self.state = ReaderState::Drained;
            return Err(PgError::Truncated {
                context: "copy trailer",
            }
            .into());
        }
        let field_count = read_i16(&mut self.chunk, "tuple field count")?;
        if field_count <= 0 {
            return Ok(false);
        }
        if field_count as usize != self.columns.len() {
            return Err(PgError::FieldCountMismatch {
                expected: self.columns.len(),
                actual: field_count as usize,
            }
            .into());
        }
        for (index, column) in self.columns.iter().enumerate() {
            let value = read_field(&mut self.chunk, &column.logical_type, &column.annotation)?;
            batch.column_mut(index).push(value)?;
        }
        batch.finish_row();
        Ok(true)
    }
}

impl<C: RemoteConnection> ResultReader for BinaryResultReader<C> {
    fn begin_copy(&mut self, sql: &str) -> Result<()> {
        if self.state.is_streaming() {
            return Err(ScanError::Internal(
                "begin_copy called while a copy is in progress".to_string(),
            ));
        }
        self.chunk = Bytes::new();
        self.conn.begin_copy_out(sql)?;
        self.state = ReaderState::AwaitingHeader;
        if let Err(e) = self.read_header() {
            // nothing after a bad header can be trusted; discard the rest
            self.state = ReaderState::Drained;
            self.chunk = Bytes::new();
            if let Err(cleanup) = self.conn.finish_copy() {
                warn!(error = %cleanup, "Failed to discard COPY stream after header error");
            }
            return Err(e);
        }
        self.state = ReaderState::ReadingTuple;
        Ok(())
    }

    fn read(&mut self, batch: &mut ColumnarBatch) -> Result<ReadResult> {
        batch.reset();
        match self.state {
            ReaderState::Drained => return Ok(ReadResult::Finished),
            ReaderState::ReadingTuple => {}
            state => {
                return Err(ScanError::Internal(format!(
                    "read called in state {:?}",
                    state
                )))
            }
        }
        while !batch.is_full() {
            if !self.read_tuple(batch)? {
                self.drain()?;
                break;
            }
        }
        trace!(rows = batch.len(), "Decoded binary batch");
        Ok(match self.state {
            ReaderState::Drained => ReadResult::Finished,
            _ => ReadResult::HaveMore,
        })
    }

    fn state(&self) -> ReaderState {
        self.state
    }
}

impl<C: RemoteConnection> Drop for BinaryResultReader<C> {
    fn drop(&mut self) {
        if self.state.is_streaming() {
            warn!("Binary reader dropped mid-stream; discarding remaining COPY data");
            if let Err(e) = self.conn.finish_copy() {
                warn!(error = %e, "Failed to discard COPY stream");
            }
        }
    }
}

// ============================================================================
// Field decoding
// ============================================================================

/// Read one length-prefixed field.
fn read_field(buf: &mut Bytes, ty: &LogicalType, annotation: &TypeAnnotation) -> Result<Value> {
    let len = read_i32(buf, "field length")?;
    if len < 0 {
        return Ok(Value::Null);
    }
    let mut field = read_bytes(buf, len as usize, "field value")?;
    decode_value(&mut field, ty, annotation)
}

fn utf8(field: &Bytes) -> Result<String> {
    String::from_utf8(field.to_vec())
        .map_err(|e| PgError::Protocol(format!("invalid UTF-8 in text field: {}", e)).into())
}

fn read_coords(field: &mut Bytes, count: usize) -> Result<Vec<f64>> {
    if count.checked_mul(8).map_or(true, |len| len > field.remaining()) {
        return Err(PgError::Truncated {
            context: "geometry coordinates",
        }
        .into());
    }
    let mut coords = Vec::with_capacity(count);
    for _ in 0..count {
        coords.push(read_f64(field, "geometry coordinate")?);
    }
    Ok(coords)
}

fn read_point_count(field: &mut Bytes) -> Result<usize> {
    let npts = read_i32(field, "geometry point count")?;
    if npts < 0 {
        return Err(PgError::Protocol(format!("negative point count {}", npts)).into());
    }
    (npts as usize)
        .checked_mul(2)
        .ok_or_else(|| PgError::Protocol(format!("point count {} overflows", npts)).into())
}

/// Decode one non-null value occupying all of `field`.
pub(crate) fn decode_value(
    field: &mut Bytes,
    ty: &LogicalType,
    annotation: &TypeAnnotation,
) -> Result<Value> {
    match annotation.hint {
        TypeHint::CastToVarchar => return Ok(Value::Varchar(utf8(field)?)),
        TypeHint::FixedLengthChar => {
            let text = utf8(field)?;
            return Ok(Value::Varchar(text.trim_end_matches(' ').to_string()));
        }
        TypeHint::Jsonb => {
            let version = read_u8(field, "jsonb version")?;
            if version != JSONB_VERSION {
                return Err(
                    PgError::Protocol(format!("unsupported jsonb version {}", version)).into(),
                );
            }
            return Ok(Value::Varchar(utf8(field)?));
        }
        TypeHint::NumericAsDouble => {
            let (layout, digits) = read_numeric(field)?;
            return Ok(Value::Double(decode_f64(&layout, &digits)));
        }
        TypeHint::Ctid => {
            let page = read_u32(field, "ctid page")?;
            let offset = read_u16(field, "ctid offset")?;
            return Ok(Value::BigInt(pack_row_id(page, offset)));
        }
        TypeHint::Wkb => return Ok(Value::Blob(field.to_vec())),
        hint if hint.is_geometry() => {
            let coords = match hint {
                TypeHint::GeomPoint => read_coords(field, 2)?,
                TypeHint::GeomLine | TypeHint::GeomCircle => read_coords(field, 3)?,
                TypeHint::GeomLineSegment | TypeHint::GeomBox => read_coords(field, 4)?,
                TypeHint::GeomPath => {
                    let _closed = read_u8(field, "path closed flag")?;
                    let n = read_point_count(field)?;
                    read_coords(field, n)?
                }
                _ => {
                    let n = read_point_count(field)?;
                    read_coords(field, n)?
                }
            };
            return geometry_value(hint, coords, "binary");
        }
        _ => {}
    }

    let value = match ty {
        LogicalType::Boolean => Value::Boolean(read_u8(field, "bool")? != 0),
        LogicalType::SmallInt => Value::SmallInt(read_i16(field, "int2")?),
        LogicalType::Integer => Value::Integer(read_i32(field, "int4")?),
        LogicalType::BigInt => Value::BigInt(read_i64(field, "int8")?),
        LogicalType::UInteger => Value::UInteger(read_u32(field, "oid")?),
        LogicalType::Float => Value::Float(read_f32(field, "float4")?),
        LogicalType::Double => Value::Double(read_f64(field, "float8")?),
        LogicalType::Decimal { width, scale } => {
            let (layout, digits) = read_numeric(field)?;
            let value = decode_scaled(&layout, &digits, *scale)?;
            if value.unsigned_abs() >= 10u128.pow(*width as u32) {
                return Err(PgError::NumericOutOfRange(format!(
                    "value does not fit DECIMAL({},{})",
                    width, scale
                ))
                .into());
            }
            Value::Decimal {
                value,
                width: *width,
                scale: *scale,
            }
        }
        LogicalType::Varchar => Value::Varchar(utf8(field)?),
        LogicalType::Blob => Value::Blob(field.to_vec()),
        LogicalType::Date => match read_i32(field, "date")? {
            i32::MAX => Value::Date(Date::INFINITY),
            i32::MIN => Value::Date(Date::NEG_INFINITY),
            days => Value::Date(Date::from_remote_days(days)),
        },
        LogicalType::Time => Value::Time(read_i64(field, "time")?),
        LogicalType::TimeTz => {
            let micros = read_u64(field, "timetz time")? as i64;
            let offset = read_i32(field, "timetz zone")?;
            // the server stores seconds west of UTC
            Value::TimeTz(TimeTz {
                micros,
                offset_seconds: -offset,
            })
        }
        LogicalType::Timestamp | LogicalType::TimestampTz => {
            let ts = match read_i64(field, "timestamp")? {
                i64::MAX => Timestamp::INFINITY,
                i64::MIN => Timestamp::NEG_INFINITY,
                micros => Timestamp::from_remote_micros(micros),
            };
            if matches!(ty, LogicalType::TimestampTz) {
                Value::TimestampTz(ts)
            } else {
                Value::Timestamp(ts)
            }
        }
        LogicalType::Interval => {
            let micros = read_i64(field, "interval micros")?;
            let days = read_i32(field, "interval days")?;
            let months = read_i32(field, "interval months")?;
            Value::Interval(Interval {
                months,
                days,
                micros,
            })
        }
        LogicalType::Uuid => {
            let upper = read_u64(field, "uuid")? as u128;
            let lower = read_u64(field, "uuid")? as u128;
            Value::uuid_from_u128((upper << 64) | lower)
        }
        LogicalType::Enum { labels, .. } => enum_index(labels, &utf8(field)?)?,
        LogicalType::List(_) => read_array(field, ty, annotation)?,
        LogicalType::Struct { fields, .. } => {
            let count = read_i32(field, "composite field count")?;
            if count < 0 || count as usize != fields.len() {
                return Err(PgError::FieldCountMismatch {
                    expected: fields.len(),
                    actual: count.max(0) as usize,
                }
                .into());
            }
            let mut values = Vec::with_capacity(fields.len());
            for (index, (name, child_ty)) in fields.iter().enumerate() {
                let _oid = read_i32(field, "composite field oid")?;
                let value = read_field(field, child_ty, child_annotation(annotation, index))?;
                values.push((name.clone(), value));
            }
            Value::Struct(values)
        }
        other => {
            return Err(ScanError::Unsupported(format!(
                "binary decoding of {} columns",
                other
            )))
        }
    };
    Ok(value)
}

/// Arrays: `ndim`, has-null flag, element oid, `(length, lower bound)` per
/// dimension, then every element length-prefixed in row-major order.
fn read_array(field: &mut Bytes, ty: &LogicalType, annotation: &TypeAnnotation) -> Result<Value> {
    let ndim = read_i32(field, "array dimensions")?;
    let _has_null = read_i32(field, "array null flag")?;
    let _element_oid = read_i32(field, "array element oid")?;
    if ndim == 0 {
        return Ok(Value::List(Vec::new()));
    }
    let depth = ty.list_depth();
    if ndim < 0 || ndim as usize != depth {
        return Err(ScanError::Conversion(format!(
            "expected a {}-dimensional array but received {} dimensions; \
             enable array_as_varchar to read this column as text",
            depth, ndim
        )));
    }
    let mut dims = Vec::with_capacity(depth);
    for _ in 0..depth {
        let len = read_i32(field, "array dimension length")?;
        let _lower_bound = read_i32(field, "array lower bound")?;
        if len < 0 {
            return Err(PgError::Protocol(format!("negative array dimension {}", len)).into());
        }
        dims.push(len as usize);
    }
    // every element carries at least its 4-byte length prefix
    match dims.iter().try_fold(1usize, |acc, &len| acc.checked_mul(len)) {
        Some(0) => return Ok(Value::List(Vec::new())),
        Some(count) if count <= field.remaining() / 4 => {}
        _ => {
            return Err(PgError::Truncated {
                context: "array elements",
            }
            .into())
        }
    }
    read_dimension(field, &dims, ty, annotation)
}

fn read_dimension(
    field: &mut Bytes,
    dims: &[usize],
    ty: &LogicalType,
    annotation: &TypeAnnotation,
) -> Result<Value> {
    let child_ty = list_child(ty)?;
    let child_ann = child_annotation(annotation, 0);
    let mut items = Vec::with_capacity(dims[0]);
    for _ in 0..dims[0] {
        let item = if dims.len() > 1 {
            read_dimension(field, &dims[1..], child_ty, child_ann)?
        } else {
            read_field(field, child_ty, child_ann)?
        };
        items.push(item);
    }
    Ok(Value::List(items))
}
