//! Text result reader.
//!
//! Runs a plain query, receives every cell as text and re-parses structured
//! cells. Scalar leaves go through a [`TextCaster`].

use tracing::trace;

use crate::batch::ColumnarBatch;
use crate::cast::{DefaultTextCaster, TextCaster};
use crate::error::{Result, ScanError};
use crate::literal::{
    decode_blob_hex, decode_wkb_hex, parse_array_into, parse_composite_into, parse_geometry,
    parse_row_id,
};
use crate::logical::{LogicalType, Value};
use crate::pg::{PgError, RemoteConnection, TextResult};
use crate::type_bridge::{ResolvedType, TypeAnnotation, TypeHint};

use super::{child_annotation, enum_index, geometry_value, list_child, ReadResult, ReaderState, ResultReader};

/// Reads a materialized text result set.
pub struct TextResultReader<C: RemoteConnection, T: TextCaster = DefaultTextCaster> {
    conn: C,
    columns: Vec<ResolvedType>,
    decoder: CellDecoder<T>,
    state: ReaderState,
    result: Option<TextResult>,
    next_row: usize,
}

impl<C: RemoteConnection> TextResultReader<C> {
    pub fn new(conn: C, columns: Vec<ResolvedType>) -> Self {
        Self::with_caster(conn, columns, DefaultTextCaster)
    }
}

impl<C: RemoteConnection, T: TextCaster> TextResultReader<C, T> {
    pub fn with_caster(conn: C, columns: Vec<ResolvedType>, caster: T) -> Self {
        Self {
            conn,
            columns,
            decoder: CellDecoder {
                caster,
                scratch: Vec::new(),
            },
            state: ReaderState::Uninitialized,
            result: None,
            next_row: 0,
        }
    }

    pub fn columns(&self) -> &[ResolvedType] {
        &self.columns
    }

    /// Decode one non-null cell.
    pub fn decode_cell(&mut self, text: &str, resolved: &ResolvedType) -> Result<Value> {
        self.decoder.decode(text, &resolved.logical_type, &resolved.annotation)
    }
}

/// Cell decoding state. Element buffers are kept between cells, one per
/// nesting level in use.
struct CellDecoder<T> {
    caster: T,
    scratch: Vec<Vec<Option<String>>>,
}

impl<T: TextCaster> CellDecoder<T> {
    fn decode(&mut self, text: &str, ty: &LogicalType, annotation: &TypeAnnotation) -> Result<Value> {
        match annotation.hint {
            TypeHint::CastToVarchar | TypeHint::Jsonb => return Ok(Value::Varchar(text.to_string())),
            TypeHint::FixedLengthChar => {
                return Ok(Value::Varchar(text.trim_end_matches(' ').to_string()))
            }
            TypeHint::NumericAsDouble => return self.caster.cast(text, &LogicalType::Double),
            TypeHint::Ctid => return Ok(Value::BigInt(parse_row_id(text)?)),
            TypeHint::Wkb => return Ok(Value::Blob(decode_wkb_hex(text)?)),
            hint if hint.is_geometry() => {
                return geometry_value(hint, parse_geometry(text)?, text);
            }
            _ => {}
        }

        match ty {
            LogicalType::List(_) => {
                let child_ty = list_child(ty)?;
                let child_ann = child_annotation(annotation, 0);
                self.with_scratch(|decoder, elements| {
                    parse_array_into(text, elements)?;
                    let mut items = Vec::with_capacity(elements.len());
                    for element in elements.drain(..) {
                        items.push(match element {
                            None => Value::Null,
                            Some(s) => decoder.decode(&s, child_ty, child_ann)?,
                        });
                    }
                    Ok(Value::List(items))
                })
            }
            LogicalType::Struct { fields, .. } => self.with_scratch(|decoder, parts| {
                parse_composite_into(text, fields.len(), parts)?;
                let mut values = Vec::with_capacity(fields.len());
                for (index, ((name, child_ty), part)) in
                    fields.iter().zip(parts.drain(..)).enumerate()
                {
                    let value = match part {
                        None => Value::Null,
                        Some(s) => {
                            decoder.decode(&s, child_ty, child_annotation(annotation, index))?
                        }
                    };
                    values.push((name.clone(), value));
                }
                Ok(Value::Struct(values))
            }),
            LogicalType::Blob => Ok(Value::Blob(decode_blob_hex(text)?)),
            LogicalType::Enum { labels, .. } => enum_index(labels, text),
            _ => self.caster.cast(text, ty),
        }
    }

    /// Run `f` with an empty element buffer borrowed from the pool.
    fn with_scratch<R>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut Vec<Option<String>>) -> Result<R>,
    ) -> Result<R> {
        let mut buffer = self.scratch.pop().unwrap_or_default();
        let result = f(self, &mut buffer);
        buffer.clear();
        self.scratch.push(buffer);
        result
    }
}

impl<C: RemoteConnection, T: TextCaster> ResultReader for TextResultReader<C, T> {
    fn begin_copy(&mut self, sql: &str) -> Result<()> {
        if self.state.is_streaming() {
            return Err(ScanError::Internal(
                "begin_copy called while a result is being read".to_string(),
            ));
        }
        let result = self.conn.query(sql)?;
        if result.column_count() != self.columns.len() {
            return Err(PgError::FieldCountMismatch {
                expected: self.columns.len(),
                actual: result.column_count(),
            }
            .into());
        }
        self.result = Some(result);
        self.next_row = 0;
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
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| ScanError::Internal("text result missing".to_string()))?;
        let row_count = result.row_count();
        while !batch.is_full() && self.next_row < row_count {
            let row = self.next_row;
            for (index, column) in self.columns.iter().enumerate() {
                let value = match result.get_str(row, index)? {
                    None => Value::Null,
                    Some(text) => self
                        .decoder
                        .decode(text, &column.logical_type, &column.annotation)?,
                };
                batch.column_mut(index).push(value)?;
            }
            batch.finish_row();
            self.next_row += 1;
        }
        trace!(rows = batch.len(), "Decoded text batch");
        if self.next_row >= row_count {
            self.state = ReaderState::Drained;
            self.result = None;
            return Ok(ReadResult::Finished);
        }
        Ok(ReadResult::HaveMore)
    }

    fn state(&self) -> ReaderState {
        self.state
    }
}
