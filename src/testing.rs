//! Test doubles shared by the reader and scan tests.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::logical::LogicalType;
use crate::pg::protocol::{FieldDescription, Format, COPY_SIGNATURE};
use crate::pg::{Oid, PgError, PgResult, RemoteConnection, TextResult};
use crate::type_bridge::ResolvedType;

// ============================================================================
// Scripted connection
// ============================================================================

#[derive(Default)]
pub(crate) struct ScriptedConnection {
    pub(crate) chunks: VecDeque<Bytes>,
    pub(crate) text: Option<TextResult>,
    pub(crate) queries: Vec<String>,
    pub(crate) in_copy: bool,
    pub(crate) finish_calls: usize,
    pub(crate) version: Option<String>,
}

impl ScriptedConnection {
    pub(crate) fn with_chunks(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks: chunks.into(),
            ..Default::default()
        }
    }

    pub(crate) fn with_text(result: TextResult) -> Self {
        Self {
            text: Some(result),
            ..Default::default()
        }
    }
}

impl RemoteConnection for ScriptedConnection {
    fn begin_copy_out(&mut self, sql: &str) -> PgResult<()> {
        self.queries.push(sql.to_string());
        self.in_copy = true;
        Ok(())
    }

    fn next_copy_data(&mut self) -> PgResult<Option<Bytes>> {
        if !self.in_copy {
            return Ok(None);
        }
        Ok(self.chunks.pop_front())
    }

    fn finish_copy(&mut self) -> PgResult<()> {
        self.in_copy = false;
        self.finish_calls += 1;
        Ok(())
    }

    fn query(&mut self, sql: &str) -> PgResult<TextResult> {
        self.queries.push(sql.to_string());
        self.text.take().ok_or(PgError::ConnectionClosed)
    }

    fn server_version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

// ============================================================================
// Stream builders
// ============================================================================

pub(crate) fn header() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(COPY_SIGNATURE);
    buf.put_i32(0);
    buf.put_i32(0);
    buf.freeze()
}

pub(crate) fn tuple(fields: &[Option<Vec<u8>>]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_i16(fields.len() as i16);
    for field in fields {
        match field {
            None => buf.put_i32(-1),
            Some(bytes) => {
                buf.put_i32(bytes.len() as i32);
                buf.put_slice(bytes);
            }
        }
    }
    buf.freeze()
}

pub(crate) fn trailer() -> Bytes {
    Bytes::from_static(&[0xFF, 0xFF])
}

pub(crate) fn int4(v: i32) -> Option<Vec<u8>> {
    Some(v.to_be_bytes().to_vec())
}

pub(crate) fn text(s: &str) -> Option<Vec<u8>> {
    Some(s.as_bytes().to_vec())
}

pub(crate) fn ctid(page: u32, offset: u16) -> Option<Vec<u8>> {
    let mut buf = page.to_be_bytes().to_vec();
    buf.extend_from_slice(&offset.to_be_bytes());
    Some(buf)
}

pub(crate) fn numeric(weight: i16, sign: u16, dscale: i16, digits: &[u16]) -> Option<Vec<u8>> {
    let mut buf = BytesMut::new();
    buf.put_i16(digits.len() as i16);
    buf.put_i16(weight);
    buf.put_u16(sign);
    buf.put_i16(dscale);
    for d in digits {
        buf.put_u16(*d);
    }
    Some(buf.to_vec())
}

pub(crate) fn int4_array(values: &[Option<i32>]) -> Option<Vec<u8>> {
    let mut buf = BytesMut::new();
    buf.put_i32(1);
    buf.put_i32(values.iter().any(Option::is_none) as i32);
    buf.put_i32(Oid::INT4.0);
    buf.put_i32(values.len() as i32);
    buf.put_i32(1);
    for v in values {
        match v {
            None => buf.put_i32(-1),
            Some(v) => {
                buf.put_i32(4);
                buf.put_i32(*v);
            }
        }
    }
    Some(buf.to_vec())
}

pub(crate) fn columns(types: &[ResolvedType]) -> Vec<LogicalType> {
    types.iter().map(|t| t.logical_type.clone()).collect()
}

pub(crate) fn text_result(names: &[&str], rows: &[&[Option<&str>]]) -> TextResult {
    let fields = names
        .iter()
        .map(|name| FieldDescription {
            name: name.to_string(),
            table_oid: 0,
            column_attr: 0,
            type_oid: Oid::TEXT,
            type_size: -1,
            type_modifier: -1,
            format: Format::Text,
        })
        .collect();
    let mut result = TextResult::new(fields);
    for row in rows {
        result.push_row(
            row.iter()
                .map(|cell| cell.map(|s| Bytes::copy_from_slice(s.as_bytes())))
                .collect(),
        );
    }
    result
}
