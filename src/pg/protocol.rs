//! PostgreSQL wire protocol message encoding and decoding.
//!
//! Only the simple-query and COPY OUT subset of the v3 protocol is covered;
//! the session is expected to be authenticated already.
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::error::{PgError, PgResult};
use super::types::Oid;

// ============================================================================
// Protocol Constants
// ============================================================================

/// Signature that opens every binary COPY stream.
pub const COPY_SIGNATURE: &[u8; 11] = b"PGCOPY\n\xff\r\n\0";

/// Format codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Format {
    Text = 0,
    Binary = 1,
}

impl From<i16> for Format {
    fn from(code: i16) -> Self {
        if code == 0 {
            Format::Text
        } else {
            Format::Binary
        }
    }
}

/// Transaction status indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
}

impl From<u8> for TransactionStatus {
    fn from(b: u8) -> Self {
        match b {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Idle,
        }
    }
}

// ============================================================================
// Frontend (Client -> Server) Messages
// ============================================================================

/// Trait for encoding frontend messages
pub trait FrontendMessage {
    fn encode(&self) -> BytesMut;
}

/// Simple query message ('Q')
#[derive(Debug, Clone)]
pub struct QueryMessage {
    pub query: String,
}

impl FrontendMessage for QueryMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'Q');

        // Length (4 bytes) + query + null terminator
        let len = 4 + self.query.len() as i32 + 1;
        buf.put_i32(len);

        buf.put_slice(self.query.as_bytes());
        buf.put_u8(0);

        buf
    }
}

/// CopyFail message ('f') - abort a COPY IN the server started unexpectedly
#[derive(Debug, Clone)]
pub struct CopyFailMessage {
    pub reason: String,
}

impl FrontendMessage for CopyFailMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'f');
        buf.put_i32(4 + self.reason.len() as i32 + 1);
        buf.put_slice(self.reason.as_bytes());
        buf.put_u8(0);
        buf
    }
}

/// Terminate message ('X') - Close the connection
#[derive(Debug, Clone, Copy)]
pub struct TerminateMessage;

impl FrontendMessage for TerminateMessage {
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(b'X');
        buf.put_i32(4);
        buf
    }
}

// ============================================================================
// Backend (Server -> Client) Messages
// ============================================================================

/// Field description in a RowDescription message
#[derive(Debug, Clone)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: i32,
    pub column_attr: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: Format,
}

/// Backend message types
#[derive(Debug, Clone)]
pub enum BackendMessage {
    // Query responses
    RowDescription {
        fields: Vec<FieldDescription>,
    },
    DataRow {
        values: Vec<Option<Bytes>>,
    },
    CommandComplete {
        tag: String,
    },
    EmptyQueryResponse,

    // COPY
    CopyInResponse,
    CopyOutResponse {
        format: Format,
        column_formats: Vec<Format>,
    },
    CopyData {
        data: Bytes,
    },
    CopyDone,

    // Status
    ReadyForQuery {
        status: TransactionStatus,
    },
    ParameterStatus {
        name: String,
        value: String,
    },

    // Errors and notices
    ErrorResponse {
        fields: HashMap<u8, String>,
    },
    NoticeResponse {
        fields: HashMap<u8, String>,
    },
}

impl BackendMessage {
    /// Decode a backend message from bytes.
    ///
    /// The input buffer should start with the message type byte.
    pub fn decode(buf: &mut Bytes) -> PgResult<Self> {
        if buf.remaining() < 5 {
            return Err(PgError::Truncated {
                context: "message header",
            });
        }

        let msg_type = buf.get_u8();
        let len = buf.get_i32();
        if len < 4 {
            return Err(PgError::Protocol(format!(
                "invalid message length {} for '{}'",
                len, msg_type as char
            )));
        }
        let len = len as usize;

        if buf.remaining() < len - 4 {
            return Err(PgError::Truncated {
                context: "message body",
            });
        }

        let body = buf.split_to(len - 4);

        match msg_type {
            b'T' => Self::decode_row_description(body),
            b'D' => Self::decode_data_row(body),
            b'C' => Self::decode_command_complete(body),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'G' => Ok(BackendMessage::CopyInResponse),
            b'H' => Self::decode_copy_out_response(body),
            b'd' => Ok(BackendMessage::CopyData { data: body }),
            b'c' => Ok(BackendMessage::CopyDone),
            b'Z' => Self::decode_ready_for_query(body),
            b'E' => Self::decode_error_response(body),
            b'N' => Self::decode_notice_response(body),
            b'S' => Self::decode_parameter_status(body),
            _ => Err(PgError::Protocol(format!(
                "Unknown message type: {}",
                msg_type as char
            ))),
        }
    }

    fn decode_row_description(mut body: Bytes) -> PgResult<Self> {
        let num_fields = read_i16(&mut body, "row description field count")?.max(0) as usize;
        let mut fields = Vec::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = read_cstring(&mut body)?;
            let table_oid = read_i32(&mut body, "row description")?;
            let column_attr = read_i16(&mut body, "row description")?;
            let type_oid = Oid::from_i32(read_i32(&mut body, "row description")?);
            let type_size = read_i16(&mut body, "row description")?;
            let type_modifier = read_i32(&mut body, "row description")?;
            let format = Format::from(read_i16(&mut body, "row description")?);

            fields.push(FieldDescription {
                name,
                table_oid,
                column_attr,
                type_oid,
                type_size,
                type_modifier,
                format,
            });
        }

        Ok(BackendMessage::RowDescription { fields })
    }

    fn decode_data_row(mut body: Bytes) -> PgResult<Self> {
        let num_cols = read_i16(&mut body, "data row column count")?.max(0) as usize;
        let mut values = Vec::with_capacity(num_cols);

        for _ in 0..num_cols {
            let len = read_i32(&mut body, "data row value length")?;
            if len < 0 {
                values.push(None);
            } else {
                values.push(Some(read_bytes(&mut body, len as usize, "data row value")?));
            }
        }

        Ok(BackendMessage::DataRow { values })
    }

    fn decode_copy_out_response(mut body: Bytes) -> PgResult<Self> {
        let format = Format::from(read_u8(&mut body, "copy format")? as i16);
        let count = read_i16(&mut body, "copy column count")?.max(0) as usize;
        let mut column_formats = Vec::with_capacity(count);
        for _ in 0..count {
            column_formats.push(Format::from(read_i16(&mut body, "copy column format")?));
        }
        Ok(BackendMessage::CopyOutResponse {
            format,
            column_formats,
        })
    }

    fn decode_command_complete(mut body: Bytes) -> PgResult<Self> {
        let tag = read_cstring(&mut body)?;
        Ok(BackendMessage::CommandComplete { tag })
    }

    fn decode_ready_for_query(mut body: Bytes) -> PgResult<Self> {
        let status = TransactionStatus::from(read_u8(&mut body, "ready for query")?);
        Ok(BackendMessage::ReadyForQuery { status })
    }

    fn decode_error_response(body: Bytes) -> PgResult<Self> {
        let fields = read_error_fields(body)?;
        Ok(BackendMessage::ErrorResponse { fields })
    }

    fn decode_notice_response(body: Bytes) -> PgResult<Self> {
        let fields = read_error_fields(body)?;
        Ok(BackendMessage::NoticeResponse { fields })
    }

    fn decode_parameter_status(mut body: Bytes) -> PgResult<Self> {
        let name = read_cstring(&mut body)?;
        let value = read_cstring(&mut body)?;
        Ok(BackendMessage::ParameterStatus { name, value })
    }
}

// ============================================================================
// Checked Reads
// ============================================================================

// Every fixed-width read goes through these; running out of bytes is a
// desynchronized stream, never a short value.

#[inline]
fn ensure<B: Buf>(buf: &B, needed: usize, context: &'static str) -> PgResult<()> {
    if buf.remaining() < needed {
        return Err(PgError::Truncated { context });
    }
    Ok(())
}

#[inline]
pub(crate) fn read_u8<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<u8> {
    ensure(buf, 1, context)?;
    Ok(buf.get_u8())
}

#[inline]
pub(crate) fn read_u16<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<u16> {
    ensure(buf, 2, context)?;
    Ok(buf.get_u16())
}

#[inline]
pub(crate) fn read_i16<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<i16> {
    ensure(buf, 2, context)?;
    Ok(buf.get_i16())
}

#[inline]
pub(crate) fn read_i32<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<i32> {
    ensure(buf, 4, context)?;
    Ok(buf.get_i32())
}

#[inline]
pub(crate) fn read_u32<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<u32> {
    ensure(buf, 4, context)?;
    Ok(buf.get_u32())
}

#[inline]
pub(crate) fn read_i64<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<i64> {
    ensure(buf, 8, context)?;
    Ok(buf.get_i64())
}

#[inline]
pub(crate) fn read_u64<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<u64> {
    ensure(buf, 8, context)?;
    Ok(buf.get_u64())
}

#[inline]
pub(crate) fn read_f32<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<f32> {
    ensure(buf, 4, context)?;
    Ok(buf.get_f32())
}

#[inline]
pub(crate) fn read_f64<B: Buf>(buf: &mut B, context: &'static str) -> PgResult<f64> {
    ensure(buf, 8, context)?;
    Ok(buf.get_f64())
}

/// Split `len` bytes off the front of the buffer.
#[inline]
pub(crate) fn read_bytes(buf: &mut Bytes, len: usize, context: &'static str) -> PgResult<Bytes> {
    ensure(buf, len, context)?;
    Ok(buf.split_to(len))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read a null-terminated string from the buffer.
/// Tries direct UTF-8 first, falls back to lossy only if invalid.
fn read_cstring(buf: &mut Bytes) -> PgResult<String> {
    let mut end = 0;
    while end < buf.remaining() && buf[end] != 0 {
        end += 1;
    }

    if end >= buf.remaining() {
        return Err(PgError::Protocol(
            "Missing null terminator in string".to_string(),
        ));
    }

    let s = std::str::from_utf8(&buf[..end])
        .map(|s| s.to_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&buf[..end]).into_owned());

    buf.advance(end + 1); // Skip the null terminator
    Ok(s)
}

/// Read error/notice response fields
fn read_error_fields(mut body: Bytes) -> PgResult<HashMap<u8, String>> {
    let mut fields = HashMap::new();

    while body.remaining() > 0 {
        let field_type = body.get_u8();
        if field_type == 0 {
            break;
        }
        let value = read_cstring(&mut body)?;
        fields.insert(field_type, value);
    }

    Ok(fields)
}
