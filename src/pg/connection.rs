//! Connection seam used by the result readers.
//!
//! [`RemoteConnection`] is the narrow contract the readers need: run a COPY
//! OUT and pull its chunks, or run a plain query and get every cell back as
//! text. [`WireConnection`] implements it over any already-authenticated
//! byte stream speaking the v3 protocol.

use std::collections::HashMap;
use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use super::error::{PgError, PgResult};
use super::protocol::*;

// ============================================================================
// Connection Contract
// ============================================================================

/// What a result reader needs from a live session.
///
/// One reader owns the connection for the whole `begin_copy`/`read`
/// sequence; implementations need not be shareable.
pub trait RemoteConnection {
    /// Issue a `COPY ... TO STDOUT` and wait until the server starts sending.
    fn begin_copy_out(&mut self, sql: &str) -> PgResult<()>;

    /// Next chunk of COPY data, or `None` once the server finished the copy.
    fn next_copy_data(&mut self) -> PgResult<Option<Bytes>>;

    /// Discard whatever is left of the current copy and return to idle.
    fn finish_copy(&mut self) -> PgResult<()>;

    /// Run a query and materialize its result in text format.
    fn query(&mut self, sql: &str) -> PgResult<TextResult>;

    /// Version string of the remote server, if known.
    fn server_version(&self) -> Option<&str>;
}

impl<C: RemoteConnection + ?Sized> RemoteConnection for &mut C {
    fn begin_copy_out(&mut self, sql: &str) -> PgResult<()> {
        (**self).begin_copy_out(sql)
    }

    fn next_copy_data(&mut self) -> PgResult<Option<Bytes>> {
        (**self).next_copy_data()
    }

    fn finish_copy(&mut self) -> PgResult<()> {
        (**self).finish_copy()
    }

    fn query(&mut self, sql: &str) -> PgResult<TextResult> {
        (**self).query(sql)
    }

    fn server_version(&self) -> Option<&str> {
        (**self).server_version()
    }
}

// ============================================================================
// Text Result
// ============================================================================

/// A fully materialized text-format result set.
#[derive(Debug, Clone, Default)]
pub struct TextResult {
    /// Column descriptions from RowDescription
    pub columns: Vec<FieldDescription>,
    rows: Vec<Vec<Option<Bytes>>>,
    /// Command tag (e.g., "SELECT 5")
    pub command_tag: String,
}

impl TextResult {
    pub fn new(columns: Vec<FieldDescription>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            command_tag: String::new(),
        }
    }

    pub fn push_row(&mut self, values: Vec<Option<Bytes>>) {
        self.rows.push(values);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
            .len()
            .max(self.rows.first().map_or(0, Vec::len))
    }

    /// Missing cells count as NULL.
    pub fn is_null(&self, row: usize, col: usize) -> bool {
        self.get_bytes(row, col).is_none()
    }

    pub fn get_bytes(&self, row: usize, col: usize) -> Option<&[u8]> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|v| v.as_deref())
    }

    pub fn get_str(&self, row: usize, col: usize) -> PgResult<Option<&str>> {
        match self.get_bytes(row, col) {
            None => Ok(None),
            Some(bytes) => std::str::from_utf8(bytes).map(Some).map_err(|_| {
                PgError::Protocol(format!("invalid UTF-8 in row {} column {}", row, col))
            }),
        }
    }
}

// ============================================================================
// Wire Connection
// ============================================================================

/// A v3 protocol session over a blocking byte stream.
///
/// Startup and authentication are done by whoever hands over the stream.
pub struct WireConnection<S> {
    stream: S,
    /// Server parameters (e.g., server_version, client_encoding)
    parameters: HashMap<String, String>,
    /// Result of `SELECT version()`, once fetched
    version: Option<String>,
    transaction_status: TransactionStatus,
    in_copy: bool,
    closed: bool,
    /// Read buffer for incoming messages
    read_buffer: BytesMut,
}

impl<S: Read + Write> WireConnection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parameters: HashMap::new(),
            version: None,
            transaction_status: TransactionStatus::Idle,
            in_copy: false,
            closed: false,
            read_buffer: BytesMut::with_capacity(32768),
        }
    }

    /// Seed parameters reported during startup.
    pub fn with_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Get a server parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|s| s.as_str())
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run `SELECT version()` and remember the answer.
    pub fn fetch_server_version(&mut self) -> PgResult<&str> {
        if self.version.is_none() {
            let result = self.query("SELECT version()")?;
            let version = result.get_str(0, 0)?.unwrap_or_default().to_string();
            self.version = Some(version);
        }
        Ok(self.version.as_deref().unwrap_or_default())
    }

    /// Send Terminate and stop using the stream.
    pub fn close(&mut self) -> PgResult<()> {
        if !self.closed {
            self.send_message(&TerminateMessage)?;
            self.closed = true;
        }
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    fn send_message<M: FrontendMessage>(&mut self, msg: &M) -> PgResult<()> {
        if self.closed {
            return Err(PgError::ConnectionClosed);
        }
        let encoded = msg.encode();
        self.stream.write_all(&encoded)?;
        self.stream.flush()?;
        Ok(())
    }

    fn send_query(&mut self, sql: &str) -> PgResult<()> {
        if self.in_copy {
            return Err(PgError::Protocol(
                "connection is still inside a COPY".to_string(),
            ));
        }
        self.send_message(&QueryMessage {
            query: sql.to_string(),
        })
    }

    /// Receive a backend message. Notices and parameter updates are
    /// absorbed here.
    fn receive_message(&mut self) -> PgResult<BackendMessage> {
        loop {
            let msg = self.receive_raw()?;
            match msg {
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::NoticeResponse { fields } => {
                    trace!(message = ?fields.get(&b'M'), "server notice");
                }
                other => return Ok(other),
            }
        }
    }

    fn receive_raw(&mut self) -> PgResult<BackendMessage> {
        loop {
            // Try to decode from buffer first
            if self.read_buffer.len() >= 5 {
                let length = i32::from_be_bytes([
                    self.read_buffer[1],
                    self.read_buffer[2],
                    self.read_buffer[3],
                    self.read_buffer[4],
                ]);
                if length < 4 {
                    return Err(PgError::Protocol(format!(
                        "invalid message length {}",
                        length
                    )));
                }

                let total_len = 1 + length as usize; // type byte + length (includes itself)

                if self.read_buffer.len() >= total_len {
                    let msg_bytes = self.read_buffer.split_to(total_len);
                    return BackendMessage::decode(&mut msg_bytes.freeze());
                }
            }

            // Need more data
            let mut buf = [0u8; 8192];
            let n = self.stream.read(&mut buf)?;

            if n == 0 {
                self.closed = true;
                return Err(PgError::ConnectionClosed);
            }

            self.read_buffer.extend_from_slice(&buf[..n]);
        }
    }

    /// Drain messages until ReadyForQuery. The first server error seen on
    /// the way is returned.
    fn drain_until_ready(&mut self) -> PgResult<()> {
        let mut first_error = None;
        loop {
            match self.receive_message()? {
                BackendMessage::ReadyForQuery { status } => {
                    self.transaction_status = status;
                    return match first_error {
                        Some(err) => Err(err),
                        None => Ok(()),
                    };
                }
                BackendMessage::ErrorResponse { fields } => {
                    first_error.get_or_insert_with(|| error_from_fields(&fields));
                }
                _ => {}
            }
        }
    }

    fn fail_unexpected(&mut self, what: &str, msg: &BackendMessage) -> PgError {
        let err = PgError::Protocol(format!("unexpected {} while {}", kind_of(msg), what));
        if let BackendMessage::ReadyForQuery { status } = msg {
            self.transaction_status = *status;
            return err;
        }
        self.resync();
        err
    }

    /// Read up to ReadyForQuery after a failed exchange. Server errors on
    /// the way are expected; anything else leaves the stream unusable.
    fn resync(&mut self) {
        match self.drain_until_ready() {
            Ok(()) | Err(PgError::Server { .. }) => {}
            Err(e) => {
                warn!(error = %e, "Could not resynchronize; closing connection");
                self.closed = true;
            }
        }
    }
}

impl<S: Read + Write> RemoteConnection for WireConnection<S> {
    fn begin_copy_out(&mut self, sql: &str) -> PgResult<()> {
        debug!(sql, "COPY OUT");
        self.send_query(sql)?;
        loop {
            let msg = self.receive_message()?;
            match msg {
                BackendMessage::CopyOutResponse { .. } => {
                    self.in_copy = true;
                    return Ok(());
                }
                BackendMessage::ErrorResponse { fields } => {
                    let err = error_from_fields(&fields);
                    self.drain_until_ready()?;
                    return Err(err);
                }
                BackendMessage::CopyInResponse => {
                    self.send_message(&CopyFailMessage {
                        reason: "COPY FROM STDIN is not supported".to_string(),
                    })?;
                    self.resync();
                    return Err(PgError::Protocol(
                        "server expected COPY IN data".to_string(),
                    ));
                }
                other => return Err(self.fail_unexpected("starting COPY OUT", &other)),
            }
        }
    }

    fn next_copy_data(&mut self) -> PgResult<Option<Bytes>> {
        if !self.in_copy {
            return Ok(None);
        }
        loop {
            match self.receive_message()? {
                BackendMessage::CopyData { data } => return Ok(Some(data)),
                BackendMessage::CopyDone => {
                    self.in_copy = false;
                    self.drain_until_ready()?;
                    return Ok(None);
                }
                BackendMessage::ErrorResponse { fields } => {
                    self.in_copy = false;
                    let err = error_from_fields(&fields);
                    self.drain_until_ready()?;
                    return Err(err);
                }
                other => {
                    self.in_copy = false;
                    return Err(self.fail_unexpected("reading COPY data", &other));
                }
            }
        }
    }

    fn finish_copy(&mut self) -> PgResult<()> {
        while self.in_copy {
            self.next_copy_data()?;
        }
        Ok(())
    }

    fn query(&mut self, sql: &str) -> PgResult<TextResult> {
        debug!(sql, "query");
        self.send_query(sql)?;

        let mut result: Option<TextResult> = None;
        loop {
            let msg = self.receive_message()?;
            match msg {
                BackendMessage::RowDescription { fields } => {
                    if result.is_none() {
                        result = Some(TextResult::new(fields));
                    }
                }
                BackendMessage::DataRow { values } => {
                    result.get_or_insert_with(TextResult::default).push_row(values);
                }
                BackendMessage::CommandComplete { tag } => {
                    let current = result.get_or_insert_with(TextResult::default);
                    if current.command_tag.is_empty() {
                        current.command_tag = tag;
                    }
                }
                BackendMessage::EmptyQueryResponse => {}
                BackendMessage::ReadyForQuery { status } => {
                    self.transaction_status = status;
                    return Ok(result.unwrap_or_default());
                }
                BackendMessage::ErrorResponse { fields } => {
                    // Drain until ReadyForQuery
                    let err = error_from_fields(&fields);
                    self.drain_until_ready()?;
                    return Err(err);
                }
                other => return Err(self.fail_unexpected("reading query result", &other)),
            }
        }
    }

    /// The `SELECT version()` string once [`fetch_server_version`] ran.
    ///
    /// The bare `server_version` parameter does not name the server product
    /// and is not consulted.
    ///
    /// [`fetch_server_version`]: WireConnection::fetch_server_version
    fn server_version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Create a PgError from error response fields.
pub(crate) fn error_from_fields(fields: &HashMap<u8, String>) -> PgError {
    PgError::Server {
        severity: fields.get(&b'S').cloned().unwrap_or_default(),
        code: fields.get(&b'C').cloned().unwrap_or_default(),
        message: fields.get(&b'M').cloned().unwrap_or_default(),
        detail: fields.get(&b'D').cloned(),
        hint: fields.get(&b'H').cloned(),
    }
}

fn kind_of(msg: &BackendMessage) -> &'static str {
    match msg {
        BackendMessage::RowDescription { .. } => "RowDescription",
        BackendMessage::DataRow { .. } => "DataRow",
        BackendMessage::CommandComplete { .. } => "CommandComplete",
        BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
        BackendMessage::CopyInResponse => "CopyInResponse",
        BackendMessage::CopyOutResponse { .. } => "CopyOutResponse",
        BackendMessage::CopyData { .. } => "CopyData",
        BackendMessage::CopyDone => "CopyDone",
        BackendMessage::ReadyForQuery { .. } => "ReadyForQuery",
        BackendMessage::ParameterStatus { .. } => "ParameterStatus",
        BackendMessage::ErrorResponse { .. } => "ErrorResponse",
        BackendMessage::NoticeResponse { .. } => "NoticeResponse",
    }
}
