//! Result readers.
//!
//! Both readers share one contract: [`ResultReader::begin_copy`] issues the
//! query, then repeated [`ResultReader::read`] calls fill a caller-owned
//! [`ColumnarBatch`] until [`ReadResult::Finished`]. Columns are produced in
//! projection order, rows in the order the server sent them.

mod binary;
mod text;

pub use binary::BinaryResultReader;
pub use text::TextResultReader;

use crate::batch::ColumnarBatch;
use crate::error::{Result, ScanError};
use crate::logical::{LogicalType, Value};
use crate::type_bridge::{TypeAnnotation, TypeHint};

/// Outcome of one [`ResultReader::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// The stream is exhausted; the batch holds the last rows (possibly none).
    Finished,
    /// The batch is full and more rows may follow.
    HaveMore,
}

/// Lifecycle of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Uninitialized,
    /// Query issued; the stream header has not been validated yet.
    AwaitingHeader,
    ReadingTuple,
    Drained,
}

impl ReaderState {
    /// Whether the connection is still in the middle of a result stream.
    pub fn is_streaming(self) -> bool {
        matches!(self, ReaderState::AwaitingHeader | ReaderState::ReadingTuple)
    }
}

/// Decodes a remote result stream into columnar batches.
pub trait ResultReader {
    /// Issue `sql` and prepare to read its result.
    fn begin_copy(&mut self, sql: &str) -> Result<()>;

    /// Reset `batch` and fill it with up to `batch.capacity()` rows.
    fn read(&mut self, batch: &mut ColumnarBatch) -> Result<ReadResult>;

    fn state(&self) -> ReaderState;
}

impl<R: ResultReader + ?Sized> ResultReader for Box<R> {
    fn begin_copy(&mut self, sql: &str) -> Result<()> {
        (**self).begin_copy(sql)
    }

    fn read(&mut self, batch: &mut ColumnarBatch) -> Result<ReadResult> {
        (**self).read(batch)
    }

    fn state(&self) -> ReaderState {
        (**self).state()
    }
}

static EMPTY_ANNOTATION: TypeAnnotation = TypeAnnotation {
    hint: TypeHint::None,
    children: Vec::new(),
};

/// Annotation of the `index`-th child, hint-free if the tree is shallower.
pub(crate) fn child_annotation(annotation: &TypeAnnotation, index: usize) -> &TypeAnnotation {
    annotation.children.get(index).unwrap_or(&EMPTY_ANNOTATION)
}

pub(crate) fn list_child(ty: &LogicalType) -> Result<&LogicalType> {
    ty.list_child()
        .ok_or_else(|| ScanError::Internal(format!("{} is not a list type", ty)))
}

/// Map an enum label to its index in the host enum.
pub(crate) fn enum_index(labels: &[String], label: &str) -> Result<Value> {
    labels
        .iter()
        .position(|l| l == label)
        .map(|i| Value::Enum(i as u32))
        .ok_or_else(|| ScanError::Conversion(format!("Could not map enum value \"{}\"", label)))
}

/// Build a geometry value from its coordinates.
///
/// Points become an `{x, y}` struct, every other shape a flat list of
/// coordinates.
pub(crate) fn geometry_value(hint: TypeHint, coords: Vec<f64>, source: &str) -> Result<Value> {
    let expected = match hint {
        TypeHint::GeomPoint => Some(2),
        TypeHint::GeomLine | TypeHint::GeomCircle => Some(3),
        TypeHint::GeomLineSegment | TypeHint::GeomBox => Some(4),
        _ => None,
    };
    let count_ok = match expected {
        Some(n) => coords.len() == n,
        None => coords.len() % 2 == 0,
    };
    if !count_ok {
        return Err(ScanError::Conversion(format!(
            "geometry \"{}\" has {} coordinates",
            source,
            coords.len()
        )));
    }
    if hint == TypeHint::GeomPoint {
        return Ok(Value::Struct(vec![
            ("x".to_string(), Value::Double(coords[0])),
            ("y".to_string(), Value::Double(coords[1])),
        ]));
    }
    Ok(Value::List(coords.into_iter().map(Value::Double).collect()))
}
