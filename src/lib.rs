//! pgscan - read remote PostgreSQL tables into host columnar batches.
//!
//! Building blocks, leaves first:
//! - [`type_bridge`]: remote type descriptors to host logical types and back
//! - [`pg`]: wire protocol, connection contract, `numeric` decoding
//! - [`literal`]: text array/composite/row-id/blob literal parsing
//! - [`reader`]: binary COPY and text result readers
//! - [`filter`]: filter pushdown to SQL
//! - [`scan`]: binding, query construction and reader selection
//!
//! The crate logs through `tracing` and never installs a subscriber.

pub mod batch;
pub mod cast;
pub mod config;
pub mod error;
pub mod filter;
pub mod literal;
pub mod logical;
pub mod pg;
pub mod reader;
pub mod scan;
pub mod type_bridge;

#[cfg(test)]
mod testing;

pub use batch::{ColumnVector, ColumnarBatch, ValidityMask};
pub use cast::{DefaultTextCaster, TextCaster};
pub use config::{ResultFormat, ScanConfig};
pub use error::{Result, ScanError};
pub use filter::{ComparisonOp, TableFilter};
pub use logical::{LogicalType, Value};
pub use reader::{BinaryResultReader, ReadResult, ReaderState, ResultReader, TextResultReader};
pub use scan::{open_reader, ColumnBinding, ScanBinding, ScanQuery, ROW_ID_INDEX};
pub use type_bridge::{
    resolve_type, to_remote_type, ResolveOptions, ResolvedType, TypeAnnotation, TypeHint,
    TypeLookup, TypeRegistry,
};
