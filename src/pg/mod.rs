//! PostgreSQL wire-level decoding.
//!
//! Everything here speaks the remote server's formats:
//! - `protocol`: v3 message framing for simple queries and COPY OUT
//! - `connection`: the connection contract the readers consume, plus a
//!   blocking implementation over any byte stream
//! - `types`: type OIDs, type descriptors and server versions
//! - `numeric`: base-10000 `numeric` decoding

pub mod connection;
pub mod error;
pub mod numeric;
pub mod protocol;
pub mod types;


pub use connection::{RemoteConnection, TextResult, WireConnection};
pub use error::{PgError, PgResult};
pub use numeric::{DecimalLayout, NumericSign};
pub use types::{Oid, PgVersion, RemoteTypeDescriptor, ServerKind};
