//! Reader and writer for the .NET Remoting Binary Format (NRBF), the record
//! stream produced by `BinaryFormatter` and still found in clipboard and
//! drag-and-drop payloads.
//!
//! Use [decode][decode] / [from_reader][from_reader] to turn a stream into a
//! [Graph][Graph], and [encode][encode] / [to_writer][to_writer] to go the
//! other way. [Decoder][Decoder] and [Encoder][Encoder] take options;
//! [Record][Record] gives access to single records.
//!
//! ```
//! use nrbf_format::{Array, Graph, MemberType, Value};
//!
//! let mut graph = Graph::new();
//! let shared = graph.add_string("x");
//! let root = graph.add_array(Array::new(
//!     MemberType::Object,
//!     vec![shared.into(), shared.into()],
//! ));
//! graph.set_root(root);
//!
//! let bytes = nrbf_format::encode(&graph)?;
//! assert_eq!(nrbf_format::decode(&bytes)?, graph);
//! # Ok::<(), nrbf_format::Error>(())
//! ```

use std::io::{Read, Write};

pub mod core;
mod counting;
mod de;
mod error;
pub mod header;
mod record;
mod ser;
pub mod types;
mod value;

pub use self::core::{Decoder, Encoder, ReaderOptions, WriterOptions};
pub use error::{Error, Result};
pub use header::SerializationHeader;
pub use record::{ArrayInfo, BinaryArrayRecord, ClassInfo, Record, RecordType, TypeInfo};
pub use types::{
    BinaryArrayType, BinaryType, DateTime, DateTimeKind, MemberType, PrimitiveType,
    PrimitiveValue,
};
pub use value::{Array, ClassInstance, Graph, Handle, Member, Object, Value};

/// Decodes a complete stream held in memory.
pub fn decode(bytes: &[u8]) -> Result<Graph> {
    Decoder::new(bytes).decode()
}

/// Decodes a complete stream from `reader`, which is read up to its end.
pub fn from_reader<R: Read>(reader: R) -> Result<Graph> {
    Decoder::new(reader).decode()
}

/// Encodes `graph` with the default [WriterOptions].
pub fn encode(graph: &Graph) -> Result<Vec<u8>> {
    Encoder::new(Vec::new()).encode(graph)
}

/// Encodes `graph` into `writer` with the default [WriterOptions].
pub fn to_writer<W: Write>(graph: &Graph, writer: W) -> Result<()> {
    Encoder::new(writer).encode(graph)?;
    Ok(())
}
