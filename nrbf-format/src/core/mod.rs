//! Stream-level state machines: the decoder that rebuilds a [`Graph`] from
//! records and the encoder that walks one into records.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  decode / encode / from_reader / ...    │
//! ├─────────────────────────────────────────┤
//! │  Decoder, Encoder  (this module)        │
//! │  - IdTable / IdAllocator                │
//! ├─────────────────────────────────────────┤
//! │  Record codecs (de, ser)                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! [`Graph`]: crate::Graph

mod ids;
mod reader;
mod writer;

pub use reader::{Decoder, ReaderOptions};
pub use writer::{Encoder, WriterOptions};

use crate::types::MemberType;

/// Everything a class record says about its class, minus the object id.
///
/// The decoder keeps one per class record so `ClassWithId` can borrow it;
/// the encoder uses it as a key to find an earlier record to point at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ClassLayout {
    pub name: String,
    pub library: Option<String>,
    pub member_names: Vec<String>,
    /// `None` for the untyped record variants.
    pub member_types: Option<Vec<MemberType>>,
}
