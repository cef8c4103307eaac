use crate::{Error, Result};

pub const MAJOR_VERSION: i32 = 1;
pub const MINOR_VERSION: i32 = 0;

/// Header id written by the legacy serializer. Readers ignore it.
pub const DEFAULT_HEADER_ID: i32 = -1;

/// First id handed out to a referenceable entity. The root object always
/// receives it, so it is also the root id every writer puts in the header.
pub const FIRST_OBJECT_ID: i32 = 1;

/// The `SerializedStreamHeader` record, always the first record of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

impl SerializationHeader {
    pub const SIZE: usize = 17;

    pub fn new(root_id: i32) -> SerializationHeader {
        SerializationHeader {
            root_id,
            header_id: DEFAULT_HEADER_ID,
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.major_version != MAJOR_VERSION || self.minor_version != MINOR_VERSION {
            return Err(Error::InvalidHeader(format!(
                "unsupported format version {}.{}",
                self.major_version, self.minor_version
            )));
        }
        Ok(())
    }
}

impl Default for SerializationHeader {
    fn default() -> Self {
        SerializationHeader::new(FIRST_OBJECT_ID)
    }
}
