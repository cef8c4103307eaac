use std::fmt;
use std::io::{Read, Write};

use crate::counting::CountingReader;
use crate::de::Deserialize;
use crate::header::SerializationHeader;
use crate::ser::Serialize;
use crate::types::{BinaryArrayType, BinaryType, PrimitiveType, PrimitiveValue};
use crate::Result;

/// Record tag (`RecordTypeEnumeration`). The numbering is fixed by the
/// legacy format; gaps (18-20) are not valid tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    SerializedStreamHeader = 0,
    ClassWithId = 1,
    SystemClassWithMembers = 2,
    ClassWithMembers = 3,
    SystemClassWithMembersAndTypes = 4,
    ClassWithMembersAndTypes = 5,
    BinaryObjectString = 6,
    BinaryArray = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    BinaryLibrary = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
    MethodCall = 21,
    MethodReturn = 22,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use RecordType::*;

        let ty = match value {
            0 => SerializedStreamHeader,
            1 => ClassWithId,
            2 => SystemClassWithMembers,
            3 => ClassWithMembers,
            4 => SystemClassWithMembersAndTypes,
            5 => ClassWithMembersAndTypes,
            6 => BinaryObjectString,
            7 => BinaryArray,
            8 => MemberPrimitiveTyped,
            9 => MemberReference,
            10 => ObjectNull,
            11 => MessageEnd,
            12 => BinaryLibrary,
            13 => ObjectNullMultiple256,
            14 => ObjectNullMultiple,
            15 => ArraySinglePrimitive,
            16 => ArraySingleObject,
            17 => ArraySingleString,
            21 => MethodCall,
            22 => MethodReturn,
            _ => return None,
        };
        Some(ty)
    }

    #[inline(always)]
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Class name and member names shared by all class record variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub object_id: i32,
    pub name: String,
    pub member_names: Vec<String>,
}

/// Object id and length shared by the single-dimension array records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub object_id: i32,
    pub length: i32,
}

/// A member or element type exactly as written: class types refer to their
/// library by id rather than by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    Primitive(PrimitiveType),
    String,
    Object,
    SystemClass(String),
    Class { name: String, library_id: i32 },
    ObjectArray,
    StringArray,
    PrimitiveArray(PrimitiveType),
}

impl TypeInfo {
    pub fn binary_type(&self) -> BinaryType {
        match self {
            TypeInfo::Primitive(_) => BinaryType::Primitive,
            TypeInfo::String => BinaryType::String,
            TypeInfo::Object => BinaryType::Object,
            TypeInfo::SystemClass(_) => BinaryType::SystemClass,
            TypeInfo::Class { .. } => BinaryType::Class,
            TypeInfo::ObjectArray => BinaryType::ObjectArray,
            TypeInfo::StringArray => BinaryType::StringArray,
            TypeInfo::PrimitiveArray(_) => BinaryType::PrimitiveArray,
        }
    }
}

/// The general array record. Only rank 1 shapes are decoded into a graph,
/// but the record itself carries whatever the stream declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArrayRecord {
    pub object_id: i32,
    pub array_type: BinaryArrayType,
    pub lengths: Vec<i32>,
    /// Empty unless `array_type` is one of the offset variants.
    pub lower_bounds: Vec<i32>,
    pub element_type: TypeInfo,
}

impl BinaryArrayRecord {
    #[inline(always)]
    pub fn rank(&self) -> usize {
        self.lengths.len()
    }
}

/// One record of the stream.
///
/// Each variant holds exactly the fields its wire form defines. Records
/// that are followed by member or element records (classes and the object
/// and string arrays) only hold their own header here; the elements of
/// `ArraySinglePrimitive` are raw values and belong to the record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    SerializedStreamHeader(SerializationHeader),
    ClassWithId {
        object_id: i32,
        metadata_id: i32,
    },
    SystemClassWithMembers(ClassInfo),
    ClassWithMembers {
        class_info: ClassInfo,
        library_id: i32,
    },
    SystemClassWithMembersAndTypes {
        class_info: ClassInfo,
        member_types: Vec<TypeInfo>,
    },
    ClassWithMembersAndTypes {
        class_info: ClassInfo,
        member_types: Vec<TypeInfo>,
        library_id: i32,
    },
    BinaryObjectString {
        object_id: i32,
        value: String,
    },
    BinaryArray(BinaryArrayRecord),
    MemberPrimitiveTyped(PrimitiveValue),
    MemberReference {
        id_ref: i32,
    },
    ObjectNull,
    /// The terminator. A unit variant: every terminator is the same value.
    MessageEnd,
    BinaryLibrary {
        library_id: i32,
        library_name: String,
    },
    ObjectNullMultiple256 {
        count: u8,
    },
    ObjectNullMultiple {
        count: i32,
    },
    ArraySinglePrimitive {
        array_info: ArrayInfo,
        primitive_type: PrimitiveType,
        values: Vec<PrimitiveValue>,
    },
    ArraySingleObject(ArrayInfo),
    ArraySingleString(ArrayInfo),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::SerializedStreamHeader(_) => RecordType::SerializedStreamHeader,
            Record::ClassWithId { .. } => RecordType::ClassWithId,
            Record::SystemClassWithMembers(_) => RecordType::SystemClassWithMembers,
            Record::ClassWithMembers { .. } => RecordType::ClassWithMembers,
            Record::SystemClassWithMembersAndTypes { .. } => {
                RecordType::SystemClassWithMembersAndTypes
            }
            Record::ClassWithMembersAndTypes { .. } => RecordType::ClassWithMembersAndTypes,
            Record::BinaryObjectString { .. } => RecordType::BinaryObjectString,
            Record::BinaryArray(_) => RecordType::BinaryArray,
            Record::MemberPrimitiveTyped(_) => RecordType::MemberPrimitiveTyped,
            Record::MemberReference { .. } => RecordType::MemberReference,
            Record::ObjectNull => RecordType::ObjectNull,
            Record::MessageEnd => RecordType::MessageEnd,
            Record::BinaryLibrary { .. } => RecordType::BinaryLibrary,
            Record::ObjectNullMultiple256 { .. } => RecordType::ObjectNullMultiple256,
            Record::ObjectNullMultiple { .. } => RecordType::ObjectNullMultiple,
            Record::ArraySinglePrimitive { .. } => RecordType::ArraySinglePrimitive,
            Record::ArraySingleObject(_) => RecordType::ArraySingleObject,
            Record::ArraySingleString(_) => RecordType::ArraySingleString,
        }
    }

    /// The id this record defines, if it defines a referenceable entity.
    pub fn object_id(&self) -> Option<i32> {
        match self {
            Record::ClassWithId { object_id, .. }
            | Record::BinaryObjectString { object_id, .. } => Some(*object_id),
            Record::SystemClassWithMembers(class_info)
            | Record::ClassWithMembers { class_info, .. }
            | Record::SystemClassWithMembersAndTypes { class_info, .. }
            | Record::ClassWithMembersAndTypes { class_info, .. } => Some(class_info.object_id),
            Record::BinaryArray(array) => Some(array.object_id),
            Record::ArraySinglePrimitive { array_info, .. }
            | Record::ArraySingleObject(array_info)
            | Record::ArraySingleString(array_info) => Some(array_info.object_id),
            _ => None,
        }
    }

    /// The number of consecutive null slots this record stands for.
    pub fn null_count(&self) -> Option<usize> {
        match self {
            Record::ObjectNull => Some(1),
            Record::ObjectNullMultiple256 { count } => Some(*count as usize),
            Record::ObjectNullMultiple { count } => usize::try_from(*count).ok(),
            _ => None,
        }
    }

    /// Builds the shortest record for a run of `count` nulls, using the same
    /// thresholds as the legacy writer.
    pub fn null_run(count: usize) -> Record {
        match count {
            1 => Record::ObjectNull,
            2..=255 => Record::ObjectNullMultiple256 { count: count as u8 },
            _ => Record::ObjectNullMultiple {
                count: i32::try_from(count).unwrap_or(i32::MAX),
            },
        }
    }

    /// Reads one record, tag included.
    ///
    /// Member values that follow a class record are not part of the class
    /// record; reading them requires the member types, which is what
    /// [`Decoder`](crate::Decoder) does.
    pub fn read<R: Read>(reader: R) -> Result<Record> {
        let mut reader = CountingReader::new(reader);
        Record::deserialize(&mut reader).map_err(|e| e.truncated_at(reader.position()))
    }

    /// Writes the record, tag included.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        self.serialize(&mut writer)
    }
}
