use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::counting::CountingReader;
use crate::header::SerializationHeader;
use crate::record::{ArrayInfo, BinaryArrayRecord, ClassInfo, Record, RecordType, TypeInfo};
use crate::types::{
    is_decimal_text, BinaryArrayType, BinaryType, DateTime, PrimitiveType, PrimitiveValue,
};
use crate::{Error, Result};

/// Upper bound on capacity reserved up front from a length read off the wire.
/// Larger collections still decode, they just grow as data actually arrives.
pub(crate) const MAX_PREALLOC: usize = 1024;

/// The legacy reader refuses arrays of more than 32 dimensions.
const MAX_RANK: i32 = 32;

pub(crate) trait Deserialize: Sized {
    fn deserialize<R: Read>(reader: &mut CountingReader<R>) -> Result<Self>;
}

// ============================================================================
// PRIMITIVE READERS
// ============================================================================

/// Read a 7-bit chunked length prefix: low groups first, high bit set on
/// every byte but the last, at most five bytes, never above `i32::MAX`.
pub(crate) fn read_length_prefix<R: Read>(reader: &mut CountingReader<R>) -> Result<usize> {
    let start = reader.position();
    let mut value: u32 = 0;

    for shift in [0u32, 7, 14, 21, 28] {
        let byte = reader.read_u8()?;
        if shift == 28 && byte > 0x07 {
            return Err(Error::malformed(start, "string length prefix out of range"));
        }
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value as usize);
        }
    }

    Err(Error::malformed(start, "string length prefix out of range"))
}

/// Read a length-prefixed UTF-8 string.
pub(crate) fn read_string<R: Read>(reader: &mut CountingReader<R>) -> Result<String> {
    let len = read_length_prefix(reader)?;
    let start = reader.position();

    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    String::from_utf8(buf).map_err(|_| Error::malformed(start, "string is not valid UTF-8"))
}

/// Read a non-negative 32-bit count.
fn read_count<R: Read>(reader: &mut CountingReader<R>, what: &str) -> Result<usize> {
    let start = reader.position();
    let value = reader.read_i32::<LittleEndian>()?;
    usize::try_from(value).map_err(|_| Error::malformed(start, format!("negative {}: {}", what, value)))
}

/// Read one UTF-8 encoded char.
fn read_char<R: Read>(reader: &mut CountingReader<R>) -> Result<char> {
    let start = reader.position();
    let mut buf = [0u8; 4];
    buf[0] = reader.read_u8()?;

    let len = match buf[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Err(Error::malformed(start, "invalid UTF-8 lead byte in char")),
    };
    reader.read_exact(&mut buf[1..len])?;

    std::str::from_utf8(&buf[..len])
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| Error::malformed(start, "invalid UTF-8 in char"))
}

fn read_primitive_type<R: Read>(reader: &mut CountingReader<R>) -> Result<PrimitiveType> {
    let start = reader.position();
    let id = reader.read_u8()?;
    match PrimitiveType::from_u8(id) {
        Some(ty) if ty.has_raw_value() => Ok(ty),
        Some(ty) => Err(Error::malformed(
            start,
            format!("primitive type {} is not a value type", ty),
        )),
        None => Err(Error::malformed(start, format!("unknown primitive type {}", id))),
    }
}

fn read_binary_type<R: Read>(reader: &mut CountingReader<R>) -> Result<BinaryType> {
    let start = reader.position();
    let id = reader.read_u8()?;
    BinaryType::from_u8(id)
        .ok_or_else(|| Error::malformed(start, format!("unknown binary type {}", id)))
}

/// Read a raw primitive value of a type known from context.
pub(crate) fn read_primitive<R: Read>(
    reader: &mut CountingReader<R>,
    ty: PrimitiveType,
) -> Result<PrimitiveValue> {
    let start = reader.position();

    let value = match ty {
        PrimitiveType::Boolean => PrimitiveValue::Boolean(reader.read_u8()? != 0),
        PrimitiveType::Byte => PrimitiveValue::Byte(reader.read_u8()?),
        PrimitiveType::Char => PrimitiveValue::Char(read_char(reader)?),
        PrimitiveType::Decimal => {
            let text = read_string(reader)?;
            if !is_decimal_text(&text) {
                return Err(Error::malformed(start, format!("invalid decimal `{}`", text)));
            }
            PrimitiveValue::Decimal(text)
        }
        PrimitiveType::Double => PrimitiveValue::Double(reader.read_f64::<LittleEndian>()?),
        PrimitiveType::Int16 => PrimitiveValue::Int16(reader.read_i16::<LittleEndian>()?),
        PrimitiveType::Int32 => PrimitiveValue::Int32(reader.read_i32::<LittleEndian>()?),
        PrimitiveType::Int64 => PrimitiveValue::Int64(reader.read_i64::<LittleEndian>()?),
        PrimitiveType::SByte => PrimitiveValue::SByte(reader.read_i8()?),
        PrimitiveType::Single => PrimitiveValue::Single(reader.read_f32::<LittleEndian>()?),
        PrimitiveType::TimeSpan => PrimitiveValue::TimeSpan(reader.read_i64::<LittleEndian>()?),
        PrimitiveType::DateTime => {
            PrimitiveValue::DateTime(DateTime::from_raw(reader.read_u64::<LittleEndian>()?))
        }
        PrimitiveType::UInt16 => PrimitiveValue::UInt16(reader.read_u16::<LittleEndian>()?),
        PrimitiveType::UInt32 => PrimitiveValue::UInt32(reader.read_u32::<LittleEndian>()?),
        PrimitiveType::UInt64 => PrimitiveValue::UInt64(reader.read_u64::<LittleEndian>()?),
        PrimitiveType::Null | PrimitiveType::String => {
            return Err(Error::malformed(
                start,
                format!("primitive type {} has no raw value", ty),
            ));
        }
    };

    Ok(value)
}

/// Read `len` raw primitives of one type, as found in primitive arrays.
pub(crate) fn read_primitives<R: Read>(
    reader: &mut CountingReader<R>,
    ty: PrimitiveType,
    len: usize,
) -> Result<Vec<PrimitiveValue>> {
    if ty == PrimitiveType::Byte {
        let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
        reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        return Ok(buf.into_iter().map(PrimitiveValue::Byte).collect());
    }

    let mut values = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        values.push(read_primitive(reader, ty)?);
    }
    Ok(values)
}

fn read_additional_info<R: Read>(
    reader: &mut CountingReader<R>,
    binary_type: BinaryType,
) -> Result<TypeInfo> {
    let info = match binary_type {
        BinaryType::Primitive => TypeInfo::Primitive(read_primitive_type(reader)?),
        BinaryType::String => TypeInfo::String,
        BinaryType::Object => TypeInfo::Object,
        BinaryType::SystemClass => TypeInfo::SystemClass(read_string(reader)?),
        BinaryType::Class => TypeInfo::Class {
            name: read_string(reader)?,
            library_id: reader.read_i32::<LittleEndian>()?,
        },
        BinaryType::ObjectArray => TypeInfo::ObjectArray,
        BinaryType::StringArray => TypeInfo::StringArray,
        BinaryType::PrimitiveArray => TypeInfo::PrimitiveArray(read_primitive_type(reader)?),
    };
    Ok(info)
}

/// Read a `MemberTypeInfo`: all binary type tags first, then the additional
/// info of each member in the same order.
fn read_member_types<R: Read>(
    reader: &mut CountingReader<R>,
    count: usize,
) -> Result<Vec<TypeInfo>> {
    let mut binary_types = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        binary_types.push(read_binary_type(reader)?);
    }

    binary_types
        .into_iter()
        .map(|binary_type| read_additional_info(reader, binary_type))
        .collect()
}

// ============================================================================
// RECORD BODIES
// ============================================================================

impl Deserialize for SerializationHeader {
    fn deserialize<R: Read>(reader: &mut CountingReader<R>) -> Result<Self> {
        Ok(SerializationHeader {
            root_id: reader.read_i32::<LittleEndian>()?,
            header_id: reader.read_i32::<LittleEndian>()?,
            major_version: reader.read_i32::<LittleEndian>()?,
            minor_version: reader.read_i32::<LittleEndian>()?,
        })
    }
}

impl Deserialize for ClassInfo {
    fn deserialize<R: Read>(reader: &mut CountingReader<R>) -> Result<Self> {
        let object_id = reader.read_i32::<LittleEndian>()?;
        let name = read_string(reader)?;
        let count = read_count(reader, "member count")?;

        let mut member_names = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            member_names.push(read_string(reader)?);
        }

        Ok(ClassInfo {
            object_id,
            name,
            member_names,
        })
    }
}

impl Deserialize for ArrayInfo {
    fn deserialize<R: Read>(reader: &mut CountingReader<R>) -> Result<Self> {
        let object_id = reader.read_i32::<LittleEndian>()?;
        let length = read_count(reader, "array length")? as i32;
        Ok(ArrayInfo { object_id, length })
    }
}

impl Deserialize for BinaryArrayRecord {
    fn deserialize<R: Read>(reader: &mut CountingReader<R>) -> Result<Self> {
        let object_id = reader.read_i32::<LittleEndian>()?;

        let start = reader.position();
        let id = reader.read_u8()?;
        let array_type = BinaryArrayType::from_u8(id)
            .ok_or_else(|| Error::malformed(start, format!("unknown binary array type {}", id)))?;

        let start = reader.position();
        let rank = reader.read_i32::<LittleEndian>()?;
        if !(1..=MAX_RANK).contains(&rank) {
            return Err(Error::malformed(start, format!("invalid array rank {}", rank)));
        }

        let mut lengths = Vec::with_capacity(rank as usize);
        for _ in 0..rank {
            lengths.push(read_count(reader, "array length")? as i32);
        }

        let mut lower_bounds = Vec::new();
        if array_type.has_lower_bounds() {
            for _ in 0..rank {
                lower_bounds.push(reader.read_i32::<LittleEndian>()?);
            }
        }

        let binary_type = read_binary_type(reader)?;
        let element_type = read_additional_info(reader, binary_type)?;

        Ok(BinaryArrayRecord {
            object_id,
            array_type,
            lengths,
            lower_bounds,
            element_type,
        })
    }
}

impl Deserialize for Record {
    fn deserialize<R: Read>(reader: &mut CountingReader<R>) -> Result<Self> {
        let start = reader.position();
        let tag = reader.read_u8()?;
        let ty = RecordType::from_u8(tag).ok_or(Error::UnknownRecordType { tag, offset: start })?;

        let record = match ty {
            RecordType::SerializedStreamHeader => {
                Record::SerializedStreamHeader(SerializationHeader::deserialize(reader)?)
            }
            RecordType::ClassWithId => Record::ClassWithId {
                object_id: reader.read_i32::<LittleEndian>()?,
                metadata_id: reader.read_i32::<LittleEndian>()?,
            },
            RecordType::SystemClassWithMembers => {
                Record::SystemClassWithMembers(ClassInfo::deserialize(reader)?)
            }
            RecordType::ClassWithMembers => Record::ClassWithMembers {
                class_info: ClassInfo::deserialize(reader)?,
                library_id: reader.read_i32::<LittleEndian>()?,
            },
            RecordType::SystemClassWithMembersAndTypes => {
                let class_info = ClassInfo::deserialize(reader)?;
                let member_types = read_member_types(reader, class_info.member_names.len())?;
                Record::SystemClassWithMembersAndTypes {
                    class_info,
                    member_types,
                }
            }
            RecordType::ClassWithMembersAndTypes => {
                let class_info = ClassInfo::deserialize(reader)?;
                let member_types = read_member_types(reader, class_info.member_names.len())?;
                Record::ClassWithMembersAndTypes {
                    class_info,
                    member_types,
                    library_id: reader.read_i32::<LittleEndian>()?,
                }
            }
            RecordType::BinaryObjectString => Record::BinaryObjectString {
                object_id: reader.read_i32::<LittleEndian>()?,
                value: read_string(reader)?,
            },
            RecordType::BinaryArray => Record::BinaryArray(BinaryArrayRecord::deserialize(reader)?),
            RecordType::MemberPrimitiveTyped => {
                let primitive_type = read_primitive_type(reader)?;
                Record::MemberPrimitiveTyped(read_primitive(reader, primitive_type)?)
            }
            RecordType::MemberReference => Record::MemberReference {
                id_ref: reader.read_i32::<LittleEndian>()?,
            },
            RecordType::ObjectNull => Record::ObjectNull,
            RecordType::MessageEnd => Record::MessageEnd,
            RecordType::BinaryLibrary => Record::BinaryLibrary {
                library_id: reader.read_i32::<LittleEndian>()?,
                library_name: read_string(reader)?,
            },
            RecordType::ObjectNullMultiple256 => Record::ObjectNullMultiple256 {
                count: reader.read_u8()?,
            },
            RecordType::ObjectNullMultiple => Record::ObjectNullMultiple {
                count: reader.read_i32::<LittleEndian>()?,
            },
            RecordType::ArraySinglePrimitive => {
                let array_info = ArrayInfo::deserialize(reader)?;
                let primitive_type = read_primitive_type(reader)?;
                let values = read_primitives(reader, primitive_type, array_info.length as usize)?;
                Record::ArraySinglePrimitive {
                    array_info,
                    primitive_type,
                    values,
                }
            }
            RecordType::ArraySingleObject => Record::ArraySingleObject(ArrayInfo::deserialize(reader)?),
            RecordType::ArraySingleString => Record::ArraySingleString(ArrayInfo::deserialize(reader)?),
            RecordType::MethodCall | RecordType::MethodReturn => {
                return Err(Error::malformed(
                    start,
                    format!("unsupported record type {}", ty),
                ));
            }
        };

        let end = reader.position();
        tracing::debug!(
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", end),
            bytes = end - start,
            record = %ty,
            "deserialized Record"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &[u8]) -> CountingReader<&[u8]> {
        CountingReader::new(data)
    }

    #[test]
    fn length_prefix_boundaries() {
        assert_eq!(read_length_prefix(&mut reader(&[0x00])).unwrap(), 0);
        assert_eq!(read_length_prefix(&mut reader(&[0x7f])).unwrap(), 127);
        assert_eq!(read_length_prefix(&mut reader(&[0x80, 0x01])).unwrap(), 128);
        assert_eq!(read_length_prefix(&mut reader(&[0xff, 0x7f])).unwrap(), 16383);
        assert_eq!(read_length_prefix(&mut reader(&[0x80, 0x80, 0x01])).unwrap(), 16384);
        assert_eq!(
            read_length_prefix(&mut reader(&[0xff, 0xff, 0xff, 0xff, 0x07])).unwrap(),
            i32::MAX as usize
        );
    }

    #[test]
    fn length_prefix_rejects_overlong() {
        let err = read_length_prefix(&mut reader(&[0xff, 0xff, 0xff, 0xff, 0x08])).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 0, .. }));

        let err = read_length_prefix(&mut reader(&[0x80, 0x80, 0x80, 0x80, 0x80])).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }

    #[test]
    fn string_reads_utf8() {
        let mut r = reader(&[0x05, b'h', b'e', b'l', b'l', b'o', 0xaa]);
        assert_eq!(read_string(&mut r).unwrap(), "hello");
        assert_eq!(r.position(), 6);

        let mut r = reader(&[0x02, 0xc3, 0xa9]);
        assert_eq!(read_string(&mut r).unwrap(), "é");
    }

    #[test]
    fn string_rejects_bad_utf8_and_truncation() {
        let err = read_string(&mut reader(&[0x01, 0xff])).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 1, .. }));

        let err = read_string(&mut reader(&[0x04, b'a', b'b'])).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn char_decodes_multibyte() {
        let mut r = reader("ü€".as_bytes());
        assert_eq!(read_primitive(&mut r, PrimitiveType::Char).unwrap(), PrimitiveValue::Char('ü'));
        assert_eq!(read_primitive(&mut r, PrimitiveType::Char).unwrap(), PrimitiveValue::Char('€'));
        assert!(read_primitive(&mut reader(&[0x80]), PrimitiveType::Char).is_err());
    }

    #[test]
    fn primitives_are_little_endian() {
        let mut r = reader(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(
            read_primitive(&mut r, PrimitiveType::Int32).unwrap(),
            PrimitiveValue::Int32(0x04030201)
        );
        let mut r = reader(&[0x34, 0x12]);
        assert_eq!(
            read_primitive(&mut r, PrimitiveType::UInt16).unwrap(),
            PrimitiveValue::UInt16(0x1234)
        );
    }

    #[test]
    fn null_and_string_have_no_raw_value() {
        assert!(read_primitive(&mut reader(&[0; 8]), PrimitiveType::Null).is_err());
        assert!(read_primitive(&mut reader(&[0; 8]), PrimitiveType::String).is_err());
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let err = Record::deserialize(&mut reader(&[0x13])).unwrap_err();
        assert!(matches!(err, Error::UnknownRecordType { tag: 0x13, offset: 0 }));
    }

    #[test]
    fn method_records_are_rejected() {
        let err = Record::deserialize(&mut reader(&[0x15, 0, 0, 0, 0])).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { .. }));
    }

    #[test]
    fn member_types_read_tags_before_infos() {
        // ClassWithMembersAndTypes, id 1, "C", members a: Int32, b: Class("T", lib 2)
        let data = [
            0x05, 0x01, 0x00, 0x00, 0x00, 0x01, b'C', 0x02, 0x00, 0x00, 0x00, 0x01, b'a', 0x01,
            b'b', 0x00, 0x04, 0x08, 0x01, b'T', 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
        ];
        let record = Record::deserialize(&mut reader(&data)).unwrap();
        assert_eq!(
            record,
            Record::ClassWithMembersAndTypes {
                class_info: ClassInfo {
                    object_id: 1,
                    name: "C".into(),
                    member_names: vec!["a".into(), "b".into()],
                },
                member_types: vec![
                    TypeInfo::Primitive(PrimitiveType::Int32),
                    TypeInfo::Class {
                        name: "T".into(),
                        library_id: 2
                    },
                ],
                library_id: 2,
            }
        );
    }

    #[test]
    fn binary_array_rejects_bad_rank() {
        // object id, Single, rank 0
        let data = [0x07, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let err = Record::deserialize(&mut reader(&data)).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 6, .. }));
    }

    #[test]
    fn negative_array_length_is_malformed() {
        let data = [0x10, 0x01, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff];
        let err = Record::deserialize(&mut reader(&data)).unwrap_err();
        assert!(matches!(err, Error::MalformedStream { offset: 5, .. }));
    }
}
