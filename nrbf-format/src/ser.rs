use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::header::SerializationHeader;
use crate::record::{ArrayInfo, BinaryArrayRecord, ClassInfo, Record, TypeInfo};
use crate::types::{is_decimal_text, PrimitiveType, PrimitiveValue};
use crate::{Error, Result};

pub(crate) trait Serialize {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<()>;
}

// ============================================================================
// PRIMITIVE WRITERS
// ============================================================================

pub(crate) fn write_length_prefix<W: Write>(writer: &mut W, len: usize) -> Result<()> {
    let mut value = u32::try_from(len)
        .ok()
        .filter(|v| *v <= i32::MAX as u32)
        .ok_or_else(|| Error::unsupported(format!("string of {} bytes is too long", len)))?;

    while value >= 0x80 {
        writer.write_u8((value as u8 & 0x7f) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)?;
    Ok(())
}

pub(crate) fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    write_length_prefix(writer, value.len())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

/// Checks that a value can be written raw, without writing anything.
pub(crate) fn check_primitive(value: &PrimitiveValue) -> Result<()> {
    match value {
        PrimitiveValue::Decimal(text) if !is_decimal_text(text) => {
            Err(Error::unsupported(format!("`{}` is not a decimal", text)))
        }
        PrimitiveValue::Decimal(text) if text.len() > i32::MAX as usize => {
            Err(Error::unsupported("decimal text is too long"))
        }
        _ => Ok(()),
    }
}

/// Writes a raw primitive value, without a type tag.
pub(crate) fn write_primitive<W: Write>(writer: &mut W, value: &PrimitiveValue) -> Result<()> {
    check_primitive(value)?;

    match value {
        PrimitiveValue::Boolean(v) => writer.write_u8(*v as u8)?,
        PrimitiveValue::Byte(v) => writer.write_u8(*v)?,
        PrimitiveValue::Char(v) => {
            let mut buf = [0u8; 4];
            writer.write_all(v.encode_utf8(&mut buf).as_bytes())?;
        }
        PrimitiveValue::Decimal(v) => write_string(writer, v)?,
        PrimitiveValue::Double(v) => writer.write_f64::<LittleEndian>(*v)?,
        PrimitiveValue::Int16(v) => writer.write_i16::<LittleEndian>(*v)?,
        PrimitiveValue::Int32(v) => writer.write_i32::<LittleEndian>(*v)?,
        PrimitiveValue::Int64(v) => writer.write_i64::<LittleEndian>(*v)?,
        PrimitiveValue::SByte(v) => writer.write_i8(*v)?,
        PrimitiveValue::Single(v) => writer.write_f32::<LittleEndian>(*v)?,
        PrimitiveValue::TimeSpan(v) => writer.write_i64::<LittleEndian>(*v)?,
        PrimitiveValue::DateTime(v) => writer.write_u64::<LittleEndian>(v.raw())?,
        PrimitiveValue::UInt16(v) => writer.write_u16::<LittleEndian>(*v)?,
        PrimitiveValue::UInt32(v) => writer.write_u32::<LittleEndian>(*v)?,
        PrimitiveValue::UInt64(v) => writer.write_u64::<LittleEndian>(*v)?,
    }
    Ok(())
}

fn check_value_type(ty: PrimitiveType) -> Result<()> {
    if ty.has_raw_value() {
        Ok(())
    } else {
        Err(Error::unsupported(format!("{} is not a primitive value type", ty)))
    }
}

fn check_type_info(info: &TypeInfo) -> Result<()> {
    match info {
        TypeInfo::Primitive(ty) | TypeInfo::PrimitiveArray(ty) => check_value_type(*ty),
        _ => Ok(()),
    }
}

fn check_length(length: i32) -> Result<()> {
    if length < 0 {
        return Err(Error::unsupported(format!("negative array length {}", length)));
    }
    Ok(())
}

fn write_additional_info<W: Write>(writer: &mut W, info: &TypeInfo) -> Result<()> {
    match info {
        TypeInfo::Primitive(ty) | TypeInfo::PrimitiveArray(ty) => writer.write_u8(ty.id())?,
        TypeInfo::SystemClass(name) => write_string(writer, name)?,
        TypeInfo::Class { name, library_id } => {
            write_string(writer, name)?;
            writer.write_i32::<LittleEndian>(*library_id)?;
        }
        TypeInfo::String | TypeInfo::Object | TypeInfo::ObjectArray | TypeInfo::StringArray => {}
    }
    Ok(())
}

fn write_member_types<W: Write>(writer: &mut W, member_types: &[TypeInfo]) -> Result<()> {
    for info in member_types {
        writer.write_u8(info.binary_type().id())?;
    }
    for info in member_types {
        write_additional_info(writer, info)?;
    }
    Ok(())
}

// ============================================================================
// RECORD BODIES
// ============================================================================

impl Serialize for SerializationHeader {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(self.root_id)?;
        writer.write_i32::<LittleEndian>(self.header_id)?;
        writer.write_i32::<LittleEndian>(self.major_version)?;
        writer.write_i32::<LittleEndian>(self.minor_version)?;
        Ok(())
    }
}

impl Serialize for ClassInfo {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(self.object_id)?;
        write_string(writer, &self.name)?;
        writer.write_i32::<LittleEndian>(self.member_names.len() as i32)?;
        for name in &self.member_names {
            write_string(writer, name)?;
        }
        Ok(())
    }
}

impl Serialize for ArrayInfo {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(self.object_id)?;
        writer.write_i32::<LittleEndian>(self.length)?;
        Ok(())
    }
}

impl Serialize for BinaryArrayRecord {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(self.object_id)?;
        writer.write_u8(self.array_type.id())?;
        writer.write_i32::<LittleEndian>(self.rank() as i32)?;
        for length in &self.lengths {
            writer.write_i32::<LittleEndian>(*length)?;
        }
        for bound in &self.lower_bounds {
            writer.write_i32::<LittleEndian>(*bound)?;
        }
        writer.write_u8(self.element_type.binary_type().id())?;
        write_additional_info(writer, &self.element_type)?;
        Ok(())
    }
}

impl Record {
    /// Rejects records whose fields disagree with each other. Runs before
    /// the first byte of a record is written.
    fn check(&self) -> Result<()> {
        match self {
            Record::SystemClassWithMembers(class_info)
            | Record::ClassWithMembers { class_info, .. } => check_member_count(class_info),
            Record::SystemClassWithMembersAndTypes {
                class_info,
                member_types,
            }
            | Record::ClassWithMembersAndTypes {
                class_info,
                member_types,
                ..
            } => {
                check_member_count(class_info)?;
                if member_types.len() != class_info.member_names.len() {
                    return Err(Error::unsupported(format!(
                        "class `{}` has {} members but {} member types",
                        class_info.name,
                        class_info.member_names.len(),
                        member_types.len()
                    )));
                }
                member_types.iter().try_for_each(check_type_info)
            }
            Record::BinaryArray(array) => {
                if array.rank() == 0 || array.rank() > 32 {
                    return Err(Error::unsupported(format!("invalid array rank {}", array.rank())));
                }
                let bounds = if array.array_type.has_lower_bounds() {
                    array.rank()
                } else {
                    0
                };
                if array.lower_bounds.len() != bounds {
                    return Err(Error::unsupported(format!(
                        "{:?} array needs {} lower bounds, got {}",
                        array.array_type,
                        bounds,
                        array.lower_bounds.len()
                    )));
                }
                array.lengths.iter().try_for_each(|l| check_length(*l))?;
                check_type_info(&array.element_type)
            }
            Record::MemberPrimitiveTyped(value) => check_primitive(value),
            Record::ObjectNullMultiple { count } if *count < 0 => {
                Err(Error::unsupported(format!("negative null count {}", count)))
            }
            Record::ArraySinglePrimitive {
                array_info,
                primitive_type,
                values,
            } => {
                check_value_type(*primitive_type)?;
                check_length(array_info.length)?;
                if values.len() != array_info.length as usize {
                    return Err(Error::unsupported(format!(
                        "array declares {} elements but holds {}",
                        array_info.length,
                        values.len()
                    )));
                }
                for value in values {
                    if value.primitive_type() != *primitive_type {
                        return Err(Error::unsupported(format!(
                            "{} element in {} array",
                            value.primitive_type(),
                            primitive_type
                        )));
                    }
                    check_primitive(value)?;
                }
                Ok(())
            }
            Record::ArraySingleObject(array_info) | Record::ArraySingleString(array_info) => {
                check_length(array_info.length)
            }
            _ => Ok(()),
        }
    }
}

fn check_member_count(class_info: &ClassInfo) -> Result<()> {
    if class_info.member_names.len() > i32::MAX as usize {
        return Err(Error::unsupported("too many class members"));
    }
    Ok(())
}

impl Serialize for Record {
    fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.check()?;

        writer.write_u8(self.record_type().id())?;

        match self {
            Record::SerializedStreamHeader(header) => header.serialize(writer)?,
            Record::ClassWithId {
                object_id,
                metadata_id,
            } => {
                writer.write_i32::<LittleEndian>(*object_id)?;
                writer.write_i32::<LittleEndian>(*metadata_id)?;
            }
            Record::SystemClassWithMembers(class_info) => class_info.serialize(writer)?,
            Record::ClassWithMembers {
                class_info,
                library_id,
            } => {
                class_info.serialize(writer)?;
                writer.write_i32::<LittleEndian>(*library_id)?;
            }
            Record::SystemClassWithMembersAndTypes {
                class_info,
                member_types,
            } => {
                class_info.serialize(writer)?;
                write_member_types(writer, member_types)?;
            }
            Record::ClassWithMembersAndTypes {
                class_info,
                member_types,
                library_id,
            } => {
                class_info.serialize(writer)?;
                write_member_types(writer, member_types)?;
                writer.write_i32::<LittleEndian>(*library_id)?;
            }
            Record::BinaryObjectString { object_id, value } => {
                writer.write_i32::<LittleEndian>(*object_id)?;
                write_string(writer, value)?;
            }
            Record::BinaryArray(array) => array.serialize(writer)?,
            Record::MemberPrimitiveTyped(value) => {
                writer.write_u8(value.primitive_type().id())?;
                write_primitive(writer, value)?;
            }
            Record::MemberReference { id_ref } => writer.write_i32::<LittleEndian>(*id_ref)?,
            Record::ObjectNull | Record::MessageEnd => {}
            Record::BinaryLibrary {
                library_id,
                library_name,
            } => {
                writer.write_i32::<LittleEndian>(*library_id)?;
                write_string(writer, library_name)?;
            }
            Record::ObjectNullMultiple256 { count } => writer.write_u8(*count)?,
            Record::ObjectNullMultiple { count } => writer.write_i32::<LittleEndian>(*count)?,
            Record::ArraySinglePrimitive {
                array_info,
                primitive_type,
                values,
            } => {
                array_info.serialize(writer)?;
                writer.write_u8(primitive_type.id())?;
                if *primitive_type == PrimitiveType::Byte {
                    let bytes: Vec<u8> = values
                        .iter()
                        .filter_map(|v| match v {
                            PrimitiveValue::Byte(b) => Some(*b),
                            _ => None,
                        })
                        .collect();
                    writer.write_all(&bytes)?;
                } else {
                    for value in values {
                        write_primitive(writer, value)?;
                    }
                }
            }
            Record::ArraySingleObject(array_info) | Record::ArraySingleString(array_info) => {
                array_info.serialize(writer)?
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BinaryArrayType;

    fn to_bytes(record: &Record) -> Vec<u8> {
        let mut buf = Vec::new();
        record.serialize(&mut buf).unwrap();
        buf
    }

    #[test]
    fn length_prefix_encoding() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (16383, &[0xff, 0x7f]),
            (16384, &[0x80, 0x80, 0x01]),
            (i32::MAX as usize, &[0xff, 0xff, 0xff, 0xff, 0x07]),
        ];
        for (len, expected) in cases {
            let mut buf = Vec::new();
            write_length_prefix(&mut buf, *len).unwrap();
            assert_eq!(&buf[..], *expected, "length {}", len);
        }
    }

    #[test]
    fn length_prefix_rejects_oversize() {
        let mut buf = Vec::new();
        let err = write_length_prefix(&mut buf, i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn header_bytes() {
        let bytes = to_bytes(&Record::SerializedStreamHeader(SerializationHeader::default()));
        assert_eq!(
            bytes,
            [
                0x00, 0x01, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00
            ]
        );
        assert_eq!(bytes.len(), SerializationHeader::SIZE);
    }

    #[test]
    fn char_is_utf8() {
        let bytes = to_bytes(&Record::MemberPrimitiveTyped(PrimitiveValue::Char('é')));
        assert_eq!(bytes, [0x08, 0x03, 0xc3, 0xa9]);
    }

    #[test]
    fn decimal_is_text() {
        let bytes = to_bytes(&Record::MemberPrimitiveTyped(PrimitiveValue::Decimal(
            "1.5".into(),
        )));
        assert_eq!(bytes, [0x08, 0x05, 0x03, b'1', b'.', b'5']);

        let mut buf = Vec::new();
        let err = Record::MemberPrimitiveTyped(PrimitiveValue::Decimal("NaN".into()))
            .serialize(&mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn primitive_array_checks_before_writing() {
        let record = Record::ArraySinglePrimitive {
            array_info: ArrayInfo {
                object_id: 1,
                length: 2,
            },
            primitive_type: PrimitiveType::Int32,
            values: vec![PrimitiveValue::Int32(1), PrimitiveValue::Int64(2)],
        };
        let mut buf = Vec::new();
        assert!(matches!(
            record.serialize(&mut buf),
            Err(Error::UnsupportedValue(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn byte_array_is_written_in_bulk() {
        let record = Record::ArraySinglePrimitive {
            array_info: ArrayInfo {
                object_id: 1,
                length: 3,
            },
            primitive_type: PrimitiveType::Byte,
            values: vec![1u8.into(), 2u8.into(), 3u8.into()],
        };
        assert_eq!(
            to_bytes(&record),
            [0x0f, 0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x02, 0x01, 0x02, 0x03]
        );
    }

    #[test]
    fn binary_array_layout() {
        let record = Record::BinaryArray(BinaryArrayRecord {
            object_id: 4,
            array_type: BinaryArrayType::SingleOffset,
            lengths: vec![2],
            lower_bounds: vec![5],
            element_type: TypeInfo::PrimitiveArray(PrimitiveType::Int32),
        });
        assert_eq!(
            to_bytes(&record),
            [
                0x07, 0x04, 0x00, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
                0x00, 0x05, 0x00, 0x00, 0x00, 0x07, 0x08
            ]
        );
    }

    #[test]
    fn offset_array_needs_bounds() {
        let record = Record::BinaryArray(BinaryArrayRecord {
            object_id: 4,
            array_type: BinaryArrayType::SingleOffset,
            lengths: vec![2],
            lower_bounds: vec![],
            element_type: TypeInfo::Object,
        });
        let mut buf = Vec::new();
        assert!(record.serialize(&mut buf).is_err());
        assert!(buf.is_empty());
    }
}
