use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use byteorder::ReadBytesExt;

use super::ids::{DefineError, IdTable};
use super::ClassLayout;
use crate::counting::CountingReader;
use crate::de::{read_primitive, read_primitives, Deserialize, MAX_PREALLOC};
use crate::header::SerializationHeader;
use crate::record::{BinaryArrayRecord, Record, RecordType, TypeInfo};
use crate::types::{BinaryArrayType, MemberType};
use crate::value::{Array, ClassInstance, Graph, Handle, Member, Object, Value};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Deepest nesting of objects inside objects the decoder will follow.
    pub max_depth: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions { max_depth: 256 }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// What one value record stands for.
enum Slot {
    Value(Value),
    /// A run of null array slots.
    Nulls(usize),
}

/// Rebuilds a [`Graph`] from a record stream.
///
/// # Example
///
/// ```
/// use nrbf_format::{Decoder, ReaderOptions, Value};
///
/// let bytes = [
///     0x00, 0x01, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00, 0x00, 0x0a, 0x0b,
/// ];
/// let graph = Decoder::new(&bytes[..])
///     .with_options(ReaderOptions::new().with_max_depth(16))
///     .decode()?;
/// assert_eq!(graph.root(), &Value::Null);
/// # Ok::<(), nrbf_format::Error>(())
/// ```
pub struct Decoder<R> {
    reader: CountingReader<R>,
    options: ReaderOptions,
    /// Arena slots. `None` until the defining record has been read in full.
    objects: Vec<Option<Object>>,
    ids: IdTable,
    libraries: HashMap<i32, String>,
    classes: HashMap<i32, Arc<ClassLayout>>,
    depth: usize,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder {
            reader: CountingReader::new(reader),
            options: ReaderOptions::default(),
            objects: Vec::new(),
            ids: IdTable::new(),
            libraries: HashMap::new(),
            classes: HashMap::new(),
            depth: 0,
        }
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Reads the whole stream up to and including `MessageEnd`.
    pub fn decode(mut self) -> Result<Graph> {
        tracing::debug!(max_depth = self.options.max_depth, "decoding stream");

        let result = self.decode_stream();
        let position = self.reader.position();
        let graph = result.map_err(|e| e.truncated_at(position))?;

        tracing::debug!(
            bytes = position,
            objects = graph.len(),
            "decoded stream"
        );
        Ok(graph)
    }

    fn decode_stream(&mut self) -> Result<Graph> {
        let header = self.read_header()?;

        let (start, record) = self.next_value_record()?;
        let root_value = match self.slot_of(start, record, None)? {
            Slot::Value(value) => value,
            Slot::Nulls(1) => Value::Null,
            Slot::Nulls(_) => return Err(self.violation(start, "null run as root record")),
        };

        loop {
            let (start, record) = self.next_value_record()?;
            match record {
                Record::MessageEnd => break,
                record if record.object_id().is_some() => {
                    self.read_object(start, record)?;
                }
                other => {
                    return Err(self.violation(
                        start,
                        format!("unexpected {} record at top level", other.record_type()),
                    ));
                }
            }
        }

        if let Some(id) = self.ids.first_pending() {
            tracing::warn!(id, "reference to an object that is never defined");
            return Err(Error::DanglingReference { id });
        }

        let mut probe = [0u8; 1];
        if self.reader.read(&mut probe)? != 0 {
            let offset = self.reader.position() - 1;
            return Err(self.violation(offset, "trailing data after MessageEnd"));
        }

        let root = match self.ids.lookup(header.root_id) {
            Some(handle) => Value::Object(handle),
            None if root_value.as_handle().is_none() => root_value,
            None => {
                tracing::warn!(root_id = header.root_id, "root object is never defined");
                return Err(Error::DanglingReference {
                    id: header.root_id,
                });
            }
        };

        let position = self.reader.position();
        let objects = std::mem::take(&mut self.objects)
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.violation(position, "object record never completed"))?;
        let ids = std::mem::take(&mut self.ids).into_map();

        Ok(Graph::from_parts(objects, root, Some(header.root_id), ids))
    }

    fn read_header(&mut self) -> Result<SerializationHeader> {
        let tag = match self.reader.read_u8() {
            Ok(tag) => tag,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::InvalidHeader("empty stream".into()));
            }
            Err(e) => return Err(e.into()),
        };

        if tag != RecordType::SerializedStreamHeader.id() {
            return Err(Error::InvalidHeader(format!(
                "expected header record, found tag 0x{:02x}",
                tag
            )));
        }

        let header = SerializationHeader::deserialize(&mut self.reader).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::InvalidHeader("truncated header".into())
            }
            other => other,
        })?;
        header.validate()?;

        tracing::debug!(
            root_id = header.root_id,
            header_id = header.header_id,
            "read stream header"
        );
        Ok(header)
    }

    fn violation(&self, offset: u64, reason: impl Into<String>) -> Error {
        let reason = reason.into();
        tracing::warn!(offset = format_args!("{:#x}", offset), %reason, "malformed stream");
        Error::malformed(offset, reason)
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Next record that is not a `BinaryLibrary`, registering any libraries
    /// passed on the way.
    fn next_value_record(&mut self) -> Result<(u64, Record)> {
        loop {
            let start = self.reader.position();
            match Record::deserialize(&mut self.reader)? {
                Record::BinaryLibrary {
                    library_id,
                    library_name,
                } => {
                    if self.libraries.contains_key(&library_id) {
                        return Err(
                            self.violation(start, format!("library id {} defined twice", library_id))
                        );
                    }
                    self.libraries.insert(library_id, library_name);
                }
                record => return Ok((start, record)),
            }
        }
    }

    fn read_slot(&mut self, expected: Option<&MemberType>) -> Result<(u64, Slot)> {
        let (start, record) = self.next_value_record()?;
        let slot = self.slot_of(start, record, expected)?;
        Ok((start, slot))
    }

    fn slot_of(&mut self, start: u64, record: Record, expected: Option<&MemberType>) -> Result<Slot> {
        if let Some(expected) = expected {
            if !accepts(expected, &record) {
                return Err(self.violation(
                    start,
                    format!("{} record where {} was declared", record.record_type(), expected),
                ));
            }
        }

        let slot = match record {
            Record::ObjectNull => Slot::Nulls(1),
            Record::ObjectNullMultiple256 { .. } | Record::ObjectNullMultiple { .. } => {
                match record.null_count() {
                    Some(count) if count > 0 => Slot::Nulls(count),
                    _ => return Err(self.violation(start, "invalid null run length")),
                }
            }
            Record::MemberPrimitiveTyped(value) => Slot::Value(Value::Primitive(value)),
            Record::MemberReference { id_ref } => Slot::Value(Value::Object(self.resolve(id_ref)?)),
            record if record.object_id().is_some() => {
                Slot::Value(Value::Object(self.read_object(start, record)?))
            }
            other => {
                return Err(self.violation(
                    start,
                    format!("unexpected {} record", other.record_type()),
                ));
            }
        };
        Ok(slot)
    }

    fn alloc(objects: &mut Vec<Option<Object>>) -> Handle {
        objects.push(None);
        Handle(objects.len() - 1)
    }

    fn define(&mut self, start: u64, id: i32) -> Result<Handle> {
        let objects = &mut self.objects;
        match self.ids.define(id, || Self::alloc(objects)) {
            Ok(handle) => Ok(handle),
            Err(DefineError::Reserved) => Err(self.violation(start, "object id 0 is reserved")),
            Err(DefineError::Duplicate) => {
                Err(self.violation(start, format!("object id {} defined twice", id)))
            }
        }
    }

    fn resolve(&mut self, id: i32) -> Result<Handle> {
        let objects = &mut self.objects;
        self.ids
            .resolve(id, || Self::alloc(objects))
            .ok_or(Error::DanglingReference { id })
    }

    fn library(&self, id: i32) -> Result<String> {
        match self.libraries.get(&id) {
            Some(name) => Ok(name.clone()),
            None => {
                tracing::warn!(library_id = id, "reference to undefined library");
                Err(Error::DanglingReference { id })
            }
        }
    }

    fn member_type(&self, info: &TypeInfo) -> Result<MemberType> {
        let ty = match info {
            TypeInfo::Primitive(p) => MemberType::Primitive(*p),
            TypeInfo::String => MemberType::String,
            TypeInfo::Object => MemberType::Object,
            TypeInfo::SystemClass(name) => MemberType::SystemClass(name.clone()),
            TypeInfo::Class { name, library_id } => MemberType::Class {
                name: name.clone(),
                library: self.library(*library_id)?,
            },
            TypeInfo::ObjectArray => MemberType::ObjectArray,
            TypeInfo::StringArray => MemberType::StringArray,
            TypeInfo::PrimitiveArray(p) => MemberType::PrimitiveArray(*p),
        };
        Ok(ty)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    fn read_object(&mut self, start: u64, record: Record) -> Result<Handle> {
        if self.depth >= self.options.max_depth {
            return Err(self.violation(
                start,
                format!("objects nested deeper than {}", self.options.max_depth),
            ));
        }

        self.depth += 1;
        let result = self.read_object_record(start, record);
        self.depth -= 1;
        result
    }

    fn read_object_record(&mut self, start: u64, record: Record) -> Result<Handle> {
        let (handle, object) = match record {
            Record::BinaryObjectString { object_id, value } => {
                (self.define(start, object_id)?, Object::String(value))
            }
            Record::ArraySinglePrimitive {
                array_info,
                primitive_type,
                values,
            } => {
                let handle = self.define(start, array_info.object_id)?;
                let items = values.into_iter().map(Value::Primitive).collect();
                let array = Array::new(MemberType::Primitive(primitive_type), items);
                (handle, Object::Array(array))
            }
            Record::ArraySingleObject(array_info) => {
                let handle = self.define(start, array_info.object_id)?;
                let items = self.read_items(array_info.length as usize, &MemberType::Object)?;
                (handle, Object::Array(Array::new(MemberType::Object, items)))
            }
            Record::ArraySingleString(array_info) => {
                let handle = self.define(start, array_info.object_id)?;
                let items = self.read_items(array_info.length as usize, &MemberType::String)?;
                (handle, Object::Array(Array::new(MemberType::String, items)))
            }
            Record::BinaryArray(array) => self.read_binary_array(start, array)?,
            class => return self.read_class(start, class),
        };

        self.objects[handle.0] = Some(object);
        Ok(handle)
    }

    fn read_binary_array(
        &mut self,
        start: u64,
        array: BinaryArrayRecord,
    ) -> Result<(Handle, Object)> {
        if array.rank() != 1 {
            return Err(self.violation(
                start,
                format!("arrays of rank {} are not supported", array.rank()),
            ));
        }
        if matches!(
            array.array_type,
            BinaryArrayType::Rectangular | BinaryArrayType::RectangularOffset
        ) {
            return Err(self.violation(start, "rectangular arrays are not supported"));
        }

        let element_type = self.member_type(&array.element_type)?;
        let length = array.lengths[0] as usize;
        let lower_bound = array.lower_bounds.first().copied().unwrap_or(0);

        let handle = self.define(start, array.object_id)?;
        let items = match element_type {
            MemberType::Primitive(p) => read_primitives(&mut self.reader, p, length)?
                .into_iter()
                .map(Value::Primitive)
                .collect(),
            ref other => self.read_items(length, other)?,
        };

        let array = Array::new(element_type, items).with_lower_bound(lower_bound);
        Ok((handle, Object::Array(array)))
    }

    /// Reads `len` element records, expanding null runs.
    fn read_items(&mut self, len: usize, element_type: &MemberType) -> Result<Vec<Value>> {
        let mut items = Vec::with_capacity(len.min(MAX_PREALLOC));

        while items.len() < len {
            match self.read_slot(Some(element_type))? {
                (_, Slot::Value(value)) => items.push(value),
                (start, Slot::Nulls(count)) => {
                    let remaining = len - items.len();
                    if count > remaining {
                        return Err(self.violation(
                            start,
                            format!("run of {} nulls with {} slots left", count, remaining),
                        ));
                    }
                    items.resize(items.len() + count, Value::Null);
                }
            }
        }

        Ok(items)
    }

    fn class_layout(&self, start: u64, record: Record) -> Result<(i32, Arc<ClassLayout>)> {
        let types = |member_types: Vec<TypeInfo>| -> Result<Vec<MemberType>> {
            member_types.iter().map(|t| self.member_type(t)).collect()
        };

        let (object_id, layout) = match record {
            Record::ClassWithId {
                object_id,
                metadata_id,
            } => {
                let layout = match self.classes.get(&metadata_id) {
                    Some(layout) => Arc::clone(layout),
                    None => {
                        tracing::warn!(metadata_id, "ClassWithId refers to unknown class");
                        return Err(Error::DanglingReference { id: metadata_id });
                    }
                };
                return Ok((object_id, layout));
            }
            Record::SystemClassWithMembers(class_info) => (
                class_info.object_id,
                ClassLayout {
                    name: class_info.name,
                    library: None,
                    member_names: class_info.member_names,
                    member_types: None,
                },
            ),
            Record::ClassWithMembers {
                class_info,
                library_id,
            } => (
                class_info.object_id,
                ClassLayout {
                    name: class_info.name,
                    library: Some(self.library(library_id)?),
                    member_names: class_info.member_names,
                    member_types: None,
                },
            ),
            Record::SystemClassWithMembersAndTypes {
                class_info,
                member_types,
            } => (
                class_info.object_id,
                ClassLayout {
                    name: class_info.name,
                    library: None,
                    member_names: class_info.member_names,
                    member_types: Some(types(member_types)?),
                },
            ),
            Record::ClassWithMembersAndTypes {
                class_info,
                member_types,
                library_id,
            } => (
                class_info.object_id,
                ClassLayout {
                    name: class_info.name,
                    library: Some(self.library(library_id)?),
                    member_names: class_info.member_names,
                    member_types: Some(types(member_types)?),
                },
            ),
            other => {
                return Err(self.violation(
                    start,
                    format!("{} record does not define an object", other.record_type()),
                ));
            }
        };

        Ok((object_id, Arc::new(layout)))
    }

    fn read_class(&mut self, start: u64, record: Record) -> Result<Handle> {
        let is_reuse = matches!(record, Record::ClassWithId { .. });
        let (object_id, layout) = self.class_layout(start, record)?;

        let handle = self.define(start, object_id)?;
        if !is_reuse {
            self.classes.insert(object_id, Arc::clone(&layout));
        }

        let mut members = Vec::with_capacity(layout.member_names.len().min(MAX_PREALLOC));
        for (index, name) in layout.member_names.iter().enumerate() {
            let member_type = layout
                .member_types
                .as_ref()
                .and_then(|types| types.get(index).cloned());

            let value = match &member_type {
                Some(MemberType::Primitive(p)) => {
                    Value::Primitive(read_primitive(&mut self.reader, *p)?)
                }
                expected => match self.read_slot(expected.as_ref())? {
                    (_, Slot::Value(value)) => value,
                    (_, Slot::Nulls(1)) => Value::Null,
                    (start, Slot::Nulls(_)) => {
                        return Err(self.violation(start, "null run outside of an array"));
                    }
                },
            };

            members.push(Member {
                name: name.clone(),
                member_type,
                value,
            });
        }

        self.objects[handle.0] = Some(Object::Class(ClassInstance {
            name: layout.name.clone(),
            library: layout.library.clone(),
            members,
        }));
        Ok(handle)
    }
}

/// Whether `record` may stand in a slot declared as `expected`.
fn accepts(expected: &MemberType, record: &Record) -> bool {
    match record {
        Record::ObjectNull
        | Record::ObjectNullMultiple256 { .. }
        | Record::ObjectNullMultiple { .. }
        | Record::MemberReference { .. } => return true,
        _ => {}
    }

    match expected {
        MemberType::Object => true,
        MemberType::Primitive(p) => {
            matches!(record, Record::MemberPrimitiveTyped(v) if v.primitive_type() == *p)
        }
        MemberType::String => matches!(record, Record::BinaryObjectString { .. }),
        MemberType::SystemClass(_) | MemberType::Class { .. } => matches!(
            record,
            Record::ClassWithId { .. }
                | Record::SystemClassWithMembers(_)
                | Record::ClassWithMembers { .. }
                | Record::SystemClassWithMembersAndTypes { .. }
                | Record::ClassWithMembersAndTypes { .. }
        ),
        MemberType::ObjectArray => {
            matches!(record, Record::ArraySingleObject(_) | Record::BinaryArray(_))
        }
        MemberType::StringArray => {
            matches!(record, Record::ArraySingleString(_) | Record::BinaryArray(_))
        }
        MemberType::PrimitiveArray(p) => match record {
            Record::ArraySinglePrimitive { primitive_type, .. } => primitive_type == p,
            Record::BinaryArray(_) => true,
            _ => false,
        },
    }
}
