use std::collections::{HashMap, VecDeque};
use std::io::Write;

use super::ids::IdAllocator;
use super::ClassLayout;
use crate::counting::CountingWriter;
use crate::header::{SerializationHeader, FIRST_OBJECT_ID};
use crate::record::{ArrayInfo, BinaryArrayRecord, ClassInfo, Record, TypeInfo};
use crate::ser::{check_primitive, write_primitive, Serialize};
use crate::types::{BinaryArrayType, MemberType, PrimitiveValue};
use crate::value::{Array, ClassInstance, Graph, Handle, Object, Value};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Write class records with member type information. When off, the
    /// untyped class records are used and primitive members carry their own
    /// type tag.
    pub member_types: bool,
    /// Objects nested deeper than this are written as references and
    /// emitted at top level once the current object is done.
    pub max_depth: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            member_types: true,
            max_depth: 64,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member_types(mut self, member_types: bool) -> Self {
        self.member_types = member_types;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Walks a [`Graph`] and writes it as a record stream.
///
/// Each encoder writes exactly one stream and returns its sink when done.
///
/// # Example
///
/// ```
/// use nrbf_format::{ClassInstance, Encoder, Graph, Value, WriterOptions};
///
/// let mut graph = Graph::new();
/// let root = graph.add_class(ClassInstance::new("Demo.Point", "Demo")
///     .with_member("X", Value::primitive(1))
///     .with_member("Y", Value::primitive(2)));
/// graph.set_root(root);
///
/// let bytes = Encoder::new(Vec::new())
///     .with_options(WriterOptions::new().with_member_types(false))
///     .encode(&graph)?;
/// assert_eq!(bytes.last(), Some(&0x0b));
/// # Ok::<(), nrbf_format::Error>(())
/// ```
pub struct Encoder<W: Write> {
    writer: CountingWriter<W>,
    options: WriterOptions,
    ids: IdAllocator,
    libraries: HashMap<String, i32>,
    layouts: HashMap<ClassLayout, i32>,
    /// Objects referenced past `max_depth`, waiting to be written.
    deferred: VecDeque<Handle>,
    depth: usize,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Encoder {
            writer: CountingWriter::new(writer),
            options: WriterOptions::default(),
            ids: IdAllocator::new(),
            libraries: HashMap::new(),
            layouts: HashMap::new(),
            deferred: VecDeque::new(),
            depth: 0,
        }
    }

    pub fn with_options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn encode(mut self, graph: &Graph) -> Result<W> {
        tracing::debug!(
            objects = graph.len(),
            member_types = self.options.member_types,
            "encoding stream"
        );

        self.write_record(&Record::SerializedStreamHeader(SerializationHeader::new(
            FIRST_OBJECT_ID,
        )))?;
        self.write_value(graph, graph.root())?;

        while let Some(handle) = self.deferred.pop_front() {
            self.write_deferred(graph, handle)?;
        }

        self.write_record(&Record::MessageEnd)?;
        self.writer.flush()?;

        tracing::debug!(bytes = self.writer.bytes_written(), "encoded stream");
        Ok(self.writer.into_inner())
    }

    fn write_record(&mut self, record: &Record) -> Result<()> {
        let start = self.writer.bytes_written();
        record.serialize(&mut self.writer)?;
        tracing::trace!(
            start = format_args!("{:#x}", start),
            end = format_args!("{:#x}", self.writer.bytes_written()),
            record = %record.record_type(),
            "serialized Record"
        );
        Ok(())
    }

    fn object<'g>(&self, graph: &'g Graph, handle: Handle) -> Result<&'g Object> {
        graph
            .get(handle)
            .ok_or_else(|| Error::unsupported(format!("handle {} is not in the graph", handle)))
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Writes one value as a record of its own.
    fn write_value(&mut self, graph: &Graph, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_record(&Record::ObjectNull),
            Value::Primitive(p) => self.write_record(&Record::MemberPrimitiveTyped(p.clone())),
            Value::Object(handle) => self.write_handle(graph, *handle),
        }
    }

    fn write_handle(&mut self, graph: &Graph, handle: Handle) -> Result<()> {
        let object = self.object(graph, handle)?;

        let (id, fresh) = self.ids.assign(handle)?;
        if !fresh {
            return self.write_record(&Record::MemberReference { id_ref: id });
        }

        match object {
            Object::String(value) => self.write_record(&Record::BinaryObjectString {
                object_id: id,
                value: value.clone(),
            }),
            _ if self.depth >= self.options.max_depth => {
                tracing::trace!(id, depth = self.depth, "deferring nested object");
                self.deferred.push_back(handle);
                self.write_record(&Record::MemberReference { id_ref: id })
            }
            Object::Array(array) => self.write_array(graph, id, array),
            Object::Class(class) => self.write_class(graph, id, class),
        }
    }

    fn write_deferred(&mut self, graph: &Graph, handle: Handle) -> Result<()> {
        let id = self
            .ids
            .get(handle)
            .ok_or_else(|| Error::unsupported(format!("deferred handle {} has no id", handle)))?;

        match self.object(graph, handle)? {
            Object::Array(array) => self.write_array(graph, id, array),
            Object::Class(class) => self.write_class(graph, id, class),
            Object::String(value) => self.write_record(&Record::BinaryObjectString {
                object_id: id,
                value: value.clone(),
            }),
        }
    }

    /// The type a member without a declared type is written as.
    fn infer_type(&self, graph: &Graph, value: &Value) -> Result<MemberType> {
        let handle = match value {
            Value::Null => return Ok(MemberType::Object),
            Value::Primitive(p) => return Ok(MemberType::Primitive(p.primitive_type())),
            Value::Object(handle) => *handle,
        };

        let ty = match self.object(graph, handle)? {
            Object::String(_) => MemberType::String,
            Object::Array(array) => match &array.element_type {
                MemberType::Primitive(p) => MemberType::PrimitiveArray(*p),
                MemberType::String => MemberType::StringArray,
                MemberType::Object => MemberType::ObjectArray,
                _ => MemberType::Object,
            },
            Object::Class(class) => match &class.library {
                None => MemberType::SystemClass(class.name.clone()),
                Some(library) => MemberType::Class {
                    name: class.name.clone(),
                    library: library.clone(),
                },
            },
        };
        Ok(ty)
    }

    /// Checks that `value` fits a slot declared as `expected`.
    fn check_slot(&self, graph: &Graph, expected: &MemberType, value: &Value) -> Result<()> {
        let handle = match (expected, value) {
            (MemberType::Primitive(p), Value::Primitive(v)) if v.primitive_type() == *p => {
                return check_primitive(v);
            }
            (MemberType::Primitive(p), other) => {
                return Err(Error::unsupported(format!(
                    "{} slot holds {}",
                    p,
                    describe(graph, other)
                )));
            }
            (MemberType::Object, Value::Primitive(v)) => return check_primitive(v),
            (_, Value::Null) => return Ok(()),
            (_, Value::Primitive(v)) => {
                return Err(Error::unsupported(format!(
                    "{} slot holds primitive {}",
                    expected, v
                )));
            }
            (_, Value::Object(handle)) => *handle,
        };

        let object = self.object(graph, handle)?;
        let fits = match (expected, object) {
            (MemberType::Object, _) => true,
            (MemberType::String, Object::String(_)) => true,
            (MemberType::SystemClass(_) | MemberType::Class { .. }, Object::Class(_)) => true,
            (MemberType::ObjectArray, Object::Array(a)) => a.element_type == MemberType::Object,
            (MemberType::StringArray, Object::Array(a)) => a.element_type == MemberType::String,
            (MemberType::PrimitiveArray(p), Object::Array(a)) => {
                a.element_type == MemberType::Primitive(*p)
            }
            _ => false,
        };

        if fits {
            Ok(())
        } else {
            Err(Error::unsupported(format!(
                "{} slot holds {}",
                expected,
                describe(graph, value)
            )))
        }
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    fn write_array(&mut self, graph: &Graph, id: i32, array: &Array) -> Result<()> {
        let length = i32::try_from(array.items.len())
            .map_err(|_| Error::unsupported("array longer than i32::MAX"))?;

        if !matches!(array.element_type, MemberType::Object) {
            for item in &array.items {
                self.check_slot(graph, &array.element_type, item)?;
            }
        }

        let array_info = ArrayInfo {
            object_id: id,
            length,
        };

        match (&array.element_type, array.lower_bound) {
            (MemberType::Primitive(p), 0) => {
                let values = primitive_items(&array.items);
                return self.write_record(&Record::ArraySinglePrimitive {
                    array_info,
                    primitive_type: *p,
                    values,
                });
            }
            (MemberType::String, 0) => self.write_record(&Record::ArraySingleString(array_info))?,
            (MemberType::Object, 0) => self.write_record(&Record::ArraySingleObject(array_info))?,
            (element_type, lower_bound) => {
                let element = self.type_info(element_type)?;
                let array_type = match (element_type.is_array(), lower_bound != 0) {
                    (false, false) => BinaryArrayType::Single,
                    (true, false) => BinaryArrayType::Jagged,
                    (false, true) => BinaryArrayType::SingleOffset,
                    (true, true) => BinaryArrayType::JaggedOffset,
                };
                let lower_bounds = if lower_bound != 0 {
                    vec![lower_bound]
                } else {
                    Vec::new()
                };

                self.write_record(&Record::BinaryArray(BinaryArrayRecord {
                    object_id: id,
                    array_type,
                    lengths: vec![length],
                    lower_bounds,
                    element_type: element,
                }))?;

                if let MemberType::Primitive(_) = element_type {
                    for value in primitive_items(&array.items) {
                        write_primitive(&mut self.writer, &value)?;
                    }
                    return Ok(());
                }
            }
        }

        self.depth += 1;
        let result = self.write_items(graph, &array.items);
        self.depth -= 1;
        result
    }

    /// Writes element records, collapsing consecutive nulls into runs.
    fn write_items(&mut self, graph: &Graph, items: &[Value]) -> Result<()> {
        let mut nulls = 0usize;

        for item in items {
            if item.is_null() {
                nulls += 1;
                continue;
            }
            if nulls > 0 {
                self.write_record(&Record::null_run(nulls))?;
                nulls = 0;
            }
            self.write_value(graph, item)?;
        }

        if nulls > 0 {
            self.write_record(&Record::null_run(nulls))?;
        }
        Ok(())
    }

    // ========================================================================
    // Classes
    // ========================================================================

    fn library_id(&mut self, library: &str) -> Result<i32> {
        if let Some(id) = self.libraries.get(library) {
            return Ok(*id);
        }

        let library_id = self.ids.next_id()?;
        self.write_record(&Record::BinaryLibrary {
            library_id,
            library_name: library.to_string(),
        })?;
        self.libraries.insert(library.to_string(), library_id);
        Ok(library_id)
    }

    /// Wire form of a member type, emitting any library it names first.
    fn type_info(&mut self, ty: &MemberType) -> Result<TypeInfo> {
        let info = match ty {
            MemberType::Primitive(p) | MemberType::PrimitiveArray(p) if !p.has_raw_value() => {
                return Err(Error::unsupported(format!("{} is not a primitive value type", p)));
            }
            MemberType::Primitive(p) => TypeInfo::Primitive(*p),
            MemberType::String => TypeInfo::String,
            MemberType::Object => TypeInfo::Object,
            MemberType::SystemClass(name) => TypeInfo::SystemClass(name.clone()),
            MemberType::Class { name, library } => TypeInfo::Class {
                name: name.clone(),
                library_id: self.library_id(library)?,
            },
            MemberType::ObjectArray => TypeInfo::ObjectArray,
            MemberType::StringArray => TypeInfo::StringArray,
            MemberType::PrimitiveArray(p) => TypeInfo::PrimitiveArray(*p),
        };
        Ok(info)
    }

    fn write_class(&mut self, graph: &Graph, id: i32, class: &ClassInstance) -> Result<()> {
        let member_types = class
            .members
            .iter()
            .map(|member| match &member.member_type {
                Some(ty) => Ok(ty.clone()),
                None => self.infer_type(graph, &member.value),
            })
            .collect::<Result<Vec<_>>>()?;

        for (member, ty) in class.members.iter().zip(&member_types) {
            self.check_slot(graph, ty, &member.value).map_err(|e| match e {
                Error::UnsupportedValue(reason) => Error::UnsupportedValue(format!(
                    "member `{}` of `{}`: {}",
                    member.name, class.name, reason
                )),
                other => other,
            })?;
        }

        let typed = self.options.member_types;
        let library_id = match &class.library {
            Some(library) => Some(self.library_id(library)?),
            None => None,
        };

        let layout = ClassLayout {
            name: class.name.clone(),
            library: class.library.clone(),
            member_names: class.members.iter().map(|m| m.name.clone()).collect(),
            member_types: typed.then(|| member_types.clone()),
        };

        if let Some(metadata_id) = self.layouts.get(&layout) {
            let record = Record::ClassWithId {
                object_id: id,
                metadata_id: *metadata_id,
            };
            self.write_record(&record)?;
        } else {
            let class_info = ClassInfo {
                object_id: id,
                name: layout.name.clone(),
                member_names: layout.member_names.clone(),
            };
            let record = match (typed, library_id) {
                (true, library_id) => {
                    let infos = member_types
                        .iter()
                        .map(|ty| self.type_info(ty))
                        .collect::<Result<Vec<_>>>()?;
                    match library_id {
                        Some(library_id) => Record::ClassWithMembersAndTypes {
                            class_info,
                            member_types: infos,
                            library_id,
                        },
                        None => Record::SystemClassWithMembersAndTypes {
                            class_info,
                            member_types: infos,
                        },
                    }
                }
                (false, Some(library_id)) => Record::ClassWithMembers {
                    class_info,
                    library_id,
                },
                (false, None) => Record::SystemClassWithMembers(class_info),
            };
            self.write_record(&record)?;
            self.layouts.insert(layout, id);
        }

        self.depth += 1;
        let result = self.write_members(graph, class, &member_types);
        self.depth -= 1;
        result
    }

    fn write_members(
        &mut self,
        graph: &Graph,
        class: &ClassInstance,
        member_types: &[MemberType],
    ) -> Result<()> {
        for (member, ty) in class.members.iter().zip(member_types) {
            match (ty, &member.value) {
                (MemberType::Primitive(_), Value::Primitive(value)) if self.options.member_types => {
                    write_primitive(&mut self.writer, value)?
                }
                (_, value) => self.write_value(graph, value)?,
            }
        }
        Ok(())
    }
}

fn primitive_items(items: &[Value]) -> Vec<PrimitiveValue> {
    items
        .iter()
        .filter_map(Value::as_primitive)
        .cloned()
        .collect()
}

fn describe(graph: &Graph, value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Primitive(p) => format!("{} {}", p.primitive_type(), p),
        Value::Object(handle) => match graph.get(*handle) {
            Some(Object::Class(class)) => format!("class `{}`", class.name),
            Some(Object::Array(array)) => format!("{}[] array", array.element_type),
            Some(object) => object.kind().to_string(),
            None => format!("dangling handle {}", handle),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveType;

    fn encode(graph: &Graph) -> Result<Vec<u8>> {
        Encoder::new(Vec::new()).encode(graph)
    }

    #[test]
    fn library_id_follows_object_id() {
        let mut graph = Graph::new();
        let root = graph.add_class(ClassInstance::new("A.B", "Lib"));
        graph.set_root(root);
        let bytes = encode(&graph).unwrap();

        // BinaryLibrary with id 2, then the class record with id 1
        assert_eq!(&bytes[17..22], &[0x0c, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(bytes[26], 0x05);
        assert_eq!(&bytes[27..31], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn null_in_primitive_member_fails_before_class_record() {
        let mut graph = Graph::new();
        let root = graph.add_class(ClassInstance::system("P").with_typed_member(
            "n",
            MemberType::Primitive(PrimitiveType::Int32),
            Value::Null,
        ));
        graph.set_root(root);

        let mut sink = Vec::new();
        let err = Encoder::new(&mut sink).encode(&graph).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(_)));
        // Only the header made it out.
        assert_eq!(sink.len(), 17);
    }

    #[test]
    fn mismatched_primitive_array_item() {
        let mut graph = Graph::new();
        let root = graph.add_array(Array::new(
            MemberType::Primitive(PrimitiveType::Int32),
            vec![Value::primitive(1), Value::primitive(2i64)],
        ));
        graph.set_root(root);
        assert!(matches!(encode(&graph), Err(Error::UnsupportedValue(_))));
    }

    #[test]
    fn dangling_handle() {
        let mut graph = Graph::new();
        graph.set_root(Handle(3));
        assert!(matches!(encode(&graph), Err(Error::UnsupportedValue(_))));
    }

    #[test]
    fn null_primitive_type_is_rejected() {
        let mut graph = Graph::new();
        let root = graph.add_array(Array::new(MemberType::Primitive(PrimitiveType::Null), vec![]));
        graph.set_root(root);
        assert!(matches!(encode(&graph), Err(Error::UnsupportedValue(_))));
    }

    #[test]
    fn deep_objects_are_deferred_to_top_level() {
        let mut graph = Graph::new();
        let inner = graph.add_array(Array::new(MemberType::Object, vec![]));
        let root = graph.add_array(Array::new(MemberType::Object, vec![inner.into()]));
        graph.set_root(root);

        let bytes = Encoder::new(Vec::new())
            .with_options(WriterOptions::new().with_max_depth(1))
            .encode(&graph)
            .unwrap();

        assert_eq!(
            &bytes[17..],
            &[
                // object[1] id 1
                0x10, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
                // reference to id 2
                0x09, 0x02, 0x00, 0x00, 0x00,
                // object[0] id 2 at top level
                0x10, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x0b,
            ]
        );
    }

    #[test]
    fn untyped_primitive_members_are_tagged() {
        let mut graph = Graph::new();
        let root = graph.add_class(ClassInstance::system("P").with_member("n", Value::primitive(5u8)));
        graph.set_root(root);

        let bytes = Encoder::new(Vec::new())
            .with_options(WriterOptions::new().with_member_types(false))
            .encode(&graph)
            .unwrap();

        // SystemClassWithMembers, then MemberPrimitiveTyped(Byte 5)
        assert_eq!(bytes[17], 0x02);
        assert_eq!(&bytes[bytes.len() - 4..], &[0x08, 0x02, 0x05, 0x0b]);
    }
}
