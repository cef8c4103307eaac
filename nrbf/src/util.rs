use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nrbf_format::{Decoder, Graph, Handle, Object, PrimitiveValue, ReaderOptions, Value};

use crate::error::{Error, Result};

/// Longest string shown verbatim in a summary.
const MAX_SUMMARY_CHARS: usize = 40;

pub fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| Error::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

pub fn read_graph(path: &Path, max_depth: usize) -> Result<Graph> {
    let graph = Decoder::new(open(path)?)
        .with_options(ReaderOptions::new().with_max_depth(max_depth))
        .decode()
        .map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!(path = %path.display(), objects = graph.len(), "decoded stream file");
    Ok(graph)
}

/// Wire id of every object in a decoded graph.
pub fn wire_ids(graph: &Graph) -> HashMap<Handle, i32> {
    graph.ids().map(|(id, handle)| (handle, id)).collect()
}

pub fn format_ref(handle: Handle, ids: &HashMap<Handle, i32>) -> String {
    match ids.get(&handle) {
        Some(id) => format!("@{}", id),
        None => handle.to_string(),
    }
}

pub fn format_string(value: &str) -> String {
    if value.chars().count() <= MAX_SUMMARY_CHARS {
        return format!("{:?}", value);
    }
    let head: String = value.chars().take(MAX_SUMMARY_CHARS).collect();
    format!("{:?}…", head)
}

pub fn format_primitive(value: &PrimitiveValue) -> String {
    format!("{} {}", value.primitive_type(), value)
}

/// One-line description of a value; objects are shown as references.
pub fn format_value(value: &Value, ids: &HashMap<Handle, i32>) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Primitive(p) => format_primitive(p),
        Value::Object(handle) => format_ref(*handle, ids),
    }
}

/// One-line description of an object's contents.
pub fn format_object(object: &Object, ids: &HashMap<Handle, i32>) -> String {
    match object {
        Object::String(s) => format_string(s),
        Object::Array(array) => {
            let bound = if array.lower_bound != 0 {
                format!(" from {}", array.lower_bound)
            } else {
                String::new()
            };
            format!(
                "{}[{}]{}",
                array.element_type,
                array.items.len(),
                bound
            )
        }
        Object::Class(class) => {
            let members = class
                .members
                .iter()
                .map(|m| format!("{}={}", m.name, format_value(&m.value, ids)))
                .collect::<Vec<_>>()
                .join(", ");
            match &class.library {
                Some(library) => format!("{} [{}] {{ {} }}", class.name, library, members),
                None => format!("{} {{ {} }}", class.name, members),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrbf_format::{Array, ClassInstance, MemberType, PrimitiveType};

    #[test]
    fn long_strings_are_cut() {
        assert_eq!(format_string("abc"), "\"abc\"");
        let long = "x".repeat(100);
        let shown = format_string(&long);
        assert!(shown.ends_with('…'));
        assert_eq!(shown.chars().filter(|c| *c == 'x').count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn objects_are_summarized() {
        let mut graph = Graph::new();
        let s = graph.add_string("hi");
        let ids: HashMap<Handle, i32> = [(s, 2)].into_iter().collect();

        let class = ClassInstance::new("Demo.Pair", "Demo")
            .with_member("A", Value::primitive(1))
            .with_member("B", s);
        assert_eq!(
            format_object(&Object::Class(class), &ids),
            "Demo.Pair [Demo] { A=Int32 1, B=@2 }"
        );

        let array = Array::new(
            MemberType::Primitive(PrimitiveType::Byte),
            vec![Value::primitive(1u8)],
        )
        .with_lower_bound(5);
        assert_eq!(format_object(&Object::Array(array), &ids), "Byte[1] from 5");
    }
}
