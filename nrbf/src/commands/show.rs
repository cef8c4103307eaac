use std::collections::HashMap;

use nrbf_format::{Graph, Handle, Object, PrimitiveValue, Value};
use serde_json::{json, Map};

use crate::cli::ShowArgs;
use crate::error::{Error, Result};
use crate::util::{read_graph, wire_ids};

pub fn run(args: ShowArgs) -> Result<()> {
    let graph = read_graph(&args.file, args.max_depth)?;
    let json = serde_json::to_string_pretty(&graph_json(&graph))
        .map_err(|source| Error::Json { source })?;
    println!("{}", json);
    Ok(())
}

fn graph_json(graph: &Graph) -> serde_json::Value {
    let ids = wire_ids(graph);

    let mut objects = Map::new();
    for (id, handle) in graph.ids() {
        if let Some(object) = graph.get(handle) {
            objects.insert(id.to_string(), object_json(object, &ids));
        }
    }

    json!({
        "root_id": graph.root_id(),
        "root": value_json(graph.root(), &ids),
        "objects": objects,
    })
}

fn value_json(value: &Value, ids: &HashMap<Handle, i32>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Primitive(p) => primitive_json(p),
        Value::Object(handle) => match ids.get(handle) {
            Some(id) => json!({ "$ref": id }),
            None => json!({ "$handle": handle.index() }),
        },
    }
}

fn primitive_json(value: &PrimitiveValue) -> serde_json::Value {
    match value {
        PrimitiveValue::Boolean(v) => json!(v),
        PrimitiveValue::Byte(v) => json!(v),
        PrimitiveValue::Char(v) => json!(v.to_string()),
        PrimitiveValue::Decimal(v) => json!({ "decimal": v }),
        // NaN and infinities have no JSON number form.
        PrimitiveValue::Double(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| json!(v.to_string())),
        PrimitiveValue::Single(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| json!(v.to_string())),
        PrimitiveValue::Int16(v) => json!(v),
        PrimitiveValue::Int32(v) => json!(v),
        PrimitiveValue::Int64(v) => json!(v),
        PrimitiveValue::SByte(v) => json!(v),
        PrimitiveValue::TimeSpan(v) => json!({ "timespan_ticks": v }),
        PrimitiveValue::DateTime(v) => json!({
            "datetime_ticks": v.ticks(),
            "kind": format!("{:?}", v.kind()),
        }),
        PrimitiveValue::UInt16(v) => json!(v),
        PrimitiveValue::UInt32(v) => json!(v),
        PrimitiveValue::UInt64(v) => json!(v),
    }
}

fn object_json(object: &Object, ids: &HashMap<Handle, i32>) -> serde_json::Value {
    match object {
        Object::String(s) => json!({ "kind": "string", "value": s }),
        Object::Array(array) => {
            let items = array
                .items
                .iter()
                .map(|v| value_json(v, ids))
                .collect::<Vec<_>>();
            json!({
                "kind": "array",
                "element_type": array.element_type.to_string(),
                "lower_bound": array.lower_bound,
                "items": items,
            })
        }
        Object::Class(class) => {
            let members = class
                .members
                .iter()
                .map(|m| {
                    json!({
                        "name": m.name,
                        "type": m.member_type.as_ref().map(|t| t.to_string()),
                        "value": value_json(&m.value, ids),
                    })
                })
                .collect::<Vec<_>>();
            json!({
                "kind": "class",
                "name": class.name,
                "library": class.library,
                "members": members,
            })
        }
    }
}
