use std::collections::HashMap;

use nrbf_format::{Graph, Handle, Object};
use serde::Serialize;

use crate::cli::ListArgs;
use crate::error::{Error, Result};
use crate::util::{format_object, format_value, read_graph, wire_ids};

#[derive(Serialize)]
struct JsonEntry {
    id: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    library: Option<String>,
    summary: String,
}

#[derive(Serialize)]
struct JsonListing {
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<i32>,
    root: String,
    objects: Vec<JsonEntry>,
}

pub fn run(args: ListArgs) -> Result<()> {
    let graph = read_graph(&args.file, args.max_depth)?;
    let ids = wire_ids(&graph);

    if args.json {
        list_json(&graph, &ids)
    } else {
        list_table(&graph, &ids);
        Ok(())
    }
}

fn list_table(graph: &Graph, ids: &HashMap<Handle, i32>) {
    println!("{:>8}  {:<6}  Contents", "Id", "Kind");
    println!("{}", "-".repeat(60));

    for (id, handle) in graph.ids() {
        if let Some(object) = graph.get(handle) {
            println!("{:>8}  {:<6}  {}", id, object.kind(), format_object(object, ids));
        }
    }

    println!("{}", "-".repeat(60));
    println!(
        "{} objects, root: {}",
        graph.len(),
        format_value(graph.root(), ids)
    );
}

fn list_json(graph: &Graph, ids: &HashMap<Handle, i32>) -> Result<()> {
    let objects = graph
        .ids()
        .filter_map(|(id, handle)| {
            let object = graph.get(handle)?;
            let (name, library) = match object {
                Object::Class(class) => (Some(class.name.clone()), class.library.clone()),
                _ => (None, None),
            };
            Some(JsonEntry {
                id,
                kind: object.kind(),
                name,
                library,
                summary: format_object(object, ids),
            })
        })
        .collect();

    let listing = JsonListing {
        root_id: graph.root_id(),
        root: format_value(graph.root(), ids),
        objects,
    };

    let json =
        serde_json::to_string_pretty(&listing).map_err(|source| Error::Json { source })?;
    println!("{}", json);
    Ok(())
}
