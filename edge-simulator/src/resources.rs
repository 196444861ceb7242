//! Input files consumed by the simulator.
//!
//! Two inputs accompany a trace: the **resource size map**, a `;`-delimited
//! CSV mapping content identifiers to byte sizes, and the **node map**, a
//! JSON adjacency list describing which edge nodes neighbour each other.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Error raised while reading an input file.
#[derive(Debug, Error)]
pub enum InputError {
    /// The file could not be opened or read.
    #[error("input i/o error: {0}")]
    Io(#[from] io::Error),
    /// A CSV row could not be parsed.
    #[error("resource map error: {0}")]
    Csv(#[from] csv::Error),
    /// The node map is not valid JSON.
    #[error("node map error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the resource size map. Only `identifier` and `size` are read;
/// the extension and type columns are ignored.
#[derive(Debug, Deserialize)]
struct ResourceRow {
    identifier: String,
    size: i64,
}

/// Removes all whitespace from an identifier.
fn clean_identifier(identifier: &str) -> String {
    identifier.split_whitespace().collect()
}

/// Reads a resource size map from a `;`-delimited CSV file with an
/// `identifier;size;extension;type` header.
///
/// Whitespace-only identifiers are ignored and rows with a non-positive size
/// are dropped.
pub fn read_resource_map(path: impl AsRef<Path>) -> Result<HashMap<String, u64>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path.as_ref())?;

    let mut resource_map = HashMap::new();
    for row in reader.deserialize() {
        let row: ResourceRow = row?;
        let identifier = clean_identifier(&row.identifier);
        if identifier.is_empty() || row.size <= 0 {
            continue;
        }
        resource_map.insert(identifier, row.size as u64);
    }
    Ok(resource_map)
}

/// JSON node map: `{"nodes": {"cdn1": ["cdn2", "cdn3"], ...}}`.
#[derive(Debug, Deserialize)]
struct NodeMapFile {
    nodes: HashMap<String, Vec<String>>,
}

/// Reads a node adjacency map from a JSON file.
///
/// The keys are the node identifiers; the values list each node's
/// neighbours. Used by the neighbouring strategy and the trace generator.
pub fn read_node_map(path: impl AsRef<Path>) -> Result<HashMap<String, Vec<String>>, InputError> {
    let file = File::open(path.as_ref())?;
    let map: NodeMapFile = serde_json::from_reader(file)?;
    Ok(map.nodes)
}

/// Builds a fully connected node layout `cdn1..cdnN`.
///
/// Used when no node map is supplied: every node neighbours every other
/// node.
pub fn default_node_map(no_nodes: usize) -> HashMap<String, Vec<String>> {
    let names: Vec<String> = (1..=no_nodes).map(|i| format!("cdn{i}")).collect();
    names
        .iter()
        .map(|node| {
            let neighbours = names.iter().filter(|n| *n != node).cloned().collect();
            (node.clone(), neighbours)
        })
        .collect()
}
