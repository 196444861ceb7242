//! Per-node statistics files.
//!
//! Every node of a run gets one `;`-delimited CSV file. The header is
//! written once when the file is created; each `GET_STATS` instruction
//! appends one integer row keyed by the current iteration:
//!
//! ```text
//! iteration;hits;misses;no_items;bytes_used;cache_bytes;origin_bytes;
//! neighbour_bytes;requests_to_origin;requests_to_neighbours;
//! requests_to_neighbours_success
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;

use edge_cache::CacheMetrics;

/// Column order of a statistics row.
const HEADER: [&str; 11] = [
    "iteration",
    "hits",
    "misses",
    "no_items",
    "bytes_used",
    "cache_bytes",
    "origin_bytes",
    "neighbour_bytes",
    "requests_to_origin",
    "requests_to_neighbours",
    "requests_to_neighbours_success",
];

/// One sample row; field order must match [`HEADER`].
#[derive(Debug, Serialize)]
struct StatsRow {
    iteration: u64,
    hits: u64,
    misses: u64,
    no_items: u64,
    bytes_used: u64,
    cache_bytes: u64,
    origin_bytes: u64,
    neighbour_bytes: u64,
    requests_to_origin: u64,
    requests_to_neighbours: u64,
    requests_to_neighbours_success: u64,
}

/// Appends metric samples for one node to a CSV file.
#[derive(Debug)]
pub struct StatsWriter {
    writer: csv::Writer<File>,
}

impl StatsWriter {
    /// Creates the file and writes the header line.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_path(path.as_ref())?;
        writer.write_record(HEADER)?;
        Ok(StatsWriter { writer })
    }

    /// Appends one sample row for the given iteration.
    pub fn append(&mut self, iteration: u64, stats: &CacheMetrics) -> Result<(), csv::Error> {
        self.writer.serialize(StatsRow {
            iteration,
            hits: stats.hits,
            misses: stats.misses,
            no_items: stats.no_items,
            bytes_used: stats.bytes_used,
            cache_bytes: stats.cache_bytes,
            origin_bytes: stats.origin_bytes,
            neighbour_bytes: stats.neighbour_bytes,
            requests_to_origin: stats.requests_to_origin,
            requests_to_neighbours: stats.requests_to_neighbours,
            requests_to_neighbours_success: stats.requests_to_neighbours_success,
        })?;
        self.writer.flush()?;
        Ok(())
    }
}

/// File path for one node's statistics, `<out_dir>/<node><-marker>.csv`.
pub fn stats_path(out_dir: &Path, node_id: &str, marker: &str) -> PathBuf {
    let marker = if marker.is_empty() {
        String::new()
    } else {
        format!("-{marker}")
    };
    out_dir.join(format!("{node_id}{marker}.csv"))
}

/// Creates one stats writer per node in `out_dir`.
pub fn writers_for_nodes(
    node_ids: &[String],
    out_dir: &Path,
    marker: &str,
) -> Result<BTreeMap<String, StatsWriter>, csv::Error> {
    node_ids
        .iter()
        .map(|node_id| {
            let writer = StatsWriter::create(stats_path(out_dir, node_id, marker))?;
            Ok((node_id.clone(), writer))
        })
        .collect()
}
