use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::error::FlowmonError;
use crate::model::aggregate::FlowAggregate;
use crate::state::TableSnapshot;

use super::{field_cell, limited, rate_kbps};

#[derive(Serialize)]
struct JsonSnapshot<'a> {
    processed_messages: u64,
    keys: Vec<&'static str>,
    sort: &'static str,
    aggregates: Vec<JsonAggregate<'a>>,
}

#[derive(Serialize)]
struct JsonAggregate<'a> {
    /// Active key fields only.
    fields: BTreeMap<&'a str, String>,
    members: usize,
    total_bytes: u64,
    total_packets: u64,
    rate_kbps: f64,
    trend: &'static str,
    first_time_received: u64,
    last_time_received: u64,
    first_time_flow_start: u64,
    last_time_flow_end: u64,
}

impl<'a> JsonAggregate<'a> {
    fn new(snapshot: &'a TableSnapshot, agg: &FlowAggregate) -> Self {
        let fields = snapshot
            .keys
            .iter()
            .map(|def| (def.name, field_cell(snapshot, agg, def.name)))
            .collect();
        Self {
            fields,
            members: agg.members(),
            total_bytes: agg.total_bytes,
            total_packets: agg.total_packets,
            rate_kbps: rate_kbps(agg),
            trend: agg.trend().symbol(),
            first_time_received: agg.first_time_received,
            last_time_received: agg.last_time_received,
            first_time_flow_start: agg.first_time_flow_start,
            last_time_flow_end: agg.last_time_flow_end,
        }
    }
}

/// Write the snapshot as a pretty-printed JSON document.
pub fn write_json(
    snapshot: &TableSnapshot,
    limit: Option<usize>,
    writer: &mut impl Write,
) -> Result<(), FlowmonError> {
    let doc = JsonSnapshot {
        processed_messages: snapshot.messages,
        keys: snapshot.keys.names(),
        sort: snapshot.sort_name(),
        aggregates: limited(snapshot, limit)
            .iter()
            .map(|agg| JsonAggregate::new(snapshot, agg))
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *writer, &doc)
        .map_err(|e| FlowmonError::Serialization(std::io::Error::other(e.to_string())))?;
    writeln!(writer).map_err(FlowmonError::Serialization)
}
