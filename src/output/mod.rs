pub mod json;
pub mod pretty;
pub mod tsv;

use std::io::Write;

use crate::cli::OutputFormat;
use crate::error::FlowmonError;
use crate::model::aggregate::FlowAggregate;
use crate::state::TableSnapshot;
use crate::state::sort::{RATE, TOTAL_BYTES, TOTAL_PACKETS};

/// Metric columns appended after the key fields.
pub const METRIC_COLUMNS: [&str; 3] = [TOTAL_BYTES, TOTAL_PACKETS, RATE];

/// Shown for fields outside the active key set.
pub const NOT_AGGREGATED: &str = "-";
/// Shown when a field lookup fails.
pub const LOOKUP_ERROR: &str = "err";

/// Write a snapshot of the ranked aggregates in the specified format.
/// `limit` caps the number of rows.
pub fn write_snapshot(
    snapshot: &TableSnapshot,
    format: OutputFormat,
    limit: Option<usize>,
    writer: &mut impl Write,
) -> Result<(), FlowmonError> {
    match format {
        OutputFormat::Tsv => tsv::write_tsv(snapshot, limit, writer),
        OutputFormat::Json => json::write_json(snapshot, limit, writer),
        OutputFormat::Pretty => pretty::write_pretty(snapshot, limit, writer),
    }
}

/// Every vocabulary field followed by the metric columns.
pub fn header(snapshot: &TableSnapshot) -> Vec<&'static str> {
    snapshot
        .fields
        .names()
        .chain(METRIC_COLUMNS)
        .collect()
}

/// Display cells for one aggregate, in `header` order.
pub fn row_cells(snapshot: &TableSnapshot, agg: &FlowAggregate) -> Vec<String> {
    let mut cells: Vec<String> = snapshot
        .fields
        .names()
        .map(|name| field_cell(snapshot, agg, name))
        .collect();
    cells.push(agg.total_bytes.to_string());
    cells.push(agg.total_packets.to_string());
    cells.push(format_rate(agg));
    cells
}

pub fn field_cell(snapshot: &TableSnapshot, agg: &FlowAggregate, name: &str) -> String {
    if !snapshot.keys.contains(name) {
        return NOT_AGGREGATED.to_string();
    }
    match agg.field_string(name) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Cannot render field {name}: {e}");
            LOOKUP_ERROR.to_string()
        }
    }
}

/// Rate in kbps with one decimal, followed by the trend arrow.
pub fn format_rate(agg: &FlowAggregate) -> String {
    format!("{:.1} {}", rate_kbps(agg), agg.trend().symbol())
}

pub fn rate_kbps(agg: &FlowAggregate) -> f64 {
    agg.last_bps as f64 / 1000.0
}

fn limited(snapshot: &TableSnapshot, limit: Option<usize>) -> &[FlowAggregate] {
    let n = limit.map_or(snapshot.aggregates.len(), |l| l.min(snapshot.aggregates.len()));
    &snapshot.aggregates[..n]
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::enrichment::Attributes;
    use crate::model::fields::TableMode;
    use crate::model::flow::RawFlow;
    use crate::state::{FlowTable, TableSnapshot};

    /// Two aggregates keyed by source port: port 443 (3200 bytes over two
    /// records) then port 22 (500 bytes).
    pub fn sample_snapshot() -> TableSnapshot {
        let table = FlowTable::new(TableMode::Normal);
        table.set_active_keys(["SrcPort", "Proto"]).unwrap();
        table.set_sort_key("TotalBytes").unwrap();
        let flows = [(443, 1000, 10, 12), (22, 500, 11, 16), (443, 2200, 12, 14)];
        for (src_port, bytes, start, end) in flows {
            let raw = RawFlow {
                src_port,
                dst_port: 50000,
                proto: 6,
                bytes,
                packets: 2,
                time_received: end,
                time_flow_start: start,
                time_flow_end: end,
                ..Default::default()
            };
            table.process_message(&raw, &Attributes::default());
        }
        table.snapshot()
    }
}
