use std::cmp::Ordering;

use crate::error::FlowmonError;
use crate::model::aggregate::FlowAggregate;
use crate::model::fields::{FieldTable, KeySet};

pub const LAST_TIME_RECEIVED: &str = "LastTimeReceived";
pub const RATE: &str = "Rate(kbps)";
pub const TOTAL_BYTES: &str = "TotalBytes";
pub const TOTAL_PACKETS: &str = "TotalPackets";

/// Reserved metric names and their aliases.
const RESERVED: &[(&str, SortKey)] = &[
    (LAST_TIME_RECEIVED, SortKey::LastTimeReceived),
    ("last-seen-time", SortKey::LastTimeReceived),
    (RATE, SortKey::Rate),
    ("computed-rate", SortKey::Rate),
    (TOTAL_BYTES, SortKey::TotalBytes),
    ("total-bytes", SortKey::TotalBytes),
    (TOTAL_PACKETS, SortKey::TotalPackets),
    ("total-packets", SortKey::TotalPackets),
];

/// What aggregates are ranked by. Larger values rank first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    LastTimeReceived,
    Rate,
    TotalBytes,
    TotalPackets,
    /// A key field, by column index in the `FieldTable`.
    Field(usize),
}

impl SortKey {
    /// Resolve a sort request. Key fields are only accepted while they are
    /// part of the active key set.
    pub fn parse(name: &str, table: &FieldTable, keys: &KeySet) -> Result<Self, FlowmonError> {
        if let Some((_, key)) = RESERVED.iter().find(|(n, _)| *n == name) {
            return Ok(*key);
        }
        let index = table.lookup(name)?;
        if !keys.contains_index(index) {
            return Err(FlowmonError::NotAggregated(name.to_string()));
        }
        Ok(Self::Field(index))
    }

    pub fn name(&self, table: &FieldTable) -> &'static str {
        match self {
            Self::LastTimeReceived => LAST_TIME_RECEIVED,
            Self::Rate => RATE,
            Self::TotalBytes => TOTAL_BYTES,
            Self::TotalPackets => TOTAL_PACKETS,
            Self::Field(index) => table.def(*index).name,
        }
    }

    pub fn reserved_names() -> impl Iterator<Item = &'static str> {
        [LAST_TIME_RECEIVED, RATE, TOTAL_BYTES, TOTAL_PACKETS].into_iter()
    }

    /// Compare two aggregates by this key's metric, ascending.
    pub fn compare(&self, table: &FieldTable, a: &FlowAggregate, b: &FlowAggregate) -> Ordering {
        match self {
            Self::LastTimeReceived => a.last_time_received.cmp(&b.last_time_received),
            Self::Rate => a.last_bps.cmp(&b.last_bps),
            Self::TotalBytes => a.total_bytes.cmp(&b.total_bytes),
            Self::TotalPackets => a.total_packets.cmp(&b.total_packets),
            Self::Field(index) => {
                let name = table.def(*index).name;
                match (a.field(name), b.field(name)) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    // Aggregates without the field sink to the bottom.
                    (Ok(_), Err(_)) => Ordering::Greater,
                    (Err(_), Ok(_)) => Ordering::Less,
                    (Err(_), Err(_)) => Ordering::Equal,
                }
            }
        }
    }

    /// Whether `existing` belongs after `new` in the ranked list.
    pub fn ranks_after(
        &self,
        table: &FieldTable,
        existing: &FlowAggregate,
        new: &FlowAggregate,
    ) -> bool {
        self.compare(table, existing, new) == Ordering::Less
    }
}
