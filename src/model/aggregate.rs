use std::sync::Arc;

use crate::error::FlowmonError;
use crate::model::FieldValue;
use crate::model::fields::KeySet;
use crate::model::flow::FlowRecord;

/// Direction of the last rate change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Up,
    Flat,
    Down,
}

impl Trend {
    pub fn from_delta(delta: i64) -> Self {
        match delta.signum() {
            1 => Self::Up,
            -1 => Self::Down,
            _ => Self::Flat,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Up => "↑",
            Self::Flat => "=",
            Self::Down => "↓",
        }
    }
}

/// A group of flow records sharing the values of every active key field.
///
/// Only a cumulative summary is kept; the first member is retained as the
/// identity the remaining members are compared against.
#[derive(Clone, Debug)]
pub struct FlowAggregate {
    keys: Arc<KeySet>,
    identity: Option<Arc<FlowRecord>>,
    members: usize,

    pub total_bytes: u64,
    pub total_packets: u64,

    pub first_time_received: u64,
    pub last_time_received: u64,
    pub first_time_flow_start: u64,
    pub last_time_flow_end: u64,

    /// Bytes per second over the aggregate's lifetime.
    pub last_bps: u64,
    pub last_delta_bps: i64,
}

/// Signed `new - old`, clamped to the `i64` range.
fn rate_delta(new: u64, old: u64) -> i64 {
    let delta = i128::from(new) - i128::from(old);
    i64::try_from(delta).unwrap_or(if delta > 0 { i64::MAX } else { i64::MIN })
}

impl FlowAggregate {
    pub fn new(keys: Arc<KeySet>) -> Self {
        Self {
            keys,
            identity: None,
            members: 0,
            total_bytes: 0,
            total_packets: 0,
            first_time_received: 0,
            last_time_received: 0,
            first_time_flow_start: 0,
            last_time_flow_end: 0,
            last_bps: 0,
            last_delta_bps: 0,
        }
    }

    /// Append `record` if it agrees with this aggregate on every active key
    /// field. An empty aggregate accepts anything.
    pub fn append_if_matches(&mut self, record: &Arc<FlowRecord>) -> bool {
        if let Some(identity) = &self.identity {
            let matches = self
                .keys
                .iter()
                .all(|field| (field.get)(&identity.key) == (field.get)(&record.key));
            if !matches {
                return false;
            }
        } else {
            self.identity = Some(Arc::clone(record));
        }
        self.absorb(record);
        true
    }

    fn absorb(&mut self, record: &FlowRecord) {
        self.members += 1;
        // Counters pin at u64::MAX rather than wrap.
        self.total_bytes = self.total_bytes.saturating_add(record.bytes);
        self.total_packets = self.total_packets.saturating_add(record.packets);

        if self.first_time_received == 0 {
            self.first_time_received = record.time_received;
        }
        if self.first_time_flow_start == 0 {
            self.first_time_flow_start = record.time_flow_start;
        }
        // Last-write-wins: out-of-order delivery can move these backwards.
        self.last_time_received = record.time_received;
        self.last_time_flow_end = record.time_flow_end;

        let duration = self
            .last_time_flow_end
            .saturating_sub(self.first_time_flow_start);
        let bps = if duration == 0 {
            0
        } else {
            self.total_bytes / duration
        };
        self.last_delta_bps = rate_delta(bps, self.last_bps);
        self.last_bps = bps;
    }

    pub fn members(&self) -> usize {
        self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members == 0
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn trend(&self) -> Trend {
        Trend::from_delta(self.last_delta_bps)
    }

    /// Value of an active key field. Fields outside the key set have no
    /// single value for the aggregate and are reported as unknown.
    pub fn field(&self, name: &str) -> Result<FieldValue<'_>, FlowmonError> {
        let def = self
            .keys
            .get(name)
            .ok_or_else(|| FlowmonError::UnknownField(name.to_string()))?;
        let identity = self.identity.as_ref().ok_or(FlowmonError::EmptyAggregate)?;
        Ok((def.get)(&identity.key))
    }

    pub fn field_string(&self, name: &str) -> Result<String, FlowmonError> {
        self.field(name).map(|v| v.to_string())
    }
}
