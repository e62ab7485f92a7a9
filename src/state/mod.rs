pub mod sort;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::enrichment::Attributes;
use crate::error::FlowmonError;
use crate::model::aggregate::FlowAggregate;
use crate::model::fields::{FieldTable, KeySet, TableMode};
use crate::model::flow::{FlowRecord, RawFlow};
use crate::normalize::normalize;

use self::sort::SortKey;

/// Everything guarded by the table lock.
struct TableState {
    /// Every record ever ingested, in ingestion order.
    flows: Vec<Arc<FlowRecord>>,
    /// Always a partition of `flows` under `keys`, ranked by `sort`.
    aggregates: Vec<FlowAggregate>,
    keys: Arc<KeySet>,
    sort: SortKey,
    messages: u64,
}

impl TableState {
    fn process_flow(&mut self, fields: &FieldTable, flow: &Arc<FlowRecord>) {
        let matched = self
            .aggregates
            .iter_mut()
            .position(|agg| agg.append_if_matches(flow));

        let agg = match matched {
            Some(i) => self.aggregates.remove(i),
            None => {
                let mut agg = FlowAggregate::new(Arc::clone(&self.keys));
                assert!(
                    agg.append_if_matches(flow),
                    "empty aggregate rejected its first flow"
                );
                agg
            }
        };
        self.insert_sorted(fields, agg);
    }

    /// Insert before the first aggregate that ranks after `agg`, so ties keep
    /// insertion order.
    fn insert_sorted(&mut self, fields: &FieldTable, agg: FlowAggregate) {
        let at = self
            .aggregates
            .partition_point(|existing| !self.sort.ranks_after(fields, existing, &agg));
        self.aggregates.insert(at, agg);
    }

    /// Discard all aggregates and replay the full history.
    fn recompute(&mut self, fields: &FieldTable) {
        self.aggregates = Vec::new();
        let flows = std::mem::take(&mut self.flows);
        for flow in &flows {
            self.process_flow(fields, flow);
        }
        self.flows = flows;
    }
}

/// Consistent copy of the table for rendering.
#[derive(Clone)]
pub struct TableSnapshot {
    pub fields: Arc<FieldTable>,
    pub keys: Arc<KeySet>,
    pub sort: SortKey,
    pub aggregates: Vec<FlowAggregate>,
    pub messages: u64,
}

impl TableSnapshot {
    pub fn sort_name(&self) -> &'static str {
        self.sort.name(&self.fields)
    }
}

/// Flow history plus the ranked aggregates derived from it.
///
/// Safe to share between several ingest workers and readers. Every mutation,
/// including the history append, happens under one write lock, so a replay
/// triggered by reconfiguration never sees a record that has not yet been
/// aggregated.
pub struct FlowTable {
    fields: Arc<FieldTable>,
    state: RwLock<TableState>,
}

impl FlowTable {
    /// Create an empty table with every field of `mode` active, ranked by
    /// last-seen time.
    pub fn new(mode: TableMode) -> Self {
        let fields = Arc::new(FieldTable::new(mode));
        let keys = Arc::new(KeySet::all(&fields));
        Self {
            fields,
            state: RwLock::new(TableState {
                flows: Vec::new(),
                aggregates: Vec::new(),
                keys,
                sort: SortKey::default(),
                messages: 0,
            }),
        }
    }

    pub fn fields(&self) -> &Arc<FieldTable> {
        &self.fields
    }

    pub fn process_message(&self, raw: &RawFlow, attrs: &Attributes) {
        log::debug!("Processing flow message: {raw:?}");
        let flow = Arc::new(normalize(raw, attrs));

        let mut state = self.state.write();
        state.process_flow(&self.fields, &flow);
        state.flows.push(flow);
        state.messages += 1;
    }

    /// Replace the active key set and rebuild every aggregate from history.
    pub fn set_active_keys<I, S>(&self, names: I) -> Result<(), FlowmonError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = KeySet::resolve(&self.fields, names)?;
        let mut state = self.state.write();
        self.replace_keys(&mut state, keys);
        Ok(())
    }

    /// Add or remove one field from the active key set.
    pub fn toggle_aggregate_field(&self, name: &str) -> Result<(), FlowmonError> {
        let mut state = self.state.write();
        let keys = state.keys.toggled(&self.fields, name)?;
        self.replace_keys(&mut state, keys);
        Ok(())
    }

    fn replace_keys(&self, state: &mut TableState, keys: KeySet) {
        if let SortKey::Field(index) = state.sort
            && !keys.contains_index(index)
        {
            log::info!(
                "Sort field {} left the aggregate, sorting by {}",
                self.fields.def(index).name,
                sort::LAST_TIME_RECEIVED
            );
            state.sort = SortKey::LastTimeReceived;
        }
        log::info!("Aggregating by {:?}", keys.names());
        state.keys = Arc::new(keys);
        state.recompute(&self.fields);
    }

    /// Change the ranking criterion. Unknown names, and key fields outside
    /// the active key set, are rejected without any change.
    pub fn set_sort_key(&self, name: &str) -> Result<(), FlowmonError> {
        let mut state = self.state.write();
        let sort = SortKey::parse(name, &self.fields, &state.keys)?;
        log::info!("Sorting by {}", sort.name(&self.fields));
        state.sort = sort;
        state.recompute(&self.fields);
        Ok(())
    }

    pub fn snapshot(&self) -> TableSnapshot {
        let state = self.state.read();
        TableSnapshot {
            fields: Arc::clone(&self.fields),
            keys: Arc::clone(&state.keys),
            sort: state.sort,
            aggregates: state.aggregates.clone(),
            messages: state.messages,
        }
    }

    pub fn message_count(&self) -> u64 {
        self.state.read().messages
    }

    pub fn history_len(&self) -> usize {
        self.state.read().flows.len()
    }

    pub fn aggregate_count(&self) -> usize {
        self.state.read().aggregates.len()
    }

    pub fn active_keys(&self) -> Vec<&'static str> {
        self.state.read().keys.names()
    }

    pub fn sort_key(&self) -> SortKey {
        self.state.read().sort
    }
}
