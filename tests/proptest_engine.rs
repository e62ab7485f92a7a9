//! Property-based tests for the flow table.
//!
//! Random record streams and key subsets check that aggregation is a
//! partition of the history, that byte and packet totals are conserved across
//! regrouping, that toggling a field twice is a no-op, and that every sort
//! key yields a ranked list.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use proptest::prelude::*;

use flowmon::enrichment::Attributes;
use flowmon::model::fields::TableMode;
use flowmon::model::flow::RawFlow;
use flowmon::normalize::normalize;
use flowmon::state::FlowTable;

const KEY_CHOICES: [&str; 6] = [
    "SrcAddr", "DstAddr", "Proto", "SrcPort", "DstPort", "SvcPort",
];

/// Small value ranges so groups actually collide.
fn arbitrary_flow() -> impl Strategy<Value = RawFlow> {
    (
        0u8..3,
        0u8..3,
        prop_oneof![Just(6u32), Just(17u32), Just(1u32)],
        prop_oneof![Just(53u32), Just(443u32), Just(40000u32), Just(50000u32)],
        prop_oneof![Just(80u32), Just(40001u32)],
        0u64..10_000,
        0u64..50,
        (0u64..100, 0u64..20),
    )
        .prop_map(|(src, dst, proto, src_port, dst_port, bytes, packets, (start, len))| RawFlow {
            src_addr: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, src))),
            dst_addr: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 1, dst))),
            proto,
            src_port,
            dst_port,
            bytes,
            packets,
            time_received: start + len,
            time_flow_start: start,
            time_flow_end: start + len,
            ..Default::default()
        })
}

fn arbitrary_keys() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(KEY_CHOICES.to_vec(), 0..=KEY_CHOICES.len())
}

fn arbitrary_sort() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("LastTimeReceived"),
        Just("Rate(kbps)"),
        Just("TotalBytes"),
        Just("TotalPackets"),
    ]
}

fn build(flows: &[RawFlow], keys: &[&str]) -> FlowTable {
    let table = FlowTable::new(TableMode::Normal);
    table.set_active_keys(keys).unwrap();
    for f in flows {
        table.process_message(f, &Attributes::default());
    }
    table
}

/// Expected grouping computed directly from the records: active-key values to
/// (bytes, packets, count).
fn expected_groups(
    table: &FlowTable,
    flows: &[RawFlow],
) -> BTreeMap<Vec<String>, (u64, u64, usize)> {
    let keys = table.active_keys();
    let mut groups = BTreeMap::new();
    for f in flows {
        let record = normalize(f, &Attributes::default());
        let values: Vec<String> = keys
            .iter()
            .map(|k| table.fields().value(&record.key, k).unwrap().to_string())
            .collect();
        let entry = groups.entry(values).or_insert((0, 0, 0));
        entry.0 += f.bytes;
        entry.1 += f.packets;
        entry.2 += 1;
    }
    groups
}

fn actual_groups(table: &FlowTable) -> BTreeMap<Vec<String>, (u64, u64, usize)> {
    let snap = table.snapshot();
    let keys = snap.keys.names();
    snap.aggregates
        .iter()
        .map(|agg| {
            let values = keys.iter().map(|k| agg.field_string(k).unwrap()).collect();
            (values, (agg.total_bytes, agg.total_packets, agg.members()))
        })
        .collect()
}

proptest! {
    /// Each record lands in exactly one aggregate, and aggregates are distinct
    /// on the active keys.
    #[test]
    fn aggregation_is_a_partition(
        flows in prop::collection::vec(arbitrary_flow(), 0..60),
        keys in arbitrary_keys(),
    ) {
        let table = build(&flows, &keys);
        let actual = actual_groups(&table);
        // A BTreeMap collapses duplicate keys, so equal sizes mean no two
        // aggregates share the same key values.
        prop_assert_eq!(actual.len(), table.aggregate_count());
        prop_assert_eq!(actual, expected_groups(&table, &flows));
    }

    /// Totals survive any sequence of regroupings.
    #[test]
    fn totals_are_conserved(
        flows in prop::collection::vec(arbitrary_flow(), 1..60),
        regroupings in prop::collection::vec(arbitrary_keys(), 1..4),
    ) {
        let table = build(&flows, &[]);
        let bytes: u64 = flows.iter().map(|f| f.bytes).sum();
        let packets: u64 = flows.iter().map(|f| f.packets).sum();
        for keys in regroupings {
            table.set_active_keys(&keys).unwrap();
            let snap = table.snapshot();
            prop_assert_eq!(snap.aggregates.iter().map(|a| a.total_bytes).sum::<u64>(), bytes);
            prop_assert_eq!(snap.aggregates.iter().map(|a| a.total_packets).sum::<u64>(), packets);
        }
    }

    /// Toggling the same field twice gives back the same partition.
    #[test]
    fn double_toggle_is_identity(
        flows in prop::collection::vec(arbitrary_flow(), 0..40),
        keys in arbitrary_keys(),
        field in prop::sample::select(KEY_CHOICES.to_vec()),
    ) {
        let table = build(&flows, &keys);
        let before = actual_groups(&table);
        table.toggle_aggregate_field(field).unwrap();
        table.toggle_aggregate_field(field).unwrap();
        let restored: Vec<&str> = table.fields().names().filter(|n| keys.contains(n)).collect();
        prop_assert_eq!(table.active_keys(), restored);
        prop_assert_eq!(actual_groups(&table), before);
    }

    /// Every reserved sort key yields a non-increasing list.
    #[test]
    fn ranking_is_ordered(
        flows in prop::collection::vec(arbitrary_flow(), 0..60),
        keys in arbitrary_keys(),
        sort in arbitrary_sort(),
    ) {
        let table = build(&flows, &keys);
        table.set_sort_key(sort).unwrap();
        let snap = table.snapshot();
        for pair in snap.aggregates.windows(2) {
            prop_assert!(snap.sort.compare(&snap.fields, &pair[0], &pair[1]).is_ge());
        }
    }

    /// Sorting by an active key field orders by that field's value.
    #[test]
    fn ranking_by_key_field_is_ordered(
        flows in prop::collection::vec(arbitrary_flow(), 0..60),
        field in prop::sample::select(KEY_CHOICES.to_vec()),
    ) {
        let table = build(&flows, &[field]);
        table.set_sort_key(field).unwrap();
        let snap = table.snapshot();
        for pair in snap.aggregates.windows(2) {
            prop_assert!(pair[0].field(field).unwrap() >= pair[1].field(field).unwrap());
        }
    }
}
