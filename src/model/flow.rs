use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::model::{Etype, FlowDirection, MacAddr, Proto};

/// A decoded flow record as handed over by the collector.
///
/// Field names and widths follow the goflow2 protobuf message. Every field is
/// optional on the wire and defaults to zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFlow {
    pub flow_direction: u32,
    pub in_if: u32,
    pub out_if: u32,
    pub src_mac: u64,
    pub dst_mac: u64,
    pub etype: u32,
    pub vlan_id: u32,
    pub src_addr: Option<IpAddr>,
    pub dst_addr: Option<IpAddr>,
    pub proto: u32,
    pub src_port: u32,
    pub dst_port: u32,
    pub tcp_flags: u32,
    pub icmp_type: u32,
    pub icmp_code: u32,
    pub bytes: u64,
    pub packets: u64,
    pub time_received: u64,
    pub time_flow_start: u64,
    pub time_flow_end: u64,
    pub forwarding_status: u32,
    pub observation_domain_id: u32,
    pub observation_point_id: u32,
}

/// Logical-flow and datapath information attached by the OVN enricher.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OvnInfo {
    pub lf_uuid: String,
    pub lf_match: String,
    pub lf_actions: String,
    pub lf_pipeline: String,
    pub lf_stage: String,
    pub dp_type: String,
    pub dp_name: String,
    pub of_table: i64,
}

/// ACL verdict information attached by the ACL enricher.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AclInfo {
    pub name: String,
    pub direction: String,
    pub action: String,
}

/// The identifying fields of a flow. Immutable once built by the normalizer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub direction: FlowDirection,

    pub in_if: u32,
    pub out_if: u32,

    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub etype: Etype,
    pub vlan_id: u32,

    pub src_addr: Option<IpAddr>,
    pub dst_addr: Option<IpAddr>,
    pub proto: Proto,

    pub src_port: u32,
    pub dst_port: u32,
    pub svc_port: u32,
    pub tcp_flags: u32,
    pub icmp_type: u32,
    pub icmp_code: u32,

    pub ovn: OvnInfo,
    pub acl: AclInfo,
}

/// A flow key plus its counters and timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRecord {
    pub key: FlowKey,

    pub bytes: u64,
    pub packets: u64,

    pub time_received: u64,
    pub time_flow_start: u64,
    pub time_flow_end: u64,

    pub forwarding_status: u32,
}
