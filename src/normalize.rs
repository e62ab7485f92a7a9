use crate::enrichment::{AttrValue, Attributes, attr};
use crate::model::flow::{AclInfo, FlowKey, FlowRecord, OvnInfo, RawFlow};
use crate::model::{Etype, FlowDirection, MacAddr, Proto};

/// First port of the default Linux ephemeral range (32768-60999).
const EPHEMERAL_PORT_START: u32 = 32768;

/// Build an immutable `FlowRecord` from a decoded flow and its enrichment
/// attributes.
///
/// Missing attributes fall back to empty strings and zero; the function never
/// fails and does not check the record for internal consistency.
pub fn normalize(raw: &RawFlow, attrs: &Attributes) -> FlowRecord {
    let key = FlowKey {
        direction: FlowDirection::from(raw.flow_direction),
        in_if: raw.in_if,
        out_if: raw.out_if,
        src_mac: MacAddr::from_u64(raw.src_mac),
        dst_mac: MacAddr::from_u64(raw.dst_mac),
        etype: Etype::from(raw.etype),
        vlan_id: raw.vlan_id,
        src_addr: raw.src_addr,
        dst_addr: raw.dst_addr,
        proto: Proto::from(raw.proto),
        src_port: raw.src_port,
        dst_port: raw.dst_port,
        svc_port: service_port(raw.src_port, raw.dst_port),
        tcp_flags: raw.tcp_flags,
        icmp_type: raw.icmp_type,
        icmp_code: raw.icmp_code,
        ovn: OvnInfo {
            lf_uuid: text_attr(attrs, attr::LF_UUID),
            lf_match: text_attr(attrs, attr::LF_MATCH),
            lf_actions: text_attr(attrs, attr::LF_ACTIONS),
            lf_pipeline: text_attr(attrs, attr::LF_PIPELINE),
            lf_stage: text_attr(attrs, attr::LF_STAGE),
            dp_type: text_attr(attrs, attr::DP_TYPE),
            dp_name: text_attr(attrs, attr::DP_NAME),
            of_table: int_attr(attrs, attr::OF_TABLE),
        },
        acl: AclInfo {
            name: text_attr(attrs, attr::ACL_NAME),
            direction: text_attr(attrs, attr::ACL_DIRECTION),
            action: text_attr(attrs, attr::ACL_ACTION),
        },
    };

    FlowRecord {
        key,
        bytes: raw.bytes,
        packets: raw.packets,
        time_received: raw.time_received,
        time_flow_start: raw.time_flow_start,
        time_flow_end: raw.time_flow_end,
        forwarding_status: raw.forwarding_status,
    }
}

/// The service port is the non-ephemeral side of the connection, or 0 when
/// both ports are ephemeral.
fn service_port(src_port: u32, dst_port: u32) -> u32 {
    if src_port < EPHEMERAL_PORT_START {
        src_port
    } else if dst_port < EPHEMERAL_PORT_START {
        dst_port
    } else {
        0
    }
}

fn text_attr(attrs: &Attributes, name: &str) -> String {
    match attrs.get(name) {
        Some(AttrValue::Text(s)) => s.clone(),
        Some(AttrValue::Int(v)) => v.to_string(),
        None => String::new(),
    }
}

fn int_attr(attrs: &Attributes, name: &str) -> i64 {
    match attrs.get(name) {
        Some(AttrValue::Int(v)) => *v,
        Some(AttrValue::Text(s)) => s.trim().parse().unwrap_or_else(|_| {
            log::warn!("attribute {name}: '{s}' is not an integer, using 0");
            0
        }),
        None => 0,
    }
}
