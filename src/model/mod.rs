pub mod aggregate;
pub mod fields;
pub mod flow;

use std::net::IpAddr;

/// Direction of a flow relative to the observation point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlowDirection {
    Ingress,
    Egress,
    Unknown(u32),
}

impl From<u32> for FlowDirection {
    fn from(raw: u32) -> Self {
        match raw {
            0 => Self::Ingress,
            1 => Self::Egress,
            other => Self::Unknown(other),
        }
    }
}

/// Ethernet type. Compares by its numeric value.
#[derive(Clone, Copy, Debug)]
pub enum Etype {
    Ipv4,
    Arp,
    Ipv6,
    Other(u32),
}

impl From<u32> for Etype {
    fn from(raw: u32) -> Self {
        match raw {
            0x0800 => Self::Ipv4,
            0x0806 => Self::Arp,
            0x86DD => Self::Ipv6,
            other => Self::Other(other),
        }
    }
}

impl Etype {
    pub fn raw(self) -> u32 {
        match self {
            Self::Ipv4 => 0x0800,
            Self::Arp => 0x0806,
            Self::Ipv6 => 0x86DD,
            Self::Other(raw) => raw,
        }
    }
}

/// IP protocol number. Compares by its numeric value.
#[derive(Clone, Copy, Debug)]
pub enum Proto {
    Icmp,
    Tcp,
    Udp,
    Icmpv6,
    Other(u32),
}

impl From<u32> for Proto {
    fn from(raw: u32) -> Self {
        match raw {
            0x01 => Self::Icmp,
            0x06 => Self::Tcp,
            0x11 => Self::Udp,
            0x3A => Self::Icmpv6,
            other => Self::Other(other),
        }
    }
}

impl Proto {
    pub fn raw(self) -> u32 {
        match self {
            Self::Icmp => 0x01,
            Self::Tcp => 0x06,
            Self::Udp => 0x11,
            Self::Icmpv6 => 0x3A,
            Self::Other(raw) => raw,
        }
    }
}

macro_rules! numeric_ordering {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.raw() == other.raw()
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.raw().cmp(&other.raw())
            }
        }

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.raw().hash(state);
            }
        }
    };
}

numeric_ordering!(Etype);
numeric_ordering!(Proto);

/// 48-bit Ethernet address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Build from the low 48 bits of an exporter's 64-bit MAC field.
    pub fn from_u64(raw: u64) -> Self {
        let bytes = raw.to_be_bytes();
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[2..8]);
        Self(mac)
    }
}

impl std::fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ingress => write!(f, "INGRESS"),
            Self::Egress => write!(f, "EGRESS"),
            Self::Unknown(_) => write!(f, "unknown"),
        }
    }
}

impl std::fmt::Display for Etype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Arp => write!(f, "ARP"),
            Self::Ipv6 => write!(f, "IPv6"),
            Self::Other(raw) => write!(f, "0x{raw:x}"),
        }
    }
}

impl std::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Icmp => write!(f, "ICMP"),
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Icmpv6 => write!(f, "ICMPv6"),
            Self::Other(raw) => write!(f, "0x{raw:x}"),
        }
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Value of a single key field, borrowed from a `FlowKey`.
///
/// Values of the same field always share a variant, so the derived ordering
/// is the natural ordering of the field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue<'a> {
    Direction(FlowDirection),
    Etype(Etype),
    Proto(Proto),
    Dec(u64),
    Int(i64),
    Mac(MacAddr),
    Addr(Option<IpAddr>),
    Text(&'a str),
}

impl std::fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direction(d) => write!(f, "{d}"),
            Self::Etype(e) => write!(f, "{e}"),
            Self::Proto(p) => write!(f, "{p}"),
            Self::Dec(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Mac(m) => write!(f, "{m}"),
            Self::Addr(Some(ip)) => write!(f, "{ip}"),
            Self::Addr(None) => write!(f, "<nil>"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}
