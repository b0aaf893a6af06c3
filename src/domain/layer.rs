//! Layer and link-type models.

use std::fmt;

/// Data link type of a capture, using libpcap DLT numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkType(pub i32);

impl LinkType {
    /// BSD loopback encapsulation (DLT_NULL).
    pub const NULL: LinkType = LinkType(0);
    /// Ethernet (DLT_EN10MB).
    pub const ETHERNET: LinkType = LinkType(1);
    /// Raw IP (DLT_RAW as written by most platforms).
    pub const RAW: LinkType = LinkType(101);
    /// Raw IP, OpenBSD numbering.
    pub const RAW_OPENBSD: LinkType = LinkType(14);
    /// Raw IP, legacy BSD numbering.
    pub const RAW_LEGACY: LinkType = LinkType(12);
    /// Linux "cooked" capture (DLT_LINUX_SLL).
    pub const LINUX_SLL: LinkType = LinkType(113);

    /// Whether frames of this link type start directly with an IP header.
    pub fn is_raw_ip(self) -> bool {
        self == Self::RAW || self == Self::RAW_OPENBSD || self == Self::RAW_LEGACY
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NULL => write!(f, "NULL"),
            Self::ETHERNET => write!(f, "EN10MB"),
            Self::LINUX_SLL => write!(f, "LINUX_SLL"),
            lt if lt.is_raw_ip() => write!(f, "RAW"),
            LinkType(other) => write!(f, "DLT {}", other),
        }
    }
}

/// The kind of a parsed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Ethernet,
    LinuxSll,
    Loopback,
    Vlan,
    Arp,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    /// Opaque payload on top of the last recognized header.
    Data,
}

impl LayerType {
    /// Whether this layer carries an IP header.
    pub fn is_network(self) -> bool {
        matches!(self, LayerType::Ipv4 | LayerType::Ipv6)
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ethernet => "ethernet",
            Self::LinuxSll => "sll",
            Self::Loopback => "loopback",
            Self::Vlan => "vlan",
            Self::Arp => "arp",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Icmpv6 => "icmpv6",
            Self::Data => "data",
        };
        f.write_str(name)
    }
}

/// One parsed protocol layer: its kind and the byte range it covers.
///
/// The range includes the layer's header and everything it encapsulates,
/// so `Data` layers cover exactly the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    layer_type: LayerType,
    offset: usize,
    len: usize,
}

impl Layer {
    pub fn new(layer_type: LayerType, offset: usize, len: usize) -> Self {
        Self {
            layer_type,
            offset,
            len,
        }
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
