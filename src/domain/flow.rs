//! Bidirectional transport flow identification.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;

use super::layer::LayerType;
use super::packet::Packet;

/// One side of a transport conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            IpAddr::V4(addr) => write!(f, "{}:{}", addr, self.port),
            IpAddr::V6(addr) => write!(f, "[{}]:{}", addr, self.port),
        }
    }
}

/// Which way a packet travels relative to the canonical flow key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the lower endpoint to the upper endpoint
    Forward,
    /// From the upper endpoint to the lower endpoint
    Reverse,
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

/// Canonical key of a bidirectional TCP or UDP flow.
///
/// Both directions of a conversation map to the same key; the endpoints
/// are stored in sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub transport: FlowTransport,
    pub lower: Endpoint,
    pub upper: Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowTransport {
    Tcp,
    Udp,
}

impl FlowKey {
    /// Build the key for a packet's innermost TCP or UDP layer.
    ///
    /// Returns `None` if the packet has no such layer, no IP layer, or its
    /// bytes have not been copied yet.
    pub fn from_packet(packet: &Packet) -> Option<(FlowKey, Direction)> {
        let (index, transport_layer) = packet
            .layers()
            .iter()
            .enumerate()
            .rev()
            .find(|(_, layer)| matches!(layer.layer_type(), LayerType::Tcp | LayerType::Udp))?;
        let network_layer = packet.layers()[..index]
            .iter()
            .rev()
            .find(|layer| layer.layer_type().is_network())?;

        let (src_addr, dst_addr) = ip_addresses(
            network_layer.layer_type(),
            packet.layer_data(network_layer),
        )?;

        let transport_bytes = packet.layer_data(transport_layer);
        let (transport, src_port, dst_port) = match transport_layer.layer_type() {
            LayerType::Tcp => {
                let tcp = TcpPacket::new(transport_bytes)?;
                (FlowTransport::Tcp, tcp.get_source(), tcp.get_destination())
            }
            _ => {
                let udp = UdpPacket::new(transport_bytes)?;
                (FlowTransport::Udp, udp.get_source(), udp.get_destination())
            }
        };

        let src = Endpoint {
            addr: src_addr,
            port: src_port,
        };
        let dst = Endpoint {
            addr: dst_addr,
            port: dst_port,
        };

        Some(FlowKey::new(transport, src, dst))
    }

    /// Canonical key for a packet travelling from `src` to `dst`.
    pub fn new(transport: FlowTransport, src: Endpoint, dst: Endpoint) -> (FlowKey, Direction) {
        if src <= dst {
            (
                FlowKey {
                    transport,
                    lower: src,
                    upper: dst,
                },
                Direction::Forward,
            )
        } else {
            (
                FlowKey {
                    transport,
                    lower: dst,
                    upper: src,
                },
                Direction::Reverse,
            )
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.transport {
            FlowTransport::Tcp => "tcp",
            FlowTransport::Udp => "udp",
        };
        write!(f, "{} {} <-> {}", proto, self.lower, self.upper)
    }
}

fn ip_addresses(layer_type: LayerType, bytes: &[u8]) -> Option<(IpAddr, IpAddr)> {
    match layer_type {
        LayerType::Ipv4 => {
            let ip = Ipv4Packet::new(bytes)?;
            let src: Ipv4Addr = ip.get_source();
            let dst: Ipv4Addr = ip.get_destination();
            Some((IpAddr::V4(src), IpAddr::V4(dst)))
        }
        LayerType::Ipv6 => {
            let ip = Ipv6Packet::new(bytes)?;
            let src: Ipv6Addr = ip.get_source();
            let dst: Ipv6Addr = ip.get_destination();
            Some((IpAddr::V6(src), IpAddr::V6(dst)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(last_octet: u8, port: u16) -> Endpoint {
        Endpoint {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)),
            port,
        }
    }

    #[test]
    fn test_both_directions_share_key() {
        let a = endpoint(1, 40000);
        let b = endpoint(2, 80);

        let (forward, dir_ab) = FlowKey::new(FlowTransport::Tcp, a, b);
        let (reverse, dir_ba) = FlowKey::new(FlowTransport::Tcp, b, a);

        assert_eq!(forward, reverse);
        assert_ne!(dir_ab, dir_ba);
    }

    #[test]
    fn test_transport_distinguishes_keys() {
        let a = endpoint(1, 53);
        let b = endpoint(2, 53);

        let (tcp, _) = FlowKey::new(FlowTransport::Tcp, a, b);
        let (udp, _) = FlowKey::new(FlowTransport::Udp, a, b);

        assert_ne!(tcp, udp);
    }

    #[test]
    fn test_display() {
        let (key, _) = FlowKey::new(FlowTransport::Udp, endpoint(9, 5353), endpoint(1, 53));
        assert_eq!(key.to_string(), "udp 10.0.0.1:53 <-> 10.0.0.9:5353");
    }
}
