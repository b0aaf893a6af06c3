//! Layer stack parser.
//!
//! Walks a frame from the link layer inwards and records one [`Layer`]
//! per recognized header. Header fields are read through pnet packet
//! views; lengths are validated here so a broken frame never panics.

use pnet::packet::arp::ArpPacket;
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::vlan::VlanPacket;

use crate::domain::{DataOwnership, Frame, Layer, LayerType, LinkType, Packet};
use crate::error::ParseError;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_HEADER_LEN: usize = 4;
const LINUX_SLL_HEADER_LEN: usize = 16;
const LOOPBACK_HEADER_LEN: usize = 4;
const ARP_MIN_LEN: usize = 28;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_MIN_LEN: usize = 4;

/// 802.1ad service tag
const ETHERTYPE_QINQ: u16 = 0x88a8;

/// IPv6 extension headers that are skipped inside the IPv6 layer
mod ipv6_ext {
    pub const HOP_BY_HOP: u8 = 0;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const DESTINATION: u8 = 60;
    pub const NO_NEXT_HEADER: u8 = 59;
}

/// BSD loopback address families carried in DLT_NULL headers
mod loopback_family {
    pub const INET: u32 = 2;
    pub const INET6_BSD: u32 = 24;
    pub const INET6_FREEBSD: u32 = 28;
    pub const INET6_DARWIN: u32 = 30;
}

/// What to parse next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Ethernet,
    Vlan,
    LinuxSll,
    Loopback,
    Ip,
    Arp,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Data,
    Done,
}

/// Parser for frames into layer stacks.
///
/// Stateless apart from its configuration, so one parser serves the whole
/// capture.
#[derive(Debug, Clone, Default)]
pub struct LayerParser {
    /// Copy frame bytes into the packet before parsing
    eager_copy: bool,
}

impl LayerParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every frame into packet-owned storage before parsing, instead
    /// of leaving the copy to the dispatcher.
    pub fn with_eager_copy(mut self, eager_copy: bool) -> Self {
        self.eager_copy = eager_copy;
        self
    }

    /// Parse `frame` into `packet`.
    ///
    /// On error the packet keeps the layers parsed so far. `ownership` may
    /// be resolved to `Owned` if the parser copies the bytes itself.
    pub fn parse<'f>(
        &self,
        packet: &mut Packet,
        link_type: LinkType,
        frame: &Frame<'f>,
        ownership: &mut DataOwnership<'f>,
    ) -> Result<(), ParseError> {
        packet.begin(link_type, frame);

        if self.eager_copy {
            ownership.resolve(packet);
        }

        let (bytes, layers) = ownership.view(packet);
        parse_layers(link_type, bytes, layers)
    }
}

/// Parse `bytes` as a frame of `link_type`, appending to `layers`.
pub fn parse_layers(
    link_type: LinkType,
    bytes: &[u8],
    layers: &mut Vec<Layer>,
) -> Result<(), ParseError> {
    let mut step = match link_type {
        LinkType::ETHERNET => Step::Ethernet,
        LinkType::LINUX_SLL => Step::LinuxSll,
        LinkType::NULL => Step::Loopback,
        lt if lt.is_raw_ip() => Step::Ip,
        LinkType(other) => {
            return Err(ParseError::UnrecognizedLayer {
                what: "link type",
                value: other as u32,
            })
        }
    };

    let mut offset = 0;
    let mut end = bytes.len();

    loop {
        if step == Step::Done {
            return Ok(());
        }
        if offset >= end {
            // A header was announced but the frame ends before it.
            return match expected_header(step) {
                Some((layer, needed)) => Err(truncated(layer, needed, 0)),
                None => Ok(()),
            };
        }
        let data = &bytes[offset..end];

        step = match step {
            Step::Ethernet => {
                let ethernet = EthernetPacket::new(data)
                    .ok_or_else(|| truncated(LayerType::Ethernet, ETHERNET_HEADER_LEN, data.len()))?;
                layers.push(Layer::new(LayerType::Ethernet, offset, data.len()));
                offset += ETHERNET_HEADER_LEN;
                ethertype_step(ethernet.get_ethertype())?
            }

            Step::Vlan => {
                let vlan = VlanPacket::new(data)
                    .ok_or_else(|| truncated(LayerType::Vlan, VLAN_HEADER_LEN, data.len()))?;
                layers.push(Layer::new(LayerType::Vlan, offset, data.len()));
                offset += VLAN_HEADER_LEN;
                ethertype_step(vlan.get_ethertype())?
            }

            Step::LinuxSll => {
                if data.len() < LINUX_SLL_HEADER_LEN {
                    return Err(truncated(LayerType::LinuxSll, LINUX_SLL_HEADER_LEN, data.len()));
                }
                layers.push(Layer::new(LayerType::LinuxSll, offset, data.len()));
                offset += LINUX_SLL_HEADER_LEN;
                let protocol = u16::from_be_bytes([data[14], data[15]]);
                ethertype_step(EtherType(protocol))?
            }

            Step::Loopback => {
                if data.len() < LOOPBACK_HEADER_LEN {
                    return Err(truncated(LayerType::Loopback, LOOPBACK_HEADER_LEN, data.len()));
                }
                layers.push(Layer::new(LayerType::Loopback, offset, data.len()));
                offset += LOOPBACK_HEADER_LEN;
                // The family is written in the capturing host's byte order.
                let raw = [data[0], data[1], data[2], data[3]];
                loopback_step(u32::from_le_bytes(raw))
                    .or_else(|_| loopback_step(u32::from_be_bytes(raw)))?
            }

            Step::Ip => match data[0] >> 4 {
                4 => Step::Ipv4,
                6 => Step::Ipv6,
                version => {
                    return Err(ParseError::UnrecognizedLayer {
                        what: "ip version",
                        value: u32::from(version),
                    })
                }
            },

            Step::Arp => {
                if ArpPacket::new(data).is_none() {
                    return Err(truncated(LayerType::Arp, ARP_MIN_LEN, data.len()));
                }
                layers.push(Layer::new(LayerType::Arp, offset, data.len()));
                Step::Done
            }

            Step::Ipv4 => {
                let ip = Ipv4Packet::new(data)
                    .ok_or_else(|| truncated(LayerType::Ipv4, IPV4_MIN_HEADER_LEN, data.len()))?;
                if ip.get_version() != 4 {
                    return Err(malformed(
                        LayerType::Ipv4,
                        format!("version {} in IPv4 header", ip.get_version()),
                    ));
                }
                let header_len = usize::from(ip.get_header_length()) * 4;
                if header_len < IPV4_MIN_HEADER_LEN {
                    return Err(malformed(
                        LayerType::Ipv4,
                        format!("header length {} below minimum", header_len),
                    ));
                }
                if header_len > data.len() {
                    return Err(truncated(LayerType::Ipv4, header_len, data.len()));
                }
                let total_len = usize::from(ip.get_total_length());
                if total_len < header_len {
                    return Err(malformed(
                        LayerType::Ipv4,
                        format!("total length {} shorter than header", total_len),
                    ));
                }

                // Trailing link padding is not part of the datagram; a snap
                // length cut keeps whatever was captured.
                end = offset + total_len.min(data.len());
                layers.push(Layer::new(LayerType::Ipv4, offset, end - offset));
                offset += header_len;

                if ip.get_fragment_offset() != 0 {
                    Step::Data
                } else {
                    protocol_step(ip.get_next_level_protocol())?
                }
            }

            Step::Ipv6 => {
                let ip = Ipv6Packet::new(data)
                    .ok_or_else(|| truncated(LayerType::Ipv6, IPV6_HEADER_LEN, data.len()))?;
                if ip.get_version() != 6 {
                    return Err(malformed(
                        LayerType::Ipv6,
                        format!("version {} in IPv6 header", ip.get_version()),
                    ));
                }
                let payload_len = usize::from(ip.get_payload_length());
                end = offset + (IPV6_HEADER_LEN + payload_len).min(data.len());
                layers.push(Layer::new(LayerType::Ipv6, offset, end - offset));
                offset += IPV6_HEADER_LEN;

                let (next, fragmented) = skip_ipv6_extensions(bytes, &mut offset, end, ip.get_next_header())?;
                if fragmented {
                    Step::Data
                } else if next.0 == ipv6_ext::NO_NEXT_HEADER {
                    Step::Done
                } else {
                    protocol_step(next)?
                }
            }

            Step::Tcp => {
                let tcp = TcpPacket::new(data)
                    .ok_or_else(|| truncated(LayerType::Tcp, TCP_MIN_HEADER_LEN, data.len()))?;
                let header_len = usize::from(tcp.get_data_offset()) * 4;
                if header_len < TCP_MIN_HEADER_LEN {
                    return Err(malformed(
                        LayerType::Tcp,
                        format!("data offset {} below minimum", header_len),
                    ));
                }
                if header_len > data.len() {
                    return Err(truncated(LayerType::Tcp, header_len, data.len()));
                }
                layers.push(Layer::new(LayerType::Tcp, offset, data.len()));
                offset += header_len;
                Step::Data
            }

            Step::Udp => {
                let udp = UdpPacket::new(data)
                    .ok_or_else(|| truncated(LayerType::Udp, UDP_HEADER_LEN, data.len()))?;
                let length = usize::from(udp.get_length());
                if length < UDP_HEADER_LEN {
                    return Err(malformed(
                        LayerType::Udp,
                        format!("length {} shorter than header", length),
                    ));
                }
                end = offset + length.min(data.len());
                layers.push(Layer::new(LayerType::Udp, offset, end - offset));
                offset += UDP_HEADER_LEN;
                Step::Data
            }

            Step::Icmp | Step::Icmpv6 => {
                let layer_type = if step == Step::Icmp {
                    LayerType::Icmp
                } else {
                    LayerType::Icmpv6
                };
                if data.len() < ICMP_MIN_LEN {
                    return Err(truncated(layer_type, ICMP_MIN_LEN, data.len()));
                }
                layers.push(Layer::new(layer_type, offset, data.len()));
                Step::Done
            }

            Step::Data => {
                layers.push(Layer::new(LayerType::Data, offset, data.len()));
                Step::Done
            }

            Step::Done => Step::Done,
        };
    }
}

fn ethertype_step(ethertype: EtherType) -> Result<Step, ParseError> {
    if ethertype == EtherTypes::Ipv4 {
        Ok(Step::Ipv4)
    } else if ethertype == EtherTypes::Ipv6 {
        Ok(Step::Ipv6)
    } else if ethertype == EtherTypes::Arp {
        Ok(Step::Arp)
    } else if ethertype == EtherTypes::Vlan || ethertype.0 == ETHERTYPE_QINQ {
        Ok(Step::Vlan)
    } else {
        Err(ParseError::UnrecognizedLayer {
            what: "ethertype",
            value: u32::from(ethertype.0),
        })
    }
}

/// Layer and minimum length still owed when the frame ends before `step`.
fn expected_header(step: Step) -> Option<(LayerType, usize)> {
    match step {
        Step::Ethernet => Some((LayerType::Ethernet, ETHERNET_HEADER_LEN)),
        Step::Vlan => Some((LayerType::Vlan, VLAN_HEADER_LEN)),
        Step::LinuxSll => Some((LayerType::LinuxSll, LINUX_SLL_HEADER_LEN)),
        Step::Loopback => Some((LayerType::Loopback, LOOPBACK_HEADER_LEN)),
        Step::Arp => Some((LayerType::Arp, ARP_MIN_LEN)),
        Step::Ip | Step::Ipv4 => Some((LayerType::Ipv4, IPV4_MIN_HEADER_LEN)),
        Step::Ipv6 => Some((LayerType::Ipv6, IPV6_HEADER_LEN)),
        Step::Tcp => Some((LayerType::Tcp, TCP_MIN_HEADER_LEN)),
        Step::Udp => Some((LayerType::Udp, UDP_HEADER_LEN)),
        Step::Icmp => Some((LayerType::Icmp, ICMP_MIN_LEN)),
        Step::Icmpv6 => Some((LayerType::Icmpv6, ICMP_MIN_LEN)),
        Step::Data | Step::Done => None,
    }
}

fn loopback_step(family: u32) -> Result<Step, ParseError> {
    match family {
        loopback_family::INET => Ok(Step::Ipv4),
        loopback_family::INET6_BSD
        | loopback_family::INET6_FREEBSD
        | loopback_family::INET6_DARWIN => Ok(Step::Ipv6),
        other => Err(ParseError::UnrecognizedLayer {
            what: "loopback family",
            value: other,
        }),
    }
}

fn protocol_step(protocol: IpNextHeaderProtocol) -> Result<Step, ParseError> {
    if protocol == IpNextHeaderProtocols::Tcp {
        Ok(Step::Tcp)
    } else if protocol == IpNextHeaderProtocols::Udp {
        Ok(Step::Udp)
    } else if protocol == IpNextHeaderProtocols::Icmp {
        Ok(Step::Icmp)
    } else if protocol == IpNextHeaderProtocols::Icmpv6 {
        Ok(Step::Icmpv6)
    } else {
        Err(ParseError::UnrecognizedLayer {
            what: "ip protocol",
            value: u32::from(protocol.0),
        })
    }
}

/// Advance `offset` past IPv6 extension headers.
///
/// Returns the upper-layer protocol and whether the datagram is a
/// non-initial fragment.
fn skip_ipv6_extensions(
    bytes: &[u8],
    offset: &mut usize,
    end: usize,
    mut next: IpNextHeaderProtocol,
) -> Result<(IpNextHeaderProtocol, bool), ParseError> {
    loop {
        let remaining = end.saturating_sub(*offset);
        match next.0 {
            ipv6_ext::HOP_BY_HOP | ipv6_ext::ROUTING | ipv6_ext::DESTINATION => {
                if remaining < 2 {
                    return Err(truncated(LayerType::Ipv6, 2, remaining));
                }
                let header = &bytes[*offset..end];
                let len = (usize::from(header[1]) + 1) * 8;
                if len > remaining {
                    return Err(truncated(LayerType::Ipv6, len, remaining));
                }
                next = IpNextHeaderProtocol(header[0]);
                *offset += len;
            }
            ipv6_ext::FRAGMENT => {
                if remaining < 8 {
                    return Err(truncated(LayerType::Ipv6, 8, remaining));
                }
                let header = &bytes[*offset..end];
                let fragment_offset = u16::from_be_bytes([header[2], header[3]]) >> 3;
                next = IpNextHeaderProtocol(header[0]);
                *offset += 8;
                if fragment_offset != 0 {
                    return Ok((next, true));
                }
            }
            _ => return Ok((next, false)),
        }
    }
}

fn truncated(layer: LayerType, needed: usize, available: usize) -> ParseError {
    ParseError::Truncated {
        layer,
        needed,
        available,
    }
}

fn malformed(layer: LayerType, message: String) -> ParseError {
    ParseError::Malformed { layer, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FrameBuilder;
    use std::time::Duration;

    fn layer_types(link_type: LinkType, bytes: &[u8]) -> Result<Vec<LayerType>, ParseError> {
        let mut layers = Vec::new();
        parse_layers(link_type, bytes, &mut layers)?;
        Ok(layers.iter().map(|l| l.layer_type()).collect())
    }

    #[test]
    fn test_ethernet_arp() {
        let frame = FrameBuilder::ethernet().arp().build();
        assert_eq!(
            layer_types(LinkType::ETHERNET, &frame).unwrap(),
            vec![LayerType::Ethernet, LayerType::Arp]
        );
    }

    #[test]
    fn test_ethernet_ipv4_tcp_payload() {
        let frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .tcp(40000, 80, 1000, 0x18)
            .payload(b"GET / HTTP/1.1\r\n\r\n")
            .build();

        let mut layers = Vec::new();
        parse_layers(LinkType::ETHERNET, &frame, &mut layers).unwrap();

        let types: Vec<_> = layers.iter().map(|l| l.layer_type()).collect();
        assert_eq!(
            types,
            vec![LayerType::Ethernet, LayerType::Ipv4, LayerType::Tcp, LayerType::Data]
        );
        let data = layers.last().unwrap();
        assert_eq!(data.offset(), 14 + 20 + 20);
        assert_eq!(data.len(), 18);
    }

    #[test]
    fn test_tcp_without_payload_is_top_layer() {
        let frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .tcp(40000, 80, 1000, 0x10)
            .build();
        assert_eq!(
            layer_types(LinkType::ETHERNET, &frame).unwrap(),
            vec![LayerType::Ethernet, LayerType::Ipv4, LayerType::Tcp]
        );
    }

    #[test]
    fn test_ethernet_padding_excluded_from_ip() {
        let mut frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .tcp(1, 2, 0, 0x10)
            .build();
        frame.extend_from_slice(&[0u8; 6]);

        let mut layers = Vec::new();
        parse_layers(LinkType::ETHERNET, &frame, &mut layers).unwrap();

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[1].len(), 40);
    }

    #[test]
    fn test_vlan_tagged_udp() {
        let frame = FrameBuilder::ethernet()
            .vlan(42)
            .ipv4([192, 168, 1, 1], [192, 168, 1, 2])
            .udp(5353, 53)
            .payload(&[1, 2, 3, 4])
            .build();
        assert_eq!(
            layer_types(LinkType::ETHERNET, &frame).unwrap(),
            vec![
                LayerType::Ethernet,
                LayerType::Vlan,
                LayerType::Ipv4,
                LayerType::Udp,
                LayerType::Data
            ]
        );
    }

    #[test]
    fn test_linux_sll_ipv6_udp() {
        let frame = FrameBuilder::linux_sll()
            .ipv6([0xfe80, 0, 0, 0, 0, 0, 0, 1], [0xfe80, 0, 0, 0, 0, 0, 0, 2])
            .udp(546, 547)
            .payload(&[0u8; 12])
            .build();
        assert_eq!(
            layer_types(LinkType::LINUX_SLL, &frame).unwrap(),
            vec![LayerType::LinuxSll, LayerType::Ipv6, LayerType::Udp, LayerType::Data]
        );
    }

    #[test]
    fn test_raw_ip_and_loopback() {
        let raw = FrameBuilder::raw_ip()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .icmp(&[8, 0, 0, 0, 0, 1, 0, 1])
            .build();
        assert_eq!(
            layer_types(LinkType::RAW, &raw).unwrap(),
            vec![LayerType::Ipv4, LayerType::Icmp]
        );

        let null = FrameBuilder::loopback()
            .ipv4([127, 0, 0, 1], [127, 0, 0, 1])
            .udp(1000, 2000)
            .build();
        assert_eq!(
            layer_types(LinkType::NULL, &null).unwrap(),
            vec![LayerType::Loopback, LayerType::Ipv4, LayerType::Udp]
        );
    }

    #[test]
    fn test_frame_ending_before_announced_header_is_truncated() {
        let frame = FrameBuilder::ethernet().ethertype(0x0800).build();
        let mut layers = Vec::new();
        let err = parse_layers(LinkType::ETHERNET, &frame, &mut layers).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Truncated {
                layer: LayerType::Ipv4,
                needed: 20,
                available: 0
            }
        ));
        assert_eq!(layers.len(), 1);

        // IPv4 says TCP follows, but the datagram is header only.
        let frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .ip_payload(6, &[])
            .build();
        let err = layer_types(LinkType::ETHERNET, &frame).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Truncated {
                layer: LayerType::Tcp,
                needed: 20,
                available: 0
            }
        ));
    }

    #[test]
    fn test_ipv6_without_next_header_is_complete() {
        let frame = FrameBuilder::raw_ip()
            .ipv6([0xfe80, 0, 0, 0, 0, 0, 0, 1], [0xfe80, 0, 0, 0, 0, 0, 0, 2])
            .build();
        assert_eq!(layer_types(LinkType::RAW, &frame).unwrap(), vec![LayerType::Ipv6]);
    }

    #[test]
    fn test_unknown_ethertype_is_unrecognized() {
        let frame = FrameBuilder::ethernet()
            .ethertype(0x88cc)
            .payload(&[0u8; 20])
            .build();
        let err = layer_types(LinkType::ETHERNET, &frame).unwrap_err();
        assert!(err.is_unrecognized());
        assert_eq!(err.to_string(), "Unrecognized ethertype 0x88cc");
    }

    #[test]
    fn test_unknown_ip_protocol_is_unrecognized() {
        let frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .ip_payload(47, &[0u8; 8])
            .build();
        assert!(layer_types(LinkType::ETHERNET, &frame)
            .unwrap_err()
            .is_unrecognized());
    }

    #[test]
    fn test_unknown_link_type_is_unrecognized() {
        assert!(layer_types(LinkType(147), &[0u8; 10])
            .unwrap_err()
            .is_unrecognized());
    }

    #[test]
    fn test_truncated_tcp_header() {
        let mut frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .tcp(1, 2, 0, 0x02)
            .build();
        frame.truncate(14 + 20 + 10);

        let err = layer_types(LinkType::ETHERNET, &frame).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Truncated {
                layer: LayerType::Tcp,
                needed: 20,
                available: 10
            }
        ));
    }

    #[test]
    fn test_bad_ipv4_header_length_is_malformed() {
        let mut frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .udp(1, 2)
            .build();
        frame[14] = 0x43;

        let err = layer_types(LinkType::ETHERNET, &frame).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { layer: LayerType::Ipv4, .. }));
    }

    #[test]
    fn test_partial_layers_kept_on_error() {
        let mut frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .udp(1, 2)
            .build();
        frame.truncate(14 + 20 + 4);

        let mut layers = Vec::new();
        assert!(parse_layers(LinkType::ETHERNET, &frame, &mut layers).is_err());
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn test_parser_leaves_data_borrowed_by_default() {
        let bytes = FrameBuilder::ethernet().arp().build();
        let frame = Frame::new(Duration::from_secs(3), &bytes);
        let mut packet = Packet::new();
        let mut ownership = DataOwnership::Borrowed(frame.data);

        LayerParser::new()
            .parse(&mut packet, LinkType::ETHERNET, &frame, &mut ownership)
            .unwrap();

        assert!(ownership.is_borrowed());
        assert!(!packet.is_owned());
        assert_eq!(packet.layer_count(), 2);
        assert_eq!(packet.timestamp(), Duration::from_secs(3));
    }

    #[test]
    fn test_eager_copy_resolves_ownership() {
        let bytes = FrameBuilder::ethernet().arp().build();
        let frame = Frame::new(Duration::ZERO, &bytes);
        let mut packet = Packet::new();
        let mut ownership = DataOwnership::Borrowed(frame.data);

        LayerParser::new()
            .with_eager_copy(true)
            .parse(&mut packet, LinkType::ETHERNET, &frame, &mut ownership)
            .unwrap();

        assert!(!ownership.is_borrowed());
        assert!(packet.is_owned());
        assert_eq!(packet.data(), bytes.as_slice());
        assert_eq!(packet.layer_count(), 2);
    }
}
