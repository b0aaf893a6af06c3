//! Synthetic frame construction.
//!
//! Builds well-formed frames for replay through the in-memory backend.
//! Checksums are left at zero; nothing in the dispatch path verifies them.

use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy)]
enum Link {
    Ethernet,
    LinuxSll,
    Loopback,
    RawIp,
}

#[derive(Debug, Clone, Copy)]
enum Network {
    V4 { src: Ipv4Addr, dst: Ipv4Addr },
    V6 { src: Ipv6Addr, dst: Ipv6Addr },
    Arp,
}

#[derive(Debug, Clone, Copy)]
enum Transport {
    Tcp {
        src: u16,
        dst: u16,
        seq: u32,
        flags: u8,
    },
    Udp {
        src: u16,
        dst: u16,
    },
    Other {
        protocol: u8,
    },
}

/// Builder for synthetic link/network/transport frames.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    link: Link,
    vlan: Option<u16>,
    ethertype: Option<u16>,
    network: Option<Network>,
    transport: Option<Transport>,
    payload: Vec<u8>,
}

impl FrameBuilder {
    fn with_link(link: Link) -> Self {
        Self {
            link,
            vlan: None,
            ethertype: None,
            network: None,
            transport: None,
            payload: Vec::new(),
        }
    }

    pub fn ethernet() -> Self {
        Self::with_link(Link::Ethernet)
    }

    pub fn linux_sll() -> Self {
        Self::with_link(Link::LinuxSll)
    }

    pub fn loopback() -> Self {
        Self::with_link(Link::Loopback)
    }

    pub fn raw_ip() -> Self {
        Self::with_link(Link::RawIp)
    }

    /// Insert an 802.1Q tag with the given VLAN id.
    pub fn vlan(mut self, id: u16) -> Self {
        self.vlan = Some(id);
        self
    }

    /// Force the link-layer protocol field.
    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = Some(ethertype);
        self
    }

    pub fn arp(mut self) -> Self {
        self.network = Some(Network::Arp);
        self
    }

    pub fn ipv4(mut self, src: [u8; 4], dst: [u8; 4]) -> Self {
        self.network = Some(Network::V4 {
            src: Ipv4Addr::from(src),
            dst: Ipv4Addr::from(dst),
        });
        self
    }

    pub fn ipv6(mut self, src: [u16; 8], dst: [u16; 8]) -> Self {
        self.network = Some(Network::V6 {
            src: Ipv6Addr::from(src),
            dst: Ipv6Addr::from(dst),
        });
        self
    }

    /// TCP header with the given flags byte (e.g. `0x02` SYN, `0x18` PSH|ACK).
    pub fn tcp(mut self, src: u16, dst: u16, seq: u32, flags: u8) -> Self {
        self.transport = Some(Transport::Tcp {
            src,
            dst,
            seq,
            flags,
        });
        self
    }

    pub fn udp(mut self, src: u16, dst: u16) -> Self {
        self.transport = Some(Transport::Udp { src, dst });
        self
    }

    pub fn icmp(mut self, message: &[u8]) -> Self {
        self.transport = Some(Transport::Other { protocol: 1 });
        self.payload = message.to_vec();
        self
    }

    /// Arbitrary IP payload with the given protocol number.
    pub fn ip_payload(mut self, protocol: u8, payload: &[u8]) -> Self {
        self.transport = Some(Transport::Other { protocol });
        self.payload = payload.to_vec();
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let (protocol, segment) = self.build_transport();
        let (ethertype, datagram) = self.build_network(protocol, segment);
        let ethertype = self.ethertype.or(ethertype).unwrap_or(0);

        let mut frame = Vec::with_capacity(datagram.len() + 32);
        match self.link {
            Link::Ethernet => {
                frame.extend_from_slice(&[0xff; 6]);
                frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
                if let Some(id) = self.vlan {
                    frame.extend_from_slice(&0x8100u16.to_be_bytes());
                    frame.extend_from_slice(&(id & 0x0fff).to_be_bytes());
                }
                frame.extend_from_slice(&ethertype.to_be_bytes());
            }
            Link::LinuxSll => {
                frame.extend_from_slice(&0u16.to_be_bytes()); // to us
                frame.extend_from_slice(&1u16.to_be_bytes()); // ARPHRD_ETHER
                frame.extend_from_slice(&6u16.to_be_bytes());
                frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]);
                frame.extend_from_slice(&ethertype.to_be_bytes());
            }
            Link::Loopback => {
                let family: u32 = match self.network {
                    Some(Network::V6 { .. }) => 30,
                    _ => 2,
                };
                frame.extend_from_slice(&family.to_le_bytes());
            }
            Link::RawIp => {}
        }
        frame.extend_from_slice(&datagram);
        frame
    }

    fn build_transport(&self) -> (Option<u8>, Vec<u8>) {
        let mut segment = Vec::new();
        let protocol = match self.transport {
            Some(Transport::Tcp {
                src,
                dst,
                seq,
                flags,
            }) => {
                segment.extend_from_slice(&src.to_be_bytes());
                segment.extend_from_slice(&dst.to_be_bytes());
                segment.extend_from_slice(&seq.to_be_bytes());
                segment.extend_from_slice(&0u32.to_be_bytes()); // ack
                segment.push(5 << 4);
                segment.push(flags);
                segment.extend_from_slice(&0xffffu16.to_be_bytes()); // window
                segment.extend_from_slice(&[0, 0, 0, 0]); // checksum, urgent
                Some(6)
            }
            Some(Transport::Udp { src, dst }) => {
                let length = (8 + self.payload.len()) as u16;
                segment.extend_from_slice(&src.to_be_bytes());
                segment.extend_from_slice(&dst.to_be_bytes());
                segment.extend_from_slice(&length.to_be_bytes());
                segment.extend_from_slice(&[0, 0]);
                Some(17)
            }
            Some(Transport::Other { protocol }) => Some(protocol),
            None => None,
        };
        segment.extend_from_slice(&self.payload);
        (protocol, segment)
    }

    fn build_network(&self, protocol: Option<u8>, segment: Vec<u8>) -> (Option<u16>, Vec<u8>) {
        match self.network {
            Some(Network::V4 { src, dst }) => {
                let total = (20 + segment.len()) as u16;
                let mut datagram = vec![0x45, 0];
                datagram.extend_from_slice(&total.to_be_bytes());
                datagram.extend_from_slice(&[0, 0, 0x40, 0]); // id, DF
                datagram.push(64);
                datagram.push(protocol.unwrap_or(0xff));
                datagram.extend_from_slice(&[0, 0]);
                datagram.extend_from_slice(&src.octets());
                datagram.extend_from_slice(&dst.octets());
                datagram.extend_from_slice(&segment);
                (Some(0x0800), datagram)
            }
            Some(Network::V6 { src, dst }) => {
                let mut datagram = vec![0x60, 0, 0, 0];
                datagram.extend_from_slice(&(segment.len() as u16).to_be_bytes());
                datagram.push(protocol.unwrap_or(59)); // no next header
                datagram.push(64);
                datagram.extend_from_slice(&src.octets());
                datagram.extend_from_slice(&dst.octets());
                datagram.extend_from_slice(&segment);
                (Some(0x86dd), datagram)
            }
            Some(Network::Arp) => {
                let mut arp = vec![0, 1, 0x08, 0x00, 6, 4, 0, 1];
                arp.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
                arp.extend_from_slice(&[10, 0, 0, 1]);
                arp.extend_from_slice(&[0; 6]);
                arp.extend_from_slice(&[10, 0, 0, 2]);
                (Some(0x0806), arp)
            }
            None => (None, segment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ethernet_ipv4_udp_lengths() {
        let frame = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .udp(1000, 53)
            .payload(&[0xab; 10])
            .build();

        assert_eq!(frame.len(), 14 + 20 + 8 + 10);
        assert_eq!(&frame[12..14], &[0x08, 0x00]);
        assert_eq!(u16::from_be_bytes([frame[16], frame[17]]), 38);
        assert_eq!(u16::from_be_bytes([frame[38], frame[39]]), 18);
    }

    #[test]
    fn test_arp_frame() {
        let frame = FrameBuilder::ethernet().arp().build();
        assert_eq!(frame.len(), 14 + 28);
        assert_eq!(&frame[12..14], &[0x08, 0x06]);
    }

    #[test]
    fn test_vlan_tag_inserted() {
        let frame = FrameBuilder::ethernet().vlan(7).arp().build();
        assert_eq!(&frame[12..14], &[0x81, 0x00]);
        assert_eq!(&frame[16..18], &[0x08, 0x06]);
    }
}
