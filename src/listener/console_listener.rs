//! Console-based packet listener.

use std::io::{self, Write};

use macaddr::MacAddr6;
use pnet::packet::ethernet::EthernetPacket;

use crate::domain::{FlowKey, LayerType, LinkType, Packet};
use crate::listener::PacketListener;
use crate::pool::PooledPacket;

/// Prints one line per packet to stdout.
///
/// Formats packets in a human-readable form suitable for terminal output.
pub struct ConsoleListener {
    /// Whether to show link-layer addresses
    verbose: bool,
    accepted: u64,
    errors: u64,
}

impl ConsoleListener {
    pub fn new() -> Self {
        Self {
            verbose: false,
            accepted: 0,
            errors: 0,
        }
    }

    /// Enable or disable verbose output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Packets accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Error deliveries so far.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    fn format_packet(&self, packet: &Packet) -> String {
        let ts = packet.timestamp();
        let mut output = format!(
            "[{}.{:06}] {} {} bytes",
            ts.as_secs(),
            ts.subsec_micros(),
            packet.summary(),
            packet.wire_len()
        );

        if let Some((flow, _)) = FlowKey::from_packet(packet) {
            output.push_str(&format!(" | {}", flow));
        }

        if self.verbose {
            if let Some((src, dst)) = ethernet_addresses(packet) {
                output.push_str(&format!(" | {} -> {}", src, dst));
            }
        }

        output
    }

    fn write_line(&self, line: &str) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
    }
}

impl Default for ConsoleListener {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketListener for ConsoleListener {
    fn begin_capture(&mut self, source: &str, link_type: LinkType, snap_length: u32) {
        self.write_line(&format!(
            "Reading from {} (link type {}, snapshot length {})",
            source, link_type, snap_length
        ));
    }

    fn accept(&mut self, packet: PooledPacket) {
        self.accepted += 1;
        let line = self.format_packet(&packet);
        self.write_line(&line);
    }

    fn accept_error(&mut self, packet: PooledPacket, error: &str) {
        self.errors += 1;
        let line = format!("{} | ERROR: {}", self.format_packet(&packet), error);
        self.write_line(&line);
    }
}

fn ethernet_addresses(packet: &Packet) -> Option<(MacAddr6, MacAddr6)> {
    let layer = packet.find_layer(LayerType::Ethernet)?;
    let ethernet = EthernetPacket::new(packet.layer_data(layer))?;
    Some((
        MacAddr6::from(ethernet.get_source().octets()),
        MacAddr6::from(ethernet.get_destination().octets()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataOwnership, Frame};
    use crate::parser::{FrameBuilder, LayerParser};
    use crate::pool::PacketPool;
    use std::time::Duration;

    fn parsed(bytes: &[u8]) -> PooledPacket {
        let pool = PacketPool::new();
        let mut packet = pool.claim();
        let frame = Frame::new(Duration::new(1700000000, 250_000), bytes);
        let mut ownership = DataOwnership::Borrowed(bytes);
        LayerParser::new()
            .parse(&mut packet, LinkType::ETHERNET, &frame, &mut ownership)
            .unwrap();
        ownership.resolve(&mut packet);
        packet
    }

    #[test]
    fn test_format_tcp_packet() {
        let bytes = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .tcp(40000, 80, 1, 0x18)
            .payload(b"hello")
            .build();
        let packet = parsed(&bytes);

        let line = ConsoleListener::new().format_packet(&packet);
        assert_eq!(
            line,
            "[1700000000.000250] ethernet/ipv4/tcp/data 59 bytes | tcp 10.0.0.1:40000 <-> 10.0.0.2:80"
        );
    }

    #[test]
    fn test_verbose_shows_mac_addresses() {
        let bytes = FrameBuilder::ethernet().arp().build();
        let packet = parsed(&bytes);

        let line = ConsoleListener::new().with_verbose(true).format_packet(&packet);
        assert!(line.contains("ethernet/arp"));
        assert!(line
            .to_lowercase()
            .contains("02:00:00:00:00:01 -> ff:ff:ff:ff:ff:ff"));
    }

    #[test]
    fn test_counts_deliveries() {
        let bytes = FrameBuilder::ethernet().arp().build();
        let mut listener = ConsoleListener::new();

        listener.accept(parsed(&bytes));
        listener.accept_error(parsed(&bytes), "broken");

        assert_eq!(listener.accepted(), 1);
        assert_eq!(listener.errors(), 1);
    }
}
