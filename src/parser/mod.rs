//! Frame parsing module.
//!
//! This module is responsible for turning raw frame bytes into a packet's
//! layer stack (SRP). It never routes or stores packets.

mod frame_builder;
mod layer_parser;

pub use frame_builder::FrameBuilder;
pub use layer_parser::{parse_layers, LayerParser};

#[cfg(test)]
pub(crate) fn parsed_packet(
    pool: &crate::pool::PacketPool,
    timestamp: std::time::Duration,
    bytes: &[u8],
) -> crate::pool::PooledPacket {
    use crate::domain::{DataOwnership, Frame, LinkType};

    let mut packet = pool.claim();
    let frame = Frame::new(timestamp, bytes);
    let mut ownership = DataOwnership::Borrowed(bytes);
    LayerParser::new()
        .parse(&mut packet, LinkType::ETHERNET, &frame, &mut ownership)
        .unwrap();
    ownership.resolve(&mut packet);
    packet
}
