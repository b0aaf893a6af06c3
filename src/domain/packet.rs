//! Frame and packet models.

use std::time::Duration;

use super::layer::{Layer, LayerType, LinkType};

/// One raw frame as delivered by a capture backend.
///
/// `data` points into memory owned by the backend and is only valid for
/// the duration of a single dispatch callback.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Capture timestamp, relative to the Unix epoch
    pub timestamp: Duration,
    /// Captured bytes (possibly cut short by the snap length)
    pub data: &'a [u8],
    /// Length of the frame on the wire
    pub wire_len: usize,
}

impl<'a> Frame<'a> {
    /// Create a frame whose wire length equals its captured length.
    pub fn new(timestamp: Duration, data: &'a [u8]) -> Self {
        Self {
            timestamp,
            data,
            wire_len: data.len(),
        }
    }

    /// Set the original wire length.
    pub fn with_wire_len(mut self, wire_len: usize) -> Self {
        self.wire_len = wire_len;
        self
    }
}

/// Reusable storage for one parsed packet.
///
/// Packets are normally obtained from a [`PacketPool`](crate::pool::PacketPool);
/// the byte buffer and layer stack keep their capacity across reuse.
#[derive(Debug, Default)]
pub struct Packet {
    timestamp: Duration,
    link_type: Option<LinkType>,
    wire_len: usize,
    captured_len: usize,
    layers: Vec<Layer>,
    buffer: Vec<u8>,
    owned: bool,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start describing a new frame. Clears layers and data.
    pub(crate) fn begin(&mut self, link_type: LinkType, frame: &Frame<'_>) {
        self.reset();
        self.timestamp = frame.timestamp;
        self.link_type = Some(link_type);
        self.wire_len = frame.wire_len;
        self.captured_len = frame.data.len();
    }

    /// Return to the clean state of a freshly constructed packet.
    pub(crate) fn reset(&mut self) {
        self.timestamp = Duration::ZERO;
        self.link_type = None;
        self.wire_len = 0;
        self.captured_len = 0;
        self.layers.clear();
        self.buffer.clear();
        self.owned = false;
    }

    /// Copy frame bytes into the packet's own buffer.
    pub(crate) fn copy_data(&mut self, bytes: &[u8]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(bytes);
        self.owned = true;
    }

    pub(crate) fn layers_mut(&mut self) -> &mut Vec<Layer> {
        &mut self.layers
    }

    /// Owned bytes and layer stack, borrowed disjointly.
    pub(crate) fn split_mut(&mut self) -> (&[u8], &mut Vec<Layer>) {
        (self.buffer.as_slice(), &mut self.layers)
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn link_type(&self) -> Option<LinkType> {
        self.link_type
    }

    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    pub fn captured_len(&self) -> usize {
        self.captured_len
    }

    /// Whether the packet's bytes have been copied into its own buffer.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// The packet bytes. Empty until the data has been copied.
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layer by position. Negative indices count from the top, so `-1` is
    /// the innermost parsed layer and `-2` the one beneath it.
    pub fn layer(&self, index: isize) -> Option<&Layer> {
        let index = if index < 0 {
            self.layers.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.layers.get(index)
    }

    /// The innermost layer of the given type.
    pub fn find_layer(&self, layer_type: LayerType) -> Option<&Layer> {
        self.layers
            .iter()
            .rev()
            .find(|layer| layer.layer_type() == layer_type)
    }

    /// Bytes covered by a layer, or an empty slice if not available.
    pub fn layer_data(&self, layer: &Layer) -> &[u8] {
        self.buffer
            .get(layer.offset()..layer.offset() + layer.len())
            .unwrap_or(&[])
    }

    /// Layer stack as `ethernet/ipv4/tcp/data`.
    pub fn summary(&self) -> String {
        self.layers
            .iter()
            .map(|layer| layer.layer_type().to_string())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Who owns the bytes of a packet during one dispatch callback.
///
/// A packet starts out `Borrowed`, viewing the backend's frame buffer. The
/// lifetime prevents the view from escaping the callback; anything that
/// keeps the packet must first [`resolve`](DataOwnership::resolve) it.
#[derive(Debug, Clone, Copy)]
pub enum DataOwnership<'frame> {
    Borrowed(&'frame [u8]),
    Owned,
}

impl<'frame> DataOwnership<'frame> {
    pub fn is_borrowed(&self) -> bool {
        matches!(self, DataOwnership::Borrowed(_))
    }

    /// Copy borrowed bytes into the packet. Returns `true` if a copy was made.
    pub fn resolve(&mut self, packet: &mut Packet) -> bool {
        match *self {
            DataOwnership::Borrowed(bytes) => {
                packet.copy_data(bytes);
                *self = DataOwnership::Owned;
                true
            }
            DataOwnership::Owned => false,
        }
    }

    /// Current bytes together with the packet's layer stack.
    pub(crate) fn view<'a>(&'a self, packet: &'a mut Packet) -> (&'a [u8], &'a mut Vec<Layer>) {
        match self {
            DataOwnership::Borrowed(bytes) => (*bytes, packet.layers_mut()),
            DataOwnership::Owned => packet.split_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with_layers(types: &[LayerType]) -> Packet {
        let mut packet = Packet::new();
        let frame = Frame::new(Duration::from_secs(5), &[0u8; 64]);
        packet.begin(LinkType::ETHERNET, &frame);
        for (i, layer_type) in types.iter().enumerate() {
            packet.layers_mut().push(Layer::new(*layer_type, i * 10, 64 - i * 10));
        }
        packet
    }

    #[test]
    fn test_negative_layer_index() {
        let packet = packet_with_layers(&[LayerType::Ethernet, LayerType::Ipv4, LayerType::Tcp]);

        assert_eq!(packet.layer(-1).unwrap().layer_type(), LayerType::Tcp);
        assert_eq!(packet.layer(-2).unwrap().layer_type(), LayerType::Ipv4);
        assert_eq!(packet.layer(-3).unwrap().layer_type(), LayerType::Ethernet);
        assert!(packet.layer(-4).is_none());
        assert_eq!(packet.layer(0).unwrap().layer_type(), LayerType::Ethernet);
        assert!(packet.layer(3).is_none());
    }

    #[test]
    fn test_summary() {
        let packet = packet_with_layers(&[LayerType::Ethernet, LayerType::Arp]);
        assert_eq!(packet.summary(), "ethernet/arp");
    }

    #[test]
    fn test_resolve_copies_once() {
        let bytes = [1u8, 2, 3, 4];
        let mut packet = Packet::new();
        packet.begin(LinkType::RAW, &Frame::new(Duration::ZERO, &bytes));
        let mut ownership = DataOwnership::Borrowed(&bytes);

        assert!(!packet.is_owned());
        assert!(packet.data().is_empty());

        assert!(ownership.resolve(&mut packet));
        assert!(!ownership.resolve(&mut packet));
        assert!(packet.is_owned());
        assert_eq!(packet.data(), &bytes);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut packet = packet_with_layers(&[LayerType::Ethernet]);
        packet.copy_data(&[9, 9, 9]);
        packet.reset();

        assert_eq!(packet.layer_count(), 0);
        assert!(packet.data().is_empty());
        assert!(!packet.is_owned());
        assert_eq!(packet.timestamp(), Duration::ZERO);
        assert!(packet.link_type().is_none());
    }

    #[test]
    fn test_layer_data_requires_owned_bytes() {
        let bytes = [0xaa; 20];
        let mut packet = Packet::new();
        packet.begin(LinkType::RAW, &Frame::new(Duration::ZERO, &bytes));
        packet.layers_mut().push(Layer::new(LayerType::Ipv4, 0, 20));
        let layer = *packet.layer(-1).unwrap();

        assert!(packet.layer_data(&layer).is_empty());

        DataOwnership::Borrowed(&bytes).resolve(&mut packet);
        assert_eq!(packet.layer_data(&layer).len(), 20);
    }
}
