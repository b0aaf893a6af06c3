//! Listener that keeps a record of every delivery.

use std::time::Duration;

use crate::domain::{LayerType, LinkType, Packet};
use crate::listener::PacketListener;
use crate::pool::PooledPacket;

/// A `begin_capture` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStart {
    pub source: String,
    pub link_type: LinkType,
    pub snap_length: u32,
}

/// What a listener saw of one delivered packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub summary: String,
    pub timestamp: Duration,
    /// Bytes of the innermost data layer, empty if there is none
    pub payload: Vec<u8>,
    /// Whether the packet owned its bytes on arrival
    pub owned: bool,
    /// Error message for `accept_error` deliveries
    pub error: Option<String>,
}

/// Records deliveries and returns packets to the pool straight away.
#[derive(Debug, Default)]
pub struct RecordingListener {
    captures: Vec<CaptureStart>,
    deliveries: Vec<Delivery>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captures(&self) -> &[CaptureStart] {
        &self.captures
    }

    /// Every delivery, in arrival order.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn accepted(&self) -> Vec<&Delivery> {
        self.deliveries.iter().filter(|d| d.error.is_none()).collect()
    }

    pub fn errors(&self) -> Vec<&Delivery> {
        self.deliveries.iter().filter(|d| d.error.is_some()).collect()
    }

    /// Non-empty payloads of accepted packets, in arrival order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.accepted()
            .into_iter()
            .filter(|d| !d.payload.is_empty())
            .map(|d| d.payload.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.captures.clear();
        self.deliveries.clear();
    }

    fn record(&mut self, packet: &Packet, error: Option<&str>) {
        let payload = packet
            .find_layer(LayerType::Data)
            .map(|layer| packet.layer_data(layer).to_vec())
            .unwrap_or_default();

        self.deliveries.push(Delivery {
            summary: packet.summary(),
            timestamp: packet.timestamp(),
            payload,
            owned: packet.is_owned(),
            error: error.map(str::to_string),
        });
    }
}

impl PacketListener for RecordingListener {
    fn begin_capture(&mut self, source: &str, link_type: LinkType, snap_length: u32) {
        self.captures.push(CaptureStart {
            source: source.to_string(),
            link_type,
            snap_length,
        });
    }

    fn accept(&mut self, packet: PooledPacket) {
        self.record(&packet, None);
    }

    fn accept_error(&mut self, packet: PooledPacket, error: &str) {
        self.record(&packet, Some(error));
    }
}
