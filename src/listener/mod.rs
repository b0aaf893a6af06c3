//! Packet consumers.
//!
//! This module defines the `PacketListener` trait (ISP, DIP): the single
//! downstream sink that receives every packet the dispatcher or a
//! reassembler lets go of.

mod console_listener;
mod recording_listener;

pub use console_listener::ConsoleListener;
pub use recording_listener::{CaptureStart, Delivery, RecordingListener};

use std::cell::RefCell;
use std::rc::Rc;

use crate::domain::LinkType;
use crate::pool::PooledPacket;

/// Trait for consumers of parsed packets.
///
/// Packets are handed over by value; the listener owns them from then on
/// and returns them to the pool by dropping them.
pub trait PacketListener {
    /// Called once when a capture starts.
    fn begin_capture(&mut self, source: &str, link_type: LinkType, snap_length: u32);

    /// Receive a fully parsed packet.
    fn accept(&mut self, packet: PooledPacket);

    /// Receive a packet that failed to parse, with the failure description.
    fn accept_error(&mut self, packet: PooledPacket, error: &str);
}

/// Consumer reference shared by the dispatcher and every active reassembler.
pub type SharedListener = Rc<RefCell<dyn PacketListener>>;

/// Wrap a listener for sharing.
pub fn shared<L: PacketListener + 'static>(listener: L) -> SharedListener {
    Rc::new(RefCell::new(listener))
}
