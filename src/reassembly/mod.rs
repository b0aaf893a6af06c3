//! Reassembly lifecycle.
//!
//! This module defines the `Reassembler` trait (DIP) and the coordinator
//! that owns the active TCP and UDP reassemblers (SRP). The coordinator
//! creates, flushes, rebinds and destroys them; what they do with a packet
//! is up to the implementation.

mod tcp;
mod udp;

pub use tcp::{TcpReassembler, DEFAULT_TCP_IDLE_TIMEOUT};
pub use udp::{UdpReassembler, DEFAULT_UDP_IDLE_TIMEOUT, DEFAULT_UDP_MAX_DATAGRAMS};

use std::rc::Rc;
use std::time::Duration;

use crate::listener::SharedListener;
use crate::pool::PooledPacket;

/// A stream or datagram reassembler.
///
/// Reassemblers take ownership of every packet handed to them and either
/// deliver it to their consumer or drop it back to the pool.
pub trait Reassembler {
    /// Take ownership of one packet.
    fn process(&mut self, packet: PooledPacket);

    /// Advance the reassembler's clock to the capture time `now`.
    fn set_time(&mut self, now: Duration);

    /// Deliver everything still buffered.
    fn flush(&mut self);

    /// Deliver to `listener` from now on.
    fn rebind_consumer(&mut self, listener: SharedListener);
}

/// How often reassemblers look for idle state, in capture time.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Builds a reassembler bound to a consumer.
pub type ReassemblerFactory = Box<dyn Fn(SharedListener) -> Box<dyn Reassembler>>;

/// Owns the consumer reference and the active reassemblers.
pub struct ReassemblyCoordinator {
    listener: SharedListener,
    tcp: Option<Box<dyn Reassembler>>,
    udp: Option<Box<dyn Reassembler>>,
    tcp_factory: ReassemblerFactory,
    udp_factory: ReassemblerFactory,
}

impl ReassemblyCoordinator {
    /// Create a coordinator with both reassemblers disabled.
    pub fn new(listener: SharedListener) -> Self {
        Self {
            listener,
            tcp: None,
            udp: None,
            tcp_factory: Box::new(|listener| -> Box<dyn Reassembler> {
                Box::new(TcpReassembler::new(listener))
            }),
            udp_factory: Box::new(|listener| -> Box<dyn Reassembler> {
                Box::new(UdpReassembler::new(listener))
            }),
        }
    }

    /// Replace how TCP reassemblers are built. Applies from the next enable.
    pub fn with_tcp_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(SharedListener) -> Box<dyn Reassembler> + 'static,
    {
        self.tcp_factory = Box::new(factory);
        self
    }

    /// Replace how UDP reassemblers are built. Applies from the next enable.
    pub fn with_udp_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(SharedListener) -> Box<dyn Reassembler> + 'static,
    {
        self.udp_factory = Box::new(factory);
        self
    }

    /// Enable or disable TCP reassembly.
    ///
    /// Disabling flushes the reassembler before destroying it.
    pub fn enable_tcp(&mut self, enabled: bool) {
        set_enabled(&mut self.tcp, enabled, &self.tcp_factory, &self.listener, "TCP");
    }

    /// Enable or disable UDP reassembly.
    pub fn enable_udp(&mut self, enabled: bool) {
        set_enabled(&mut self.udp, enabled, &self.udp_factory, &self.listener, "UDP");
    }

    pub fn tcp_enabled(&self) -> bool {
        self.tcp.is_some()
    }

    pub fn udp_enabled(&self) -> bool {
        self.udp.is_some()
    }

    /// The consumer every packet ends up with.
    pub fn listener(&self) -> &SharedListener {
        &self.listener
    }

    /// Point the coordinator and every active reassembler at a new consumer.
    pub fn rebind_consumer(&mut self, listener: SharedListener) {
        if let Some(tcp) = self.tcp.as_mut() {
            tcp.rebind_consumer(Rc::clone(&listener));
        }
        if let Some(udp) = self.udp.as_mut() {
            udp.rebind_consumer(Rc::clone(&listener));
        }
        self.listener = listener;
    }

    /// Flush TCP, then UDP.
    pub fn flush(&mut self) {
        if let Some(tcp) = self.tcp.as_mut() {
            tcp.flush();
        }
        if let Some(udp) = self.udp.as_mut() {
            udp.flush();
        }
    }

    /// Forward the capture clock to every active reassembler.
    pub fn advance_time(&mut self, now: Duration) {
        if let Some(tcp) = self.tcp.as_mut() {
            tcp.set_time(now);
        }
        if let Some(udp) = self.udp.as_mut() {
            udp.set_time(now);
        }
    }

    /// Hand a packet to the TCP reassembler, or to the consumer if disabled.
    pub fn process_tcp(&mut self, packet: PooledPacket) {
        match self.tcp.as_mut() {
            Some(tcp) => tcp.process(packet),
            None => self.deliver(packet),
        }
    }

    /// Hand a packet to the UDP reassembler, or to the consumer if disabled.
    pub fn process_udp(&mut self, packet: PooledPacket) {
        match self.udp.as_mut() {
            Some(udp) => udp.process(packet),
            None => self.deliver(packet),
        }
    }

    pub fn deliver(&self, packet: PooledPacket) {
        self.listener.borrow_mut().accept(packet);
    }

    pub fn deliver_error(&self, packet: PooledPacket, error: &str) {
        self.listener.borrow_mut().accept_error(packet, error);
    }
}

fn set_enabled(
    slot: &mut Option<Box<dyn Reassembler>>,
    enabled: bool,
    factory: &ReassemblerFactory,
    listener: &SharedListener,
    name: &str,
) {
    match (enabled, slot.is_some()) {
        (true, false) => {
            *slot = Some(factory(Rc::clone(listener)));
            tracing::debug!("{} reassembly enabled", name);
        }
        (false, true) => {
            if let Some(mut reassembler) = slot.take() {
                reassembler.flush();
            }
            tracing::debug!("{} reassembly disabled", name);
        }
        _ => {}
    }
}

/// Deliver a packet to a shared consumer.
fn emit(listener: &SharedListener, packet: PooledPacket) {
    listener.borrow_mut().accept(packet);
}
