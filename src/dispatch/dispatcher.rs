//! Dispatch state machine.

use std::fmt;

use tracing::trace;

use crate::capture::CaptureInfo;
use crate::domain::{DataOwnership, Frame, LayerType, LinkType, Packet};
use crate::parser::LayerParser;
use crate::pool::PacketPool;
use crate::reassembly::ReassemblyCoordinator;

/// Where a parsed packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Consumer,
    Tcp,
    Udp,
}

/// Pick a route from the top two layers of `packet`.
///
/// A packet whose top layer is TCP, or data carried over TCP, goes to the
/// TCP reassembler when it is enabled, and likewise for UDP. Everything
/// else, including packets with fewer than two layers, goes to the
/// consumer.
pub fn classify(packet: &Packet, tcp_enabled: bool, udp_enabled: bool) -> Route {
    let (Some(top), Some(below)) = (packet.layer(-1), packet.layer(-2)) else {
        return Route::Consumer;
    };

    match (top.layer_type(), below.layer_type()) {
        (LayerType::Tcp, _) | (LayerType::Data, LayerType::Tcp) if tcp_enabled => Route::Tcp,
        (LayerType::Udp, _) | (LayerType::Data, LayerType::Udp) if udp_enabled => Route::Udp,
        _ => Route::Consumer,
    }
}

/// Counters of dispatch outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames received from the capture
    pub frames: u64,
    /// Packets handed straight to the consumer
    pub direct: u64,
    pub tcp: u64,
    pub udp: u64,
    /// Packets delivered through the consumer's error entry
    pub errors: u64,
    /// Packets returned to the pool without delivery
    pub discarded: u64,
    /// Frame copies made into packet-owned storage
    pub copies: u64,
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames: {} direct, {} tcp, {} udp, {} errors, {} discarded",
            self.frames, self.direct, self.tcp, self.udp, self.errors, self.discarded
        )
    }
}

/// Claims, parses, classifies and hands off one frame at a time.
pub struct Dispatcher {
    pool: PacketPool,
    parser: LayerParser,
    reassembly: ReassemblyCoordinator,
    link_type: LinkType,
    unknown_layer_as_error: bool,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(pool: PacketPool, parser: LayerParser, reassembly: ReassemblyCoordinator) -> Self {
        Self {
            pool,
            parser,
            reassembly,
            link_type: LinkType::ETHERNET,
            unknown_layer_as_error: false,
            stats: DispatchStats::default(),
        }
    }

    /// Deliver packets with unrecognized layers through `accept_error`
    /// instead of discarding them.
    pub fn with_unknown_layer_as_error(mut self, enabled: bool) -> Self {
        self.unknown_layer_as_error = enabled;
        self
    }

    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    pub fn reassembly(&self) -> &ReassemblyCoordinator {
        &self.reassembly
    }

    pub fn reassembly_mut(&mut self) -> &mut ReassemblyCoordinator {
        &mut self.reassembly
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Adopt the link type of a newly opened capture and tell the consumer.
    pub fn begin_capture(&mut self, info: &CaptureInfo) {
        self.link_type = info.link_type;
        self.reassembly
            .listener()
            .borrow_mut()
            .begin_capture(&info.source, info.link_type, info.snap_length);
    }

    /// Route one frame.
    ///
    /// The frame's bytes are copied into the packet only if the packet
    /// outlives this call, right before it is handed over.
    pub fn handle_frame(&mut self, frame: Frame<'_>) {
        self.stats.frames += 1;

        let mut packet = self.pool.claim();
        let mut ownership = DataOwnership::Borrowed(frame.data);

        if let Err(error) = self
            .parser
            .parse(&mut packet, self.link_type, &frame, &mut ownership)
        {
            if error.is_unrecognized() && !self.unknown_layer_as_error {
                trace!("Discarding frame {}: {}", self.stats.frames, error);
                self.stats.discarded += 1;
                return;
            }
            self.count_copy(ownership.resolve(&mut packet));
            self.stats.errors += 1;
            self.reassembly.deliver_error(packet, &error.to_string());
            return;
        }

        self.reassembly.advance_time(packet.timestamp());

        let route = classify(
            &packet,
            self.reassembly.tcp_enabled(),
            self.reassembly.udp_enabled(),
        );
        self.count_copy(ownership.resolve(&mut packet));

        match route {
            Route::Tcp => {
                self.stats.tcp += 1;
                self.reassembly.process_tcp(packet);
            }
            Route::Udp => {
                self.stats.udp += 1;
                self.reassembly.process_udp(packet);
            }
            Route::Consumer => {
                self.stats.direct += 1;
                self.reassembly.deliver(packet);
            }
        }
    }

    fn count_copy(&mut self, copied: bool) {
        if copied {
            self.stats.copies += 1;
        }
    }
}
