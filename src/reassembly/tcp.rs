//! TCP segment reordering.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Duration;

use pnet::packet::tcp::{TcpFlags, TcpPacket};

use super::{emit, Reassembler, SWEEP_INTERVAL};
use crate::domain::{FlowKey, LayerType, Packet};
use crate::listener::SharedListener;
use crate::pool::PooledPacket;

/// Default idle time after which a connection is flushed and forgotten.
pub const DEFAULT_TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
struct Segment {
    seq: u32,
    /// Sequence space consumed: payload plus SYN and FIN
    seq_len: u32,
    syn: bool,
    fin: bool,
    rst: bool,
}

impl Segment {
    fn from_packet(packet: &Packet) -> Option<Segment> {
        let layer = packet.find_layer(LayerType::Tcp)?;
        let bytes = packet.layer_data(layer);
        let tcp = TcpPacket::new(bytes)?;

        let flags = u16::from(tcp.get_flags());
        let syn = flags & u16::from(TcpFlags::SYN) != 0;
        let fin = flags & u16::from(TcpFlags::FIN) != 0;
        let header_len = usize::from(tcp.get_data_offset()) * 4;
        let payload_len = bytes.len().saturating_sub(header_len) as u32;

        Some(Segment {
            seq: tcp.get_sequence(),
            seq_len: payload_len + u32::from(syn) + u32::from(fin),
            syn,
            fin,
            rst: flags & u16::from(TcpFlags::RST) != 0,
        })
    }
}

/// One direction of a connection.
#[derive(Default)]
struct HalfStream {
    /// Absolute sequence number that maps to relative 0
    base: Option<u32>,
    /// Start of the delivered range, below 0 once earlier segments turn up
    low: u32,
    /// Next expected relative sequence number
    next: u32,
    /// Out-of-order segments keyed by relative sequence number
    pending: BTreeMap<u32, (PooledPacket, u32)>,
    fin: bool,
}

impl HalfStream {
    fn relative(&mut self, segment: &Segment) -> u32 {
        let base = *self.base.get_or_insert(segment.seq);
        segment.seq.wrapping_sub(base)
    }

    /// Deliver pending segments that have become contiguous.
    fn drain_ready(&mut self, listener: &SharedListener) {
        while let Some(entry) = self.pending.first_entry() {
            let rel = *entry.key();
            if before(self.next, rel) {
                break;
            }
            let (packet, seq_len) = entry.remove();
            let end = rel.wrapping_add(seq_len);
            if before(self.next, end) {
                self.next = end;
                emit(listener, packet);
            } else {
                tracing::trace!("Dropping retransmitted segment at {}", rel);
            }
        }
    }

    fn flush(&mut self, listener: &SharedListener) {
        for (_, (packet, _)) in std::mem::take(&mut self.pending) {
            emit(listener, packet);
        }
    }
}

struct Connection {
    halves: [HalfStream; 2],
    last_seen: Duration,
}

impl Connection {
    fn new(now: Duration) -> Self {
        Self {
            halves: [HalfStream::default(), HalfStream::default()],
            last_seen: now,
        }
    }

    fn flush(&mut self, listener: &SharedListener) {
        for half in self.halves.iter_mut() {
            half.flush(listener);
        }
    }

    fn is_finished(&self) -> bool {
        self.halves
            .iter()
            .all(|half| half.fin && half.pending.is_empty())
    }
}

/// Puts the segments of each TCP connection back in sequence order.
///
/// Per direction, in-order segments are delivered as soon as they arrive
/// and out-of-order ones are held until the gap is filled. Segments that
/// only repeat already delivered data are dropped. Segments without
/// sequence space (pure ACKs) go straight through.
///
/// A connection ends on RST, when both sides have sent FIN, or when it has
/// been idle for longer than the idle timeout. Its buffered segments are
/// delivered in sequence order when it ends.
pub struct TcpReassembler {
    listener: SharedListener,
    connections: BTreeMap<FlowKey, Connection>,
    idle_timeout: Duration,
    now: Duration,
    last_sweep: Duration,
}

impl TcpReassembler {
    pub fn new(listener: SharedListener) -> Self {
        Self {
            listener,
            connections: BTreeMap::new(),
            idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
            now: Duration::ZERO,
            last_sweep: Duration::ZERO,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of connections being tracked.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of segments waiting for a gap to be filled.
    pub fn pending_count(&self) -> usize {
        self.connections
            .values()
            .flat_map(|conn| conn.halves.iter())
            .map(|half| half.pending.len())
            .sum()
    }

    fn close(&mut self, key: &FlowKey) {
        if let Some(mut connection) = self.connections.remove(key) {
            connection.flush(&self.listener);
            tracing::debug!("Closed {}", key);
        }
    }

    fn evict_idle(&mut self) {
        let now = self.now;
        let idle_timeout = self.idle_timeout;
        let idle: Vec<FlowKey> = self
            .connections
            .iter()
            .filter(|(_, conn)| now.saturating_sub(conn.last_seen) > idle_timeout)
            .map(|(key, _)| *key)
            .collect();

        for key in idle {
            tracing::debug!("Evicting idle connection {}", key);
            self.close(&key);
        }
    }
}

impl Reassembler for TcpReassembler {
    fn process(&mut self, packet: PooledPacket) {
        let (Some((key, direction)), Some(segment)) =
            (FlowKey::from_packet(&packet), Segment::from_packet(&packet))
        else {
            emit(&self.listener, packet);
            return;
        };

        let connection = self
            .connections
            .entry(key)
            .or_insert_with(|| Connection::new(packet.timestamp()));
        connection.last_seen = connection.last_seen.max(packet.timestamp());

        if segment.rst {
            emit(&self.listener, packet);
            self.close(&key);
            return;
        }

        let half = &mut connection.halves[direction.index()];
        if segment.syn && half.base.is_none() {
            tracing::trace!("New stream {} {:?}", key, direction);
        }
        let rel = half.relative(&segment);
        let end = rel.wrapping_add(segment.seq_len);
        if segment.fin {
            half.fin = true;
        }

        if segment.seq_len == 0 {
            emit(&self.listener, packet);
        } else if before(rel, half.low) {
            // Precedes everything delivered so far in this direction.
            if !before(end, half.low) {
                half.low = rel;
            }
            tracing::trace!("Late segment at {} ahead of stream start", rel);
            emit(&self.listener, packet);
        } else if rel == half.next {
            half.next = end;
            emit(&self.listener, packet);
            half.drain_ready(&self.listener);
        } else if before(rel, half.next) {
            if before(half.next, end) {
                // Overlaps the delivered edge but carries new data.
                half.next = end;
                emit(&self.listener, packet);
                half.drain_ready(&self.listener);
            } else {
                tracing::trace!("Dropping retransmitted segment at {}", rel);
            }
        } else {
            match half.pending.entry(rel) {
                Entry::Vacant(slot) => {
                    slot.insert((packet, segment.seq_len));
                }
                Entry::Occupied(_) => {
                    tracing::trace!("Dropping duplicate out-of-order segment at {}", rel);
                }
            }
        }

        if connection.is_finished() {
            self.connections.remove(&key);
            tracing::debug!("Finished {}", key);
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        if now.saturating_sub(self.last_sweep) >= SWEEP_INTERVAL {
            self.last_sweep = now;
            self.evict_idle();
        }
    }

    fn flush(&mut self) {
        for (_, mut connection) in std::mem::take(&mut self.connections) {
            connection.flush(&self.listener);
        }
    }

    fn rebind_consumer(&mut self, listener: SharedListener) {
        self.listener = listener;
    }
}

/// Sequence comparison modulo 2^32: whether `a` comes before `b`.
fn before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}
