//! UDP datagram grouping.

use std::collections::BTreeMap;
use std::time::Duration;

use super::{emit, Reassembler, SWEEP_INTERVAL};
use crate::domain::FlowKey;
use crate::listener::SharedListener;
use crate::pool::PooledPacket;

/// Default idle time after which a flow's datagrams are delivered.
pub const DEFAULT_UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of datagrams a flow may hold before it is delivered.
pub const DEFAULT_UDP_MAX_DATAGRAMS: usize = 64;

struct Datagrams {
    packets: Vec<PooledPacket>,
    last_seen: Duration,
}

/// Groups datagrams by bidirectional flow.
///
/// A flow's datagrams are delivered together, in arrival order, once the
/// flow has been idle longer than the idle timeout, once it holds
/// `max_datagrams` packets, or on flush.
pub struct UdpReassembler {
    listener: SharedListener,
    flows: BTreeMap<FlowKey, Datagrams>,
    idle_timeout: Duration,
    max_datagrams: usize,
    last_sweep: Duration,
}

impl UdpReassembler {
    pub fn new(listener: SharedListener) -> Self {
        Self {
            listener,
            flows: BTreeMap::new(),
            idle_timeout: DEFAULT_UDP_IDLE_TIMEOUT,
            max_datagrams: DEFAULT_UDP_MAX_DATAGRAMS,
            last_sweep: Duration::ZERO,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the per-flow batch size. Zero is treated as one.
    pub fn with_max_datagrams(mut self, max_datagrams: usize) -> Self {
        self.max_datagrams = max_datagrams.max(1);
        self
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Number of datagrams held across all flows.
    pub fn pending_count(&self) -> usize {
        self.flows.values().map(|flow| flow.packets.len()).sum()
    }

    fn deliver_flow(&mut self, key: &FlowKey) {
        if let Some(flow) = self.flows.remove(key) {
            tracing::trace!("Delivering {} datagrams of {}", flow.packets.len(), key);
            for packet in flow.packets {
                emit(&self.listener, packet);
            }
        }
    }
}

impl Reassembler for UdpReassembler {
    fn process(&mut self, packet: PooledPacket) {
        let Some((key, _)) = FlowKey::from_packet(&packet) else {
            emit(&self.listener, packet);
            return;
        };

        let timestamp = packet.timestamp();
        let flow = self.flows.entry(key).or_insert_with(|| Datagrams {
            packets: Vec::new(),
            last_seen: timestamp,
        });
        flow.last_seen = flow.last_seen.max(timestamp);
        flow.packets.push(packet);

        if flow.packets.len() >= self.max_datagrams {
            self.deliver_flow(&key);
        }
    }

    fn set_time(&mut self, now: Duration) {
        if now.saturating_sub(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = now;

        let idle_timeout = self.idle_timeout;
        let idle: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, flow)| now.saturating_sub(flow.last_seen) > idle_timeout)
            .map(|(key, _)| *key)
            .collect();

        for key in idle {
            self.deliver_flow(&key);
        }
    }

    fn flush(&mut self) {
        for (_, flow) in std::mem::take(&mut self.flows) {
            for packet in flow.packets {
                emit(&self.listener, packet);
            }
        }
    }

    fn rebind_consumer(&mut self, listener: SharedListener) {
        self.listener = listener;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::RecordingListener;
    use crate::parser::{parsed_packet, FrameBuilder};
    use crate::pool::PacketPool;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (PacketPool, Rc<RefCell<RecordingListener>>, UdpReassembler) {
        let recorder = Rc::new(RefCell::new(RecordingListener::new()));
        let reassembler = UdpReassembler::new(recorder.clone());
        (PacketPool::new(), recorder, reassembler)
    }

    fn datagram(pool: &PacketPool, src_port: u16, dst_port: u16, payload: &[u8], secs: u64) -> PooledPacket {
        let bytes = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
            .udp(src_port, dst_port)
            .payload(payload)
            .build();
        parsed_packet(pool, Duration::from_secs(secs), &bytes)
    }

    fn reply(pool: &PacketPool, payload: &[u8], secs: u64) -> PooledPacket {
        let bytes = FrameBuilder::ethernet()
            .ipv4([10, 0, 0, 2], [10, 0, 0, 1])
            .udp(53, 5000)
            .payload(payload)
            .build();
        parsed_packet(pool, Duration::from_secs(secs), &bytes)
    }

    #[test]
    fn test_datagrams_held_until_flush() {
        let (pool, recorder, mut udp) = setup();
        udp.process(datagram(&pool, 5000, 53, b"query", 1));
        udp.process(reply(&pool, b"answer", 1));

        assert_eq!(udp.flow_count(), 1);
        assert_eq!(udp.pending_count(), 2);
        assert!(recorder.borrow().deliveries().is_empty());

        udp.flush();
        assert_eq!(
            recorder.borrow().payloads(),
            vec![b"query".to_vec(), b"answer".to_vec()]
        );
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_batch_limit_delivers_flow() {
        let (pool, recorder, udp) = setup();
        let mut udp = udp.with_max_datagrams(2);

        udp.process(datagram(&pool, 5000, 53, b"a", 1));
        udp.process(datagram(&pool, 6000, 53, b"other", 1));
        udp.process(datagram(&pool, 5000, 53, b"b", 1));

        assert_eq!(recorder.borrow().payloads(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(udp.flow_count(), 1);
    }

    #[test]
    fn test_idle_flow_is_delivered() {
        let (pool, recorder, udp) = setup();
        let mut udp = udp.with_idle_timeout(Duration::from_secs(5));

        udp.process(datagram(&pool, 5000, 53, b"early", 1));
        udp.set_time(Duration::from_secs(3));
        udp.process(datagram(&pool, 6000, 53, b"late", 3));

        udp.set_time(Duration::from_secs(7));
        assert_eq!(recorder.borrow().payloads(), vec![b"early".to_vec()]);
        assert_eq!(udp.flow_count(), 1);
    }

    #[test]
    fn test_idle_check_waits_a_second() {
        let (pool, recorder, udp) = setup();
        let mut udp = udp.with_idle_timeout(Duration::ZERO);

        udp.process(datagram(&pool, 5000, 53, b"held", 5));
        udp.set_time(Duration::from_secs(5));
        udp.set_time(Duration::from_millis(5500));
        assert!(recorder.borrow().deliveries().is_empty());
        assert_eq!(udp.pending_count(), 1);

        udp.set_time(Duration::from_secs(6));
        assert_eq!(recorder.borrow().payloads(), vec![b"held".to_vec()]);
        assert_eq!(udp.flow_count(), 0);
    }

    #[test]
    fn test_non_ip_packet_passes_through() {
        let (pool, recorder, mut udp) = setup();
        let bytes = FrameBuilder::ethernet().arp().build();
        udp.process(parsed_packet(&pool, Duration::from_secs(1), &bytes));

        assert_eq!(recorder.borrow().deliveries().len(), 1);
        assert_eq!(udp.flow_count(), 0);
    }

    #[test]
    fn test_rebind_consumer() {
        let (pool, first, mut udp) = setup();
        let second = Rc::new(RefCell::new(RecordingListener::new()));

        udp.process(datagram(&pool, 5000, 53, b"x", 1));
        udp.rebind_consumer(second.clone());
        udp.flush();

        assert!(first.borrow().deliveries().is_empty());
        assert_eq!(second.borrow().deliveries().len(), 1);
    }
}
