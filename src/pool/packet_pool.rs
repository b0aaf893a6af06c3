//! Arena-backed packet pool with a free-index stack.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::domain::Packet;

#[derive(Default)]
struct Slots {
    /// `Some` while the slot is free, `None` while it is claimed
    slots: Vec<Option<Packet>>,
    free: Vec<usize>,
    in_use: usize,
    high_water: usize,
}

/// Pool of reusable packets.
///
/// `claim` pops a free slot index, or grows the arena by one slot when none
/// is free. A claimed packet goes back to its slot when the returned
/// [`PooledPacket`] is released or dropped, wherever that happens.
///
/// Cloning the pool yields another handle to the same arena. The pool is
/// meant for a single dispatch thread and does no locking.
#[derive(Clone, Default)]
pub struct PacketPool {
    inner: Rc<RefCell<Slots>>,
}

impl PacketPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate `count` free packets.
    pub fn with_capacity(count: usize) -> Self {
        let pool = Self::new();
        {
            let mut inner = pool.inner.borrow_mut();
            for index in 0..count {
                inner.slots.push(Some(Packet::new()));
                inner.free.push(count - 1 - index);
            }
        }
        pool
    }

    /// Claim a clean packet, reusing a freed one when available.
    pub fn claim(&self) -> PooledPacket {
        let mut inner = self.inner.borrow_mut();

        let (slot, packet) = match inner.free.pop() {
            Some(slot) => {
                let packet = inner.slots[slot].take().unwrap_or_default();
                (slot, packet)
            }
            None => {
                inner.slots.push(None);
                (inner.slots.len() - 1, Packet::new())
            }
        };

        inner.in_use += 1;
        inner.high_water = inner.high_water.max(inner.in_use);

        PooledPacket {
            slot,
            packet,
            pool: Rc::clone(&self.inner),
        }
    }

    /// Return a packet to the pool. Equivalent to dropping it.
    pub fn release(&self, packet: PooledPacket) {
        drop(packet);
    }

    /// Number of packets currently claimed.
    pub fn in_use(&self) -> usize {
        self.inner.borrow().in_use
    }

    /// Number of free packets ready for reuse.
    pub fn available(&self) -> usize {
        self.inner.borrow().free.len()
    }

    /// Total number of slots ever created.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Highest number of simultaneously claimed packets.
    pub fn high_water(&self) -> usize {
        self.inner.borrow().high_water
    }
}

impl fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("PacketPool")
            .field("capacity", &inner.slots.len())
            .field("in_use", &inner.in_use)
            .field("high_water", &inner.high_water)
            .finish()
    }
}

/// Exclusive handle to a claimed packet.
///
/// Dereferences to [`Packet`]. Dropping the handle resets the packet and
/// returns its slot to the pool.
pub struct PooledPacket {
    slot: usize,
    packet: Packet,
    pool: Rc<RefCell<Slots>>,
}

impl PooledPacket {
    /// Index of the arena slot backing this packet.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Return the packet to its pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledPacket {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.packet
    }
}

impl DerefMut for PooledPacket {
    fn deref_mut(&mut self) -> &mut Packet {
        &mut self.packet
    }
}

impl fmt::Debug for PooledPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledPacket")
            .field("slot", &self.slot)
            .field("packet", &self.packet)
            .finish()
    }
}

impl Drop for PooledPacket {
    fn drop(&mut self) {
        let mut packet = std::mem::take(&mut self.packet);
        packet.reset();

        match self.pool.try_borrow_mut() {
            Ok(mut inner) => {
                inner.slots[self.slot] = Some(packet);
                inner.free.push(self.slot);
                inner.in_use -= 1;
            }
            Err(_) => {
                tracing::warn!("Packet pool busy, dropping packet slot {}", self.slot);
            }
        }
    }
}
