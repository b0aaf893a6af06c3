//! Packet object pool.
//!
//! Recycles parsed-packet storage so sustained capture does not allocate
//! a new packet per frame (SRP: the pool only manages storage, it never
//! parses or routes).

mod packet_pool;

pub use packet_pool::{PacketPool, PooledPacket};
