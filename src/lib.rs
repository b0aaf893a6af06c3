//! pcapflow - capture-driven packet dispatch.
//!
//! Frames from a recorded or live capture are parsed into layered packets
//! held in a reusable pool, then routed either to a TCP or UDP reassembler
//! or straight to a single consumer implementing [`PacketListener`].

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod listener;
pub mod parser;
pub mod pool;
pub mod reader;
pub mod reassembly;

pub use capture::{list_interfaces, CaptureBackend, CaptureHandle, MemoryBackend, PcapBackend, Recording};
pub use config::ReaderConfig;
pub use dispatch::DispatchStats;
pub use domain::{Layer, LayerType, LinkType, Packet};
pub use error::{CaptureError, ConfigError, ParseError};
pub use listener::{shared, ConsoleListener, PacketListener, RecordingListener, SharedListener};
pub use parser::FrameBuilder;
pub use pool::{PacketPool, PooledPacket};
pub use reader::PacketReader;
pub use reassembly::{Reassembler, ReassemblyCoordinator};
