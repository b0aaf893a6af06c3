//! Domain models for captured frames and parsed packets.
//!
//! This module contains the core types shared by the parser, the
//! dispatcher, the reassemblers and the listeners. None of them depend
//! on a particular capture backend.

mod flow;
mod layer;
mod packet;

pub use flow::{Direction, Endpoint, FlowKey, FlowTransport};
pub use layer::{Layer, LayerType, LinkType};
pub use packet::{DataOwnership, Frame, Packet};
