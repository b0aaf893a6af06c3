//! Per-frame classification and routing.
//!
//! This module is responsible for turning each captured frame into a
//! pooled packet and deciding who receives it (SRP): the TCP reassembler,
//! the UDP reassembler, the consumer, or the consumer's error entry.

mod dispatcher;

pub use dispatcher::{classify, DispatchStats, Dispatcher, Route};
