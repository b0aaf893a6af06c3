//! Packet capture abstraction.
//!
//! This module defines the `CaptureBackend` and `CaptureHandle` traits
//! (DIP) and the session that owns at most one open handle (SRP). A
//! libpcap implementation and an in-memory replay implementation are
//! provided, so the engine can be driven without a network (OCP).

mod memory;
mod pcap_capture;
mod session;

pub use memory::{MemoryBackend, Recording};
pub use pcap_capture::{list_interfaces, PcapBackend, PcapHandle};
pub use session::{CaptureSession, SessionGuard};

use std::path::Path;
use std::time::Duration;

use crate::domain::{Frame, LinkType};
use crate::error::CaptureError;

/// Default number of bytes captured per frame on live interfaces.
pub const DEFAULT_SNAPLEN: u32 = 65536;

/// Default time a live read waits for frames before returning.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of frames one live read delivers at most.
pub const DEFAULT_BATCH_LIMIT: usize = 1024;

/// Settings for opening a live interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOptions {
    pub promiscuous: bool,
    pub snaplen: u32,
    pub read_timeout: Duration,
    /// Frames per read, `0` for no limit
    pub batch_limit: usize,
}

impl LiveOptions {
    pub fn new() -> Self {
        Self {
            promiscuous: false,
            snaplen: DEFAULT_SNAPLEN,
            read_timeout: DEFAULT_READ_TIMEOUT,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    pub fn with_snaplen(mut self, snaplen: u32) -> Self {
        self.snaplen = snaplen;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// What is known about an open capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureInfo {
    /// File path or device name
    pub source: String,
    pub link_type: LinkType,
    pub snap_length: u32,
}

/// An open capture source.
///
/// Dropping the handle closes the source and frees any filter attached
/// to it.
pub trait CaptureHandle {
    /// Link-layer type of the frames this handle delivers.
    fn link_type(&self) -> LinkType;

    /// Maximum number of bytes captured per frame.
    fn snap_length(&self) -> u32;

    /// Compile `expression` and attach it to the handle.
    fn apply_filter(&mut self, expression: &str) -> Result<(), CaptureError>;

    /// Deliver available frames to `callback`, one at a time.
    ///
    /// Recorded sources are read to the end. Live sources return once the
    /// read timeout expires or the batch limit is reached. Returns the
    /// number of frames delivered.
    fn dispatch(&mut self, callback: &mut dyn FnMut(Frame<'_>)) -> Result<usize, CaptureError>;
}

/// Factory for capture handles.
pub trait CaptureBackend {
    type Handle: CaptureHandle;

    /// Open a recorded capture.
    fn open_file(&mut self, path: &Path) -> Result<Self::Handle, CaptureError>;

    /// Open a live interface.
    fn open_live(&mut self, device: &str, options: &LiveOptions) -> Result<Self::Handle, CaptureError>;
}
