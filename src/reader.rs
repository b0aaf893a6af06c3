//! Packet reader engine.
//!
//! Ties the capture session, the packet pool, the dispatcher and the
//! reassemblers together behind one object.

use std::path::Path;
use std::rc::Rc;

use tracing::info;

use crate::capture::{CaptureBackend, CaptureInfo, CaptureSession, PcapBackend};
use crate::config::ReaderConfig;
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::CaptureError;
use crate::listener::SharedListener;
use crate::parser::LayerParser;
use crate::pool::PacketPool;
use crate::reassembly::{Reassembler, ReassemblyCoordinator, TcpReassembler, UdpReassembler};

/// Reads frames from a capture and dispatches them as parsed packets.
///
/// Both reassemblers are enabled on construction unless the configuration
/// turns them off. Dropping the reader flushes the reassemblers and then
/// closes any open capture.
pub struct PacketReader<B: CaptureBackend = PcapBackend> {
    session: CaptureSession<B>,
    dispatcher: Dispatcher,
    config: ReaderConfig,
}

impl PacketReader<PcapBackend> {
    /// Create a reader over libpcap.
    pub fn new(listener: SharedListener, config: ReaderConfig) -> Self {
        Self::with_backend(PcapBackend::new(), listener, config)
    }
}

impl<B: CaptureBackend> PacketReader<B> {
    /// Create a reader over `backend` with the stock reassemblers.
    pub fn with_backend(backend: B, listener: SharedListener, config: ReaderConfig) -> Self {
        let tcp_idle_timeout = config.tcp_idle_timeout;
        let udp_idle_timeout = config.udp_idle_timeout;
        let udp_max_datagrams = config.udp_max_datagrams;

        let reassembly = ReassemblyCoordinator::new(listener)
            .with_tcp_factory(move |listener| -> Box<dyn Reassembler> {
                Box::new(TcpReassembler::new(listener).with_idle_timeout(tcp_idle_timeout))
            })
            .with_udp_factory(move |listener| -> Box<dyn Reassembler> {
                Box::new(
                    UdpReassembler::new(listener)
                        .with_idle_timeout(udp_idle_timeout)
                        .with_max_datagrams(udp_max_datagrams),
                )
            });

        Self::with_reassembly(backend, reassembly, config)
    }

    /// Create a reader over `backend` with a custom coordinator.
    pub fn with_reassembly(backend: B, mut reassembly: ReassemblyCoordinator, config: ReaderConfig) -> Self {
        reassembly.enable_tcp(config.tcp_reassembly);
        reassembly.enable_udp(config.udp_reassembly);

        let parser = LayerParser::new().with_eager_copy(config.eager_copy);
        let dispatcher = Dispatcher::new(PacketPool::new(), parser, reassembly)
            .with_unknown_layer_as_error(config.unknown_layer_as_error);

        Self {
            session: CaptureSession::new(backend),
            dispatcher,
            config,
        }
    }

    /// Open a recorded capture, read it to the end and close it.
    ///
    /// Returns the number of frames read. The capture is closed on every
    /// exit path; if another capture is already open it is left untouched.
    pub fn read_file(&mut self, path: impl AsRef<Path>, filter: &str) -> Result<usize, CaptureError> {
        let info = self.session.open_file(path.as_ref(), filter)?.clone();

        let mut guard = self.session.guard();
        self.dispatcher.begin_capture(&info);

        let dispatcher = &mut self.dispatcher;
        let count = guard.dispatch(&mut |frame| dispatcher.handle_frame(frame))?;
        info!("Read {} frames from {}", count, info.source);

        Ok(count)
    }

    /// Open a recorded capture without reading it.
    pub fn open_file(&mut self, path: impl AsRef<Path>, filter: &str) -> Result<(), CaptureError> {
        let info = self.session.open_file(path.as_ref(), filter)?.clone();
        self.dispatcher.begin_capture(&info);
        Ok(())
    }

    /// Open a live interface without reading from it.
    ///
    /// Snap length, read timeout and batch limit come from the
    /// configuration.
    pub fn open_live(&mut self, device: &str, promiscuous: bool, filter: &str) -> Result<(), CaptureError> {
        let options = self.config.live_options(promiscuous);
        let info = self.session.open_live(device, &options, filter)?.clone();
        self.dispatcher.begin_capture(&info);
        Ok(())
    }

    /// Run one batch of the capture loop on the open capture.
    ///
    /// Returns the number of frames read, `0` once a recorded capture is
    /// exhausted or a live read timed out without traffic.
    pub fn read_packets(&mut self) -> Result<usize, CaptureError> {
        let dispatcher = &mut self.dispatcher;
        self.session
            .dispatch(&mut |frame| dispatcher.handle_frame(frame))
    }

    /// Close the open capture.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        self.session.close()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn capture_info(&self) -> Option<&CaptureInfo> {
        self.session.info()
    }

    pub fn session(&self) -> &CaptureSession<B> {
        &self.session
    }

    /// Replace the consumer, for the reader and every active reassembler.
    pub fn set_listener(&mut self, listener: SharedListener) {
        self.dispatcher.reassembly_mut().rebind_consumer(listener);
    }

    pub fn listener(&self) -> SharedListener {
        Rc::clone(self.dispatcher.reassembly().listener())
    }

    /// Deliver everything the reassemblers still hold.
    pub fn flush(&mut self) {
        self.dispatcher.reassembly_mut().flush();
    }

    /// Enable or disable TCP reassembly. Disabling flushes first.
    pub fn enable_tcp_reassembly(&mut self, enabled: bool) {
        self.dispatcher.reassembly_mut().enable_tcp(enabled);
    }

    /// Enable or disable UDP reassembly. Disabling flushes first.
    pub fn enable_udp_reassembly(&mut self, enabled: bool) {
        self.dispatcher.reassembly_mut().enable_udp(enabled);
    }

    pub fn tcp_reassembly_enabled(&self) -> bool {
        self.dispatcher.reassembly().tcp_enabled()
    }

    pub fn udp_reassembly_enabled(&self) -> bool {
        self.dispatcher.reassembly().udp_enabled()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn pool(&self) -> &PacketPool {
        self.dispatcher.pool()
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }
}

impl<B: CaptureBackend> Drop for PacketReader<B> {
    fn drop(&mut self) {
        self.flush();
        if self.session.is_open() {
            let _ = self.session.close();
        }

        let stats = self.dispatcher.stats();
        info!(
            "Packet reader done: {} frames seen, at most {} packets in use",
            stats.frames,
            self.dispatcher.pool().high_water()
        );
    }
}
