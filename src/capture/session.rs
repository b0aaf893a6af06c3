//! Exclusive ownership of one capture handle.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use tracing::{debug, info};

use super::{CaptureBackend, CaptureHandle, CaptureInfo, LiveOptions};
use crate::domain::Frame;
use crate::error::CaptureError;

/// Owns at most one open capture handle.
///
/// Opening while a handle is open fails with `AlreadyOpen` and leaves the
/// open handle alone. Closing with nothing open fails with `NotOpen`.
pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    handle: Option<B::Handle>,
    info: Option<CaptureInfo>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handle: None,
            info: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Source, link type and snap length of the open capture.
    pub fn info(&self) -> Option<&CaptureInfo> {
        self.info.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open a recorded capture and attach `filter` if it is not empty.
    pub fn open_file(&mut self, path: &Path, filter: &str) -> Result<&CaptureInfo, CaptureError> {
        if self.is_open() {
            return Err(CaptureError::AlreadyOpen);
        }
        let handle = self.backend.open_file(path)?;
        self.install(handle, path.display().to_string(), filter)
    }

    /// Open a live interface and attach `filter` if it is not empty.
    pub fn open_live(
        &mut self,
        device: &str,
        options: &LiveOptions,
        filter: &str,
    ) -> Result<&CaptureInfo, CaptureError> {
        if self.is_open() {
            return Err(CaptureError::AlreadyOpen);
        }
        let handle = self.backend.open_live(device, options)?;
        self.install(handle, device.to_string(), filter)
    }

    fn install(
        &mut self,
        mut handle: B::Handle,
        source: String,
        filter: &str,
    ) -> Result<&CaptureInfo, CaptureError> {
        // Compiled with netmask 0, so `ip broadcast` only matches all-zero or all-ones destinations.
        if !filter.is_empty() {
            handle.apply_filter(filter)?;
            debug!("Filter '{}' attached to {}", filter, source);
        }

        let info = CaptureInfo {
            source,
            link_type: handle.link_type(),
            snap_length: handle.snap_length(),
        };
        info!(
            "Opened {} (link type {}, snapshot length {})",
            info.source, info.link_type, info.snap_length
        );

        self.handle = Some(handle);
        Ok(&*self.info.insert(info))
    }

    /// Run the open handle's capture loop once.
    pub fn dispatch(&mut self, callback: &mut dyn FnMut(Frame<'_>)) -> Result<usize, CaptureError> {
        let handle = self.handle.as_mut().ok_or(CaptureError::NotOpen)?;
        handle.dispatch(callback)
    }

    /// Close the open handle.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        let handle = self.handle.take().ok_or(CaptureError::NotOpen)?;
        drop(handle);
        if let Some(info) = self.info.take() {
            debug!("Closed {}", info.source);
        }
        Ok(())
    }

    /// Borrow the session so that the open handle is closed when the
    /// borrow ends, however it ends.
    pub fn guard(&mut self) -> SessionGuard<'_, B> {
        SessionGuard { session: self }
    }
}

/// Closes the session's handle on drop.
pub struct SessionGuard<'a, B: CaptureBackend> {
    session: &'a mut CaptureSession<B>,
}

impl<B: CaptureBackend> Deref for SessionGuard<'_, B> {
    type Target = CaptureSession<B>;

    fn deref(&self) -> &CaptureSession<B> {
        self.session
    }
}

impl<B: CaptureBackend> DerefMut for SessionGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut CaptureSession<B> {
        self.session
    }
}

impl<B: CaptureBackend> Drop for SessionGuard<'_, B> {
    fn drop(&mut self) {
        if self.session.is_open() {
            let _ = self.session.close();
        }
    }
}
