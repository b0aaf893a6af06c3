//! In-memory capture backend.

use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use super::{CaptureBackend, CaptureHandle, LiveOptions, DEFAULT_SNAPLEN};
use crate::domain::{Frame, LinkType};
use crate::error::CaptureError;

#[derive(Debug, Clone)]
struct StoredFrame {
    timestamp: Duration,
    data: Vec<u8>,
    wire_len: usize,
}

/// A sequence of frames replayed by [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct Recording {
    link_type: LinkType,
    snap_length: u32,
    frames: Rc<Vec<StoredFrame>>,
    filter_error: Option<String>,
    read_error: Option<(usize, String)>,
}

impl Recording {
    pub fn new(link_type: LinkType) -> Self {
        Self {
            link_type,
            snap_length: DEFAULT_SNAPLEN,
            frames: Rc::new(Vec::new()),
            filter_error: None,
            read_error: None,
        }
    }

    pub fn with_snap_length(mut self, snap_length: u32) -> Self {
        self.snap_length = snap_length;
        self
    }

    /// Append a frame captured at `timestamp`.
    pub fn frame(mut self, timestamp: Duration, data: Vec<u8>) -> Self {
        let wire_len = data.len();
        Rc::make_mut(&mut self.frames).push(StoredFrame {
            timestamp,
            data,
            wire_len,
        });
        self
    }

    /// Fail every filter with `message`.
    ///
    /// Filters are otherwise accepted but not evaluated.
    pub fn rejecting_filters(mut self, message: &str) -> Self {
        self.filter_error = Some(message.to_string());
        self
    }

    /// Fail the read once `after` frames have been delivered.
    pub fn failing_after(mut self, after: usize, message: &str) -> Self {
        self.read_error = Some((after, message.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Replays recordings registered under file or device names.
///
/// Clones share the count of open handles, so a test can keep a clone to
/// observe whether handles were closed.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    recordings: HashMap<String, Recording>,
    open_handles: Rc<Cell<usize>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `recording` under `name`, for both `open_file` and
    /// `open_live`.
    pub fn with_recording(mut self, name: &str, recording: Recording) -> Self {
        self.recordings.insert(name.to_string(), recording);
        self
    }

    /// Number of handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.get()
    }

    fn open(&self, name: &str, batch_limit: Option<usize>) -> Result<MemoryHandle, CaptureError> {
        let recording = self
            .recordings
            .get(name)
            .ok_or_else(|| CaptureError::Open {
                source_name: name.to_string(),
                message: "No such file or device".to_string(),
            })?
            .clone();

        self.open_handles.set(self.open_handles.get() + 1);
        Ok(MemoryHandle {
            recording,
            position: 0,
            batch_limit,
            open_handles: Rc::clone(&self.open_handles),
        })
    }
}

impl CaptureBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn open_file(&mut self, path: &Path) -> Result<MemoryHandle, CaptureError> {
        self.open(&path.to_string_lossy(), None)
    }

    fn open_live(&mut self, device: &str, options: &LiveOptions) -> Result<MemoryHandle, CaptureError> {
        let batch_limit = match options.batch_limit {
            0 => None,
            limit => Some(limit),
        };
        self.open(device, batch_limit)
    }
}

/// Handle over one [`Recording`].
pub struct MemoryHandle {
    recording: Recording,
    position: usize,
    /// `None` reads to the end of the recording
    batch_limit: Option<usize>,
    open_handles: Rc<Cell<usize>>,
}

impl CaptureHandle for MemoryHandle {
    fn link_type(&self) -> LinkType {
        self.recording.link_type
    }

    fn snap_length(&self) -> u32 {
        self.recording.snap_length
    }

    fn apply_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
        match &self.recording.filter_error {
            Some(message) => Err(CaptureError::Filter {
                filter: expression.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn dispatch(&mut self, callback: &mut dyn FnMut(Frame<'_>)) -> Result<usize, CaptureError> {
        let frames = Rc::clone(&self.recording.frames);
        let mut count = 0;

        while let Some(stored) = frames.get(self.position) {
            if self.batch_limit.is_some_and(|limit| count >= limit) {
                break;
            }
            if let Some((after, message)) = &self.recording.read_error {
                if self.position >= *after {
                    return Err(CaptureError::Read(message.clone()));
                }
            }

            let frame = Frame::new(stored.timestamp, &stored.data).with_wire_len(stored.wire_len);
            self.position += 1;
            count += 1;
            callback(frame);
        }

        Ok(count)
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.open_handles.set(self.open_handles.get().saturating_sub(1));
    }
}
