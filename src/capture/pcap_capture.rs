//! libpcap-based capture implementation.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use pcap::{Activated, Active, Capture, Device, Offline, PacketHeader};

use super::{CaptureBackend, CaptureHandle, LiveOptions};
use crate::domain::{Frame, LinkType};
use crate::error::CaptureError;

const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;
/// Offset of the snapshot length in a classic pcap global header
const PCAP_SNAPLEN_OFFSET: usize = 16;

const PCAPNG_SECTION_HEADER: u32 = 0x0a0d_0d0a;
const PCAPNG_INTERFACE_DESCRIPTION: u32 = 0x0000_0001;
const PCAPNG_BYTE_ORDER_MAGIC: u32 = 0x1a2b_3c4d;

/// Bytes of a capture file read to find its snapshot length
const HEADER_READ_LIMIT: u64 = 64 * 1024;

/// Opens captures through libpcap.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcapBackend;

impl PcapBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureBackend for PcapBackend {
    type Handle = PcapHandle;

    fn open_file(&mut self, path: &Path) -> Result<PcapHandle, CaptureError> {
        let capture = Capture::from_file(path).map_err(|e| CaptureError::Open {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(PcapHandle::Offline {
            capture,
            snap_length: file_snap_length(path),
        })
    }

    fn open_live(&mut self, device: &str, options: &LiveOptions) -> Result<PcapHandle, CaptureError> {
        let open_error = |e: pcap::Error| CaptureError::Open {
            source_name: device.to_string(),
            message: e.to_string(),
        };

        let timeout_ms = i32::try_from(options.read_timeout.as_millis()).unwrap_or(i32::MAX);
        let snaplen = i32::try_from(options.snaplen).unwrap_or(i32::MAX);

        let capture = Capture::from_device(device)
            .map_err(open_error)?
            .promisc(options.promiscuous)
            .snaplen(snaplen)
            .timeout(timeout_ms)
            .open()
            .map_err(open_error)?;

        Ok(PcapHandle::Live {
            capture,
            snap_length: options.snaplen,
            batch_limit: options.batch_limit,
        })
    }
}

/// An open libpcap capture.
pub enum PcapHandle {
    Offline {
        capture: Capture<Offline>,
        snap_length: u32,
    },
    Live {
        capture: Capture<Active>,
        snap_length: u32,
        batch_limit: usize,
    },
}

impl CaptureHandle for PcapHandle {
    fn link_type(&self) -> LinkType {
        match self {
            PcapHandle::Offline { capture, .. } => LinkType(capture.get_datalink().0),
            PcapHandle::Live { capture, .. } => LinkType(capture.get_datalink().0),
        }
    }

    fn snap_length(&self) -> u32 {
        match self {
            PcapHandle::Offline { snap_length, .. } | PcapHandle::Live { snap_length, .. } => {
                *snap_length
            }
        }
    }

    fn apply_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
        let result = match self {
            PcapHandle::Offline { capture, .. } => capture.filter(expression, true),
            PcapHandle::Live { capture, .. } => capture.filter(expression, true),
        };
        result.map_err(|e| CaptureError::Filter {
            filter: expression.to_string(),
            message: e.to_string(),
        })
    }

    fn dispatch(&mut self, callback: &mut dyn FnMut(Frame<'_>)) -> Result<usize, CaptureError> {
        match self {
            PcapHandle::Offline { capture, .. } => pump(capture, 0, callback),
            PcapHandle::Live {
                capture,
                batch_limit,
                ..
            } => pump(capture, *batch_limit, callback),
        }
    }
}

/// Read frames until the source runs dry, the read times out, or `limit`
/// frames have been delivered (`0` for no limit).
fn pump<T: Activated + ?Sized>(
    capture: &mut Capture<T>,
    limit: usize,
    callback: &mut dyn FnMut(Frame<'_>),
) -> Result<usize, CaptureError> {
    let mut count = 0;

    while limit == 0 || count < limit {
        match capture.next_packet() {
            Ok(packet) => {
                let frame = Frame::new(timestamp(packet.header), packet.data)
                    .with_wire_len(packet.header.len as usize);
                callback(frame);
                count += 1;
            }
            Err(pcap::Error::NoMorePackets) | Err(pcap::Error::TimeoutExpired) => break,
            Err(e) => return Err(CaptureError::Read(e.to_string())),
        }
    }

    Ok(count)
}

fn timestamp(header: &PacketHeader) -> Duration {
    let secs = u64::try_from(header.ts.tv_sec).unwrap_or(0);
    let micros = u32::try_from(header.ts.tv_usec).unwrap_or(0);
    Duration::new(secs, micros.saturating_mul(1000))
}

/// Snapshot length recorded in a capture file, `0` if it cannot be read.
fn file_snap_length(path: &Path) -> u32 {
    let mut head = Vec::new();
    let read = File::open(path).and_then(|file| file.take(HEADER_READ_LIMIT).read_to_end(&mut head));
    match read {
        Ok(_) => header_snap_length(&head).unwrap_or(0),
        Err(e) => {
            tracing::debug!("Could not read header of {}: {}", path.display(), e);
            0
        }
    }
}

/// Snapshot length from a classic pcap global header, or from the first
/// interface description block of a pcapng file.
fn header_snap_length(head: &[u8]) -> Option<u32> {
    let magic = read_u32(head, 0, false)?;
    match magic {
        PCAP_MAGIC_MICROS | PCAP_MAGIC_NANOS => read_u32(head, PCAP_SNAPLEN_OFFSET, false),
        m if matches!(m.swap_bytes(), PCAP_MAGIC_MICROS | PCAP_MAGIC_NANOS) => {
            read_u32(head, PCAP_SNAPLEN_OFFSET, true)
        }
        PCAPNG_SECTION_HEADER => {
            let big_endian = match read_u32(head, 8, false)? {
                PCAPNG_BYTE_ORDER_MAGIC => false,
                m if m.swap_bytes() == PCAPNG_BYTE_ORDER_MAGIC => true,
                _ => return None,
            };
            let section_len = read_u32(head, 4, big_endian)? as usize;
            if read_u32(head, section_len, big_endian)? != PCAPNG_INTERFACE_DESCRIPTION {
                return None;
            }
            // block type, block length, link type + reserved, then snaplen
            read_u32(head, section_len.checked_add(12)?, big_endian)
        }
        _ => None,
    }
}

fn read_u32(bytes: &[u8], offset: usize, big_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    })
}

/// List capture devices, one line per device.
pub fn list_interfaces() -> Result<Vec<String>, CaptureError> {
    let devices = Device::list().map_err(|e| CaptureError::Interfaces(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|device| {
            let status = if device.flags.is_up() { "UP" } else { "DOWN" };
            let addrs: Vec<_> = device
                .addresses
                .iter()
                .map(|address| address.addr.to_string())
                .collect();
            format!(
                "{}: {} [{}]",
                device.name,
                status,
                if addrs.is_empty() {
                    "no IP".to_string()
                } else {
                    addrs.join(", ")
                }
            )
        })
        .collect())
}
