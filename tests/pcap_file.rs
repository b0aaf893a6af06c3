use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use pcapflow::{CaptureError, FrameBuilder, LinkType, PacketReader, ReaderConfig, RecordingListener};
use tempfile::TempDir;

/// Write a classic little-endian pcap file with Ethernet link type.
fn write_pcap(path: &Path, frames: &[(Duration, Vec<u8>)]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    bytes.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    bytes.extend_from_slice(&65535u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());

    for (ts, data) in frames {
        bytes.extend_from_slice(&(ts.as_secs() as u32).to_le_bytes());
        bytes.extend_from_slice(&ts.subsec_micros().to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(data);
    }

    fs::write(path, bytes).unwrap();
}

fn sample_capture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sample.pcap");
    write_pcap(
        &path,
        &[
            (
                Duration::new(1700000000, 250_000_000),
                FrameBuilder::ethernet().arp().build(),
            ),
            (
                Duration::new(1700000001, 0),
                FrameBuilder::ethernet()
                    .ipv4([10, 0, 0, 1], [10, 0, 0, 2])
                    .tcp(40000, 80, 1000, 0x18)
                    .payload(b"GET / HTTP/1.1\r\n")
                    .build(),
            ),
            (
                Duration::new(1700000002, 0),
                FrameBuilder::ethernet()
                    .ipv4([10, 0, 0, 1], [10, 0, 0, 53])
                    .udp(5353, 53)
                    .payload(b"query")
                    .build(),
            ),
        ],
    );
    path
}

fn recorder() -> Rc<RefCell<RecordingListener>> {
    Rc::new(RefCell::new(RecordingListener::new()))
}

#[test]
fn test_read_pcap_file() {
    let dir = TempDir::new().unwrap();
    let path = sample_capture(&dir);
    let recorder = recorder();
    let mut reader = PacketReader::new(recorder.clone(), ReaderConfig::default());

    assert_eq!(reader.read_file(&path, "").unwrap(), 3);
    assert!(!reader.is_open());

    {
        let recorder = recorder.borrow();
        let capture = &recorder.captures()[0];
        assert_eq!(capture.source, path.display().to_string());
        assert_eq!(capture.link_type, LinkType::ETHERNET);
        assert_eq!(capture.snap_length, 65535);

        let deliveries = recorder.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].summary, "ethernet/arp");
        assert_eq!(deliveries[0].timestamp, Duration::new(1700000000, 250_000_000));
        assert_eq!(deliveries[1].payload, b"GET / HTTP/1.1\r\n".to_vec());
    }

    reader.flush();
    assert_eq!(recorder.borrow().deliveries().len(), 3);
    assert_eq!(recorder.borrow().deliveries()[2].payload, b"query".to_vec());
    assert_eq!(reader.pool().in_use(), 0);
}

#[test]
fn test_filter_applies_to_file() {
    let dir = TempDir::new().unwrap();
    let path = sample_capture(&dir);
    let recorder = recorder();
    let config = ReaderConfig::from_contents("udp_reassembly = false").unwrap();
    let mut reader = PacketReader::new(recorder.clone(), config);

    assert_eq!(reader.read_file(&path, "udp").unwrap(), 1);
    assert_eq!(recorder.borrow().payloads(), vec![b"query".to_vec()]);
}

#[test]
fn test_bad_filter_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = sample_capture(&dir);
    let mut reader = PacketReader::new(recorder(), ReaderConfig::default());

    let err = reader.read_file(&path, "not a (valid filter").unwrap_err();
    assert!(matches!(err, CaptureError::Filter { .. }));
    assert!(!reader.is_open());
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let mut reader = PacketReader::new(recorder(), ReaderConfig::default());

    let err = reader
        .read_file(dir.path().join("absent.pcap"), "")
        .unwrap_err();
    assert!(matches!(err, CaptureError::Open { .. }));
}

#[test]
fn test_broadcast_filter_compiles() {
    let dir = TempDir::new().unwrap();
    let path = sample_capture(&dir);
    let recorder = recorder();
    let mut reader = PacketReader::new(recorder.clone(), ReaderConfig::default());

    // None of the sample destinations are all-ones addresses.
    assert_eq!(reader.read_file(&path, "ip broadcast").unwrap(), 0);
    assert!(recorder.borrow().deliveries().is_empty());
    assert!(!reader.is_open());
}

#[test]
fn test_big_endian_file_snap_length() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.pcap");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xa1b2c3d4u32.to_be_bytes());
    bytes.extend_from_slice(&2u16.to_be_bytes());
    bytes.extend_from_slice(&4u16.to_be_bytes());
    bytes.extend_from_slice(&0i32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&1514u32.to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    fs::write(&path, bytes).unwrap();

    let recorder = recorder();
    let mut reader = PacketReader::new(recorder.clone(), ReaderConfig::default());
    assert_eq!(reader.read_file(&path, "").unwrap(), 0);
    assert_eq!(recorder.borrow().captures()[0].snap_length, 1514);
}
