//! Shared plumbing of the `xdp-rx` and `xdp-tx` binaries and the veth test:
//! capability checks, logging, dummy Ethernet frames and running an event
//! loop on a blocking thread until Ctrl-C.

pub mod veth;

use std::fmt::Write as _;

use anyhow::{Context as _, bail};
use caps::{CapSet, Capability};
use etherparse::{EtherType, Ethernet2Header};
use eui48::MacAddress;
use tokio_util::sync::CancellationToken;
use xdp_engine::PacketSource;

/// Capabilities an AF_XDP socket needs.
pub const REQUIRED_CAPS: &[Capability] = &[Capability::CAP_NET_ADMIN, Capability::CAP_NET_RAW];

/// IEEE 802 local experimental EtherType, used for the dummy frames.
pub const DUMMY_ETHER_TYPE: EtherType = EtherType(0x88b5);

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Fails unless every capability in `required` is in the effective set.
pub fn require_caps(required: &[Capability]) -> anyhow::Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter_map(|&cap| match caps::has_cap(None, CapSet::Effective, cap) {
            Ok(true) => None,
            Ok(false) => Some(cap.to_string()),
            Err(e) => Some(format!("{cap} ({e})")),
        })
        .collect();
    if !missing.is_empty() {
        bail!("missing capabilities: {}", missing.join(", "));
    }
    Ok(())
}

/// Like [`require_caps`], reporting instead of failing.
pub fn has_caps(required: &[Capability]) -> bool {
    require_caps(required)
        .inspect_err(|e| log::warn!("{e}"))
        .is_ok()
}

/// Parses `aa:bb:cc:dd:ee:ff` (or `-` separated) into raw bytes.
pub fn parse_mac(s: &str) -> Result<[u8; 6], String> {
    MacAddress::parse_str(s)
        .map(|mac| mac.to_array())
        .map_err(|e| format!("invalid MAC address {s:?}: {e}"))
}

/// Uppercase hex of `data` without separators.
pub fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Packet source of `count` identical Ethernet frames of `size` bytes:
/// an Ethernet II header followed by zeros.
#[derive(Debug, Clone)]
pub struct DummyFrames {
    header: [u8; Ethernet2Header::LEN],
    size: usize,
    remaining: u64,
}

impl DummyFrames {
    pub fn new(src: [u8; 6], dst: [u8; 6], size: usize, count: u64) -> anyhow::Result<Self> {
        if size < Ethernet2Header::LEN {
            bail!(
                "frame size {size} is smaller than an Ethernet header ({} bytes)",
                Ethernet2Header::LEN
            );
        }
        let header = Ethernet2Header {
            source: src,
            destination: dst,
            ether_type: DUMMY_ETHER_TYPE,
        };
        Ok(DummyFrames {
            header: header.to_bytes(),
            size,
            remaining: count,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl PacketSource for DummyFrames {
    fn next_packet(&mut self, frame: &mut [u8]) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let size = self.size.min(frame.len());
        let frame = &mut frame[..size];
        frame.fill(0);
        frame[..self.header.len()].copy_from_slice(&self.header);
        self.remaining -= 1;
        Some(size)
    }
}

/// Runs `work` on a blocking thread and cancels `token` on Ctrl-C.
pub async fn run_until_ctrl_c<F, T>(token: CancellationToken, work: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let worker = tokio::task::spawn_blocking(work);
    let stop = token.clone();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    log::error!("cannot listen for Ctrl-C: {e}");
                    return;
                }
                log::info!("interrupted, stopping");
                stop.cancel();
            }
            _ = stop.cancelled() => {}
        }
    });
    let result = worker.await.context("event loop thread panicked")?;
    token.cancel();
    let _ = watcher.await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("ab:cd:ef:ab:cd:ef").unwrap(),
            [0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef]
        );
        assert_eq!(
            parse_mac("01-23-45-67-89-01").unwrap(),
            [0x01, 0x23, 0x45, 0x67, 0x89, 0x01]
        );
        assert!(parse_mac("01:23:45").is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x7f]), "00AB7F");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_dummy_frames() {
        let src = [0x01, 0x23, 0x45, 0x67, 0x89, 0x01];
        let dst = [0xab, 0xcd, 0xef, 0xab, 0xcd, 0xef];
        let mut frames = DummyFrames::new(src, dst, 60, 2).unwrap();
        let mut buf = [0xffu8; 2048];

        assert_eq!(frames.next_packet(&mut buf), Some(60));
        let (eth, rest) = Ethernet2Header::from_slice(&buf[..60]).unwrap();
        assert_eq!(eth.destination, dst);
        assert_eq!(eth.source, src);
        assert_eq!(eth.ether_type, DUMMY_ETHER_TYPE);
        assert!(rest.iter().all(|&b| b == 0));

        assert_eq!(frames.next_packet(&mut buf), Some(60));
        assert_eq!(frames.next_packet(&mut buf), None);
        assert_eq!(frames.remaining(), 0);
    }

    #[test]
    fn test_dummy_frames_rejects_runts() {
        assert!(DummyFrames::new([0; 6], [0; 6], 10, 1).is_err());
    }
}
