//! # Engine Configuration
//!
//! Every tunable the engine needs is carried by [`XdpConfig`] and handed over
//! at construction; nothing is read from global state afterwards.
//! `apply_env` lets the binaries overlay `XDP_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::XdpError;
use crate::mmap::page_size;

/// Smallest frame the kernel accepts in aligned UMEM mode.
pub const MIN_FRAME_SIZE: u32 = 2048;

/// Which half of the engine a socket serves.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Transmit only: every frame is available for outgoing packets.
    Tx,
    /// Receive only: every frame circulates through the fill ring.
    Rx,
    /// Both: the first half of the pool receives, the second half transmits.
    Both,
}

impl Direction {
    pub fn has_rx(self) -> bool {
        self != Direction::Tx
    }

    pub fn has_tx(self) -> bool {
        self != Direction::Rx
    }
}

/// Configuration for a socket endpoint and its event loop.
#[derive(Debug, Clone)]
pub struct XdpConfig {
    /// Bytes per UMEM frame, a power of two.
    pub frame_size: u32,
    /// Number of frames in the UMEM.
    pub frame_count: u32,
    /// Upper bound of descriptors handled per batch.
    pub batch_size: u32,
    pub fill_ring_size: u32,
    pub completion_ring_size: u32,
    pub rx_ring_size: u32,
    pub tx_ring_size: u32,
    pub direction: Direction,
    /// `Some(true)` forces `XDP_ZEROCOPY`, `Some(false)` forces `XDP_COPY`,
    /// `None` leaves the choice to the driver.
    pub zero_copy: Option<bool>,
    /// `None` uses huge pages when free 2 MiB pages are available.
    pub huge_page: Option<bool>,
    /// Bind with `XDP_USE_NEED_WAKEUP`. Without it every batch notifies.
    pub need_wakeup: bool,
    /// Attempts made to get ring space before a batch gives up.
    pub retry_budget: u32,
    /// Timeout of one event loop wait; `None` waits until the kernel signals,
    /// checking for cancellation every `CANCEL_CHECK_INTERVAL`.
    pub poll_timeout: Option<Duration>,
    /// Wait between completion drains during shutdown.
    pub shutdown_poll: Duration,
    /// Track frame ownership and reject descriptors naming frames the
    /// expected side does not hold.
    pub track_ownership: bool,
}

impl Default for XdpConfig {
    fn default() -> Self {
        XdpConfig {
            frame_size: 2048,
            frame_count: 4096,
            batch_size: 64,
            fill_ring_size: 2048,
            completion_ring_size: 2048,
            rx_ring_size: 2048,
            tx_ring_size: 2048,
            direction: Direction::Both,
            zero_copy: None,
            huge_page: None,
            need_wakeup: true,
            retry_budget: 64,
            poll_timeout: Some(Duration::from_millis(100)),
            shutdown_poll: Duration::from_millis(1),
            track_ownership: cfg!(debug_assertions),
        }
    }
}

impl XdpConfig {
    /// Sets all four ring sizes at once.
    pub fn with_ring_size(mut self, size: u32) -> Self {
        self.fill_ring_size = size;
        self.completion_ring_size = size;
        self.rx_ring_size = size;
        self.tx_ring_size = size;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> Result<(), XdpError> {
        let page = page_size() as u32;
        if !self.frame_size.is_power_of_two()
            || self.frame_size < MIN_FRAME_SIZE
            || self.frame_size > page
        {
            return Err(XdpError::Config(format!(
                "frame size {} must be a power of two in {MIN_FRAME_SIZE}..={page}",
                self.frame_size
            )));
        }
        if self.frame_count == 0 {
            return Err(XdpError::Config("frame count must not be zero".into()));
        }
        for (name, size) in [
            ("fill", self.fill_ring_size),
            ("completion", self.completion_ring_size),
            ("rx", self.rx_ring_size),
            ("tx", self.tx_ring_size),
        ] {
            if !size.is_power_of_two() {
                return Err(XdpError::Config(format!(
                    "{name} ring size {size} must be a non-zero power of two"
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(XdpError::Config("batch size must not be zero".into()));
        }
        if self.batch_size > self.rx_ring_size || self.batch_size > self.tx_ring_size {
            return Err(XdpError::Config(format!(
                "batch size {} exceeds the rx or tx ring",
                self.batch_size
            )));
        }
        if self.retry_budget == 0 {
            return Err(XdpError::Config("retry budget must not be zero".into()));
        }
        if self.fill_ring_size < self.rx_ring_size {
            log::warn!(
                "fill ring ({}) is smaller than the rx ring ({}); receive batches may starve",
                self.fill_ring_size,
                self.rx_ring_size
            );
        }
        Ok(())
    }

    /// Overlays `XDP_*` environment variables onto this configuration.
    ///
    /// Recognised: `XDP_FRAME_SIZE`, `XDP_FRAME_COUNT`, `XDP_BATCH_SIZE`,
    /// `XDP_RING_SIZE`, `XDP_ZERO_COPY`, `XDP_HUGE_PAGE`, `XDP_NEED_WAKEUP`,
    /// `XDP_RETRY_BUDGET`, `XDP_POLL_TIMEOUT_MS` (0 waits for the kernel).
    pub fn apply_env(self) -> Result<Self, XdpError> {
        self.apply_vars(|key| env::var(key).ok())
    }

    pub(crate) fn apply_vars<F>(mut self, lookup: F) -> Result<Self, XdpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parsed::<u32>(&lookup, "XDP_FRAME_SIZE")? {
            self.frame_size = v;
        }
        if let Some(v) = parsed::<u32>(&lookup, "XDP_FRAME_COUNT")? {
            self.frame_count = v;
        }
        if let Some(v) = parsed::<u32>(&lookup, "XDP_BATCH_SIZE")? {
            self.batch_size = v;
        }
        if let Some(v) = parsed::<u32>(&lookup, "XDP_RING_SIZE")? {
            self = self.with_ring_size(v);
        }
        if let Some(v) = flag(&lookup, "XDP_ZERO_COPY")? {
            self.zero_copy = Some(v);
        }
        if let Some(v) = flag(&lookup, "XDP_HUGE_PAGE")? {
            self.huge_page = Some(v);
        }
        if let Some(v) = flag(&lookup, "XDP_NEED_WAKEUP")? {
            self.need_wakeup = v;
        }
        if let Some(v) = parsed::<u32>(&lookup, "XDP_RETRY_BUDGET")? {
            self.retry_budget = v;
        }
        if let Some(ms) = parsed::<u64>(&lookup, "XDP_POLL_TIMEOUT_MS")? {
            self.poll_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(self)
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, XdpError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| XdpError::Config(format!("{key}={raw:?} is not a number")))
        })
        .transpose()
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>, XdpError> {
    lookup(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(XdpError::Config(format!("{key}={raw:?} is not a boolean"))),
        })
        .transpose()
}
