//! Error types.
//!
//! Construction failures (`XdpError`) propagate straight to the caller.
//! Ring contention is not an error at all: a short `reserve`/`peek` is a
//! normal return value. `RingError` covers what is left once contention is
//! absorbed: protocol violations, which poison the endpoint, and a fill ring
//! that stays starved past the retry budget.

use std::io;

use crate::ledger::Owner;

/// A broken ring or ownership invariant. Always a bug on one side of the
/// rings, never a runtime condition to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("submit of {requested} slots exceeds the {reserved} reserved")]
    SubmitOverflow { requested: u32, reserved: u32 },

    #[error("release of {requested} entries exceeds the {peeked} peeked")]
    ReleaseOverflow { requested: u32, peeked: u32 },

    #[error("cancel of {requested} exceeds the {outstanding} outstanding")]
    CancelOverflow { requested: u32, outstanding: u32 },

    #[error("ring index {index} is outside the open window")]
    SlotOutOfWindow { index: u32 },

    #[error("address {addr:#x} (+{len}) does not lie inside a single frame")]
    InvalidAddress { addr: u64, len: u32 },

    #[error("frame index {0} is out of range")]
    InvalidFrameIndex(u32),

    #[error("frame {addr:#x} is held by {actual:?}, expected one of {expected:?}")]
    OwnershipConflict {
        addr: u64,
        actual: Owner,
        expected: Vec<Owner>,
    },
}

/// Failure of a ring-level or batch operation.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    /// The fill ring had no room for recycled frames after every retry.
    /// Means the fill ring is undersized for the frames in circulation.
    #[error("fill ring could not take {needed} frames after {attempts} attempts")]
    FillStarved { needed: u32, attempts: u32 },

    /// The endpoint hit a protocol violation earlier and refuses further work.
    #[error("endpoint aborted after a protocol violation")]
    Aborted,
}

impl RingError {
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, RingError::ProtocolViolation(_))
    }
}

/// Failure to build, bind or drive an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum XdpError {
    #[error("failed to allocate UMEM: {0}")]
    Allocation(#[source] io::Error),

    #[error("failed to bind to {device} queue {queue_id}: {source}")]
    Bind {
        device: String,
        queue_id: u32,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Violation> for XdpError {
    fn from(v: Violation) -> Self {
        XdpError::Ring(RingError::ProtocolViolation(v))
    }
}
