// Public modules and re-exports
pub mod config;
pub mod create;
pub mod error;
pub mod event_loop;
pub mod ledger;
pub mod loopback;
pub mod mmap;
pub mod ring;
pub mod socket;
pub mod stats;
pub mod umem;

pub use config::{Direction, XdpConfig};
pub use error::{RingError, Violation, XdpError};
pub use event_loop::{CANCEL_CHECK_INTERVAL, EventLoop, LoopReport};
pub use kick::XskFd;
pub use ledger::{FrameLedger, Owner};
pub use loopback::{KernelSim, LoopbackNotifier, RingKind, loopback};
pub use ring::{ConsRing, ProdRing, XdpDesc};
pub use send::SendBatch;
pub use socket::{
    Discard, NoPackets, Notifier, PacketHandler, PacketSource, Readiness, RxFrame, ShutdownReport,
    Socket,
};
pub use stats::{Stats, StatsSnapshot};
pub use umem::Umem;

// Batch operations on `Socket`, hidden from documentation
#[doc(hidden)]
pub mod kick;
#[doc(hidden)]
pub mod poll;
#[doc(hidden)]
pub mod receive;
#[doc(hidden)]
pub mod send;

#[cfg(test)]
mod tests;
