//! Frame ownership ledger.
//!
//! Records, per frame, which party holds it. Every ring transfer is checked
//! against the holder the protocol expects, so a frame that shows up in two
//! rings at once, or a foreign address, is caught at the step that breaks
//! the cycle:
//!
//! ```text
//! RX: App -> FillRing -> KernelRx -> RxRing -> App -> FillRing ...
//! TX: App -> TxRing -> KernelTx -> CompletionRing -> App ...
//! ```
//!
//! The endpoint cannot see the kernel-side steps of a real socket, so it
//! accepts any holder along the path it is closing (`RX_PATH`, `TX_PATH`).
//! The loopback peer performs the kernel-side steps itself and checks them
//! strictly.

use crate::error::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    App,
    FillRing,
    KernelRx,
    RxRing,
    TxRing,
    KernelTx,
    CompletionRing,
}

/// Holders a frame may have between entering the fill ring and being
/// delivered on the rx ring.
pub const RX_PATH: &[Owner] = &[Owner::FillRing, Owner::KernelRx, Owner::RxRing];

/// Holders a frame may have between entering the tx ring and coming back on
/// the completion ring.
pub const TX_PATH: &[Owner] = &[Owner::TxRing, Owner::KernelTx, Owner::CompletionRing];

#[derive(Debug)]
pub struct FrameLedger {
    frame_size: u64,
    owners: Vec<Owner>,
}

impl FrameLedger {
    /// A ledger where every frame starts out held by the application.
    pub fn new(frame_size: u32, frame_count: u32) -> Self {
        FrameLedger {
            frame_size: frame_size as u64,
            owners: vec![Owner::App; frame_count as usize],
        }
    }

    fn index(&self, addr: u64) -> Result<usize, Violation> {
        let index = (addr / self.frame_size) as usize;
        if index >= self.owners.len() {
            return Err(Violation::InvalidAddress { addr, len: 0 });
        }
        Ok(index)
    }

    pub fn owner(&self, addr: u64) -> Result<Owner, Violation> {
        Ok(self.owners[self.index(addr)?])
    }

    /// Moves the frame at `addr` to `to`, provided it is held by one of `from`.
    pub fn transfer(&mut self, addr: u64, from: &[Owner], to: Owner) -> Result<(), Violation> {
        let index = self.index(addr)?;
        let actual = self.owners[index];
        if !from.contains(&actual) {
            return Err(Violation::OwnershipConflict {
                addr,
                actual,
                expected: from.to_vec(),
            });
        }
        self.owners[index] = to;
        Ok(())
    }

    /// Number of frames currently held by `owner`.
    pub fn count(&self, owner: Owner) -> usize {
        self.owners.iter().filter(|&&o| o == owner).count()
    }

    pub fn frame_count(&self) -> usize {
        self.owners.len()
    }
}
