//! NIC round-trip capability consumed by the measurement loops.

pub mod raw;

use anyhow::Result;

pub use raw::RawSocketTester;

/// One send/receive round-trip capability.
///
/// `receive` returning `Ok(false)` signals an unrecoverable receive failure
/// and must terminate the run; errors from either operation are treated the
/// same way at the call site. With no tester configured the sender
/// degenerates to a pure periodic cyclic loop.
pub trait NicTester: Send + Sync {
    fn send(&self) -> Result<()>;
    fn receive(&self) -> Result<bool>;
}
