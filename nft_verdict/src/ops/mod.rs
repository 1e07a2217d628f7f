//! Abstraction over the nf_tables transport for testability.
//!
//! Defines [`NfTablesOps`], the capability set the verdict queries and the
//! chain controller need from the kernel: resolve a set, fetch its elements,
//! list a chain's rules, queue a chain flush and commit queued changes.
//!
//! Production code uses [`NetlinkOps`] (Linux only).
//! Tests use a stateful fake (see `mocks` module).

use crate::error::Error;
use crate::table::{ChainRef, SetRef, TableRef};
use crate::verdict::VerdictKind;

pub mod netlink;
pub(crate) mod reply;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(test)]
pub(crate) mod mocks;

#[cfg(target_os = "linux")]
pub use linux::NetlinkOps;

/// One element of a set snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetElement {
    pub key: Vec<u8>,
    /// Attached verdict, `None` for plain sets, value maps and verdicts
    /// outside [`VerdictKind`] (jump, goto).
    pub verdict: Option<VerdictKind>,
}

impl SetElement {
    pub fn new(key: Vec<u8>, verdict: Option<VerdictKind>) -> Self {
        Self { key, verdict }
    }
}

/// Abstraction over nf_tables operations.
///
/// Implementors hold connection state and are driven through `&mut self`;
/// [`ConnectionManager`](crate::ConnectionManager) provides the serialization.
pub trait NfTablesOps: Send {
    /// Looks up a set by name. `Ok(None)` if the table or set does not exist.
    fn get_set(&mut self, table: &TableRef, name: &str) -> Result<Option<SetRef>, Error>;

    /// Fetches every element of the set as currently present in the kernel.
    fn get_set_elements(&mut self, set: &SetRef) -> Result<Vec<SetElement>, Error>;

    /// Lists the handles of the rules currently in a chain.
    fn list_rules(&mut self, chain: &ChainRef) -> Result<Vec<u64>, Error>;

    /// Queues removal of every rule in a chain. Takes effect on [`commit`](Self::commit).
    ///
    /// A failed call leaves nothing queued.
    fn flush_chain(&mut self, chain: &ChainRef) -> Result<(), Error>;

    /// Applies all queued changes as one transaction.
    ///
    /// The queue is emptied whether or not the commit succeeds.
    fn commit(&mut self) -> Result<(), Error>;
}
