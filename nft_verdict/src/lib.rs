//! Verdict lookups against nf_tables access sets and atomic chain flushes,
//! serialized over a single netfilter netlink connection.

pub mod config;
pub mod key;
pub mod logging;
pub mod ops;
pub mod table;
pub mod verdict;

mod error;
mod lookup;
mod manager;

pub use error::{Error, ErrorKind};
pub use lookup::contains_verdict;
pub use manager::{ConnectionManager, SetEntry};

pub mod prelude {
    pub use crate::key::{CompositeKey, KeyShape};
    pub use crate::table::{TableFamily, TableRef, WellKnownSet};
    pub use crate::verdict::VerdictKind;
    pub use crate::{ConnectionManager, Error, ErrorKind};
}
