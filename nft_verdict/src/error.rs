use thiserror::Error;

use std::io;

use crate::table::TableRef;

/// Coarse classification of [`Error`] for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed caller input. Retrying with the same input cannot succeed.
    InvalidInput,
    /// The referenced table or set does not exist in the current kernel state.
    NotFound,
    /// Communication with nf_tables failed or its reply could not be interpreted.
    Transport,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),
    #[error("unsupported verdict: {0}")]
    UnsupportedVerdict(String),
    #[error("unsupported table family: {0}")]
    UnsupportedFamily(String),
    #[error("invalid object name {0:?}")]
    InvalidName(String),
    #[error("malformed composite key: {0}")]
    MalformedKey(String),
    #[error("set {set} not found in table {table}")]
    SetNotFound { table: TableRef, set: String },
    #[error("{context}: {source}")]
    Netlink {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("unable to decode netlink reply: {0}")]
    Decode(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAddress(_)
            | Error::UnsupportedVerdict(_)
            | Error::UnsupportedFamily(_)
            | Error::InvalidName(_)
            | Error::MalformedKey(_) => ErrorKind::InvalidInput,
            Error::SetNotFound { .. } => ErrorKind::NotFound,
            Error::Netlink { .. } | Error::Decode(_) => ErrorKind::Transport,
        }
    }

    pub(crate) fn netlink(context: impl Into<String>, source: io::Error) -> Self {
        Error::Netlink {
            context: context.into(),
            source,
        }
    }

    /// True if a dump was cut short by a concurrent ruleset change.
    pub(crate) fn is_dump_interrupted(&self) -> bool {
        matches!(self, Error::Netlink { source, .. } if source.kind() == io::ErrorKind::Interrupted)
    }

    /// True if the kernel answered with `ENOENT`.
    pub(crate) fn is_kernel_not_found(&self) -> bool {
        matches!(self, Error::Netlink { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
