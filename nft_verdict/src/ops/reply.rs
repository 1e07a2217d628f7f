//! Receive-side bookkeeping for nf_tables requests and batches.
//!
//! The socket loop in the Linux transport only receives buffers; deciding
//! which messages belong to the request, when the kernel is done answering
//! and which errno ends the exchange happens here, over plain byte buffers.

use std::io;

use crate::error::Error;
use crate::table::{SetRef, TableRef};

use super::SetElement;
use super::netlink::{self, Message, NLMSG_DONE, NLMSG_ERROR, NLMSG_NOOP};

/// Tracks the replies to one request.
///
/// Messages with another sequence number or port are leftovers of earlier
/// exchanges and are skipped. A dump part flagged `NLM_F_DUMP_INTR` fails the
/// exchange: the snapshot it belongs to is torn.
pub struct Exchange<'c> {
    context: &'c str,
    seq: u32,
    port: u32,
    failure: Option<Error>,
}

impl<'c> Exchange<'c> {
    /// `port` 0 accepts messages for any port.
    pub fn new(context: &'c str, seq: u32, port: u32) -> Self {
        Self {
            context,
            seq,
            port,
            failure: None,
        }
    }

    /// Processes one receive buffer, passing every nf_tables message of this
    /// exchange to `on_reply`.
    ///
    /// Returns `Ok(true)` once the kernel acked the request or completed the
    /// dump, `Ok(false)` while more replies are due. A failing `on_reply`
    /// does not stop the exchange: the rest of the reply is still consumed
    /// and the failure returned at its end.
    pub fn feed<F>(&mut self, buf: &[u8], on_reply: &mut F) -> Result<bool, Error>
    where
        F: FnMut(&Message<'_>) -> Result<(), Error>,
    {
        for msg in netlink::messages(buf) {
            let msg = msg?;
            if !self.owns(&msg) {
                continue;
            }
            match msg.kind {
                NLMSG_NOOP => {}
                NLMSG_ERROR | NLMSG_DONE => {
                    // DONE may carry the errno of a dump that failed midway
                    let code = if msg.kind == NLMSG_DONE && msg.payload.len() < 4 {
                        0
                    } else {
                        msg.error_code()?
                    };
                    if code < 0 {
                        return Err(Error::netlink(self.context, io::Error::from_raw_os_error(-code)));
                    }
                    return self.failure.take().map_or(Ok(true), Err);
                }
                _ if self.failure.is_some() => {}
                _ if msg.is_dump_interrupted() => {
                    self.failure = Some(Error::netlink(
                        self.context,
                        io::Error::new(io::ErrorKind::Interrupted, "dump interrupted by a concurrent change"),
                    ));
                }
                _ => {
                    if let Err(e) = on_reply(&msg) {
                        self.failure = Some(e);
                    }
                }
            }
        }
        Ok(false)
    }

    fn owns(&self, msg: &Message<'_>) -> bool {
        if msg.seq != self.seq || (self.port != 0 && msg.port != self.port) {
            tracing::warn!(seq = msg.seq, port = msg.port, expected = self.seq, kind = msg.kind, "skipping stale netlink reply");
            return false;
        }
        true
    }
}

/// Tracks the outcome of a batch followed by an acked barrier request.
///
/// Batch messages only get an answer when they fail, so success is only
/// known once the barrier is acked. Replies to earlier requests are drained
/// before a batch is sent, so any errno ahead of the barrier's ack belongs to
/// the batch.
pub struct BatchSync {
    barrier_seq: u32,
    port: u32,
    failure: Option<Error>,
}

impl BatchSync {
    pub fn new(barrier_seq: u32, port: u32) -> Self {
        Self {
            barrier_seq,
            port,
            failure: None,
        }
    }

    /// Returns `Ok(true)` once the barrier is acked and no batch message
    /// failed, the first batch errno once the barrier is answered.
    pub fn feed(&mut self, buf: &[u8]) -> Result<bool, Error> {
        for msg in netlink::messages(buf) {
            let msg = msg?;
            if msg.kind != NLMSG_ERROR || (self.port != 0 && msg.port != self.port) {
                continue;
            }
            let code = msg.error_code()?;
            if msg.seq == self.barrier_seq {
                if let Some(e) = self.failure.take() {
                    return Err(e);
                }
                if code < 0 {
                    return Err(Error::netlink("synchronizing after batch", io::Error::from_raw_os_error(-code)));
                }
                return Ok(true);
            }
            if code < 0 && self.failure.is_none() {
                tracing::debug!(seq = msg.seq, errno = -code, "batch message rejected");
                self.failure = Some(Error::netlink("committing batch", io::Error::from_raw_os_error(-code)));
            }
        }
        Ok(false)
    }
}

/// Result of a set lookup: the kernel's ENOENT means no such table or set.
pub fn set_lookup(res: Result<Option<String>, Error>, table: &TableRef) -> Result<Option<SetRef>, Error> {
    match res {
        Ok(name) => Ok(name.map(|name| SetRef {
            table: table.clone(),
            name,
        })),
        Err(e) if e.is_kernel_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Result of an element dump: ENOENT means the set was removed after lookup.
pub fn element_dump(res: Result<Vec<SetElement>, Error>, set: &SetRef) -> Result<Vec<SetElement>, Error> {
    match res {
        Err(e) if e.is_kernel_not_found() => Err(Error::SetNotFound {
            table: set.table.clone(),
            set: set.name.clone(),
        }),
        res => res,
    }
}
