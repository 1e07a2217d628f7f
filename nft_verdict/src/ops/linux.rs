//! Production [`NfTablesOps`] over a netfilter netlink socket.
//!
//! Reads are single nf_tables requests encoded by the [`netlink`](super::netlink)
//! module. Chain flushes are queued and sent on commit as one `nftnl` batch,
//! which the kernel applies all-or-nothing.

use nftnl::{Batch, Chain, FinalizedBatch, MsgType, Rule, Table};

use std::ffi::CString;

use crate::config::{MIN_RECV_BUFFER_SIZE, NetlinkConfig};
use crate::error::Error;
use crate::table::{ChainRef, SetRef, TableRef, check_name};

use super::netlink::{self, Message, NFT_MSG_NEWRULE, NFT_MSG_NEWSET, NFT_MSG_NEWSETELEM};
use super::reply::{self, BatchSync, Exchange};
use super::{NfTablesOps, SetElement};

/// Dumps retried after the kernel flagged them as interrupted.
const DUMP_RETRIES: usize = 3;

/// Single connection to nf_tables.
pub struct NetlinkOps {
    socket: mnl::Socket,
    port: u32,
    seq: u32,
    buffer: Vec<u8>,
    pending: Vec<ChainRef>,
}

// SAFETY: `mnl::Socket` owns a heap allocated `mnl_socket` wrapping a file
// descriptor, with no thread affinity. All access goes through `&mut self`.
unsafe impl Send for NetlinkOps {}

impl NetlinkOps {
    /// Opens and binds a netfilter netlink socket.
    ///
    /// Fails if nf_tables is unreachable, e.g. missing `CAP_NET_ADMIN`.
    pub fn open(config: &NetlinkConfig) -> Result<Self, Error> {
        let socket =
            mnl::Socket::new(mnl::Bus::Netfilter).map_err(|e| Error::netlink("opening netfilter socket", e))?;
        let buffer_size = config
            .recv_buffer_size
            .unwrap_or(nftnl::nft_nlmsg_maxsize() as usize)
            .max(MIN_RECV_BUFFER_SIZE);
        let port = socket.portid();
        tracing::debug!(port, buffer_size, "netfilter socket opened");
        Ok(Self {
            socket,
            port,
            seq: 0,
            buffer: vec![0; buffer_size],
            pending: Vec::new(),
        })
    }

    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    fn recv(&mut self, context: &str) -> Result<usize, Error> {
        let len = self
            .socket
            .recv(&mut self.buffer[..])
            .map_err(|e| Error::netlink(context, e))?;
        if len == 0 {
            return Err(Error::Decode(format!("{context}: netlink socket closed")));
        }
        Ok(len)
    }

    /// Sends one request and passes every reply message to `on_reply` until
    /// the kernel acks, reports an error or completes the dump.
    fn exchange<F>(&mut self, context: &str, request: &[u8], seq: u32, mut on_reply: F) -> Result<(), Error>
    where
        F: FnMut(&Message<'_>) -> Result<(), Error>,
    {
        self.socket
            .send(request)
            .map_err(|e| Error::netlink(context, e))?;

        let mut exchange = Exchange::new(context, seq, self.port);
        loop {
            let len = self.recv(context)?;
            if exchange.feed(&self.buffer[..len], &mut on_reply)? {
                return Ok(());
            }
        }
    }

    fn dump_elements(&mut self, set: &SetRef) -> Result<Vec<SetElement>, Error> {
        let seq = self.next_seq();
        let request = netlink::get_set_elements_request(seq, set)?;
        let context = format!("getting elements from set {}", set.name);

        let mut elements = Vec::new();
        self.exchange(&context, &request, seq, |msg| {
            if msg.is_nft(NFT_MSG_NEWSETELEM) {
                elements.extend(netlink::parse_set_elements(msg)?);
            }
            Ok(())
        })?;
        Ok(elements)
    }
}

impl NfTablesOps for NetlinkOps {
    fn get_set(&mut self, table: &TableRef, name: &str) -> Result<Option<SetRef>, Error> {
        let seq = self.next_seq();
        let request = netlink::get_set_request(seq, table, name)?;
        let context = format!("getting set {name}");

        let mut found = None;
        let res = self.exchange(&context, &request, seq, |msg| {
            if msg.is_nft(NFT_MSG_NEWSET) {
                found = Some(netlink::parse_set_name(msg)?);
            }
            Ok(())
        });
        reply::set_lookup(res.map(|()| found), table)
    }

    fn get_set_elements(&mut self, set: &SetRef) -> Result<Vec<SetElement>, Error> {
        let mut attempt = 1;
        loop {
            match self.dump_elements(set) {
                Err(e) if e.is_dump_interrupted() && attempt < DUMP_RETRIES => {
                    tracing::debug!(%set, attempt, "set changed during dump, retrying");
                    attempt += 1;
                }
                res => return reply::element_dump(res, set),
            }
        }
    }

    fn list_rules(&mut self, chain: &ChainRef) -> Result<Vec<u64>, Error> {
        let seq = self.next_seq();
        let request = netlink::get_rules_request(seq, chain)?;
        let context = format!("listing rules of chain {}", chain.name);

        let mut handles = Vec::new();
        self.exchange(&context, &request, seq, |msg| {
            if msg.is_nft(NFT_MSG_NEWRULE) {
                let (rule_chain, handle) = netlink::parse_rule(msg)?;
                // older kernels ignore the chain filter of a rule dump
                if rule_chain == chain.name {
                    handles.push(handle);
                }
            }
            Ok(())
        })?;
        Ok(handles)
    }

    fn flush_chain(&mut self, chain: &ChainRef) -> Result<(), Error> {
        check_name(&chain.table.name)?;
        check_name(&chain.name)?;
        self.pending.push(chain.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }
        let batch = flush_batch(&pending)?;
        self.socket
            .send_all(&batch)
            .map_err(|e| Error::netlink("sending batch", e))?;

        // rule deletes are not acked, the barrier's ack ends the batch
        let barrier_seq = self.next_seq();
        self.socket
            .send(&netlink::get_gen_request(barrier_seq))
            .map_err(|e| Error::netlink("synchronizing after batch", e))?;

        let mut sync = BatchSync::new(barrier_seq, self.port);
        loop {
            let len = self.recv("committing batch")?;
            if sync.feed(&self.buffer[..len])? {
                return Ok(());
            }
        }
    }
}

fn cstring(name: &str) -> Result<CString, Error> {
    CString::new(name).map_err(|_| Error::InvalidName(name.to_string()))
}

fn flush_batch(chains: &[ChainRef]) -> Result<FinalizedBatch, Error> {
    let mut batch = Batch::new();
    for chain in chains {
        let table_name = cstring(&chain.table.name)?;
        let chain_name = cstring(&chain.name)?;
        let table = Table::new(&table_name, chain.table.family.proto_family());
        let nft_chain = Chain::new(&chain_name, &table);
        // a rule delete without handle removes every rule of the chain
        batch.add(&Rule::new(&nft_chain), MsgType::Del);
    }
    Ok(batch.finalize())
}
