//! nf_tables netlink messages used for read-only queries.
//!
//! Builds `NFT_MSG_GETSET`, `NFT_MSG_GETSETELEM` and `NFT_MSG_GETRULE`
//! requests and decodes the kernel's replies into [`SetElement`]s and rule
//! handles. Layouts follow linux/netlink.h, linux/netfilter/nfnetlink.h and
//! linux/netfilter/nf_tables.h. Header fields are in host byte order,
//! nf_tables payload integers in network byte order.

use crate::error::Error;
use crate::table::{ChainRef, SetRef, TableRef, check_name};
use crate::verdict::VerdictKind;

use super::SetElement;

pub const NLMSG_HDRLEN: usize = 16;
const NFGENMSG_LEN: usize = 4;
const NLA_HDRLEN: usize = 4;
const NLA_ALIGNTO: usize = 4;

pub const NLMSG_NOOP: u16 = 1;
pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;

const NLM_F_REQUEST: u16 = 0x01;
const NLM_F_ACK: u16 = 0x04;
const NLM_F_DUMP: u16 = 0x300;
/// Set on dump parts when the dumped objects changed while the dump ran.
pub const NLM_F_DUMP_INTR: u16 = 0x10;

const NLA_F_NESTED: u16 = 1 << 15;
const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

const NFNETLINK_V0: u8 = 0;
const NFPROTO_UNSPEC: u8 = 0;
const NFNL_SUBSYS_NFTABLES: u16 = 10;

pub const NFT_MSG_NEWRULE: u16 = 6;
const NFT_MSG_GETRULE: u16 = 7;
pub const NFT_MSG_NEWSET: u16 = 9;
const NFT_MSG_GETSET: u16 = 10;
pub const NFT_MSG_NEWSETELEM: u16 = 12;
const NFT_MSG_GETSETELEM: u16 = 13;
pub const NFT_MSG_NEWGEN: u16 = 15;
const NFT_MSG_GETGEN: u16 = 16;

const NFTA_RULE_TABLE: u16 = 1;
const NFTA_RULE_CHAIN: u16 = 2;
const NFTA_RULE_HANDLE: u16 = 3;

const NFTA_SET_TABLE: u16 = 1;
const NFTA_SET_NAME: u16 = 2;

const NFTA_SET_ELEM_LIST_TABLE: u16 = 1;
const NFTA_SET_ELEM_LIST_SET: u16 = 2;
const NFTA_SET_ELEM_LIST_ELEMENTS: u16 = 3;

const NFTA_LIST_ELEM: u16 = 1;

const NFTA_SET_ELEM_KEY: u16 = 1;
const NFTA_SET_ELEM_DATA: u16 = 2;

const NFTA_DATA_VALUE: u16 = 1;
const NFTA_DATA_VERDICT: u16 = 2;

const NFTA_VERDICT_CODE: u16 = 1;

fn align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

fn nft_type(msg: u16) -> u16 {
    (NFNL_SUBSYS_NFTABLES << 8) | msg
}

// ============================================================================
// Requests
// ============================================================================

struct Request {
    buf: Vec<u8>,
}

impl Request {
    fn new(msg: u16, flags: u16, nfproto: u8, seq: u32) -> Self {
        let mut buf = Vec::with_capacity(128);
        // nlmsghdr, length patched in finish()
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&nft_type(msg).to_ne_bytes());
        buf.extend_from_slice(&(NLM_F_REQUEST | flags).to_ne_bytes());
        buf.extend_from_slice(&seq.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        // nfgenmsg
        buf.push(nfproto);
        buf.push(NFNETLINK_V0);
        buf.extend_from_slice(&0u16.to_be_bytes());
        Self { buf }
    }

    fn put_strz(mut self, kind: u16, value: &str) -> Result<Self, Error> {
        check_name(value)?;
        let len = NLA_HDRLEN + value.len() + 1;
        self.buf.extend_from_slice(&(len as u16).to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        self.buf.resize(self.buf.len() + align(len) - len, 0);
        Ok(self)
    }

    fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}

/// Looks up a single set. Answered by one `NFT_MSG_NEWSET` and an ack.
pub fn get_set_request(seq: u32, table: &TableRef, name: &str) -> Result<Vec<u8>, Error> {
    Ok(Request::new(NFT_MSG_GETSET, NLM_F_ACK, table.family.nfproto(), seq)
        .put_strz(NFTA_SET_TABLE, &table.name)?
        .put_strz(NFTA_SET_NAME, name)?
        .finish())
}

/// Dumps the elements of a set. Answered by `NFT_MSG_NEWSETELEM` parts and `NLMSG_DONE`.
pub fn get_set_elements_request(seq: u32, set: &SetRef) -> Result<Vec<u8>, Error> {
    Ok(Request::new(NFT_MSG_GETSETELEM, NLM_F_DUMP, set.table.family.nfproto(), seq)
        .put_strz(NFTA_SET_ELEM_LIST_TABLE, &set.table.name)?
        .put_strz(NFTA_SET_ELEM_LIST_SET, &set.name)?
        .finish())
}

/// Dumps the rules of a chain. Answered by `NFT_MSG_NEWRULE` parts and `NLMSG_DONE`.
pub fn get_rules_request(seq: u32, chain: &ChainRef) -> Result<Vec<u8>, Error> {
    Ok(Request::new(NFT_MSG_GETRULE, NLM_F_DUMP, chain.table.family.nfproto(), seq)
        .put_strz(NFTA_RULE_TABLE, &chain.table.name)?
        .put_strz(NFTA_RULE_CHAIN, &chain.name)?
        .finish())
}

/// Asks for the ruleset generation with an ack.
///
/// The kernel handles requests of one socket in order, so the ack to this
/// request arrives after every reply to a batch sent before it.
pub fn get_gen_request(seq: u32) -> Vec<u8> {
    Request::new(NFT_MSG_GETGEN, NLM_F_ACK, NFPROTO_UNSPEC, seq).finish()
}

// ============================================================================
// Replies
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub kind: u16,
    pub flags: u16,
    pub seq: u32,
    /// Netlink port the message is addressed to.
    pub port: u32,
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    pub fn is_nft(&self, msg: u16) -> bool {
        self.kind == nft_type(msg)
    }

    /// Negative errno of an `NLMSG_ERROR` message, `0` for an ack.
    pub fn is_dump_interrupted(&self) -> bool {
        self.flags & NLM_F_DUMP_INTR != 0
    }

    pub fn error_code(&self) -> Result<i32, Error> {
        let raw = self
            .payload
            .get(..4)
            .ok_or_else(|| Error::Decode("truncated error message".into()))?;
        Ok(i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn attrs(&self) -> Result<Attrs<'a>, Error> {
        self.payload
            .get(NFGENMSG_LEN..)
            .map(Attrs::new)
            .ok_or_else(|| Error::Decode("missing nfgenmsg header".into()))
    }
}

/// Iterates the netlink messages packed into one receive buffer.
pub fn messages(buf: &[u8]) -> Messages<'_> {
    Messages { buf }
}

pub struct Messages<'a> {
    buf: &'a [u8],
}

impl<'a> Iterator for Messages<'a> {
    type Item = Result<Message<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let buf = self.buf;
        if buf.len() < NLMSG_HDRLEN {
            self.buf = &[];
            return Some(Err(Error::Decode(format!("{} trailing bytes", buf.len()))));
        }
        let len = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len < NLMSG_HDRLEN || len > buf.len() {
            self.buf = &[];
            return Some(Err(Error::Decode(format!(
                "message length {len} outside of {} byte buffer",
                buf.len()
            ))));
        }
        self.buf = &buf[align(len).min(buf.len())..];
        Some(Ok(Message {
            kind: u16::from_ne_bytes([buf[4], buf[5]]),
            flags: u16::from_ne_bytes([buf[6], buf[7]]),
            seq: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            port: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
            payload: &buf[NLMSG_HDRLEN..len],
        }))
    }
}

/// Iterates `(type, value)` pairs of a netlink attribute stream.
struct Attrs<'a> {
    buf: &'a [u8],
}

impl<'a> Attrs<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl<'a> Iterator for Attrs<'a> {
    type Item = Result<(u16, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let buf = self.buf;
        if buf.len() < NLA_HDRLEN {
            self.buf = &[];
            return Some(Err(Error::Decode("truncated attribute header".into())));
        }
        let len = u16::from_ne_bytes([buf[0], buf[1]]) as usize;
        if len < NLA_HDRLEN || len > buf.len() {
            self.buf = &[];
            return Some(Err(Error::Decode(format!("attribute length {len} out of bounds"))));
        }
        let kind = u16::from_ne_bytes([buf[2], buf[3]]) & NLA_TYPE_MASK;
        self.buf = &buf[align(len).min(buf.len())..];
        Some(Ok((kind, &buf[NLA_HDRLEN..len])))
    }
}

fn find_attr(buf: &[u8], wanted: u16) -> Result<Option<&[u8]>, Error> {
    for attr in Attrs::new(buf) {
        let (kind, value) = attr?;
        if kind == wanted {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn parse_strz(value: &[u8]) -> Result<String, Error> {
    let end = value.iter().position(|b| *b == 0).unwrap_or(value.len());
    String::from_utf8(value[..end].to_vec()).map_err(|e| Error::Decode(format!("object name: {e}")))
}

/// Name of the set carried by an `NFT_MSG_NEWSET` reply.
pub fn parse_set_name(msg: &Message<'_>) -> Result<String, Error> {
    let value = find_attr(msg.attrs()?.buf, NFTA_SET_NAME)?
        .ok_or_else(|| Error::Decode("set reply without name".into()))?;
    parse_strz(value)
}

/// Elements carried by one `NFT_MSG_NEWSETELEM` dump part.
pub fn parse_set_elements(msg: &Message<'_>) -> Result<Vec<SetElement>, Error> {
    let mut elements = Vec::new();
    for attr in msg.attrs()? {
        let (kind, value) = attr?;
        if kind != NFTA_SET_ELEM_LIST_ELEMENTS {
            continue;
        }
        for elem in Attrs::new(value) {
            let (kind, value) = elem?;
            if kind != NFTA_LIST_ELEM {
                continue;
            }
            if let Some(element) = parse_element(value)? {
                elements.push(element);
            }
        }
    }
    Ok(elements)
}

// Catch-all elements have no key and can never match a lookup.
fn parse_element(buf: &[u8]) -> Result<Option<SetElement>, Error> {
    let mut key = None;
    let mut verdict = None;
    for attr in Attrs::new(buf) {
        let (kind, value) = attr?;
        match kind {
            NFTA_SET_ELEM_KEY => {
                let raw = find_attr(value, NFTA_DATA_VALUE)?
                    .ok_or_else(|| Error::Decode("element key without value".into()))?;
                key = Some(raw.to_vec());
            }
            NFTA_SET_ELEM_DATA => verdict = parse_verdict(value)?,
            _ => {}
        }
    }
    Ok(key.map(|key| SetElement::new(key, verdict)))
}

fn parse_verdict(data: &[u8]) -> Result<Option<VerdictKind>, Error> {
    let Some(verdict) = find_attr(data, NFTA_DATA_VERDICT)? else {
        return Ok(None);
    };
    let code = find_attr(verdict, NFTA_VERDICT_CODE)?
        .ok_or_else(|| Error::Decode("verdict without code".into()))?;
    let code: [u8; 4] = code
        .try_into()
        .map_err(|_| Error::Decode(format!("verdict code of {} bytes", code.len())))?;
    let code = i32::from_be_bytes(code);
    let kind = VerdictKind::from_code(code);
    if kind.is_none() {
        tracing::trace!(code, "element verdict outside of the checked vocabulary");
    }
    Ok(kind)
}

/// Chain name and handle of an `NFT_MSG_NEWRULE` dump part.
pub fn parse_rule(msg: &Message<'_>) -> Result<(String, u64), Error> {
    let attrs = msg.attrs()?.buf;
    let chain = find_attr(attrs, NFTA_RULE_CHAIN)?
        .ok_or_else(|| Error::Decode("rule without chain".into()))
        .and_then(parse_strz)?;
    let handle = find_attr(attrs, NFTA_RULE_HANDLE)?.ok_or_else(|| Error::Decode("rule without handle".into()))?;
    let handle: [u8; 8] = handle
        .try_into()
        .map_err(|_| Error::Decode(format!("rule handle of {} bytes", handle.len())))?;
    Ok((chain, u64::from_be_bytes(handle)))
}
