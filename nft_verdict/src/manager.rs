//! Serialized access to the single nf_tables connection.
//!
//! [`ConnectionManager`] owns the transport behind one mutex. Every public
//! operation holds that mutex from input validation until its last kernel
//! round trip returns, so no two operations interleave on the connection and
//! a query never observes a flush that is only half sent.
//!
//! Answers are `Result<bool, Error>` throughout: `Ok(false)` means the kernel
//! state was read and holds no such verdict, an `Err` means it could not be
//! determined.

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Error;
use crate::key::{CompositeKey, KeyShape, parse_ipv4};
use crate::lookup;
use crate::ops::NfTablesOps;
use crate::table::{ChainRef, TableFamily, TableRef, WellKnownSet, zone_dst_set, zone_src_set};
use crate::verdict::VerdictKind;

#[cfg(target_os = "linux")]
use crate::config::Config;
#[cfg(target_os = "linux")]
use crate::ops::NetlinkOps;

/// Decoded element of an access set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetEntry {
    pub key: CompositeKey,
    pub verdict: Option<VerdictKind>,
}

pub struct ConnectionManager<T: NfTablesOps> {
    table: TableRef,
    ops: Mutex<T>,
}

#[cfg(target_os = "linux")]
impl ConnectionManager<NetlinkOps> {
    /// Connects to nf_tables with the default configuration.
    pub fn open() -> Result<Self, Error> {
        Self::open_with(&Config::default())
    }

    pub fn open_with(config: &Config) -> Result<Self, Error> {
        let ops = NetlinkOps::open(&config.netlink)?;
        Ok(Self::with_table(ops, config.lookup.table_ref()))
    }
}

impl<T: NfTablesOps> ConnectionManager<T> {
    /// Manages `ops`, resolving sets in the `inet filter` table.
    pub fn new(ops: T) -> Self {
        Self::with_table(ops, TableRef::lookup())
    }

    pub fn with_table(ops: T, table: TableRef) -> Self {
        Self {
            table,
            ops: Mutex::new(ops),
        }
    }

    pub fn lookup_table(&self) -> &TableRef {
        &self.table
    }

    /// Checks `set` for an `<ip>.<iface>` element carrying `verdict`.
    pub fn has_verdict(&self, ip: &str, iface: &str, set: &str, verdict: &str) -> Result<bool, Error> {
        let mut ops = self.ops.lock();
        let addr = parse_ipv4(ip)?;
        let verdict = verdict.parse::<VerdictKind>()?;
        let key = CompositeKey::new(addr, iface);
        lookup::has_element_verdict(&mut *ops, &self.table, set, &key.encode(), verdict)
    }

    /// Checks `set` for an `<ip>.<iface>.<mac>` element carrying `verdict`.
    pub fn has_verdict_mac(&self, ip: &str, mac: &str, iface: &str, set: &str, verdict: &str) -> Result<bool, Error> {
        let mut ops = self.ops.lock();
        let addr = parse_ipv4(ip)?;
        let verdict = verdict.parse::<VerdictKind>()?;
        let key = CompositeKey::with_hwaddr(addr, iface, mac);
        lookup::has_element_verdict(&mut *ops, &self.table, set, &key.encode(), verdict)
    }

    /// [`has_verdict`](Self::has_verdict) on one of the well-known access sets.
    pub fn has_access(&self, set: WellKnownSet, ip: &str, iface: &str, verdict: &str) -> Result<bool, Error> {
        self.has_verdict(ip, iface, set.name(), verdict)
    }

    /// True if the zone lets the device through in both directions: its
    /// `<zone>_dst_access` element continues and its `<zone>_src_access`
    /// element accepts.
    ///
    /// The source set is only queried when the destination check passed.
    pub fn has_custom_verdict(&self, zone: &str, ip: &str, iface: &str) -> Result<bool, Error> {
        let mut ops = self.ops.lock();
        let addr = parse_ipv4(ip)?;
        let key = CompositeKey::new(addr, iface).encode();

        let dst_set = zone_dst_set(zone);
        if !lookup::has_element_verdict(&mut *ops, &self.table, &dst_set, &key, VerdictKind::Continue)? {
            tracing::debug!(%zone, %ip, %iface, "no continue verdict in destination access set");
            return Ok(false);
        }

        let src_set = zone_src_set(zone);
        lookup::has_element_verdict(&mut *ops, &self.table, &src_set, &key, VerdictKind::Accept)
    }

    /// Decodes every element of `set` with a key of the given shape.
    ///
    /// Elements whose key does not decode under `shape` are skipped.
    pub fn set_entries(&self, set: &str, shape: KeyShape) -> Result<Vec<SetEntry>, Error> {
        let mut ops = self.ops.lock();
        let set = lookup::resolve_set(&mut *ops, &self.table, set)?;
        let elements = lookup::fetch_elements(&mut *ops, &set)?;

        let total = elements.len();
        let entries: Vec<SetEntry> = elements
            .into_iter()
            .filter_map(|elem| {
                CompositeKey::decode(&elem.key, shape).ok().map(|key| SetEntry {
                    key,
                    verdict: elem.verdict,
                })
            })
            .collect();
        if entries.len() < total {
            tracing::debug!(%set, skipped = total - entries.len(), ?shape, "skipped elements of a different key shape");
        }
        Ok(entries)
    }

    /// Removes every rule from a chain in one transaction.
    ///
    /// On error the chain keeps its previous rules.
    pub fn flush_chain(&self, family: TableFamily, table: &str, chain: &str) -> Result<(), Error> {
        let mut ops = self.ops.lock();
        let chain = ChainRef::new(TableRef::new(family, table), chain);
        ops.flush_chain(&chain)?;
        ops.commit()?;
        tracing::info!(%chain, "flushed chain");
        Ok(())
    }

    /// Handles of the rules currently in a chain.
    pub fn list_chain_rules(&self, family: TableFamily, table: &str, chain: &str) -> Result<Vec<u64>, Error> {
        let mut ops = self.ops.lock();
        let chain = ChainRef::new(TableRef::new(family, table), chain);
        ops.list_rules(&chain)
    }
}
