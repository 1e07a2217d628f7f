//! References to nf_tables objects and the fixed naming contract the
//! gateway provisions its tables with.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Table that every set lookup is resolved in.
pub const LOOKUP_TABLE: &str = "filter";

const DST_ACCESS_SUFFIX: &str = "_dst_access";
const SRC_ACCESS_SUFFIX: &str = "_src_access";

const NFT_NAME_MAXLEN: usize = 256;

/// nf_tables address family of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFamily {
    #[default]
    Inet,
    #[serde(rename = "ip")]
    Ipv4,
    #[serde(rename = "ip6")]
    Ipv6,
    Arp,
    Bridge,
    Netdev,
}

impl TableFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableFamily::Inet => "inet",
            TableFamily::Ipv4 => "ip",
            TableFamily::Ipv6 => "ip6",
            TableFamily::Arp => "arp",
            TableFamily::Bridge => "bridge",
            TableFamily::Netdev => "netdev",
        }
    }

    /// `NFPROTO_*` value carried in the nfgenmsg header.
    pub fn nfproto(&self) -> u8 {
        match self {
            TableFamily::Inet => 1,
            TableFamily::Ipv4 => 2,
            TableFamily::Arp => 3,
            TableFamily::Netdev => 5,
            TableFamily::Bridge => 7,
            TableFamily::Ipv6 => 10,
        }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn proto_family(&self) -> nftnl::ProtoFamily {
        match self {
            TableFamily::Inet => nftnl::ProtoFamily::Inet,
            TableFamily::Ipv4 => nftnl::ProtoFamily::Ipv4,
            TableFamily::Ipv6 => nftnl::ProtoFamily::Ipv6,
            TableFamily::Arp => nftnl::ProtoFamily::Arp,
            TableFamily::Bridge => nftnl::ProtoFamily::Bridge,
            TableFamily::Netdev => nftnl::ProtoFamily::NetDev,
        }
    }
}

impl FromStr for TableFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inet" => Ok(TableFamily::Inet),
            "ip" => Ok(TableFamily::Ipv4),
            "ip6" => Ok(TableFamily::Ipv6),
            "arp" => Ok(TableFamily::Arp),
            "bridge" => Ok(TableFamily::Bridge),
            "netdev" => Ok(TableFamily::Netdev),
            _ => Err(Error::UnsupportedFamily(s.to_string())),
        }
    }
}

impl fmt::Display for TableFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub family: TableFamily,
    pub name: String,
}

impl TableRef {
    pub fn new(family: TableFamily, name: impl Into<String>) -> Self {
        Self {
            family,
            name: name.into(),
        }
    }

    /// The `inet filter` table holding all access sets.
    pub fn lookup() -> Self {
        Self::new(TableFamily::Inet, LOOKUP_TABLE)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetRef {
    pub table: TableRef,
    pub name: String,
}

impl fmt::Display for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.table, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainRef {
    pub table: TableRef,
    pub name: String,
}

impl ChainRef {
    pub fn new(table: TableRef, name: impl Into<String>) -> Self {
        Self {
            table,
            name: name.into(),
        }
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.table, self.name)
    }
}

/// Access sets every gateway provisions in the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownSet {
    InternetAccess,
    DnsAccess,
    LanAccess,
}

impl WellKnownSet {
    pub fn name(&self) -> &'static str {
        match self {
            WellKnownSet::InternetAccess => "internet_access",
            WellKnownSet::DnsAccess => "dns_access",
            WellKnownSet::LanAccess => "lan_access",
        }
    }
}

pub fn zone_dst_set(zone: &str) -> String {
    format!("{zone}{DST_ACCESS_SUFFIX}")
}

pub fn zone_src_set(zone: &str) -> String {
    format!("{zone}{SRC_ACCESS_SUFFIX}")
}

/// Rejects names the kernel could never hold: they travel NUL-terminated
/// and are limited to `NFT_NAME_MAXLEN` bytes including the terminator.
pub(crate) fn check_name(name: &str) -> Result<(), Error> {
    if name.len() >= NFT_NAME_MAXLEN || name.as_bytes().contains(&0) {
        Err(Error::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
