use serde::Serialize;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// Verdict codes from linux/netfilter.h and linux/netfilter/nf_tables.h.
const NF_DROP: i32 = 0;
const NF_ACCEPT: i32 = 1;
const NFT_CONTINUE: i32 = -1;
const NFT_RETURN: i32 = -5;

/// Verdicts an access set element can be checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Accept,
    Drop,
    Continue,
    Return,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Accept => "accept",
            VerdictKind::Drop => "drop",
            VerdictKind::Continue => "continue",
            VerdictKind::Return => "return",
        }
    }

    /// Value of `NFTA_VERDICT_CODE` for this verdict.
    pub fn code(&self) -> i32 {
        match self {
            VerdictKind::Accept => NF_ACCEPT,
            VerdictKind::Drop => NF_DROP,
            VerdictKind::Continue => NFT_CONTINUE,
            VerdictKind::Return => NFT_RETURN,
        }
    }

    /// `None` for jump, goto, break and anything else outside the vocabulary.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            NF_ACCEPT => Some(VerdictKind::Accept),
            NF_DROP => Some(VerdictKind::Drop),
            NFT_CONTINUE => Some(VerdictKind::Continue),
            NFT_RETURN => Some(VerdictKind::Return),
            _ => None,
        }
    }
}

impl FromStr for VerdictKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(VerdictKind::Accept),
            "drop" => Ok(VerdictKind::Drop),
            "continue" => Ok(VerdictKind::Continue),
            "return" => Ok(VerdictKind::Return),
            _ => Err(Error::UnsupportedVerdict(s.to_string())),
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
