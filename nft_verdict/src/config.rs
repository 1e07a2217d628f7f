use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::path::Path;

use crate::table::{LOOKUP_TABLE, TableFamily, TableRef};

pub const DEFAULT_PATH: &str = "/etc/nft-verdict/config.toml";

const SUPPORTED_VERSION: i64 = 1;

/// Smallest receive buffer that holds a full page of netlink replies.
pub const MIN_RECV_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration file not found")]
    NoFile,
    #[error("Unable to determine configuration version")]
    VersionNotFound,
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    TomlDeserialization(#[from] toml::de::Error),
    #[error("Unsupported config version: {0}")]
    VersionMismatch(i64),
    #[error("netlink.recv_buffer_size {0} is below the minimum of {min} bytes", min = MIN_RECV_BUFFER_SIZE)]
    RecvBufferTooSmall(usize),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lookup: LookupConfig,
    pub netlink: NetlinkConfig,
}

/// Table the access sets are resolved in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub family: TableFamily,
    pub table: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            family: TableFamily::Inet,
            table: LOOKUP_TABLE.to_string(),
        }
    }
}

impl LookupConfig {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.family, self.table.clone())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetlinkConfig {
    /// Receive buffer for kernel replies, defaults to libnftnl's maximum message size.
    pub recv_buffer_size: Option<usize>,
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        match self.netlink.recv_buffer_size {
            Some(size) if size < MIN_RECV_BUFFER_SIZE => Err(Error::RecvBufferTooSmall(size)),
            _ => Ok(()),
        }
    }

    /// Reads the configuration at `path`, or at [`DEFAULT_PATH`] when `None`.
    ///
    /// A missing file at the default path yields the default configuration,
    /// a missing file at an explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => read(path),
            None => match read(Path::new(DEFAULT_PATH)) {
                Err(Error::NoFile) => {
                    tracing::debug!(path = DEFAULT_PATH, "no configuration file - using defaults");
                    Ok(Config::default())
                }
                res => res,
            },
        }
    }
}

pub fn read(path: &Path) -> Result<Config, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoFile
        } else {
            Error::IO(e)
        }
    })?;

    let table = content.parse::<toml::Table>()?;
    let version = table
        .get("version")
        .and_then(|v| v.as_integer())
        .ok_or(Error::VersionNotFound)?;
    if version != SUPPORTED_VERSION {
        return Err(Error::VersionMismatch(version));
    }

    for key in wrong_keys(&table) {
        tracing::warn!(%key, "ignoring unsupported key in configuration file");
    }
    let config = toml::from_str::<Config>(&content)?;
    config.validate()?;
    Ok(config)
}

fn wrong_keys(table: &toml::Table) -> Vec<String> {
    let mut wrong = Vec::new();
    for (key, value) in table {
        let known: &[&str] = match key.as_str() {
            "version" => continue,
            "lookup" => &["family", "table"],
            "netlink" => &["recv_buffer_size"],
            _ => {
                wrong.push(key.clone());
                continue;
            }
        };
        if let Some(section) = value.as_table() {
            wrong.extend(
                section
                    .keys()
                    .filter(|k| !known.contains(&k.as_str()))
                    .map(|k| format!("{key}.{k}")),
            );
        }
    }
    wrong
}
