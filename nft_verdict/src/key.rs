//! Composite keys of access set elements.
//!
//! The access sets are provisioned with keys concatenated from raw field
//! bytes, joined by a single separator byte:
//!
//! | Shape                          | Layout                                   |
//! |--------------------------------|------------------------------------------|
//! | [`KeyShape::AddrIface`]        | `<4 byte IPv4> '.' <iface>`              |
//! | [`KeyShape::AddrIfaceHwaddr`]  | `<4 byte IPv4> '.' <iface> '.' <hwaddr>` |
//!
//! The address is stored in network order (the octets as written). Any
//! drift from this layout makes lookups miss, so [`CompositeKey::decode`]
//! mirrors [`CompositeKey::encode`] exactly.

use serde::Serialize;

use std::net::{IpAddr, Ipv4Addr};

use crate::error::Error;

pub const FIELD_SEPARATOR: u8 = b'.';

const ADDR_LEN: usize = 4;

/// Schema of a set's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// Address and interface, used by the well-known and zone sets.
    AddrIface,
    /// Address, interface and hardware address.
    AddrIfaceHwaddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeKey {
    pub addr: Ipv4Addr,
    pub iface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hwaddr: Option<String>,
}

impl CompositeKey {
    pub fn new(addr: Ipv4Addr, iface: impl Into<String>) -> Self {
        Self {
            addr,
            iface: iface.into(),
            hwaddr: None,
        }
    }

    pub fn with_hwaddr(addr: Ipv4Addr, iface: impl Into<String>, hwaddr: impl Into<String>) -> Self {
        Self {
            addr,
            iface: iface.into(),
            hwaddr: Some(hwaddr.into()),
        }
    }

    pub fn shape(&self) -> KeyShape {
        match self.hwaddr {
            Some(_) => KeyShape::AddrIfaceHwaddr,
            None => KeyShape::AddrIface,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let hw_len = self.hwaddr.as_ref().map_or(0, |hw| hw.len() + 1);
        let mut key = Vec::with_capacity(ADDR_LEN + 1 + self.iface.len() + hw_len);
        key.extend_from_slice(&self.addr.octets());
        key.push(FIELD_SEPARATOR);
        key.extend_from_slice(self.iface.as_bytes());
        if let Some(hwaddr) = &self.hwaddr {
            key.push(FIELD_SEPARATOR);
            key.extend_from_slice(hwaddr.as_bytes());
        }
        key
    }

    /// Decodes a raw element key of the given shape.
    ///
    /// Interface names may themselves contain the separator (VLAN devices
    /// such as `eth0.100`), hardware-address strings may not: a 3-field key
    /// is split at its last separator.
    pub fn decode(raw: &[u8], shape: KeyShape) -> Result<Self, Error> {
        if raw.len() < ADDR_LEN + 1 {
            return Err(Error::MalformedKey(format!("{} bytes is shorter than address and separator", raw.len())));
        }
        let (addr, rest) = raw.split_at(ADDR_LEN);
        let addr = Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]);
        let fields = match rest.split_first() {
            Some((&FIELD_SEPARATOR, fields)) => fields,
            _ => return Err(Error::MalformedKey("missing separator after address".into())),
        };
        let fields = std::str::from_utf8(fields).map_err(|e| Error::MalformedKey(e.to_string()))?;

        match shape {
            KeyShape::AddrIface => Ok(Self::new(addr, fields)),
            KeyShape::AddrIfaceHwaddr => {
                let (iface, hwaddr) = fields
                    .rsplit_once(FIELD_SEPARATOR as char)
                    .ok_or_else(|| Error::MalformedKey("missing separator before hardware address".into()))?;
                Ok(Self::with_hwaddr(addr, iface, hwaddr))
            }
        }
    }
}

/// Parses the textual address of a device.
///
/// IPv4-mapped IPv6 notation (`::ffff:10.0.0.5`) is reduced to its IPv4 form.
pub fn parse_ipv4(ip: &str) -> Result<Ipv4Addr, Error> {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(addr)) => addr
            .to_ipv4_mapped()
            .ok_or_else(|| Error::InvalidAddress(ip.to_string())),
        Err(_) => Err(Error::InvalidAddress(ip.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    const ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    #[test]
    fn test_two_field_layout() {
        let key = CompositeKey::new(ADDR, "eth0").encode();
        assert_eq!(key, [10, 0, 0, 5, b'.', b'e', b't', b'h', b'0']);
    }

    #[test]
    fn test_three_field_layout() {
        let key = CompositeKey::with_hwaddr(ADDR, "wlan0", "aa:bb:cc:dd:ee:ff").encode();
        let mut expected = vec![10, 0, 0, 5, b'.'];
        expected.extend_from_slice(b"wlan0.aa:bb:cc:dd:ee:ff");
        assert_eq!(key, expected);
    }

    #[test]
    fn test_interface_length_never_collides() {
        let short = CompositeKey::with_hwaddr(ADDR, "eth1", "aa:bb:cc:dd:ee:ff").encode();
        let long = CompositeKey::with_hwaddr(ADDR, "eth10", "aa:bb:cc:dd:ee:ff").encode();
        assert_ne!(short.len(), long.len());
        assert_ne!(short, long);

        let short = CompositeKey::new(ADDR, "wg").encode();
        let long = CompositeKey::new(ADDR, "wg0").encode();
        assert!(long.starts_with(&short));
        assert_ne!(short, long);
    }

    #[rstest]
    #[case(CompositeKey::new(ADDR, "eth0"))]
    #[case(CompositeKey::new(Ipv4Addr::new(192, 168, 1, 9), "eth0.100"))]
    #[case(CompositeKey::with_hwaddr(ADDR, "wlan0", "aa:bb:cc:dd:ee:ff"))]
    #[case(CompositeKey::with_hwaddr(ADDR, "br-lan.20", "02:00:00:00:00:01"))]
    fn test_encode_decode_encode(#[case] key: CompositeKey) {
        let raw = key.encode();
        let decoded = CompositeKey::decode(&raw, key.shape()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.encode(), raw);
    }

    #[rstest]
    #[case(&[10, 0, 0][..])]
    #[case(&[10, 0, 0, 5][..])]
    #[case(&[10, 0, 0, 5, b':', b'e'][..])]
    fn test_decode_rejects_truncated(#[case] raw: &[u8]) {
        assert!(matches!(
            CompositeKey::decode(raw, KeyShape::AddrIface),
            Err(Error::MalformedKey(_))
        ));
    }

    #[test]
    fn test_decode_three_field_needs_hwaddr() {
        let raw = CompositeKey::new(ADDR, "eth0").encode();
        assert!(matches!(
            CompositeKey::decode(&raw, KeyShape::AddrIfaceHwaddr),
            Err(Error::MalformedKey(_))
        ));
    }

    #[rstest]
    #[case("10.0.0.5", ADDR)]
    #[case("::ffff:10.0.0.5", ADDR)]
    fn test_parse_ipv4(#[case] text: &str, #[case] expected: Ipv4Addr) {
        assert_eq!(parse_ipv4(text).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("10.0.0")]
    #[case("10.0.0.256")]
    #[case("fe80::1")]
    #[case("eth0")]
    fn test_parse_ipv4_rejects(#[case] text: &str) {
        assert!(matches!(parse_ipv4(text), Err(Error::InvalidAddress(a)) if a == text));
    }
}
