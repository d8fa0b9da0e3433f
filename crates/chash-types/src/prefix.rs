//! Canonicalized IP prefix type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP prefix in CIDR notation, canonicalized at construction.
///
/// Host bits below the mask are cleared, so `192.168.1.1/24` and
/// `192.168.1.0/24` produce the same prefix and therefore the same route
/// key. Equality and ordering operate on the canonical (network, length)
/// pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Prefix {
    network: IpAddr,
    len: u8,
}

impl Prefix {
    /// Creates a prefix from an address and mask length, masking host bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the length exceeds the maximum for the address
    /// family (/32 for IPv4, /128 for IPv6).
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, ParseError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if len > max {
            return Err(ParseError::InvalidPrefixLength { len, max });
        }

        let network = match addr {
            IpAddr::V4(v4) => {
                let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
            }
            IpAddr::V6(v6) => {
                let mask = if len == 0 {
                    0
                } else {
                    u128::MAX << (128 - len)
                };
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
            }
        };

        Ok(Prefix { network, len })
    }

    /// Returns the network address (host bits cleared).
    pub const fn network(&self) -> IpAddr {
        self.network
    }

    /// Returns the mask length in bits.
    pub const fn len(&self) -> u8 {
        self.len
    }

    /// Returns true if this is the default route (0.0.0.0/0 or ::/0).
    pub fn is_default(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

impl FromStr for Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let addr: IpAddr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr_str.to_string()))?;
        let len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        Prefix::new(addr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_and_display() {
        let prefix: Prefix = "10.0.0.0/24".parse().unwrap();
        assert_eq!(prefix.to_string(), "10.0.0.0/24");
        assert_eq!(prefix.len(), 24);
    }

    #[test]
    fn test_host_bits_are_masked() {
        let a: Prefix = "192.168.1.1/24".parse().unwrap();
        let b: Prefix = "192.168.1.0/24".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_v6_masking() {
        let prefix: Prefix = "2001:db8::dead:beef/32".parse().unwrap();
        assert_eq!(prefix.to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_default_route() {
        let v4: Prefix = "0.0.0.0/0".parse().unwrap();
        assert!(v4.is_default());

        let v6: Prefix = "::/0".parse().unwrap();
        assert!(v6.is_default());
    }

    #[test]
    fn test_invalid_length() {
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
        assert!("2001:db8::/129".parse::<Prefix>().is_err());
    }

    #[test]
    fn test_missing_mask() {
        assert!("10.0.0.0".parse::<Prefix>().is_err());
    }
}
