//! Next-hop identity type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A single forwarding destination, identified by its IP address.
///
/// Next-hops are immutable and totally ordered; sets of next-hops are kept
/// in `BTreeSet<Nexthop>` so that two sets with the same members compare
/// equal regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nexthop(IpAddr);

impl Nexthop {
    /// Creates a next-hop from an IP address.
    pub const fn new(addr: IpAddr) -> Self {
        Nexthop(addr)
    }

    /// Returns the underlying IP address.
    pub const fn ip(&self) -> IpAddr {
        self.0
    }

    /// Returns true if this is an IPv4 next-hop.
    pub const fn is_ipv4(&self) -> bool {
        self.0.is_ipv4()
    }
}

impl fmt::Display for Nexthop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Nexthop {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(Nexthop)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<IpAddr> for Nexthop {
    fn from(addr: IpAddr) -> Self {
        Nexthop(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[test]
    fn test_parse_v4_and_v6() {
        let v4: Nexthop = "10.0.0.1".parse().unwrap();
        assert!(v4.is_ipv4());
        assert_eq!(v4.to_string(), "10.0.0.1");

        let v6: Nexthop = "2001:db8::1".parse().unwrap();
        assert!(!v6.is_ipv4());
    }

    #[test]
    fn test_parse_invalid() {
        assert!("not-an-address".parse::<Nexthop>().is_err());
        assert!("10.0.0".parse::<Nexthop>().is_err());
    }

    #[test]
    fn test_set_is_order_independent() {
        let a: Nexthop = "10.0.0.1".parse().unwrap();
        let b: Nexthop = "10.0.0.2".parse().unwrap();
        let c: Nexthop = "10.0.0.3".parse().unwrap();

        let forward: BTreeSet<Nexthop> = [a, b, c].into_iter().collect();
        let reverse: BTreeSet<Nexthop> = [c, b, a].into_iter().collect();
        assert_eq!(forward, reverse);
    }
}
