//! Route entry types.

use chash_types::{Nexthop, Prefix};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::container::DcId;

/// A routing entry: a prefix, its desired next-hop set, and the desired
/// container currently realizing that set.
///
/// There is exactly one route per prefix; a second add for the same prefix
/// is a change and mutates the entry in place. The container reference is a
/// handle into the engine's container arena, never an owning pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    prefix: Prefix,
    nhset: BTreeSet<Nexthop>,
    container: DcId,
}

impl Route {
    /// Creates a route bound to the given container.
    pub fn new(prefix: Prefix, nhset: BTreeSet<Nexthop>, container: DcId) -> Self {
        Self {
            prefix,
            nhset,
            container,
        }
    }

    /// Returns the route's prefix (the unique key).
    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// Returns the desired next-hop set.
    pub fn nhset(&self) -> &BTreeSet<Nexthop> {
        &self.nhset
    }

    /// Replaces the desired next-hop set wholesale.
    pub fn set_nhset(&mut self, nhset: BTreeSet<Nexthop>) {
        self.nhset = nhset;
    }

    /// Returns the id of the container this route is attached to.
    pub fn container(&self) -> DcId {
        self.container
    }

    /// Re-points the route at another container.
    pub fn set_container(&mut self, container: DcId) {
        self.container = container;
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nexthops: Vec<_> = self.nhset.iter().map(|nh| nh.to_string()).collect();
        write!(f, "{} -> [{}]", self.prefix, nexthops.join(","))
    }
}

/// The route index, keyed by canonical prefix.
pub type RouteTable = HashMap<Prefix, Route>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nhset(addrs: &[&str]) -> BTreeSet<Nexthop> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_route_display() {
        let route = Route::new(
            "10.0.0.0/24".parse().unwrap(),
            nhset(&["10.1.0.1", "10.1.0.2"]),
            DcId(1),
        );
        assert_eq!(route.to_string(), "10.0.0.0/24 -> [10.1.0.1,10.1.0.2]");
    }

    #[test]
    fn test_route_change_in_place() {
        let mut route = Route::new(
            "10.0.0.0/24".parse().unwrap(),
            nhset(&["10.1.0.1"]),
            DcId(1),
        );

        route.set_nhset(nhset(&["10.1.0.2", "10.1.0.3"]));
        route.set_container(DcId(2));

        assert_eq!(route.nhset(), &nhset(&["10.1.0.2", "10.1.0.3"]));
        assert_eq!(route.container(), DcId(2));
    }
}
