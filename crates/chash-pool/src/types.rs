//! Pool value types: group identifiers, cost model, group records.

use chash_types::Nexthop;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Opaque identifier of a hardware group slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grp:{:#x}", self.0)
    }
}

/// Cost model for group allocation.
///
/// A consistent-hash group occupies a fixed-size bucket table regardless of
/// member count; a plain group is charged per member and must be re-created
/// to change membership.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    /// Flat cost of a consistent-hash group.
    pub consistent_cost: u64,
    /// Cost per member of a plain group.
    pub member_cost: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            consistent_cost: 64,
            member_cost: 1,
        }
    }
}

impl CostModel {
    /// Returns the cost of a group with the given member count and mode.
    pub fn group_cost(&self, member_count: usize, consistent: bool) -> u64 {
        if consistent {
            self.consistent_cost
        } else {
            self.member_cost * member_count as u64
        }
    }
}

/// Configuration for a [`crate::ResourcePool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Total resource budget in abstract units.
    pub capacity: u64,
    /// Cost model for group allocation.
    pub cost_model: CostModel,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            cost_model: CostModel::default(),
        }
    }
}

/// A live hardware group.
///
/// Group records are created and destroyed only through the pool, which
/// tracks the cost charged for each one. The record is owned by whichever
/// desired container the group realizes; deleting it hands the record back
/// to the pool by value, so a group cannot be freed twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActualGroup {
    id: GroupId,
    members: BTreeSet<Nexthop>,
    consistent: bool,
    resolved: bool,
}

impl ActualGroup {
    pub(crate) fn new(id: GroupId, members: BTreeSet<Nexthop>, consistent: bool) -> Self {
        Self {
            id,
            members,
            consistent,
            resolved: true,
        }
    }

    /// Returns the group's hardware identifier.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Returns the member set actually programmed.
    pub fn members(&self) -> &BTreeSet<Nexthop> {
        &self.members
    }

    /// Returns true if this is a consistent-hash group.
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Returns true if the group contains exactly the desired member set.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Marks the group as a degraded fallback (fewer members than desired).
    pub fn mark_unresolved(&mut self) {
        self.resolved = false;
    }

    pub(crate) fn set_members(&mut self, members: BTreeSet<Nexthop>) {
        self.members = members;
    }
}

impl fmt::Display for ActualGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<_> = self.members.iter().map(|nh| nh.to_string()).collect();
        write!(
            f,
            "{} [{}]{}{}",
            self.id,
            members.join(","),
            if self.consistent { " consistent" } else { "" },
            if self.resolved { "" } else { " degraded" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_cost() {
        let model = CostModel {
            consistent_cost: 5,
            member_cost: 1,
        };
        assert_eq!(model.group_cost(3, true), 5);
        assert_eq!(model.group_cost(3, false), 3);
        assert_eq!(model.group_cost(0, false), 0);
    }

    #[test]
    fn test_group_id_display() {
        assert_eq!(GroupId(0x2a).to_string(), "grp:0x2a");
    }
}
