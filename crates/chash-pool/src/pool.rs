//! The resource pool: capacity accounting and the driver boundary.

use chash_types::{Nexthop, Prefix};
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{PoolError, PoolResult};
use crate::types::{ActualGroup, GroupId, PoolConfig};

/// Driver boundary for hardware group programming.
///
/// The pool performs all accounting itself and notifies the driver of each
/// state change through this trait. Calls are synchronous and bounded; a
/// driver must not block on I/O here. The default [`NullCallbacks`] makes
/// the pool usable standalone in tests and tooling.
pub trait PoolCallbacks: Send + Sync {
    /// A group was allocated and programmed with the given members.
    fn on_group_created(&self, id: GroupId, members: &BTreeSet<Nexthop>, consistent: bool);

    /// An existing group's membership was rewritten in place.
    fn on_group_members_set(&self, id: GroupId, members: &BTreeSet<Nexthop>);

    /// A group was removed from hardware.
    fn on_group_removed(&self, id: GroupId);

    /// Traffic bound to `old` is redirected to `new` (glitch-free cutover).
    fn on_group_replaced(&self, old: GroupId, new: GroupId);

    /// The forwarding entry for `prefix` was bound to `group`.
    fn on_route_programmed(&self, prefix: &Prefix, group: GroupId);
}

/// No-op driver, for tests and standalone use.
#[derive(Debug, Default)]
pub struct NullCallbacks;

impl PoolCallbacks for NullCallbacks {
    fn on_group_created(&self, _id: GroupId, _members: &BTreeSet<Nexthop>, _consistent: bool) {}
    fn on_group_members_set(&self, _id: GroupId, _members: &BTreeSet<Nexthop>) {}
    fn on_group_removed(&self, _id: GroupId) {}
    fn on_group_replaced(&self, _old: GroupId, _new: GroupId) {}
    fn on_route_programmed(&self, _prefix: &Prefix, _group: GroupId) {}
}

/// Fixed-capacity budget of abstract hardware resource units.
///
/// Every live group has a recorded charge; deleting the group refunds
/// exactly that charge, so the committed total can never drift from the
/// sum of live groups. Allocation failures leave the budget untouched.
pub struct ResourcePool {
    config: PoolConfig,
    available: u64,
    /// Charge recorded per live group, refunded on delete.
    charges: HashMap<GroupId, u64>,
    next_id: u64,
    callbacks: Arc<dyn PoolCallbacks>,
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("capacity", &self.config.capacity)
            .field("available", &self.available)
            .field("live_groups", &self.charges.len())
            .finish()
    }
}

impl ResourcePool {
    /// Creates a pool with the given configuration and a no-op driver.
    pub fn new(config: PoolConfig) -> Self {
        let available = config.capacity;
        Self {
            config,
            available,
            charges: HashMap::new(),
            next_id: 1,
            callbacks: Arc::new(NullCallbacks),
        }
    }

    /// Installs the driver callbacks.
    pub fn set_callbacks(&mut self, callbacks: Arc<dyn PoolCallbacks>) {
        self.callbacks = callbacks;
    }

    /// Returns the total budget.
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Returns the unallocated budget.
    pub fn available(&self) -> u64 {
        self.available
    }

    /// Returns the committed cost across all live groups.
    pub fn used(&self) -> u64 {
        self.config.capacity - self.available
    }

    /// Returns the number of live groups.
    pub fn group_count(&self) -> usize {
        self.charges.len()
    }

    /// Allocates and programs a new group.
    ///
    /// Cost is the consistent-hash flat rate or per-member rate depending on
    /// `consistent`. On insufficient capacity nothing is charged and the
    /// caller gets the numbers back in the error.
    pub fn create_group(
        &mut self,
        members: &BTreeSet<Nexthop>,
        consistent: bool,
    ) -> PoolResult<ActualGroup> {
        if members.is_empty() {
            return Err(PoolError::EmptyGroup);
        }

        let cost = self.config.cost_model.group_cost(members.len(), consistent);
        if cost > self.available {
            return Err(PoolError::InsufficientResources {
                required: cost,
                available: self.available,
            });
        }

        self.available -= cost;
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.charges.insert(id, cost);

        self.callbacks.on_group_created(id, members, consistent);
        debug!(
            "pool: created {} ({} members, cost {}, {} left)",
            id,
            members.len(),
            cost,
            self.available
        );

        Ok(ActualGroup::new(id, members.clone(), consistent))
    }

    /// Duplicates an existing group's hardware slot.
    ///
    /// Re-requests allocation with the source group's own mode and members;
    /// same cost and failure rule as [`Self::create_group`].
    pub fn clone_group(&mut self, source: &ActualGroup) -> PoolResult<ActualGroup> {
        self.create_group(source.members(), source.is_consistent())
    }

    /// Overwrites a group's membership in place.
    ///
    /// The group's footprint class does not change, so nothing is
    /// re-charged. Only valid on groups that support in-place membership
    /// change, which in practice means immediately after a clone.
    pub fn align_group(&mut self, group: &mut ActualGroup, members: BTreeSet<Nexthop>) {
        self.callbacks.on_group_members_set(group.id(), &members);
        debug!("pool: aligned {} to {} members", group.id(), members.len());
        group.set_members(members);
    }

    /// Deletes a group, refunding its original charge.
    ///
    /// Consumes the record; the type system rules out freeing a group
    /// twice through the same record. An id the pool has no charge for is
    /// an accounting bug and aborts loudly.
    pub fn delete_group(&mut self, group: ActualGroup) {
        let cost = self
            .charges
            .remove(&group.id())
            .unwrap_or_else(|| panic!("pool: delete of unknown group {}", group.id()));

        self.available += cost;
        self.callbacks.on_group_removed(group.id());
        debug!(
            "pool: deleted {} (refund {}, {} left)",
            group.id(),
            cost,
            self.available
        );
    }

    /// Signals that traffic bound to `old` is redirected to `new`.
    ///
    /// Pure notification; no capacity change.
    pub fn replace_group(&self, old: GroupId, new: GroupId) {
        self.callbacks.on_group_replaced(old, new);
        info!("pool: replaced {} with {}", old, new);
    }

    /// Binds the forwarding entry for `prefix` to `group`.
    pub fn program_route(&self, prefix: &Prefix, group: GroupId) {
        self.callbacks.on_route_programmed(prefix, group);
        debug!("pool: programmed {} -> {}", prefix, group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CostModel;
    use pretty_assertions::assert_eq;

    fn nhset(addrs: &[&str]) -> BTreeSet<Nexthop> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    fn small_pool(capacity: u64) -> ResourcePool {
        ResourcePool::new(PoolConfig {
            capacity,
            cost_model: CostModel {
                consistent_cost: 5,
                member_cost: 1,
            },
        })
    }

    #[test]
    fn test_create_charges_per_member() {
        let mut pool = small_pool(7);
        let group = pool.create_group(&nhset(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), false).unwrap();

        assert_eq!(pool.available(), 4);
        assert_eq!(pool.used(), 3);
        assert_eq!(group.members().len(), 3);
        assert!(group.is_resolved());
        assert!(!group.is_consistent());
    }

    #[test]
    fn test_create_consistent_flat_rate() {
        let mut pool = small_pool(7);
        let group = pool.create_group(&nhset(&["10.0.0.1", "10.0.0.2"]), true).unwrap();

        assert_eq!(pool.available(), 2);
        assert!(group.is_consistent());
    }

    #[test]
    fn test_insufficient_leaves_no_partial_charge() {
        let mut pool = small_pool(2);
        let err = pool
            .create_group(&nhset(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), false)
            .unwrap_err();

        assert_eq!(
            err,
            PoolError::InsufficientResources {
                required: 3,
                available: 2
            }
        );
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.group_count(), 0);
    }

    #[test]
    fn test_delete_refunds_original_cost() {
        let mut pool = small_pool(7);
        let group = pool.create_group(&nhset(&["10.0.0.1", "10.0.0.2"]), false).unwrap();
        assert_eq!(pool.available(), 5);

        pool.delete_group(group);
        assert_eq!(pool.available(), 7);
        assert_eq!(pool.group_count(), 0);
    }

    #[test]
    fn test_align_does_not_recharge() {
        let mut pool = small_pool(10);
        let mut group = pool.create_group(&nhset(&["10.0.0.1", "10.0.0.2"]), false).unwrap();
        let before = pool.available();

        pool.align_group(&mut group, nhset(&["10.0.0.3", "10.0.0.4", "10.0.0.5"]));
        assert_eq!(pool.available(), before);
        assert_eq!(group.members(), &nhset(&["10.0.0.3", "10.0.0.4", "10.0.0.5"]));
    }

    #[test]
    fn test_clone_uses_source_mode_and_members() {
        let mut pool = small_pool(12);
        let group = pool.create_group(&nhset(&["10.0.0.1", "10.0.0.2"]), true).unwrap();
        let clone = pool.clone_group(&group).unwrap();

        assert!(clone.is_consistent());
        assert_eq!(clone.members(), group.members());
        assert_ne!(clone.id(), group.id());
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_empty_group_rejected() {
        let mut pool = small_pool(7);
        assert_eq!(
            pool.create_group(&BTreeSet::new(), false).unwrap_err(),
            PoolError::EmptyGroup
        );
    }

    #[test]
    #[should_panic(expected = "delete of unknown group")]
    fn test_delete_unknown_group_panics() {
        let mut pool = small_pool(7);
        let mut other = small_pool(7);
        let group = other.create_group(&nhset(&["10.0.0.1"]), false).unwrap();
        pool.delete_group(group);
    }
}
