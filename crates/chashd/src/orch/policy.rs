//! Allocation policy: full groups first, degraded fallback second.
//!
//! Allocation never blocks a route operation. When the pool cannot fit the
//! full group, the policy settles for a single randomly chosen next-hop in
//! a plain group (one working path beats none) and leaves restoring the
//! full set to the periodic pass.

use chash_types::Nexthop;
use log::{debug, error, info, warn};
use rand::seq::IteratorRandom;
use std::collections::BTreeSet;

use crate::container::{ContainerState, DcId};
use crate::orch::engine::ConsistentHashOrch;
use chash_pool::ActualGroup;

/// Which tier of the allocator succeeded.
#[derive(Debug)]
pub(crate) enum AcquiredGroup {
    /// The full desired set, in the current admin mode.
    Full(ActualGroup),
    /// A degraded single-next-hop plain group.
    Partial(ActualGroup),
}

impl ConsistentHashOrch {
    /// Allocates a group for a container, degrading on exhaustion.
    ///
    /// On full-tier failure the system-wide resolution (and, if held,
    /// stability) is surrendered before the fallback is attempted; the
    /// duplicate optimizer that runs on that transition may merge the
    /// container away, in which case there is nothing left to allocate.
    pub(crate) fn allocate_group(&mut self, id: DcId) {
        let Some(dc) = self.container(id) else {
            return;
        };
        let nhset = dc.nhset().clone();

        let consistent = self.admin_mode();
        match self.pool_mut().create_group(&nhset, consistent) {
            Ok(group) => {
                self.install_group(id, group);
                self.container_mut(id).unwrap().set_state(ContainerState::Resolved);
                info!("container {}: allocated full group", id);
                return;
            }
            Err(err) => {
                warn!("container {}: full allocation failed ({}), degrading", id, err);
            }
        }

        self.enter_not_resolved();

        if !self.has_container(id) {
            return;
        }

        match self.acquire_group(&nhset, true, true) {
            Some(AcquiredGroup::Partial(group)) | Some(AcquiredGroup::Full(group)) => {
                self.install_group(id, group);
                self.container_mut(id).unwrap().set_state(ContainerState::Partial);
                self.stats_mut().fallback_allocations += 1;
                warn!("container {}: running on single-next-hop fallback", id);
            }
            None => {
                self.container_mut(id).unwrap().set_state(ContainerState::Failed);
                self.stats_mut().failed_allocations += 1;
                error!("container {}: no resources even for fallback", id);
            }
        }
    }

    /// Two-tier group acquisition with no state machine side effects.
    ///
    /// `fallback_allowed` gates the degraded tier; `force_partial` skips
    /// straight to it (for callers that already know the full tier will
    /// not fit). Returns `None` when every permitted tier is exhausted.
    pub(crate) fn acquire_group(
        &mut self,
        nhset: &BTreeSet<Nexthop>,
        fallback_allowed: bool,
        force_partial: bool,
    ) -> Option<AcquiredGroup> {
        if !force_partial {
            let consistent = self.admin_mode();
            match self.pool_mut().create_group(nhset, consistent) {
                Ok(group) => return Some(AcquiredGroup::Full(group)),
                Err(err) => {
                    if !fallback_allowed {
                        debug!("full allocation failed, fallback disabled: {}", err);
                        return None;
                    }
                    debug!("full allocation failed, trying degraded tier: {}", err);
                }
            }
        }

        let nh = nhset.iter().copied().choose(&mut rand::thread_rng())?;
        let single: BTreeSet<Nexthop> = BTreeSet::from([nh]);

        match self.pool_mut().create_group(&single, false) {
            Ok(mut group) => {
                group.mark_unresolved();
                Some(AcquiredGroup::Partial(group))
            }
            Err(err) => {
                debug!("degraded allocation failed: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orch::engine::ChashOrchConfig;
    use chash_pool::{CostModel, PoolConfig, ResourcePool};
    use std::time::Duration;

    fn nhset(addrs: &[&str]) -> BTreeSet<Nexthop> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    fn engine(capacity: u64) -> ConsistentHashOrch {
        let pool = ResourcePool::new(PoolConfig {
            capacity,
            cost_model: CostModel {
                consistent_cost: 5,
                member_cost: 1,
            },
        });
        ConsistentHashOrch::new(
            ChashOrchConfig {
                stable_hysteresis: Duration::ZERO,
                admin_consistent: false,
            },
            pool,
        )
    }

    #[test]
    fn test_acquire_full_tier() {
        let mut orch = engine(8);
        let got = orch.acquire_group(&nhset(&["10.0.0.1", "10.0.0.2"]), true, false);
        assert!(matches!(got, Some(AcquiredGroup::Full(_))));
        assert_eq!(orch.pool().used(), 2);
    }

    #[test]
    fn test_acquire_falls_back_to_partial() {
        let mut orch = engine(1);
        let got = orch
            .acquire_group(&nhset(&["10.0.0.1", "10.0.0.2"]), true, false)
            .unwrap();

        let AcquiredGroup::Partial(group) = got else {
            panic!("expected degraded tier");
        };
        assert_eq!(group.members().len(), 1);
        assert!(!group.is_resolved());
        assert!(group.members().is_subset(&nhset(&["10.0.0.1", "10.0.0.2"])));
    }

    #[test]
    fn test_acquire_fallback_disabled() {
        let mut orch = engine(1);
        let got = orch.acquire_group(&nhset(&["10.0.0.1", "10.0.0.2"]), false, false);
        assert!(got.is_none());
        assert_eq!(orch.pool().used(), 0);
    }

    #[test]
    fn test_acquire_force_partial_skips_full_tier() {
        let mut orch = engine(8);
        let got = orch
            .acquire_group(&nhset(&["10.0.0.1", "10.0.0.2"]), true, true)
            .unwrap();

        assert!(matches!(got, AcquiredGroup::Partial(_)));
        assert_eq!(orch.pool().used(), 1);
    }

    #[test]
    fn test_acquire_nothing_fits() {
        let mut orch = engine(0);
        let got = orch.acquire_group(&nhset(&["10.0.0.1", "10.0.0.2"]), true, false);
        assert!(got.is_none());
    }
}
