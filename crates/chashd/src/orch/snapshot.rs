//! Queryable engine snapshot.
//!
//! A point-in-time, serializable copy of the route index, container arena,
//! group registry and system state, for tests and tooling. Not a
//! stability-guaranteed API.

use serde::Serialize;

use crate::container::{ContainerState, DcId};
use crate::orch::engine::{ChashOrchStats, ConsistentHashOrch, ResolvedState, StableState};

/// One route in the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RouteView {
    pub prefix: String,
    pub nexthops: Vec<String>,
    pub container: DcId,
}

/// One desired container in the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerView {
    pub id: DcId,
    pub nexthops: Vec<String>,
    pub ref_count: u32,
    pub state: ContainerState,
    pub group: Option<u64>,
    pub parent: Option<DcId>,
    pub children: Vec<DcId>,
}

/// One live hardware group in the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub id: u64,
    pub owner: DcId,
    pub members: Vec<String>,
    pub consistent: bool,
    pub resolved: bool,
}

/// Pool accounting in the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PoolView {
    pub capacity: u64,
    pub used: u64,
    pub available: u64,
}

/// Point-in-time engine state.
#[derive(Debug, Clone, Serialize)]
pub struct ChashSnapshot {
    pub resolved: bool,
    pub stable: bool,
    pub admin_consistent: bool,
    pub routes: Vec<RouteView>,
    pub containers: Vec<ContainerView>,
    pub groups: Vec<GroupView>,
    pub pool: PoolView,
    pub stats: ChashOrchStats,
}

impl ConsistentHashOrch {
    /// Takes a snapshot of the whole engine state, sorted for stable
    /// output.
    pub fn snapshot(&self) -> ChashSnapshot {
        let mut routes: Vec<RouteView> = self
            .routes_table()
            .values()
            .map(|r| RouteView {
                prefix: r.prefix().to_string(),
                nexthops: r.nhset().iter().map(|nh| nh.to_string()).collect(),
                container: r.container(),
            })
            .collect();
        routes.sort_by(|a, b| a.prefix.cmp(&b.prefix));

        let mut containers: Vec<ContainerView> = self
            .containers_arena()
            .values()
            .map(|dc| ContainerView {
                id: dc.id(),
                nexthops: dc.nhset().iter().map(|nh| nh.to_string()).collect(),
                ref_count: dc.ref_count(),
                state: dc.state(),
                group: dc.group().map(|g| g.id().0),
                parent: dc.parent(),
                children: dc.children().iter().copied().collect(),
            })
            .collect();
        containers.sort_by_key(|c| c.id);

        let mut groups: Vec<GroupView> = self
            .groups_registry()
            .iter()
            .map(|(gid, owner)| {
                let record = self
                    .container(*owner)
                    .and_then(|dc| dc.group())
                    .expect("registry entries point at owned groups");
                GroupView {
                    id: gid.0,
                    owner: *owner,
                    members: record.members().iter().map(|nh| nh.to_string()).collect(),
                    consistent: record.is_consistent(),
                    resolved: record.is_resolved(),
                }
            })
            .collect();
        groups.sort_by_key(|g| g.id);

        ChashSnapshot {
            resolved: self.resolved_state() == ResolvedState::Resolved,
            stable: self.stable_state() == StableState::Stable,
            admin_consistent: self.admin_consistent(),
            routes,
            containers,
            groups,
            pool: PoolView {
                capacity: self.pool().capacity(),
                used: self.pool().used(),
                available: self.pool().available(),
            },
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::orch::engine::{ChashOrchConfig, ConsistentHashOrch};
    use chash_pool::{CostModel, PoolConfig, ResourcePool};
    use std::collections::BTreeSet;
    use std::time::Duration;

    #[test]
    fn test_snapshot_reflects_state() {
        let pool = ResourcePool::new(PoolConfig {
            capacity: 16,
            cost_model: CostModel {
                consistent_cost: 5,
                member_cost: 1,
            },
        });
        let mut orch = ConsistentHashOrch::new(
            ChashOrchConfig {
                stable_hysteresis: Duration::ZERO,
                admin_consistent: false,
            },
            pool,
        );

        let nhset: BTreeSet<_> = ["10.1.0.1", "10.1.0.2"]
            .iter()
            .map(|a| a.parse().unwrap())
            .collect();
        orch.add_route("10.0.0.0/24".parse().unwrap(), nhset.clone()).unwrap();
        orch.add_route("10.0.1.0/24".parse().unwrap(), nhset).unwrap();

        let snap = orch.snapshot();
        assert!(snap.resolved);
        assert!(!snap.admin_consistent);
        assert_eq!(snap.routes.len(), 2);
        assert_eq!(snap.containers.len(), 1);
        assert_eq!(snap.groups.len(), 1);
        assert_eq!(snap.containers[0].ref_count, 2);
        assert_eq!(snap.pool.used, 2);
        assert_eq!(snap.routes[0].prefix, "10.0.0.0/24");

        // Snapshots serialize for the CLI dump.
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"10.0.0.0/24\""));
    }
}
