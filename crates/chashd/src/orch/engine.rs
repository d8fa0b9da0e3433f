//! ConsistentHashOrch implementation.
//!
//! All mutable state lives in one engine instance: the route index, the
//! container arena, the global group registry, the pool, and the two
//! system-wide state axes. Nothing here is a process global; tests run
//! several independent engines side by side.

use chash_pool::{ActualGroup, GroupId, ResourcePool};
use chash_types::{Nexthop, Prefix};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::container::{ContainerState, DcId, DesiredContainer};
use crate::route::{Route, RouteTable};

/// Error type for engine operations.
///
/// Resource exhaustion is not an error at this boundary; it degrades the
/// affected container and the periodic pass repairs it later.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChashError {
    #[error("route {0} has an empty next-hop set")]
    EmptyNextHopSet(Prefix),

    #[error("route not found: {0}")]
    RouteNotFound(Prefix),
}

/// System-wide resolution axis: Resolved iff every container is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolvedState {
    Resolved,
    NotResolved,
}

/// System-wide stability axis: Stable iff the parent/child sharing
/// shortcut is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StableState {
    Stable,
    NonStable,
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct ChashOrchConfig {
    /// How long the system must stay resolved before the sharing shortcut
    /// is trusted again (consistent mode only).
    pub stable_hysteresis: Duration,
    /// Whether groups are allocated as consistent-hash groups.
    pub admin_consistent: bool,
}

impl Default for ChashOrchConfig {
    fn default() -> Self {
        Self {
            stable_hysteresis: Duration::from_secs(120),
            admin_consistent: true,
        }
    }
}

/// Engine counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChashOrchStats {
    pub routes_added: u64,
    pub routes_changed: u64,
    pub routes_removed: u64,
    pub fallback_allocations: u64,
    pub failed_allocations: u64,
    pub duplicate_merges: u64,
    pub full_restorations: u64,
}

/// The consistent-hash reconciliation engine.
///
/// Routes map onto content-deduplicated desired containers; containers own
/// at most one hardware group each, allocated through the pool. When the
/// pool runs dry the engine degrades affected containers to single-next-hop
/// fallback groups instead of failing the route operation, and the periodic
/// pass restores full resolution once capacity frees up.
pub struct ConsistentHashOrch {
    config: ChashOrchConfig,
    pool: ResourcePool,
    routes: RouteTable,
    containers: HashMap<DcId, DesiredContainer>,
    /// Global registry of live groups: group id to owning container.
    groups: HashMap<GroupId, DcId>,
    next_container_id: u64,
    admin_consistent: bool,
    resolved: ResolvedState,
    stable: StableState,
    /// When the system last became fully resolved (hysteresis anchor).
    resolved_at: Option<Instant>,
    /// When resolution was last lost.
    resolution_lost_at: Option<Instant>,
    frozen: bool,
    stats: ChashOrchStats,
}

impl ConsistentHashOrch {
    /// Creates an engine over the given pool.
    ///
    /// An empty engine is vacuously resolved; stability is earned through
    /// the hysteresis window like any other resolution.
    pub fn new(config: ChashOrchConfig, pool: ResourcePool) -> Self {
        let admin_consistent = config.admin_consistent;
        Self {
            config,
            pool,
            routes: RouteTable::new(),
            containers: HashMap::new(),
            groups: HashMap::new(),
            next_container_id: 1,
            admin_consistent,
            resolved: ResolvedState::Resolved,
            stable: StableState::NonStable,
            resolved_at: Some(Instant::now()),
            resolution_lost_at: None,
            frozen: false,
            stats: ChashOrchStats::default(),
        }
    }

    /// Adds a route, or changes it if the prefix is already known.
    pub fn add_route(
        &mut self,
        prefix: Prefix,
        nhset: BTreeSet<Nexthop>,
    ) -> Result<(), ChashError> {
        if nhset.is_empty() {
            return Err(ChashError::EmptyNextHopSet(prefix));
        }

        if self.routes.contains_key(&prefix) {
            self.change_route(prefix, nhset);
        } else {
            self.new_route(prefix, nhset);
        }
        Ok(())
    }

    /// Deletes a route.
    pub fn del_route(&mut self, prefix: &Prefix) -> Result<(), ChashError> {
        let route = self
            .routes
            .remove(prefix)
            .ok_or(ChashError::RouteNotFound(*prefix))?;

        let dc_id = route.container();
        let remaining = self
            .containers
            .get_mut(&dc_id)
            .expect("route points at a live container")
            .release();
        debug!("container {}: ref count down to {}", dc_id, remaining);

        if remaining == 0 {
            self.release_container(dc_id);
            self.periodic_tick();
        }

        self.stats.routes_removed += 1;
        info!("removed route {}", prefix);
        Ok(())
    }

    /// Switches the group allocation mode.
    ///
    /// Every container holding a group is marked for re-derivation under
    /// the new cost/sharing model; the periodic pass re-runs them through
    /// the allocator and cuts traffic over group by group.
    pub fn set_admin_state(&mut self, consistent: bool) {
        if consistent == self.admin_consistent {
            return;
        }

        info!(
            "admin mode -> {}",
            if consistent { "consistent" } else { "plain" }
        );
        self.admin_consistent = consistent;
        self.resolved = ResolvedState::NotResolved;
        self.resolved_at = None;
        self.resolution_lost_at = Some(Instant::now());
        self.stable = StableState::NonStable;

        for dc in self.containers.values_mut() {
            if dc.group().is_some() {
                dc.set_state(ContainerState::Reallocate);
            }
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// Driven by the scheduler tick, and re-entered from the tail of route
    /// mutations (the caller already holds the engine lock). While frozen,
    /// the clock advances but reconciliation is skipped.
    pub fn periodic_tick(&mut self) {
        if self.frozen {
            debug!("frozen, skipping reconciliation");
            return;
        }

        if self.resolved != ResolvedState::Resolved {
            self.optimize_not_resolved();
            self.check_for_resolution();
        }
        if self.stable != StableState::Stable {
            self.check_for_stable();
        }
    }

    /// Suspends reconciliation (mutations still apply).
    pub fn freeze(&mut self) {
        self.frozen = true;
        info!("reconciliation frozen");
    }

    /// Resumes reconciliation.
    pub fn unfreeze(&mut self) {
        self.frozen = false;
        info!("reconciliation unfrozen");
    }

    /// Returns true if reconciliation is suspended.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the resolution axis.
    pub fn resolved_state(&self) -> ResolvedState {
        self.resolved
    }

    /// Returns the stability axis.
    pub fn stable_state(&self) -> StableState {
        self.stable
    }

    /// Returns true if every container is resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved == ResolvedState::Resolved
    }

    /// Returns true if the sharing shortcut is trusted.
    pub fn is_stable(&self) -> bool {
        self.stable == StableState::Stable
    }

    /// Returns the current allocation mode.
    pub fn admin_consistent(&self) -> bool {
        self.admin_consistent
    }

    /// Returns the number of indexed routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Returns the number of live containers.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Returns the number of live hardware groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns a route by prefix.
    pub fn route(&self, prefix: &Prefix) -> Option<&Route> {
        self.routes.get(prefix)
    }

    /// Returns a container by handle.
    pub fn container(&self, id: DcId) -> Option<&DesiredContainer> {
        self.containers.get(&id)
    }

    /// Returns the container a route is attached to.
    pub fn container_of(&self, prefix: &Prefix) -> Option<&DesiredContainer> {
        self.routes
            .get(prefix)
            .and_then(|r| self.containers.get(&r.container()))
    }

    /// Returns when the system last became fully resolved.
    pub fn resolved_since(&self) -> Option<Instant> {
        self.resolved_at
    }

    /// Returns when resolution was last lost.
    pub fn resolution_lost_at(&self) -> Option<Instant> {
        self.resolution_lost_at
    }

    /// Returns the pool for accounting queries.
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> ChashOrchStats {
        self.stats
    }

    // ------------------------------------------------------------------
    // Route mutation internals
    // ------------------------------------------------------------------

    fn new_route(&mut self, prefix: Prefix, nhset: BTreeSet<Nexthop>) {
        let (dc_id, fresh) = match self.find_container(&nhset) {
            Some(id) => (id, false),
            None => (self.create_container(nhset.clone()), true),
        };

        self.routes
            .insert(prefix, Route::new(prefix, nhset, dc_id));
        self.attach(&prefix, dc_id);

        if fresh {
            self.allocate_group(dc_id);
        }

        self.stats.routes_added += 1;
        info!("added route {} on {}", prefix, dc_id);
        self.finish_route_op(&prefix, false);
    }

    fn change_route(&mut self, prefix: Prefix, nhset: BTreeSet<Nexthop>) {
        let old_id = self.routes[&prefix].container();
        let remaining = self
            .containers
            .get_mut(&old_id)
            .expect("route points at a live container")
            .release();
        debug!("container {}: ref count down to {}", old_id, remaining);

        self.routes
            .get_mut(&prefix)
            .unwrap()
            .set_nhset(nhset.clone());

        let use_shortcut = self.stable == StableState::Stable && self.admin_consistent;
        if use_shortcut {
            match self.find_child(old_id, &nhset) {
                Some(child) => self.attach(&prefix, child),
                None => {
                    let child = self.create_container(nhset.clone());
                    self.containers.get_mut(&child).unwrap().set_parent(old_id);
                    self.containers.get_mut(&old_id).unwrap().add_child(child);
                    self.attach(&prefix, child);
                    self.clone_for_child(old_id, child, nhset);
                }
            }
        } else {
            match self.find_container(&nhset) {
                Some(id) => self.attach(&prefix, id),
                None => {
                    let id = self.create_container(nhset);
                    self.attach(&prefix, id);
                    self.allocate_group(id);
                }
            }
        }

        // The old container may already be gone if the optimizer merged it.
        if let Some(dc) = self.containers.get(&old_id) {
            if dc.ref_count() == 0 {
                self.release_container(old_id);
            }
        }

        self.stats.routes_changed += 1;
        info!("changed route {}", prefix);
        self.finish_route_op(&prefix, true);
    }

    /// Programs the route unless its container is failed, then runs one
    /// reconciliation pass (always, or only when unresolved).
    fn finish_route_op(&mut self, prefix: &Prefix, always_pass: bool) {
        let dc_id = self.routes[prefix].container();
        let state = self.containers[&dc_id].state();

        if state != ContainerState::Failed {
            self.program_route_now(prefix);
        }
        if always_pass || state != ContainerState::Resolved {
            self.periodic_tick();
        }
    }

    fn attach(&mut self, prefix: &Prefix, dc_id: DcId) {
        self.routes.get_mut(prefix).unwrap().set_container(dc_id);
        let refs = self.containers.get_mut(&dc_id).unwrap().acquire();
        debug!("container {}: ref count up to {}", dc_id, refs);
    }

    /// Binds the forwarding entry for a route to its container's group.
    ///
    /// Callers must have checked the container is not failed; a container
    /// that passes that check but owns no group is a state machine bug.
    fn program_route_now(&self, prefix: &Prefix) {
        let route = &self.routes[prefix];
        let dc = &self.containers[&route.container()];
        let group = dc.group().unwrap_or_else(|| {
            panic!(
                "programming route {} but container {} owns no group",
                prefix,
                dc.id()
            )
        });
        self.pool.program_route(prefix, group.id());
    }

    // ------------------------------------------------------------------
    // Container arena
    // ------------------------------------------------------------------

    fn create_container(&mut self, nhset: BTreeSet<Nexthop>) -> DcId {
        let id = DcId(self.next_container_id);
        self.next_container_id += 1;
        self.containers.insert(id, DesiredContainer::new(id, nhset));
        debug!("created container {}", id);
        id
    }

    /// Searches the whole arena for a container with the given content.
    ///
    /// Duplicates may legitimately exist while non-stable; prefer a
    /// resolved representative, then the oldest.
    fn find_container(&self, nhset: &BTreeSet<Nexthop>) -> Option<DcId> {
        let mut matches: Vec<DcId> = self
            .containers
            .values()
            .filter(|dc| dc.nhset() == nhset)
            .map(|dc| dc.id())
            .collect();
        matches.sort_by_key(|id| (self.containers[id].state() != ContainerState::Resolved, id.0));
        matches.first().copied()
    }

    /// Searches only a container's children for the given content.
    ///
    /// The child scope is built one container per content while stable;
    /// two matches mean the sharing graph is corrupt.
    fn find_child(&self, parent: DcId, nhset: &BTreeSet<Nexthop>) -> Option<DcId> {
        let mut matches = self.containers[&parent]
            .children()
            .iter()
            .copied()
            .filter(|id| {
                self.containers
                    .get(id)
                    .is_some_and(|dc| dc.nhset() == nhset)
            });

        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            panic!(
                "duplicate containers for one next-hop set among children of {}",
                parent
            );
        }
        first
    }

    /// Tears a container down: sever both directions of the sharing
    /// relation first, then release the owned group back to the pool.
    fn release_container(&mut self, id: DcId) {
        let Some(mut dc) = self.containers.remove(&id) else {
            return;
        };

        let children: Vec<DcId> = dc.children().iter().copied().collect();
        for child in children {
            if let Some(c) = self.containers.get_mut(&child) {
                c.clear_parent();
            }
        }
        if let Some(parent) = dc.parent() {
            if let Some(p) = self.containers.get_mut(&parent) {
                p.remove_child(id);
            }
        }

        if let Some(group) = dc.take_group() {
            self.groups.remove(&group.id());
            self.pool.delete_group(group);
        }

        info!("removed container {}", dc);
    }

    pub(crate) fn install_group(&mut self, id: DcId, group: ActualGroup) {
        self.groups.insert(group.id(), id);
        self.containers.get_mut(&id).unwrap().set_group(group);
    }

    /// The cheap incremental path: duplicate the parent's group slot and
    /// rewrite its membership to the child's set.
    fn clone_for_child(&mut self, parent: DcId, child: DcId, nhset: BTreeSet<Nexthop>) {
        let source = self.containers[&parent].group().cloned();

        if let Some(source) = source {
            match self.pool.clone_group(&source) {
                Ok(mut group) => {
                    self.pool.align_group(&mut group, nhset);
                    self.install_group(child, group);
                    self.containers
                        .get_mut(&child)
                        .unwrap()
                        .set_state(ContainerState::Resolved);
                    debug!("container {}: cloned group slot from {}", child, parent);
                    return;
                }
                Err(err) => {
                    warn!(
                        "container {}: clone from {} failed ({}), leaving stable mode",
                        child, parent, err
                    );
                }
            }
        } else {
            warn!(
                "container {}: parent {} owns no group, leaving stable mode",
                child, parent
            );
        }

        self.stable = StableState::NonStable;
        self.allocate_group(child);
        self.clean_stable_state();
        self.optimize_non_stable();
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    /// Records the loss of full resolution and, if the system was stable,
    /// abandons the sharing shortcut and repairs the duplication it built.
    pub(crate) fn enter_not_resolved(&mut self) {
        if self.resolved == ResolvedState::Resolved {
            self.resolved = ResolvedState::NotResolved;
            self.resolved_at = None;
            self.resolution_lost_at = Some(Instant::now());
            info!("system resolution lost");
        }
        if self.stable == StableState::Stable {
            self.stable = StableState::NonStable;
            self.clean_stable_state();
            self.optimize_non_stable();
        }
    }

    /// Drops every parent/child link; topology built under the stable
    /// assumption is no longer trustworthy.
    fn clean_stable_state(&mut self) {
        for dc in self.containers.values_mut() {
            dc.clear_parent();
            dc.clear_children();
        }
    }

    /// Merges duplicate containers back to one per next-hop-set value.
    fn optimize_non_stable(&mut self) {
        let mut classes: HashMap<BTreeSet<Nexthop>, Vec<DcId>> = HashMap::new();
        for dc in self.containers.values() {
            classes.entry(dc.nhset().clone()).or_default().push(dc.id());
        }

        for (_, mut ids) in classes {
            if ids.len() < 2 {
                continue;
            }
            ids.sort_by_key(|id| {
                (self.containers[id].state() != ContainerState::Resolved, id.0)
            });

            let rep = ids.iter().copied().find(|id| {
                let dc = &self.containers[id];
                dc.state() != ContainerState::Failed && dc.group().is_some()
            });
            let Some(rep) = rep else {
                debug!("duplicated next-hop set with no resolvable member, deferring merge");
                continue;
            };

            for dup in ids.into_iter().filter(|id| *id != rep) {
                self.merge_duplicate(dup, rep);
            }
        }
    }

    fn merge_duplicate(&mut self, dup: DcId, rep: DcId) {
        let moved: Vec<Prefix> = self
            .routes
            .values()
            .filter(|r| r.container() == dup)
            .map(|r| r.prefix())
            .collect();
        for prefix in &moved {
            self.routes.get_mut(prefix).unwrap().set_container(rep);
            self.containers.get_mut(&rep).unwrap().acquire();
        }

        if let Some(old) = self.containers[&dup].group().map(|g| g.id()) {
            let new = self.containers[&rep]
                .group()
                .expect("representative owns a group")
                .id();
            self.pool.replace_group(old, new);
        }

        info!(
            "merged duplicate container {} into {} ({} routes moved)",
            dup,
            rep,
            moved.len()
        );
        self.release_container(dup);
        self.stats.duplicate_merges += 1;
    }

    /// Re-attempts full allocation for every unresolved container, cutting
    /// traffic over glitch-free when it succeeds.
    fn optimize_not_resolved(&mut self) {
        let mut pending: Vec<DcId> = self
            .containers
            .values()
            .filter(|dc| dc.state() != ContainerState::Resolved)
            .map(|dc| dc.id())
            .collect();
        pending.sort();

        for id in pending {
            let nhset = self.containers[&id].nhset().clone();
            let Some(group) = self.acquire_full_group(&nhset) else {
                continue;
            };

            match self.containers.get_mut(&id).unwrap().take_group() {
                Some(old_group) => {
                    self.pool.replace_group(old_group.id(), group.id());
                    self.groups.remove(&old_group.id());
                    self.install_group(id, group);
                    self.pool.delete_group(old_group);
                }
                None => {
                    // Never bound to hardware; bind its routes for the
                    // first time.
                    self.install_group(id, group);
                    let prefixes: Vec<Prefix> = self
                        .routes
                        .values()
                        .filter(|r| r.container() == id)
                        .map(|r| r.prefix())
                        .collect();
                    for prefix in &prefixes {
                        self.program_route_now(prefix);
                    }
                }
            }

            self.containers
                .get_mut(&id)
                .unwrap()
                .set_state(ContainerState::Resolved);
            self.stats.full_restorations += 1;
            info!("container {}: restored full resolution", id);
        }
    }

    fn check_for_resolution(&mut self) {
        if self
            .containers
            .values()
            .all(|dc| dc.state() == ContainerState::Resolved)
        {
            self.resolved = ResolvedState::Resolved;
            self.resolved_at = Some(Instant::now());
            info!("all containers resolved");
        }
    }

    fn check_for_stable(&mut self) {
        if self.resolved != ResolvedState::Resolved {
            return;
        }

        // Plain mode never uses the sharing shortcut, so it needs no
        // hysteresis before trusting it.
        let ready = !self.admin_consistent
            || self
                .resolved_at
                .is_some_and(|at| at.elapsed() >= self.config.stable_hysteresis);

        if ready {
            self.stable = StableState::Stable;
            info!("system stable");
        }
    }

    // Accessors shared with the policy and snapshot halves of the impl.

    pub(crate) fn pool_mut(&mut self) -> &mut ResourcePool {
        &mut self.pool
    }

    pub(crate) fn admin_mode(&self) -> bool {
        self.admin_consistent
    }

    pub(crate) fn container_mut(&mut self, id: DcId) -> Option<&mut DesiredContainer> {
        self.containers.get_mut(&id)
    }

    pub(crate) fn has_container(&self, id: DcId) -> bool {
        self.containers.contains_key(&id)
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ChashOrchStats {
        &mut self.stats
    }

    pub(crate) fn routes_table(&self) -> &RouteTable {
        &self.routes
    }

    pub(crate) fn containers_arena(&self) -> &HashMap<DcId, DesiredContainer> {
        &self.containers
    }

    pub(crate) fn groups_registry(&self) -> &HashMap<GroupId, DcId> {
        &self.groups
    }

    /// Full-tier-only allocation used by the periodic retry path.
    fn acquire_full_group(&mut self, nhset: &BTreeSet<Nexthop>) -> Option<ActualGroup> {
        use crate::orch::policy::AcquiredGroup;
        match self.acquire_group(nhset, false, false) {
            Some(AcquiredGroup::Full(group)) => Some(group),
            Some(AcquiredGroup::Partial(_)) | None => None,
        }
    }
}
