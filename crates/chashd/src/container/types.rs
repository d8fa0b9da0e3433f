//! Desired container types.
//!
//! A desired container is the content-identified unit of deduplication:
//! every route wanting one particular next-hop set shares the container for
//! that set, and the container owns at most one hardware group realizing
//! it. Containers live in an arena keyed by [`DcId`] and refer to each
//! other (parent/child sharing shortcut) only by handle, so tearing one
//! down can never leave a dangling owning reference.

use chash_pool::ActualGroup;
use chash_types::Nexthop;
use log::error;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Stable arena handle for a desired container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DcId(pub u64);

impl fmt::Display for DcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dc:{}", self.0)
    }
}

/// Resolution state of a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerState {
    /// The owned group contains exactly the desired next-hop set.
    Resolved,
    /// The owned group is a degraded fallback (a strict subset).
    Partial,
    /// No group could be allocated; routes on this container are not
    /// programmed.
    Failed,
    /// The admin mode changed; the group must be re-derived under the new
    /// cost model.
    Reallocate,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Resolved => "resolved",
            ContainerState::Partial => "partial",
            ContainerState::Failed => "failed",
            ContainerState::Reallocate => "reallocate",
        };
        write!(f, "{}", s)
    }
}

/// The deduplicated intent for one next-hop set.
///
/// The next-hop set is fixed for the container's lifetime; a route whose
/// set changes moves to a different container. A new container starts in
/// [`ContainerState::Failed`] (no group yet); allocation upgrades it.
#[derive(Debug, Clone)]
pub struct DesiredContainer {
    id: DcId,
    nhset: BTreeSet<Nexthop>,
    ref_count: u32,
    state: ContainerState,
    group: Option<ActualGroup>,
    parent: Option<DcId>,
    children: BTreeSet<DcId>,
}

impl DesiredContainer {
    /// Creates a container for the given next-hop set, with no referrers
    /// and no group.
    pub fn new(id: DcId, nhset: BTreeSet<Nexthop>) -> Self {
        Self {
            id,
            nhset,
            ref_count: 0,
            state: ContainerState::Failed,
            group: None,
            parent: None,
            children: BTreeSet::new(),
        }
    }

    /// Returns the container's arena handle.
    pub fn id(&self) -> DcId {
        self.id
    }

    /// Returns the desired next-hop set.
    pub fn nhset(&self) -> &BTreeSet<Nexthop> {
        &self.nhset
    }

    /// Returns the number of routes currently attached.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Attaches one more route; returns the new count.
    pub fn acquire(&mut self) -> u32 {
        self.ref_count += 1;
        self.ref_count
    }

    /// Detaches one route; returns the new count.
    ///
    /// Underflow means a bookkeeping bug elsewhere; it is logged and the
    /// count pinned at zero rather than wrapping.
    pub fn release(&mut self) -> u32 {
        if self.ref_count == 0 {
            error!("container {}: ref count underflow", self.id);
            return 0;
        }
        self.ref_count -= 1;
        self.ref_count
    }

    /// Returns the container's resolution state.
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Sets the container's resolution state.
    pub fn set_state(&mut self, state: ContainerState) {
        self.state = state;
    }

    /// Returns the owned group, if any.
    pub fn group(&self) -> Option<&ActualGroup> {
        self.group.as_ref()
    }

    /// Installs the owned group. The previous group, if any, must have been
    /// taken out first.
    pub fn set_group(&mut self, group: ActualGroup) {
        debug_assert!(self.group.is_none(), "container {} already owns a group", self.id);
        self.group = Some(group);
    }

    /// Takes the owned group out of the container.
    pub fn take_group(&mut self) -> Option<ActualGroup> {
        self.group.take()
    }

    /// Returns the parent container handle, if linked.
    pub fn parent(&self) -> Option<DcId> {
        self.parent
    }

    /// Links this container under a parent.
    pub fn set_parent(&mut self, parent: DcId) {
        self.parent = Some(parent);
    }

    /// Drops the parent link.
    pub fn clear_parent(&mut self) {
        self.parent = None;
    }

    /// Returns the child container handles.
    pub fn children(&self) -> &BTreeSet<DcId> {
        &self.children
    }

    /// Adds a child link.
    pub fn add_child(&mut self, child: DcId) {
        self.children.insert(child);
    }

    /// Removes a child link.
    pub fn remove_child(&mut self, child: DcId) {
        self.children.remove(&child);
    }

    /// Drops all child links.
    pub fn clear_children(&mut self) {
        self.children.clear();
    }
}

impl fmt::Display for DesiredContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nexthops: Vec<_> = self.nhset.iter().map(|nh| nh.to_string()).collect();
        write!(
            f,
            "{} [{}] refs={} {}",
            self.id,
            nexthops.join(","),
            self.ref_count,
            self.state,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nhset(addrs: &[&str]) -> BTreeSet<Nexthop> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_ref_counting() {
        let mut dc = DesiredContainer::new(DcId(1), nhset(&["10.0.0.1"]));
        assert_eq!(dc.ref_count(), 0);

        assert_eq!(dc.acquire(), 1);
        assert_eq!(dc.acquire(), 2);
        assert_eq!(dc.release(), 1);
        assert_eq!(dc.release(), 0);
    }

    #[test]
    fn test_release_underflow_is_pinned() {
        let mut dc = DesiredContainer::new(DcId(1), nhset(&["10.0.0.1"]));
        assert_eq!(dc.release(), 0);
        assert_eq!(dc.ref_count(), 0);
    }

    #[test]
    fn test_new_container_has_no_group() {
        let dc = DesiredContainer::new(DcId(1), nhset(&["10.0.0.1", "10.0.0.2"]));
        assert_eq!(dc.state(), ContainerState::Failed);
        assert!(dc.group().is_none());
        assert!(dc.parent().is_none());
        assert!(dc.children().is_empty());
    }

    #[test]
    fn test_parent_child_links() {
        let mut parent = DesiredContainer::new(DcId(1), nhset(&["10.0.0.1"]));
        let mut child = DesiredContainer::new(DcId(2), nhset(&["10.0.0.2"]));

        parent.add_child(child.id());
        child.set_parent(parent.id());

        assert!(parent.children().contains(&DcId(2)));
        assert_eq!(child.parent(), Some(DcId(1)));

        parent.remove_child(child.id());
        child.clear_parent();

        assert!(parent.children().is_empty());
        assert_eq!(child.parent(), None);
    }
}
