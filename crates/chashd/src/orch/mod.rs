//! The reconciliation engine.
//!
//! This module holds the core of the system: route add/change/delete, the
//! two-axis (resolved, stable) state machine, the resource-constrained
//! allocation policy with its degraded fallback tier, and the periodic
//! optimizers that merge duplicate containers and re-attempt full
//! resolution as capacity frees up.

mod engine;
mod policy;
mod snapshot;

pub use engine::{
    ChashError, ChashOrchConfig, ChashOrchStats, ConsistentHashOrch, ResolvedState, StableState,
};
pub use snapshot::{ChashSnapshot, ContainerView, GroupView, PoolView, RouteView};
