//! chashd - Consistent-Hash ECMP Group Manager
//!
//! This daemon maps routing entries (prefix -> next-hop set) onto a scarce,
//! hardware-programmable ECMP group table. Its job is to program as few
//! distinct groups as possible (every route with the same next-hop set
//! shares one group), keep routes correctly programmed under continuous
//! churn, and degrade gracefully instead of failing when the group table
//! runs out of space, recovering automatically as capacity frees up.
//!
//! # Architecture
//!
//! ```text
//! [route feed] --> [ConsistentHashOrch] --> [ResourcePool] --> [ASIC/SDK]
//!                        ^
//!                        |
//!                  [ChashDaemon ticker]
//! ```
//!
//! # Key Components
//!
//! - [`orch::ConsistentHashOrch`]: the reconciliation engine - route
//!   mutations, the content-addressed container dedup, the allocation
//!   policy with its degraded fallback, and the periodic optimizers
//! - [`container::DesiredContainer`]: the deduplicated unit of
//!   next-hop-set intent, reference counted and arena-allocated
//! - [`daemon::ChashDaemon`]: the lock-serialized public surface and the
//!   background reconciliation ticker
//!
//! The hardware itself sits behind [`chash_pool::PoolCallbacks`]; tests
//! run the whole engine against the no-op driver.

pub mod container;
pub mod daemon;
pub mod orch;
pub mod route;

// Re-export commonly used types.
pub use chash_pool::{
    ActualGroup, CostModel, GroupId, NullCallbacks, PoolCallbacks, PoolConfig, PoolError,
    ResourcePool,
};
pub use chash_types::{Nexthop, ParseError, Prefix};

pub use container::{ContainerState, DcId, DesiredContainer};
pub use daemon::{ChashDaemon, ChashDaemonConfig};
pub use orch::{
    ChashError, ChashOrchConfig, ChashOrchStats, ChashSnapshot, ConsistentHashOrch,
    ContainerView, GroupView, PoolView, ResolvedState, RouteView, StableState,
};
pub use route::{Route, RouteTable};
