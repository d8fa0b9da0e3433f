//! Resource pool abstraction for hardware ECMP group tables.
//!
//! The forwarding ASIC exposes a bounded group table; every programmed
//! group consumes abstract resource units out of a fixed budget. This crate
//! models that budget and the group lifecycle on top of it:
//!
//! - [`ResourcePool`]: capacity accounting (charge on create, refund on
//!   delete, typed failure with no partial charge) and group bookkeeping
//! - [`ActualGroup`]: a live hardware group record
//! - [`PoolCallbacks`]: the synchronous driver boundary; the concrete
//!   SDK/ASIC implementation lives behind it
//!
//! The pool never retries or degrades on its own; callers decide what to do
//! with an [`PoolError::InsufficientResources`] result.

mod error;
mod pool;
mod types;

pub use error::{PoolError, PoolResult};
pub use pool::{NullCallbacks, PoolCallbacks, ResourcePool};
pub use types::{ActualGroup, CostModel, GroupId, PoolConfig};
