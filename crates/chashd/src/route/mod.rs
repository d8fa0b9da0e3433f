//! Route entries and the route index.

mod types;

pub use types::{Route, RouteTable};
