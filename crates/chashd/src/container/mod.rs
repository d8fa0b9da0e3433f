//! Desired containers: the deduplicated units of next-hop-set intent.

mod types;

pub use types::{ContainerState, DcId, DesiredContainer};
