//! Pool error types.

use thiserror::Error;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur during resource pool operations.
///
/// Insufficient capacity is an expected runtime condition and carries the
/// numbers the caller needs to log a useful degradation message. It never
/// leaves the pool in a partially charged state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The requested group would exceed the remaining capacity.
    #[error("insufficient resources: group costs {required} units, {available} available")]
    InsufficientResources { required: u64, available: u64 },

    /// A group was requested with no members.
    #[error("cannot create a group with no members")]
    EmptyGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::InsufficientResources {
            required: 5,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient resources: group costs 5 units, 2 available"
        );
    }
}
