//! Error classification used by [`crate::circuit_breaker::CircuitBreaker`]
//! and the retry policy built on top of it.

use thiserror::Error;

/// An error surfaced by a protected operation, tagged with enough
/// information for the circuit breaker and retry policy to decide what to
/// do next without understanding the operation itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// The circuit is open; the call was rejected before the operation ran.
    #[error("circuit is open")]
    CircuitOpen,

    /// A failure that is expected to be transient (timeouts, connection
    /// resets, 5xx responses) and worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A failure that retrying will not fix (4xx responses, digest
    /// mismatches, malformed input).
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ResilienceError {
    /// Whether a retry policy should attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResilienceError::Transient(_))
    }

    /// Whether this failure is final and must not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ResilienceError::Permanent(_) | ResilienceError::CircuitOpen)
    }

    /// Whether this failure should count against the circuit breaker's
    /// failure threshold. A rejection from an already-open circuit must
    /// not count again.
    pub fn should_trip_breaker(&self) -> bool {
        !matches!(self, ResilienceError::CircuitOpen)
    }
}
