//! Parcel Core Resilience: pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! Building blocks for handling transient failures in the transport
//! adapter that carries chunks to the upload server:
//!
//! - **Circuit Breaker**: fails fast when the server is unhealthy instead
//!   of piling up timeouts against it.
//! - **Backoff**: jittered exponential delay schedule for per-chunk retry.
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of HTTP, multipart
//! encoding, or anything upload-specific. It provides generic, composable
//! fault-tolerance patterns usable at any call site that returns a
//! [`ResilienceError`].
//!
//! # Usage Example
//!
//! ```no_run
//! use parcel_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     success_threshold: 2,
//!     ..Default::default()
//! };
//!
//! let breaker = CircuitBreaker::new(config);
//!
//! let result = breaker.execute(|| async {
//!     Ok::<_, ResilienceError>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod error;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::ResilienceError;

/// Prelude module for convenient imports.
///
/// ```
/// use parcel_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::backoff::BackoffPolicy;
    pub use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    pub use super::error::ResilienceError;
}
