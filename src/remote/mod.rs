//! Remote inference service client

pub mod circuit_breaker;
pub mod client;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use client::{RemoteError, RemoteInferenceClient, RemoteReply};
