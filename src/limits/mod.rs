//! Outbound capacity controls.
//!
//! Two independent limits guard the remote service:
//!
//! - [`RateLimiter`] bounds throughput: at most N calls start inside any
//!   sliding window.
//! - [`ConcurrencyGate`] bounds simultaneous in-flight calls, and with them
//!   connection and memory pressure.
//!
//! Both are acquired per attempt, gate first, and both waits honour the
//! caller's deadline. Dropping a pending acquisition consumes nothing.

pub mod gate;
pub mod rate;

pub use gate::{ConcurrencyGate, GatePermit};
pub use rate::{RateLimitConfig, RateLimiter};
