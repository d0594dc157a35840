//! Testing utilities and mock implementations
//!
//! Provides a scripted [`ProtocolClient`](crate::link::ProtocolClient) so
//! connection lifecycle behavior can be exercised without an MQTT broker.

pub mod mocks;

pub use mocks::*;
