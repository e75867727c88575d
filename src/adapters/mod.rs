//! Adapters that satisfy the domain ports.

pub mod transports;
pub mod verifiers;
