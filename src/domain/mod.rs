//! Domain layer for the Courtside orchestration engine
//!
//! Value types shared by both pipelines, the ports that pipelines call
//! outward through, and the error taxonomy.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ProviderError, ProviderErrorKind};
