//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Optional rolling JSON log files
//! - Redaction and fingerprinting of untrusted text

pub mod config;
pub mod logger;
pub mod redaction;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use redaction::{fingerprint, hash_text, safe_client_message, scrub_secrets, Fingerprint};
