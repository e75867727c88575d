//! Ports: the seams through which pipelines reach the outside world.

pub mod agent_transport;
pub mod patch_verifier;

pub use agent_transport::{AgentRequest, AgentTransport, TransportResponse};
pub use patch_verifier::{PatchVerifier, VerificationOutcome};
