//! Agent transport port - one outbound model call.

use async_trait::async_trait;

use crate::domain::errors::ProviderError;
use crate::domain::models::{AgentRole, ContractName, TraceContext};

/// Everything a transport needs to serve one call.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Role making the call.
    pub role: AgentRole,
    /// Contract the response must satisfy.
    pub contract: ContractName,
    /// Model to call.
    pub model_id: String,
    /// System message.
    pub system_prompt: String,
    /// User message.
    pub user_prompt: String,
    /// Output token ceiling for this call.
    pub max_tokens: u64,
    /// Sampling temperature, when the role overrides it.
    pub temperature: Option<f32>,
    /// Correlator for logs.
    pub trace: TraceContext,
    /// Candidates the caller expects; only meaningful for generation.
    pub candidate_count: u32,
}

/// What came back, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Raw reply text.
    pub text: String,
    /// Model that actually served the call.
    pub model_id: String,
    /// Prompt tokens reported by the provider.
    pub input_tokens: u64,
    /// Completion tokens reported by the provider.
    pub output_tokens: u64,
}

/// A source of agent responses: a live provider, canned fixtures, or a
/// recording.
///
/// Implementations must return sanitized [`ProviderError`]s: no prompt text,
/// no upstream payloads.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Transport name as it appears in logs.
    fn name(&self) -> &'static str;

    /// Serve one call.
    async fn complete(&self, request: &AgentRequest) -> Result<TransportResponse, ProviderError>;
}
