//! Deterministic fixture transport.
//!
//! With nothing scripted, every request gets a canned, schema-valid response
//! for its contract. Tests can queue per-role replies (raw text, JSON,
//! injected failures, delays) which are consumed in order before falling
//! back to the canned response.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

use super::estimate_tokens;
use crate::domain::errors::{ProviderError, ProviderErrorKind};
use crate::domain::models::{AgentRole, ContractName};
use crate::domain::ports::{AgentRequest, AgentTransport, TransportResponse};

const HEADLINES: [&str; 8] = [
    "Fast, Friendly Plumbing You Can Trust",
    "Same-Day Repairs Across Town",
    "Licensed Pros, Honest Prices",
    "Local Experts Since 1998",
    "Leaks Fixed Right the First Time",
    "Your Neighborhood Plumbing Team",
    "Upfront Quotes, No Surprises",
    "Emergency Help, Day or Night",
];

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum FixtureReply {
    /// Serialized and returned as the response text.
    Json(Value),
    /// Returned verbatim, e.g. to exercise parse failures.
    Raw(String),
    /// The call fails with this kind.
    Fail(ProviderErrorKind),
    /// Wait, then produce the inner reply.
    Delayed(Duration, Box<FixtureReply>),
}

/// What a test can observe about a call after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Role that called.
    pub role: AgentRole,
    /// Trace step of the call.
    pub step: String,
    /// Output token ceiling the caller requested.
    pub max_tokens: u64,
    /// User prompt as sent.
    pub user_prompt: String,
}

/// Deterministic in-process transport. Unscripted roles get a canned, contract-valid reply.
#[derive(Default)]
pub struct FixtureTransport {
    scripted: Mutex<HashMap<AgentRole, VecDeque<FixtureReply>>>,
    sticky: HashMap<AgentRole, FixtureReply>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FixtureTransport {
    /// Transport that answers every role with its canned reply.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call made by `role`.
    #[must_use]
    pub fn with_reply(mut self, role: AgentRole, reply: FixtureReply) -> Self {
        self.scripted.get_mut().entry(role).or_default().push_back(reply);
        self
    }

    /// Reply this way to every call by `role` once its queue is empty.
    #[must_use]
    pub fn with_default_reply(mut self, role: AgentRole, reply: FixtureReply) -> Self {
        self.sticky.insert(role, reply);
        self
    }

    /// Every call so far, in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Calls made by `role`.
    pub async fn call_count(&self, role: AgentRole) -> usize {
        self.calls.lock().await.iter().filter(|c| c.role == role).count()
    }

    async fn next_reply(&self, role: AgentRole) -> Option<FixtureReply> {
        let mut scripted = self.scripted.lock().await;
        scripted
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.sticky.get(&role).cloned())
    }
}

async fn resolve(reply: FixtureReply) -> Result<String, ProviderError> {
    let mut reply = reply;
    loop {
        match reply {
            FixtureReply::Json(value) => return Ok(value.to_string()),
            FixtureReply::Raw(text) => return Ok(text),
            FixtureReply::Fail(kind) => {
                return Err(ProviderError::new(kind, "fixture transport injected a failure"))
            }
            FixtureReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

fn envelope(mut body: Value) -> Value {
    if let Some(map) = body.as_object_mut() {
        map.insert("schemaVersion".to_string(), json!("v1"));
        map.insert("requiresApproval".to_string(), json!(true));
    }
    body
}

fn canned_patch() -> Value {
    json!({
        "changes": [{
            "file": "server/routes.ts",
            "operation": "edit",
            "description": "Import the missing helper",
            "diff": "diff --git a/server/routes.ts b/server/routes.ts\n--- a/server/routes.ts\n+++ b/server/routes.ts\n@@ -1,2 +1,3 @@\n+import { formatPrice } from \"./pricing\";\n import express from \"express\";\n",
            "rationale": "The handler calls formatPrice without importing it"
        }],
        "testPlan": ["Run the type checker"],
        "testCommands": [{"cmd": "pnpm", "args": ["typecheck"]}],
        "rollbackPlan": "Revert the single-line import"
    })
}

/// Canned, schema-valid response for a contract.
pub fn canned_response(contract: ContractName, candidate_count: u32) -> Value {
    let body = match contract {
        ContractName::CopyProposal => {
            let n = (candidate_count as usize).clamp(1, HEADLINES.len());
            let variants: Vec<Value> = HEADLINES
                .iter()
                .take(n)
                .map(|h| {
                    json!({
                        "targetKey": "hero.headline",
                        "value": h,
                        "rationale": "Leads with the customer benefit",
                        "confidence": 0.8
                    })
                })
                .collect();
            json!({
                "variants": variants,
                "confidence": 0.8,
                "risks": [],
                "assumptions": ["Business serves a single metro area"]
            })
        }
        ContractName::Critique => json!({
            "score": 0.8,
            "issues": [],
            "improvements": ["Consider naming the city"],
            "needsHuman": false
        }),
        ContractName::DecisionCollapse => json!({
            "chosenIndex": 0,
            "confidence": 0.8,
            "reasoning": "Clearest benefit with the fewest risks",
            "needsHuman": false,
            "reviseRequested": false
        }),
        ContractName::Diagnosis => json!({
            "likelyCause": "A helper is used without being imported",
            "confidence": 0.7,
            "relatedIssues": []
        }),
        ContractName::PatchProposal => canned_patch(),
        ContractName::ReviewCritique => json!({
            "approved": true,
            "concerns": [],
            "suggestions": []
        }),
        ContractName::ArbiterDecision => json!({
            "decision": "apply",
            "rationale": "Minimal diff with a machine-executable check",
            "finalPatch": canned_patch()
        }),
    };
    envelope(body)
}

#[async_trait]
impl AgentTransport for FixtureTransport {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn complete(&self, request: &AgentRequest) -> Result<TransportResponse, ProviderError> {
        self.calls.lock().await.push(RecordedCall {
            role: request.role,
            step: request.trace.step.clone(),
            max_tokens: request.max_tokens,
            user_prompt: request.user_prompt.clone(),
        });

        let text = match self.next_reply(request.role).await {
            Some(reply) => resolve(reply).await?,
            None => canned_response(request.contract, request.candidate_count).to_string(),
        };

        Ok(TransportResponse {
            model_id: request.model_id.clone(),
            input_tokens: estimate_tokens(&request.system_prompt) + estimate_tokens(&request.user_prompt),
            output_tokens: estimate_tokens(&text),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TraceContext;
    use crate::services::validation::validate;

    fn request(role: AgentRole) -> AgentRequest {
        AgentRequest {
            role,
            contract: role.contract(),
            model_id: "fixture/model".to_string(),
            system_prompt: "sys".to_string(),
            user_prompt: "user prompt".to_string(),
            max_tokens: 512,
            temperature: None,
            trace: TraceContext::new("job", "run", role.as_str()),
            candidate_count: 3,
        }
    }

    #[test]
    fn test_canned_responses_satisfy_their_contracts() {
        for contract in ContractName::ALL {
            let value = canned_response(contract, 3);
            assert!(validate(contract, &value).is_ok(), "{contract} canned response invalid");
        }
    }

    #[test]
    fn test_candidate_count_is_clamped() {
        let value = canned_response(ContractName::CopyProposal, 20);
        assert_eq!(value["variants"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_scripted_replies_precede_canned() {
        let transport = FixtureTransport::new()
            .with_reply(AgentRole::Critic, FixtureReply::Raw("not json".into()));
        let first = transport.complete(&request(AgentRole::Critic)).await.unwrap();
        assert_eq!(first.text, "not json");
        let second = transport.complete(&request(AgentRole::Critic)).await.unwrap();
        assert!(second.text.contains("\"score\""));
        assert_eq!(transport.call_count(AgentRole::Critic).await, 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let transport = FixtureTransport::new()
            .with_default_reply(AgentRole::Coder, FixtureReply::Fail(ProviderErrorKind::Injected));
        let err = transport.complete(&request(AgentRole::Coder)).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Injected);
    }

    #[tokio::test]
    async fn test_token_estimates() {
        let transport = FixtureTransport::new()
            .with_reply(AgentRole::Arbiter, FixtureReply::Raw("12345678".into()));
        let resp = transport.complete(&request(AgentRole::Arbiter)).await.unwrap();
        assert_eq!(resp.output_tokens, 2);
        assert_eq!(resp.input_tokens, 1 + 3);
    }
}
