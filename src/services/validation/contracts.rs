//! Contract table and the validator entry points.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::schema::{check_object, join, list, non_empty, text, unit_interval, ObjectRule, Rule};
use super::{ValidationCode, ValidationFailure};
use crate::domain::models::{ContractName, TargetKey};

/// Literal every contract must carry in `schemaVersion`.
pub const SCHEMA_VERSION: &str = "v1";

/// Hard maximum number of variants a generation may return.
pub const MAX_VARIANTS: usize = 8;

const ENVELOPE_KEYS: [&str; 2] = ["schemaVersion", "requiresApproval"];

const TARGET_KEYS: &[&str] = &[
    TargetKey::HeroHeadline.as_str(),
    TargetKey::HeroSubheadline.as_str(),
    TargetKey::HeroCta.as_str(),
    TargetKey::TrustItems.as_str(),
    TargetKey::ServicesItems.as_str(),
    TargetKey::SocialProofReviews.as_str(),
    TargetKey::SocialProofOutcomes.as_str(),
    TargetKey::SocialProofCredentials.as_str(),
];

fn copy_value() -> Rule {
    let item = Rule::AnyOf(vec![
        text(300),
        Rule::Object(ObjectRule::new().required("name", text(120)).required("line", text(240))),
        Rule::Object(ObjectRule::new().required("text", text(480)).required("author", text(120))),
        Rule::Object(ObjectRule::new().required("metric", text(60)).required("label", text(240))),
    ]);
    Rule::AnyOf(vec![text(300), list(item, 0, 10)])
}

fn copy_proposal() -> ObjectRule {
    let variant = ObjectRule::new()
        .required("targetKey", Rule::Enum(TARGET_KEYS))
        .required("value", copy_value())
        .optional("rationale", text(200))
        .optional("confidence", unit_interval())
        .optional("risks", list(text(120), 0, 3));
    ObjectRule::new()
        .required("variants", list(Rule::Object(variant), 0, MAX_VARIANTS))
        .required("confidence", unit_interval())
        .required("risks", list(text(120), 0, 5))
        .required("assumptions", list(text(120), 0, 5))
}

fn critique() -> ObjectRule {
    ObjectRule::new()
        .required("score", unit_interval())
        .required("issues", list(text(200), 0, 10))
        .required("improvements", list(text(200), 0, 10))
        .required("needsHuman", Rule::Bool)
        .optional("needsHumanReason", text(200))
}

fn decision_collapse() -> ObjectRule {
    // Range is checked against the actual variant count by the pipeline, so an
    // out-of-range index surfaces as an invalid choice rather than a schema
    // failure.
    let index = Rule::Integer {
        min: i64::MIN,
        max: i64::MAX,
        nullable: true,
    };
    ObjectRule::new()
        .required("chosenIndex", index)
        .required("confidence", unit_interval())
        .required("reasoning", text(500))
        .required("needsHuman", Rule::Bool)
        .optional("reviseRequested", Rule::Bool)
        .optional("revisionNotes", text(500))
}

fn diagnosis() -> ObjectRule {
    ObjectRule::new()
        .required("likelyCause", non_empty(500))
        .required("confidence", unit_interval())
        .required("relatedIssues", list(text(200), 0, 10))
}

fn patch_body() -> ObjectRule {
    let change = ObjectRule::new()
        .required("file", non_empty(300))
        .required("operation", Rule::Enum(&["edit", "create", "delete"]))
        .required("description", text(500))
        .optional("diff", text(20_000))
        .required("rationale", text(500));
    let test_command = ObjectRule::new()
        .required("cmd", non_empty(40))
        .optional("args", list(text(500), 0, 10))
        .optional("cwd", text(200));
    ObjectRule::new()
        .required("changes", list(Rule::Object(change), 0, 20))
        .required("testPlan", list(text(300), 0, 10))
        .optional("testCommands", list(Rule::Object(test_command), 0, 5))
        .required("rollbackPlan", text(500))
}

fn review_critique() -> ObjectRule {
    ObjectRule::new()
        .required("approved", Rule::Bool)
        .required("concerns", list(text(300), 0, 10))
        .required("suggestions", list(text(300), 0, 10))
}

fn arbiter_decision() -> ObjectRule {
    ObjectRule::new()
        .required("decision", Rule::Enum(&["apply", "reject", "revise"]))
        .required("rationale", text(1_000))
        .optional("finalPatch", Rule::Object(patch_body()))
}

static CONTRACTS: LazyLock<BTreeMap<ContractName, ObjectRule>> = LazyLock::new(|| {
    BTreeMap::from([
        (ContractName::CopyProposal, copy_proposal()),
        (ContractName::Critique, critique()),
        (ContractName::DecisionCollapse, decision_collapse()),
        (ContractName::Diagnosis, diagnosis()),
        (ContractName::PatchProposal, patch_body()),
        (ContractName::ReviewCritique, review_critique()),
        (ContractName::ArbiterDecision, arbiter_decision()),
    ])
});

/// The `schemaVersion` / `requiresApproval` assertions, checked explicitly for
/// every contract before the structural pass.
fn assert_envelope(map: &serde_json::Map<String, Value>, errors: &mut Vec<String>) {
    match map.get("schemaVersion") {
        Some(Value::String(v)) if v == SCHEMA_VERSION => {}
        Some(_) => errors.push(format!("/schemaVersion: must equal \"{SCHEMA_VERSION}\"")),
        None => errors.push("(root): missing required property 'schemaVersion'".to_string()),
    }
    match map.get("requiresApproval") {
        Some(Value::Bool(true)) => {}
        Some(_) => errors.push("/requiresApproval: must equal true".to_string()),
        None => errors.push("(root): missing required property 'requiresApproval'".to_string()),
    }
}

/// Validate a parsed value against a named contract.
///
/// Returns the value unchanged on success. A non-object is `invalid_json`;
/// everything else is `schema_violation` with every error found.
pub fn validate(contract: ContractName, candidate: &Value) -> Result<Value, ValidationFailure> {
    let Some(map) = candidate.as_object() else {
        return Err(ValidationFailure::new(
            ValidationCode::InvalidJson,
            vec!["(root): must be object".to_string()],
        ));
    };

    let mut errors = Vec::new();
    assert_envelope(map, &mut errors);
    if let Some(rule) = CONTRACTS.get(&contract) {
        check_object(map, rule, &ENVELOPE_KEYS, "(root)", &mut errors);
    } else {
        errors.push(format!("(root): unknown contract '{contract}'"));
    }

    if errors.is_empty() {
        Ok(candidate.clone())
    } else {
        Err(ValidationFailure::new(ValidationCode::SchemaViolation, errors))
    }
}

/// Parse raw text, then validate.
pub fn validate_text(contract: ContractName, raw: &str) -> Result<Value, ValidationFailure> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => validate(contract, &value),
        Err(_) => Err(ValidationFailure::new(
            ValidationCode::InvalidJson,
            vec!["(root): not parseable JSON".to_string()],
        )),
    }
}

/// JSON pointer for the `index`th variant, shared with the cap enforcer.
pub fn variant_path(index: usize) -> String {
    join(&join("(root)", "variants"), index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diagnosis_ok() -> Value {
        json!({
            "schemaVersion": "v1",
            "requiresApproval": true,
            "likelyCause": "missing import",
            "confidence": 0.8,
            "relatedIssues": []
        })
    }

    #[test]
    fn test_valid_diagnosis() {
        let v = diagnosis_ok();
        assert_eq!(validate(ContractName::Diagnosis, &v).unwrap(), v);
    }

    #[test]
    fn test_non_object_is_invalid_json() {
        let err = validate(ContractName::Diagnosis, &json!([1, 2])).unwrap_err();
        assert_eq!(err.code, ValidationCode::InvalidJson);
        let err = validate_text(ContractName::Diagnosis, "{not json").unwrap_err();
        assert_eq!(err.code, ValidationCode::InvalidJson);
    }

    #[test]
    fn test_additional_property_rejected() {
        let mut v = diagnosis_ok();
        v["extra"] = json!(1);
        let err = validate(ContractName::Diagnosis, &v).unwrap_err();
        assert_eq!(err.code, ValidationCode::SchemaViolation);
        assert_eq!(err.errors, vec!["(root): additionalProperty 'extra' is not allowed"]);
    }

    #[test]
    fn test_envelope_assertions() {
        let mut v = diagnosis_ok();
        v["requiresApproval"] = json!(false);
        v["schemaVersion"] = json!("v2");
        let err = validate(ContractName::Diagnosis, &v).unwrap_err();
        assert!(err.errors.contains(&"/requiresApproval: must equal true".to_string()));
        assert!(err.errors.contains(&"/schemaVersion: must equal \"v1\"".to_string()));

        let v = json!({"likelyCause": "x", "confidence": 0.5, "relatedIssues": []});
        let err = validate(ContractName::Diagnosis, &v).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn test_unknown_arbiter_decision_is_violation() {
        let v = json!({
            "schemaVersion": "v1",
            "requiresApproval": true,
            "decision": "escalate",
            "rationale": "unsure"
        });
        let err = validate(ContractName::ArbiterDecision, &v).unwrap_err();
        assert_eq!(err.errors, vec!["/decision: must be one of [apply, reject, revise]"]);
    }

    #[test]
    fn test_copy_proposal_shapes() {
        let v = json!({
            "schemaVersion": "v1",
            "requiresApproval": true,
            "variants": [
                {"targetKey": "hero.headline", "value": "Fast, friendly plumbing"},
                {"targetKey": "services.items", "value": [{"name": "Drains", "line": "Cleared same day"}]},
                {"targetKey": "hero.nope", "value": 3}
            ],
            "confidence": 0.7,
            "risks": [],
            "assumptions": []
        });
        let err = validate(ContractName::CopyProposal, &v).unwrap_err();
        assert!(err.errors.iter().any(|e| e.starts_with("/variants/2/targetKey")));
        assert!(err.errors.contains(&"/variants/2/value: must match one of the allowed shapes".to_string()));
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn test_every_contract_is_registered() {
        for contract in ContractName::ALL {
            assert!(CONTRACTS.contains_key(&contract), "{contract} missing");
        }
    }

    #[test]
    fn test_variant_path() {
        assert_eq!(variant_path(2), "/variants/2");
    }
}
