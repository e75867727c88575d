//! Per-section caps for copy proposals.
//!
//! Runs only after `copy_proposal` passed schema validation. Limits here are
//! tighter than the schema's and depend on each variant's `targetKey`.

use serde_json::Value;

use super::contracts::variant_path;
use super::schema::join;
use super::{ValidationCode, ValidationFailure};
use crate::domain::models::TargetKey;

/// Item-count bounds shared by every list-class section.
const MIN_ITEMS: usize = 3;
const MAX_ITEMS: usize = 5;

enum SectionCap {
    Text(usize),
    TextItems { item: usize, counted: bool },
    Pairs { fields: [(&'static str, usize); 2] },
}

const fn section_cap(key: TargetKey) -> SectionCap {
    match key {
        TargetKey::HeroHeadline => SectionCap::Text(80),
        TargetKey::HeroSubheadline => SectionCap::Text(140),
        TargetKey::HeroCta => SectionCap::Text(60),
        TargetKey::TrustItems => SectionCap::TextItems {
            item: 120,
            counted: false,
        },
        TargetKey::ServicesItems => SectionCap::Pairs {
            fields: [("name", 60), ("line", 120)],
        },
        TargetKey::SocialProofReviews => SectionCap::Pairs {
            fields: [("text", 240), ("author", 60)],
        },
        TargetKey::SocialProofOutcomes => SectionCap::Pairs {
            fields: [("metric", 20), ("label", 120)],
        },
        TargetKey::SocialProofCredentials => SectionCap::TextItems {
            item: 120,
            counted: true,
        },
    }
}

fn check_len(s: &str, max: usize, path: &str, errors: &mut Vec<String>) {
    let len = s.chars().count();
    if len > max {
        errors.push(format!("{path}: exceeds {max} chars (got {len})"));
    }
}

fn check_count(items: &[Value], path: &str, errors: &mut Vec<String>) {
    let n = items.len();
    if n < MIN_ITEMS {
        errors.push(format!("{path}: must have at least {MIN_ITEMS} items (got {n})"));
    }
    if n > MAX_ITEMS {
        errors.push(format!("{path}: must have at most {MAX_ITEMS} items (got {n})"));
    }
}

fn check_variant(key: TargetKey, value: &Value, path: &str, errors: &mut Vec<String>) {
    match section_cap(key) {
        SectionCap::Text(max) => match value.as_str() {
            Some(s) => check_len(s, max, path, errors),
            None => errors.push(format!("{path}: {key} must be a string")),
        },
        SectionCap::TextItems { item, counted } => {
            let Some(items) = value.as_array() else {
                errors.push(format!("{path}: {key} must be a list of strings"));
                return;
            };
            if counted {
                check_count(items, path, errors);
            }
            for (i, entry) in items.iter().enumerate() {
                match entry.as_str() {
                    Some(s) => check_len(s, item, &join(path, i), errors),
                    None => errors.push(format!("{}: must be a string", join(path, i))),
                }
            }
        }
        SectionCap::Pairs { fields } => {
            let Some(items) = value.as_array() else {
                errors.push(format!(
                    "{path}: {key} must be a list of {{{}, {}}}",
                    fields[0].0, fields[1].0
                ));
                return;
            };
            check_count(items, path, errors);
            for (i, entry) in items.iter().enumerate() {
                let item_path = join(path, i);
                for (field, max) in fields {
                    match entry.get(field).and_then(Value::as_str) {
                        Some(s) => check_len(s, max, &join(&item_path, field), errors),
                        None => errors.push(format!("{item_path}: missing '{field}'")),
                    }
                }
            }
        }
    }
}

/// Check every variant of a schema-valid copy proposal, returning every
/// violation in one pass.
pub fn enforce_section_caps(proposal: &Value) -> Result<(), ValidationFailure> {
    let mut errors = Vec::new();
    let variants = proposal
        .get("variants")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    for (i, variant) in variants.iter().enumerate() {
        let path = variant_path(i);
        let key = variant
            .get("targetKey")
            .and_then(Value::as_str)
            .and_then(TargetKey::from_str);
        let Some(key) = key else {
            errors.push(format!("{path}/targetKey: unknown section"));
            continue;
        };
        let value = variant.get("value").unwrap_or(&Value::Null);
        check_variant(key, value, &join(&path, "value"), &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::new(ValidationCode::CapViolation, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proposal(variants: Value) -> Value {
        json!({
            "schemaVersion": "v1",
            "requiresApproval": true,
            "variants": variants,
            "confidence": 0.5,
            "risks": [],
            "assumptions": []
        })
    }

    #[test]
    fn test_within_caps() {
        let p = proposal(json!([
            {"targetKey": "hero.headline", "value": "Same-day plumbing in Austin"},
            {"targetKey": "services.items", "value": [
                {"name": "Drains", "line": "Cleared fast"},
                {"name": "Heaters", "line": "Installed right"},
                {"name": "Leaks", "line": "Found and fixed"}
            ]}
        ]));
        assert!(enforce_section_caps(&p).is_ok());
    }

    #[test]
    fn test_reports_all_violations_in_one_pass() {
        let p = proposal(json!([
            {"targetKey": "hero.headline", "value": "h".repeat(81)},
            {"targetKey": "hero.cta", "value": "c".repeat(61)}
        ]));
        let err = enforce_section_caps(&p).unwrap_err();
        assert_eq!(err.code, ValidationCode::CapViolation);
        assert_eq!(
            err.errors,
            vec![
                "/variants/0/value: exceeds 80 chars (got 81)",
                "/variants/1/value: exceeds 60 chars (got 61)",
            ]
        );
    }

    #[test]
    fn test_list_counts_and_item_fields() {
        let p = proposal(json!([
            {"targetKey": "socialProof.outcomes", "value": [
                {"metric": "1,000,000,000 happy customers", "label": "served"},
                {"metric": "24/7", "label": "support"}
            ]}
        ]));
        let err = enforce_section_caps(&p).unwrap_err();
        assert!(err.errors.contains(&"/variants/0/value: must have at least 3 items (got 2)".to_string()));
        assert!(err.errors.iter().any(|e| e.starts_with("/variants/0/value/0/metric: exceeds 20 chars")));
    }

    #[test]
    fn test_shape_mismatch_is_violation() {
        let p = proposal(json!([
            {"targetKey": "hero.headline", "value": ["not", "a", "string"]},
            {"targetKey": "socialProof.credentials", "value": "Licensed"}
        ]));
        let err = enforce_section_caps(&p).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn test_trust_items_are_uncounted() {
        let p = proposal(json!([
            {"targetKey": "trust.items", "value": ["Licensed & insured"]}
        ]));
        assert!(enforce_section_caps(&p).is_ok());
    }
}
