//! Data-described schema rules and the checker that walks them.
//!
//! Objects are closed-world: any key not declared is an error. The checker
//! collects every violation in one pass.

use serde_json::{Map, Value};

/// One rule for one JSON value.
#[derive(Debug, Clone)]
pub enum Rule {
    /// String with a length in characters.
    Str {
        /// Shortest allowed length.
        min: usize,
        /// Longest allowed length.
        max: usize,
    },
    /// Any JSON number within bounds.
    Number {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// Whole number within bounds.
    Integer {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// Whether `null` is accepted.
        nullable: bool,
    },
    /// `true` or `false`.
    Bool,
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    /// Homogeneous array with bounded length.
    Array {
        /// Rule every element must satisfy.
        item: Box<Rule>,
        /// Fewest elements.
        min: usize,
        /// Most elements.
        max: usize,
    },
    /// Closed-world object.
    Object(ObjectRule),
    /// Value must satisfy at least one alternative.
    AnyOf(Vec<Rule>),
}

/// One declared key of an object.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Key name.
    pub name: &'static str,
    /// Whether the key must be present.
    pub required: bool,
    /// Rule for the key's value.
    pub rule: Rule,
}

/// The complete set of keys an object may carry.
#[derive(Debug, Clone, Default)]
pub struct ObjectRule {
    /// Declared keys, in declaration order.
    pub fields: Vec<FieldRule>,
}

impl ObjectRule {
    /// An object with no keys.
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Declare a key that must be present.
    #[must_use]
    pub fn required(mut self, name: &'static str, rule: Rule) -> Self {
        self.fields.push(FieldRule {
            name,
            required: true,
            rule,
        });
        self
    }

    /// Declare a key that may be absent.
    #[must_use]
    pub fn optional(mut self, name: &'static str, rule: Rule) -> Self {
        self.fields.push(FieldRule {
            name,
            required: false,
            rule,
        });
        self
    }
}

/// String of at most `max` characters.
pub const fn text(max: usize) -> Rule {
    Rule::Str { min: 0, max }
}

/// Non-empty string of at most `max` characters.
pub const fn non_empty(max: usize) -> Rule {
    Rule::Str { min: 1, max }
}

/// Number in `[0, 1]`.
pub const fn unit_interval() -> Rule {
    Rule::Number { min: 0.0, max: 1.0 }
}

/// Array of `min..=max` items matching `item`.
pub fn list(item: Rule, min: usize, max: usize) -> Rule {
    Rule::Array {
        item: Box::new(item),
        min,
        max,
    }
}

/// Child path in JSON pointer form.
pub fn join(path: &str, segment: impl std::fmt::Display) -> String {
    if path == "(root)" {
        format!("/{segment}")
    } else {
        format!("{path}/{segment}")
    }
}

/// Check `value` against `rule`, appending `"<path>: <problem>"` strings.
pub fn check(value: &Value, rule: &Rule, path: &str, errors: &mut Vec<String>) {
    match rule {
        Rule::Str { min, max } => match value.as_str() {
            Some(s) => {
                let len = s.chars().count();
                if len < *min {
                    errors.push(format!("{path}: must be >= {min} chars"));
                }
                if len > *max {
                    errors.push(format!("{path}: must be <= {max} chars"));
                }
            }
            None => errors.push(format!("{path}: must be string")),
        },
        Rule::Number { min, max } => match value.as_f64() {
            Some(n) => {
                if n < *min {
                    errors.push(format!("{path}: must be >= {min}"));
                }
                if n > *max {
                    errors.push(format!("{path}: must be <= {max}"));
                }
            }
            None => errors.push(format!("{path}: must be number")),
        },
        Rule::Integer { min, max, nullable } => {
            if value.is_null() {
                if !nullable {
                    errors.push(format!("{path}: must be integer"));
                }
                return;
            }
            match value.as_i64() {
                Some(n) => {
                    if n < *min {
                        errors.push(format!("{path}: must be >= {min}"));
                    }
                    if n > *max {
                        errors.push(format!("{path}: must be <= {max}"));
                    }
                }
                None => errors.push(format!("{path}: must be integer")),
            }
        }
        Rule::Bool => {
            if !value.is_boolean() {
                errors.push(format!("{path}: must be boolean"));
            }
        }
        Rule::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            _ => errors.push(format!("{path}: must be one of [{}]", allowed.join(", "))),
        },
        Rule::Array { item, min, max } => match value.as_array() {
            Some(items) => {
                if items.len() < *min {
                    errors.push(format!("{path}: must have >= {min} items"));
                }
                if items.len() > *max {
                    errors.push(format!("{path}: must have <= {max} items"));
                }
                for (i, v) in items.iter().enumerate() {
                    check(v, item, &join(path, i), errors);
                }
            }
            None => errors.push(format!("{path}: must be array")),
        },
        Rule::Object(obj) => match value.as_object() {
            Some(map) => check_object(map, obj, &[], path, errors),
            None => errors.push(format!("{path}: must be object")),
        },
        Rule::AnyOf(alternatives) => {
            let matched = alternatives.iter().any(|alt| {
                let mut scratch = Vec::new();
                check(value, alt, path, &mut scratch);
                scratch.is_empty()
            });
            if !matched {
                errors.push(format!("{path}: must match one of the allowed shapes"));
            }
        }
    }
}

/// Check an object's declared fields; `extra_known` names keys handled by
/// the caller that must not be reported as additional.
pub fn check_object(
    map: &Map<String, Value>,
    rule: &ObjectRule,
    extra_known: &[&str],
    path: &str,
    errors: &mut Vec<String>,
) {
    for key in map.keys() {
        let declared = rule.fields.iter().any(|f| f.name == key) || extra_known.contains(&key.as_str());
        if !declared {
            errors.push(format!("{path}: additionalProperty '{key}' is not allowed"));
        }
    }
    for field in &rule.fields {
        match map.get(field.name) {
            Some(v) => check(v, &field.rule, &join(path, field.name), errors),
            None if field.required => {
                errors.push(format!("{path}: missing required property '{}'", field.name));
            }
            None => {}
        }
    }
}
