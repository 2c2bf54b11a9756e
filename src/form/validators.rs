use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::domain::{FormElement, Situation};

use super::tree::is_empty_value;

#[derive(Debug, Clone)]
pub enum Validator {
    Required,
    Pattern { source: String, regex: Regex },
    MinLength(usize),
    MaxLength(usize),
    Range { min: Option<f64>, max: Option<f64> },
    /// Fails while a script has set the element's `error`.
    ScriptError,
}

impl Validator {
    pub fn key(&self) -> &'static str {
        match self {
            Validator::Required => "required",
            Validator::Pattern { .. } => "pattern",
            Validator::MinLength(_) => "minlength",
            Validator::MaxLength(_) => "maxlength",
            Validator::Range { .. } => "range",
            Validator::ScriptError => "script",
        }
    }

    fn check(&self, element: &FormElement) -> Option<ValidationError> {
        let value = &element.value;
        match self {
            Validator::Required => is_empty_value(value).then(|| ValidationError::new("required")),
            Validator::Pattern { source, regex } => {
                let text = value.as_str()?;
                if text.is_empty() || regex.is_match(text) {
                    return None;
                }
                Some(ValidationError::with_params(
                    "pattern",
                    json!({"requiredPattern": source, "actualValue": text}),
                ))
            }
            Validator::MinLength(min) => {
                let length = value_length(value)?;
                (length > 0 && length < *min).then(|| {
                    ValidationError::with_params(
                        "minlength",
                        json!({"requiredLength": min, "actualLength": length}),
                    )
                })
            }
            Validator::MaxLength(max) => {
                let length = value_length(value)?;
                (length > *max).then(|| {
                    ValidationError::with_params(
                        "maxlength",
                        json!({"requiredLength": max, "actualLength": length}),
                    )
                })
            }
            Validator::Range { min, max } => {
                let actual = value.as_f64()?;
                if let Some(min) = min.filter(|min| actual < *min) {
                    return Some(ValidationError::with_params(
                        "min",
                        json!({"min": min, "actual": actual}),
                    ));
                }
                max.filter(|max| actual > *max).map(|max| {
                    ValidationError::with_params("max", json!({"max": max, "actual": actual}))
                })
            }
            Validator::ScriptError => element.error.as_ref().map(|message| {
                ValidationError::with_params("script", json!({"message": message}))
            }),
        }
    }
}

/// Structured validation failure; display text is resolved by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub key: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl ValidationError {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(key: impl Into<String>, params: Value) -> Self {
        Self {
            key: key.into(),
            params,
        }
    }
}

fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Build the validator set for an element. The result replaces any previous
/// set; callers recompose whenever `required` changes.
pub fn compose_validators(
    element: &FormElement,
    situation: Situation,
    scripted: bool,
) -> Vec<Validator> {
    let mut validators = Vec::new();
    let searching = situation == Situation::Search;

    if !searching && element.required {
        validators.push(Validator::Required);
    }
    if !searching && !element.multiselect {
        if let Some(source) = element.regex.as_deref().filter(|source| !source.is_empty()) {
            match Regex::new(&format!("^(?:{source})$")) {
                Ok(regex) => validators.push(Validator::Pattern {
                    source: source.to_string(),
                    regex,
                }),
                Err(err) => warn!(field = %element.name, %err, "ignoring invalid field regex"),
            }
        }
    }
    if let Some(min) = element.min_length {
        validators.push(Validator::MinLength(min));
    }
    if let Some(max) = element.max_length {
        validators.push(Validator::MaxLength(max));
    }
    if !searching
        && element.is_numeric()
        && (element.min_value.is_some() || element.max_value.is_some())
    {
        validators.push(Validator::Range {
            min: element.min_value,
            max: element.max_value,
        });
    }
    if scripted {
        validators.push(Validator::ScriptError);
    }
    validators
}

pub fn run_validators(
    validators: &[Validator],
    element: &FormElement,
) -> IndexMap<String, ValidationError> {
    validators
        .iter()
        .filter_map(|validator| validator.check(element))
        .map(|error| (error.key.clone(), error))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ElementType;

    fn text_field() -> FormElement {
        let mut element = FormElement::new("code", ElementType::String).with_required(true);
        element.regex = Some("[A-Z]{3}".to_string());
        element
    }

    #[test]
    fn search_drops_required_and_pattern() {
        let validators = compose_validators(&text_field(), Situation::Search, false);
        assert!(validators.is_empty());
        let validators = compose_validators(&text_field(), Situation::Edit, true);
        let keys: Vec<_> = validators.iter().map(Validator::key).collect();
        assert_eq!(keys, ["required", "pattern", "script"]);
    }

    #[test]
    fn pattern_is_anchored_and_skipped_for_multiselect() {
        let mut element = text_field();
        element.value = Value::String("ABCD".into());
        let validators = compose_validators(&element, Situation::Edit, false);
        assert!(run_validators(&validators, &element).contains_key("pattern"));

        element.multiselect = true;
        let validators = compose_validators(&element, Situation::Edit, false);
        assert!(validators.iter().all(|v| v.key() != "pattern"));
    }

    #[test]
    fn script_error_fails_until_cleared() {
        let mut element = FormElement::new("amount", ElementType::Decimal);
        let validators = compose_validators(&element, Situation::Create, true);
        element.error = Some("too high".into());
        let errors = run_validators(&validators, &element);
        assert_eq!(errors["script"].params["message"], "too high");
        element.error = None;
        assert!(run_validators(&validators, &element).is_empty());
    }
}
