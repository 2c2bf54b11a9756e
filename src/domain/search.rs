use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equal,
    In,
    Like,
    Contains,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Interval,
    IntervalIncludeBoth,
    IntervalIncludeFrom,
    IntervalIncludeTo,
}

impl Operator {
    pub fn is_interval(self) -> bool {
        matches!(
            self,
            Operator::Interval
                | Operator::IntervalIncludeBoth
                | Operator::IntervalIncludeFrom
                | Operator::IntervalIncludeTo
        )
    }
}

/// A single filter entry of a SEARCH-situation data array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub property: String,
    pub operator: Operator,
    #[serde(default)]
    pub first_value: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub second_value: Value,
}

impl SearchFilter {
    pub fn new(property: impl Into<String>, operator: Operator, first_value: Value) -> Self {
        Self {
            property: property.into(),
            operator,
            first_value,
            second_value: Value::Null,
        }
    }

    /// An `EQUAL` filter without a value asks for objects where the field is unset.
    pub fn is_not_set(&self) -> bool {
        self.operator == Operator::Equal && self.first_value.is_null()
    }
}

/// Operator plus one or two bounds; the value of range-capable fields while searching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeValue {
    pub operator: Operator,
    #[serde(default)]
    pub first_value: Value,
    #[serde(default)]
    pub second_value: Value,
}

impl RangeValue {
    pub fn new(operator: Operator, first_value: Value, second_value: Value) -> Self {
        Self {
            operator,
            first_value,
            second_value,
        }
    }

    pub fn from_filter(filter: &SearchFilter) -> Self {
        Self::new(
            filter.operator,
            filter.first_value.clone(),
            filter.second_value.clone(),
        )
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "operator": self.operator,
            "firstValue": self.first_value,
            "secondValue": self.second_value,
        })
    }
}

/// Read the filter entries of a SEARCH data blob. Malformed entries are logged and skipped.
pub fn parse_filters(data: &Value) -> Vec<SearchFilter> {
    match data {
        Value::Null => Vec::new(),
        Value::Array(entries) => entries
            .iter()
            .enumerate()
            .filter_map(
                |(index, entry)| match serde_json::from_value::<SearchFilter>(entry.clone()) {
                    Ok(filter) => Some(filter),
                    Err(err) => {
                        warn!(index, %err, "skipping malformed search filter");
                        None
                    }
                },
            )
            .collect(),
        other => {
            warn!(kind = %value_kind(other), "search data is not a filter array; ignoring it");
            Vec::new()
        }
    }
}

/// Parse filters persisted as a JSON string (e.g. a stored quick search).
pub fn parse_stored_filters(raw: &str) -> Vec<SearchFilter> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => parse_filters(&value),
        Err(err) => {
            warn!(%err, "stored search filters are not valid JSON; treating them as empty");
            Vec::new()
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
