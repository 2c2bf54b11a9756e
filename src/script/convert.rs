use rhai::{Array, Dynamic, EvalAltResult, Map, Position};
use serde_json::{Map as JsonMap, Number, Value};
use thiserror::Error;

use super::moment::Moment;

#[derive(Debug, Clone, Error)]
#[error("values of type '{type_name}' cannot be stored in a form field")]
pub struct UnsupportedValue {
    pub type_name: String,
}

impl From<UnsupportedValue> for Box<EvalAltResult> {
    fn from(err: UnsupportedValue) -> Self {
        Box::new(EvalAltResult::ErrorRuntime(
            Dynamic::from(err.to_string()),
            Position::NONE,
        ))
    }
}

pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(flag) => Dynamic::from_bool(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(int) => Dynamic::from_int(int),
            None => Dynamic::from_float(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => Dynamic::from(text.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(json_to_dynamic).collect()),
        Value::Object(map) => {
            let converted: Map = map
                .iter()
                .map(|(key, value)| (key.as_str().into(), json_to_dynamic(value)))
                .collect();
            Dynamic::from_map(converted)
        }
    }
}

/// Convert a script value back into JSON. Moments become ISO-8601 strings;
/// functions and other host types are rejected.
pub fn dynamic_to_json(value: &Dynamic) -> Result<Value, UnsupportedValue> {
    let value = value.flatten_clone();
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(flag) = value.as_bool() {
        return Ok(Value::Bool(flag));
    }
    if let Ok(int) = value.as_int() {
        return Ok(Value::from(int));
    }
    if let Ok(float) = value.as_float() {
        // NaN and infinities have no JSON form
        return Ok(Number::from_f64(float)
            .map(Value::Number)
            .unwrap_or(Value::Null));
    }
    if let Ok(ch) = value.as_char() {
        return Ok(Value::String(ch.to_string()));
    }
    if let Ok(text) = value.clone().into_immutable_string() {
        return Ok(Value::String(text.to_string()));
    }
    if value.is::<Array>() {
        let items = value.clone().try_cast::<Array>().unwrap_or_default();
        return items
            .iter()
            .map(dynamic_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if value.is::<Map>() {
        let map = value.clone().try_cast::<Map>().unwrap_or_default();
        let mut converted = JsonMap::with_capacity(map.len());
        for (key, item) in &map {
            converted.insert(key.to_string(), dynamic_to_json(item)?);
        }
        return Ok(Value::Object(converted));
    }
    if let Some(moment) = value.clone().try_cast::<Moment>() {
        return Ok(Value::String(moment.to_iso_string()));
    }
    Err(UnsupportedValue {
        type_name: value.type_name().to_string(),
    })
}

/// Structural equality where numbers compare by value (`1` equals `1.0`).
pub fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_values_survive_conversion() {
        let value = json!({"rows": [1, 2.5, "x", null, {"ok": true}]});
        let back = dynamic_to_json(&json_to_dynamic(&value)).unwrap();
        assert!(json_equal(&value, &back));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(json_equal(&json!(1), &json!(1.0)));
        assert!(!json_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn function_pointers_are_rejected() {
        let ptr = rhai::FnPtr::new("handler").unwrap();
        let err = dynamic_to_json(&Dynamic::from(ptr)).unwrap_err();
        assert!(err.to_string().contains("cannot be stored"));
    }
}
