use anyhow::{Context, Result, bail};
use serde_json::Value;

use super::schema::{FormElement, FormModel, Situation};

/// Parse a server-supplied form model document into a `FormModel`.
pub fn parse_form_model(value: &Value) -> Result<FormModel> {
    let Some(object) = value.as_object() else {
        bail!("form model must be a JSON object");
    };
    let elements = object
        .get("elements")
        .and_then(Value::as_array)
        .context("form model must define an elements array")?;

    let situation = object
        .get("situation")
        .filter(|raw| !raw.is_null())
        .map(|raw| serde_json::from_value::<Situation>(raw.clone()))
        .transpose()
        .context("form model has an invalid situation")?;

    let mut parsed = Vec::with_capacity(elements.len());
    for (index, raw) in elements.iter().enumerate() {
        let element = parse_element(raw, &format!("/elements/{index}"))?;
        parsed.push(element);
    }

    Ok(FormModel {
        name: object
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
        situation,
        elements: parsed,
        script: object
            .get("script")
            .and_then(Value::as_str)
            .filter(|source| !source.trim().is_empty())
            .map(str::to_string),
    })
}

fn parse_element(raw: &Value, pointer: &str) -> Result<FormElement> {
    let Some(object) = raw.as_object() else {
        bail!("element at {pointer} must be a JSON object");
    };
    // children are parsed separately so errors name the failing node
    let mut own = object.clone();
    let children = own.remove("elements");
    let mut element: FormElement = serde_json::from_value(Value::Object(own))
        .with_context(|| format!("invalid element at {pointer}"))?;

    if let Some(children) = children.as_ref().and_then(Value::as_array) {
        element.elements = children
            .iter()
            .enumerate()
            .map(|(index, child)| parse_element(child, &format!("{pointer}/elements/{index}")))
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(element)
}
