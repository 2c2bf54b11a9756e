use serde_json::json;

use crate::domain::{ElementType, Situation, parse_form_model};

#[test]
fn parses_partitions_and_script() {
    let raw = json!({
        "name": "invoice",
        "situation": "CREATE",
        "script": "scope.model.title.required = true;",
        "elements": [
            {"name": "core", "type": "o2mGroup", "elements": [
                {"name": "title", "type": "string", "required": true, "maxLength": 32}
            ]},
            {"name": "data", "type": "o2mGroupStack", "elements": [
                {"name": "amount", "type": "decimal", "minValue": 0},
                {"name": "kind", "type": "codesystem"}
            ]}
        ]
    });
    let model = parse_form_model(&raw).unwrap();
    assert_eq!(model.situation, Some(Situation::Create));
    assert_eq!(model.script_name(), "invoice");
    assert!(model.has_elements());

    let core = &model.elements[0];
    assert_eq!(core.element_type, ElementType::O2mGroup);
    assert_eq!(core.elements[0].max_length, Some(32));

    let data = &model.elements[1];
    assert_eq!(data.element_type, ElementType::O2mGroupStack);
    assert_eq!(data.elements[0].min_value, Some(0.0));
    assert_eq!(
        data.elements[1].element_type,
        ElementType::Other("codesystem".into())
    );
}

#[test]
fn blank_scripts_are_dropped() {
    let model = parse_form_model(&json!({"elements": [], "script": "  \n"})).unwrap();
    assert!(model.script.is_none());
    assert_eq!(model.script_name(), "form-script");
    assert!(!model.has_elements());
}

#[test]
fn errors_name_the_failing_element() {
    let raw = json!({
        "elements": [
            {"name": "core", "type": "o2mGroup", "elements": [
                {"name": "title", "type": "string"},
                {"name": "amount", "type": "decimal", "required": "yes"}
            ]}
        ]
    });
    let err = parse_form_model(&raw).unwrap_err();
    assert!(format!("{err:#}").contains("/elements/0/elements/1"));
}

#[test]
fn rejects_models_without_elements() {
    assert!(parse_form_model(&json!({"name": "x"})).is_err());
    assert!(parse_form_model(&json!([1, 2])).is_err());
    assert!(parse_form_model(&json!({"elements": [], "situation": "LATER"})).is_err());
}
