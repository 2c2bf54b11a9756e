use serde_json::{Value, json};

use crate::domain::{ElementType, FormElement, FormModel, Operator, RangeValue, Situation};
use crate::form::{ControlKind, ExtractOptions, FormBuilder, GroupLayout, build};
use crate::options::FormOptions;

fn field(name: &str, element_type: ElementType) -> FormElement {
    FormElement::new(name, element_type)
}

fn group(name: &str, elements: Vec<FormElement>) -> FormElement {
    field(name, ElementType::O2mGroup).with_elements(elements)
}

fn invoice_model() -> FormModel {
    let mut amount = field("amount", ElementType::Decimal);
    amount.defaultvalue = Some(json!(1.5));
    let mut due = field("due", ElementType::Datetime);
    due.resolution = Some("date".into());
    FormModel::new(vec![
        group("core", vec![field("title", ElementType::String).with_required(true)]),
        field("data", ElementType::O2mGroupStack).with_elements(vec![group(
            "details",
            vec![amount, due, field("note", ElementType::String)],
        )]),
    ])
}

#[test]
fn empty_groups_are_skipped() {
    let model = FormModel::new(vec![
        field("", ElementType::O2mGroup),
        group("", vec![field("title", ElementType::String).with_required(true)]),
        group("shell", vec![field("grid", ElementType::Table)]),
    ]);
    let options = FormOptions::default();
    let tree = build(&model, &json!({}), Situation::Create, &options);
    let keys: Vec<_> = tree.root.children.keys().cloned().collect();
    assert_eq!(keys, ["group-1"]);
    assert!(!tree.is_valid());
}

#[test]
fn layouts_follow_group_type_and_depth() {
    let options = FormOptions::default();
    let tree = build(&invoice_model(), &json!({}), Situation::Edit, &options);
    assert_eq!(tree.root.group("core").unwrap().layout, GroupLayout::Plain);
    let data = tree.root.group("data").unwrap();
    assert_eq!(data.layout, GroupLayout::Tabs);
    assert_eq!(data.group("details").unwrap().layout, GroupLayout::Fieldset);
}

#[test]
fn defaults_apply_only_when_creating() {
    let options = FormOptions::default();
    let created = build(&invoice_model(), &json!({}), Situation::Create, &options);
    assert_eq!(created.control("amount").unwrap().value(), json!(1.5));

    let edited = build(&invoice_model(), &json!({}), Situation::Edit, &options);
    assert_eq!(edited.control("amount").unwrap().value(), Value::Null);

    let kept = build(&invoice_model(), &json!({"amount": 7}), Situation::Create, &options);
    assert_eq!(kept.control("amount").unwrap().value(), json!(7));
}

#[test]
fn edit_extraction_keeps_cleared_keys() {
    let options = FormOptions::default();
    let data = json!({"title": "Invoice", "note": "first"});
    let mut tree = build(&invoice_model(), &data, Situation::Edit, &options);
    tree.control_mut("note").unwrap().patch_value(json!(""), true);
    assert_eq!(tree.to_data(), json!({"title": "Invoice", "note": null}));
    assert!(tree.is_dirty());
}

#[test]
fn create_extraction_omits_empty_values() {
    let options = FormOptions::default();
    let mut tree = build(&invoice_model(), &json!({}), Situation::Create, &options);
    tree.control_mut("note").unwrap().patch_value(json!([]), true);
    assert_eq!(tree.to_data(), json!({"amount": 1.5}));
}

#[test]
fn date_only_fields_are_formatted() {
    let options = FormOptions::default();
    let data = json!({"due": "2024-03-05T10:30:00.000Z"});
    let tree = build(&invoice_model(), &data, Situation::Edit, &options);
    assert_eq!(tree.to_data()["due"], json!("2024-03-05"));
    assert_eq!(tree.control("due").unwrap().kind, ControlKind::Date);

    let options = FormOptions::default().with_date_format("%d.%m.%Y");
    let tree = build(&invoice_model(), &data, Situation::Edit, &options);
    assert_eq!(tree.to_data()["due"], json!("05.03.2024"));
}

#[test]
fn search_binds_filters_by_id() {
    let mut amount = field("amount", ElementType::Decimal);
    amount.id = Some("inv:amount".into());
    let model = FormModel::new(vec![group(
        "data",
        vec![
            amount,
            field("status", ElementType::String),
            field("title", ElementType::String).with_required(true),
        ],
    )]);
    let data = json!([
        {"property": "inv:amount", "operator": "INTERVAL_INCLUDE_BOTH", "firstValue": 10, "secondValue": 100},
        {"property": "status", "operator": "EQUAL", "firstValue": null}
    ]);
    let options = FormOptions::default();
    let tree = build(&model, &data, Situation::Search, &options);

    let amount = tree.control("amount").unwrap();
    assert_eq!(amount.kind, ControlKind::Range);
    assert_eq!(
        RangeValue::from_value(&amount.value()),
        Some(RangeValue::new(Operator::IntervalIncludeBoth, json!(10), json!(100)))
    );

    let status = tree.control("status").unwrap();
    assert!(status.is_not_set_value);
    assert!(tree.is_valid());
    assert!(tree.to_data().get("status").is_none());
    let explicit = tree.extract_with(ExtractOptions {
        include_not_set: true,
    });
    assert_eq!(explicit["status"], Value::Null);
}

#[test]
fn disabled_forms_are_readonly_and_valid() {
    let options = FormOptions::default().with_disabled(true);
    let tree = FormBuilder::new(Situation::Create, &options).build(&invoice_model(), &json!({}));
    let title = tree.control("title").unwrap();
    assert!(title.is_readonly());
    assert!(title.errors().contains_key("required"));
    assert!(tree.is_valid());
}

#[test]
fn classifications_pick_the_control_kind() {
    let mut email = field("mail", ElementType::String);
    email.classifications = vec!["email".into()];
    let mut org = field("owner", ElementType::String);
    org.classifications = vec!["id:organization[user]".into()];
    let model = FormModel::new(vec![email, org, field("grid", ElementType::Table)
        .with_elements(vec![field("qty", ElementType::Integer)])]);
    let options = FormOptions::default();
    let tree = build(&model, &json!({}), Situation::Edit, &options);
    assert_eq!(tree.control("mail").unwrap().kind, ControlKind::Email);
    assert_eq!(tree.control("owner").unwrap().kind, ControlKind::Organization);
    assert_eq!(tree.control("grid").unwrap().kind, ControlKind::Table);
    assert_eq!(tree.control("mail").unwrap().element().display_label(), "mail");
}
