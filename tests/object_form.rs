use std::rc::Rc;
use std::time::Instant;

use indexmap::IndexMap;
use objectform::{
    CombinedForm, CombinedFormInput, ExtractOptions, FormEnvironment, FormOptions, ObjectForm,
    ObjectFormInput, Operator, PendingTaskRegistry, RangeValue, Situation, parse_form_model,
};
use serde_json::{Value, json};

fn form(schema: Value, data: Value, situation: Situation) -> ObjectForm {
    ObjectForm::new(
        ObjectFormInput::new(parse_form_model(&schema).unwrap(), data, situation),
        FormOptions::default(),
        FormEnvironment::default(),
    )
}

#[test]
fn create_form_becomes_valid_once_title_is_set() {
    let schema = json!({
        "elements": [
            {"type": "o2mGroup", "elements": []},
            {"type": "o2mGroup", "elements": [
                {"name": "title", "type": "string", "required": true}
            ]}
        ]
    });
    let mut form = form(schema, json!({}), Situation::Create);
    assert!(!form.is_valid());
    assert!(form.errors()["title"].contains_key("required"));

    form.set_value("title", json!("Invoice")).unwrap();
    assert!(form.is_valid());
    assert_eq!(form.extract(), json!({"title": "Invoice"}));
}

#[test]
fn search_range_is_bound_from_filters() {
    let schema = json!({"elements": [{"name": "amount", "type": "decimal"}]});
    let data = json!([
        {"property": "amount", "operator": "INTERVAL_INCLUDE_BOTH", "firstValue": 10, "secondValue": 100}
    ]);
    let form = form(schema, data, Situation::Search);
    assert_eq!(
        RangeValue::from_value(&form.value("amount").unwrap()),
        Some(RangeValue::new(
            Operator::IntervalIncludeBoth,
            json!(10),
            json!(100)
        ))
    );
}

#[test]
fn equal_null_filter_marks_not_set() {
    let schema = json!({"elements": [{"name": "status", "type": "string"}]});
    let data = json!([{"property": "status", "operator": "EQUAL", "firstValue": null}]);
    let form = form(schema, data, Situation::Search);
    assert!(form.control("status").unwrap().is_not_set_value);
    assert_eq!(form.extract(), json!({}));
    assert_eq!(
        form.extract_with(ExtractOptions {
            include_not_set: true
        }),
        json!({"status": null})
    );
}

#[test]
fn scalar_fields_round_trip_without_scripts() {
    let schema = json!({
        "elements": [
            {"name": "core", "type": "o2mGroup", "elements": [
                {"name": "title", "type": "string"},
                {"name": "count", "type": "integer"},
                {"name": "amount", "type": "decimal"},
                {"name": "paid", "type": "boolean"}
            ]}
        ]
    });
    let data = json!({"title": "Invoice", "count": 3, "amount": 12.5, "paid": false});
    for situation in [Situation::Create, Situation::Edit] {
        let form = form(schema.clone(), data.clone(), situation);
        assert_eq!(form.extract(), data, "{situation}");
        assert!(!form.is_dirty());
    }
}

#[test]
fn edited_table_row_releases_its_task() {
    let schema = json!({
        "elements": [{"name": "positions", "type": "table", "elements": [
            {"name": "article", "type": "string"},
            {"name": "qty", "type": "integer"}
        ]}]
    });
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = ObjectForm::new(
        ObjectFormInput::new(
            parse_form_model(&schema).unwrap(),
            json!({"positions": [{"article": "Chair", "qty": 2}, {"article": "Desk", "qty": 1}]}),
            Situation::Edit,
        ),
        FormOptions::default(),
        FormEnvironment::default().with_pending(pending.clone()),
    );

    form.edit_row("positions", 0).unwrap();
    assert!(!pending.is_empty());
    form.update_row_value("positions", "article", json!("Armchair"))
        .unwrap();
    form.save_row("positions", false).unwrap();

    let table = form.table("positions").unwrap();
    assert_eq!(table.rows()[0], json!({"article": "Armchair", "qty": 2}));
    assert_eq!(table.len(), 2);
    assert!(pending.is_empty());
}

#[test]
fn status_is_published_after_the_debounce_window() {
    let schema = json!({"elements": [{"name": "title", "type": "string"}]});
    let mut form = form(schema, json!({"title": "Draft"}), Situation::Edit);
    let start = Instant::now();
    assert!(form.poll_status(start).is_none());

    form.set_value("title", json!("Final")).unwrap();
    let window = form.options().debounce;
    assert!(form.poll_status(Instant::now()).is_none());
    let status = form
        .poll_status(Instant::now() + window)
        .expect("status after the window");
    assert!(status.dirty);
    assert!(!status.invalid);
    assert!(status.indexdata_changed);

    form.set_value("title", json!("Draft")).unwrap();
    let status = form.poll_status(Instant::now() + window).unwrap();
    assert!(!status.indexdata_changed);
}

#[test]
fn adding_a_fragment_dirties_the_combined_form() {
    let main = parse_form_model(&json!({"elements": [{"name": "title", "type": "string"}]})).unwrap();
    let vendor =
        parse_form_model(&json!({"elements": [{"name": "vendor", "type": "string"}]})).unwrap();
    let mut combined = CombinedForm::new(
        CombinedFormInput::new(main, json!({"title": "Invoice"}), Situation::Edit)
            .with_edit_sot(true),
        FormOptions::default(),
        FormEnvironment::default(),
    );
    assert!(!combined.combined_state().dirty);

    combined
        .add_forms(
            IndexMap::from([("vendor-sot".to_string(), vendor)]),
            &json!({"vendor": "ACME"}),
        )
        .unwrap();
    let state = combined.combined_state();
    assert!(state.dirty);
    assert!(combined.extension_form("vendor-sot").is_some_and(|form| !form.is_dirty()));
    assert_eq!(state.data, json!({"title": "Invoice", "vendor": "ACME"}));
    assert_eq!(combined.added_fragments(), ["vendor-sot"]);
}
