use serde_json::json;

use crate::domain::{Operator, RangeValue, SearchFilter, parse_filters, parse_stored_filters};

#[test]
fn malformed_entries_are_skipped() {
    let filters = parse_filters(&json!([
        {"property": "title", "operator": "LIKE", "firstValue": "Inv*"},
        {"property": "amount", "operator": "SOMETIMES"},
        "garbage",
        {"property": "status", "operator": "EQUAL", "firstValue": null}
    ]));
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0], SearchFilter::new("title", Operator::Like, json!("Inv*")));
    assert!(filters[1].is_not_set());
    assert!(!filters[0].is_not_set());
}

#[test]
fn non_array_search_data_is_empty() {
    assert!(parse_filters(&json!({"title": "x"})).is_empty());
    assert!(parse_filters(&json!(null)).is_empty());
}

#[test]
fn stored_filters_tolerate_bad_json() {
    assert!(parse_stored_filters("{oops").is_empty());
    assert!(parse_stored_filters("").is_empty());
    let filters = parse_stored_filters(r#"[{"property":"n","operator":"GREATER_THAN","firstValue":3}]"#);
    assert_eq!(filters[0].operator, Operator::GreaterThan);
}

#[test]
fn range_values_use_camel_case_bounds() {
    let range = RangeValue::new(Operator::IntervalIncludeBoth, json!(10), json!(100));
    let value = range.to_value();
    assert_eq!(
        value,
        json!({"operator": "INTERVAL_INCLUDE_BOTH", "firstValue": 10, "secondValue": 100})
    );
    assert_eq!(RangeValue::from_value(&value), Some(range));
    assert!(RangeValue::from_value(&json!(10)).is_none());
    assert!(Operator::IntervalIncludeBoth.is_interval());
    assert!(!Operator::Equal.is_interval());
}
