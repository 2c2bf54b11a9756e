use std::rc::Rc;

use serde_json::{Value, json};

use crate::domain::{ElementType, FormElement, FormModel, Situation};
use crate::environment::FormEnvironment;
use crate::form::{FormError, ObjectForm, ObjectFormInput};
use crate::options::FormOptions;
use crate::pending::PendingTaskRegistry;

fn positions_model() -> FormModel {
    let columns = vec![
        FormElement::new("article", ElementType::String).with_required(true),
        FormElement::new("qty", ElementType::Integer),
    ];
    FormModel::new(vec![
        FormElement::new("data", ElementType::O2mGroup).with_elements(vec![
            FormElement::new("positions", ElementType::Table).with_elements(columns),
        ]),
    ])
}

fn positions_form(rows: Value, pending: Rc<PendingTaskRegistry>) -> ObjectForm {
    ObjectForm::new(
        ObjectFormInput::new(positions_model(), json!({"positions": rows}), Situation::Edit),
        FormOptions::default(),
        FormEnvironment::default().with_pending(pending),
    )
}

fn two_rows() -> Value {
    json!([
        {"id": 7, "article": "Chair", "qty": 2},
        {"id": 8, "article": "Desk", "qty": 1}
    ])
}

#[test]
fn saving_an_edited_row_patches_it_in_place() {
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = positions_form(two_rows(), Rc::clone(&pending));

    form.edit_row("positions", 0).unwrap();
    assert_eq!(pending.len(), 1);
    let row = form.row_form("positions").unwrap();
    assert_eq!(row.situation(), Situation::Edit);
    assert_eq!(row.value("article"), Some(json!("Chair")));

    assert!(form.update_row_value("positions", "qty", json!(5)).unwrap());
    form.save_row("positions", false).unwrap();

    let table = form.table("positions").unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows()[0], json!({"id": 7, "article": "Chair", "qty": 5}));
    assert_eq!(table.selected(), Some(0));
    assert!(!table.is_editing());
    assert!(pending.is_empty());
    assert!(form.is_dirty());
    assert_eq!(form.extract()["positions"][0]["qty"], json!(5));
}

#[test]
fn new_rows_are_appended_and_can_chain() {
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = positions_form(two_rows(), Rc::clone(&pending));

    form.add_row("positions").unwrap();
    assert_eq!(
        form.row_form("positions").unwrap().situation(),
        Situation::Create
    );
    form.update_row_value("positions", "article", json!("Lamp")).unwrap();
    form.save_row("positions", true).unwrap();

    let table = form.table("positions").unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.rows()[2], json!({"article": "Lamp"}));
    let session = table.session().expect("next row opened");
    assert_eq!(session.index(), None);
    assert_eq!(pending.len(), 1);

    form.cancel_row("positions").unwrap();
    assert!(pending.is_empty());
    assert_eq!(
        form.cancel_row("positions"),
        Err(FormError::NoRowInEdit("positions".into()))
    );
}

#[test]
fn invalid_rows_are_not_saved() {
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = positions_form(json!([]), Rc::clone(&pending));
    form.add_row("positions").unwrap();
    assert_eq!(
        form.save_row("positions", false),
        Err(FormError::InvalidRow("positions".into()))
    );
    assert!(form.table("positions").unwrap().is_empty());
    assert_eq!(pending.len(), 1);
}

#[test]
fn deleting_moves_to_the_adjacent_row() {
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = positions_form(two_rows(), Rc::clone(&pending));

    form.edit_row("positions", 1).unwrap();
    form.delete_row("positions").unwrap();
    let table = form.table("positions").unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.session().and_then(|s| s.index()), Some(0));
    assert_eq!(pending.len(), 1);

    form.delete_row("positions").unwrap();
    let table = form.table("positions").unwrap();
    assert!(table.is_empty());
    assert!(!table.is_editing());
    assert!(pending.is_empty());
    assert_eq!(form.extract()["positions"], Value::Null);
}

#[test]
fn unsaved_rows_block_switching() {
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = positions_form(two_rows(), Rc::clone(&pending));

    form.edit_row("positions", 0).unwrap();
    assert_eq!(form.leave_table("positions"), Ok(true));
    assert!(pending.is_empty());

    form.edit_row("positions", 0).unwrap();
    form.update_row_value("positions", "qty", json!(9)).unwrap();
    assert_eq!(
        form.edit_row("positions", 1),
        Err(FormError::PendingRowChanges("positions".into()))
    );
    assert_eq!(form.leave_table("positions"), Ok(false));

    pending.set_discard(true);
    form.edit_row("positions", 1).unwrap();
    assert_eq!(form.table("positions").unwrap().rows()[0]["qty"], json!(2));
    assert_eq!(pending.len(), 1);
}

#[test]
fn table_operations_validate_their_target() {
    let mut form = positions_form(two_rows(), Rc::new(PendingTaskRegistry::new()));
    assert_eq!(
        form.edit_row("positions", 5),
        Err(FormError::RowOutOfRange {
            table: "positions".into(),
            index: 5
        })
    );
    assert_eq!(
        form.edit_row("nothing", 0),
        Err(FormError::UnknownField("nothing".into()))
    );
    assert_eq!(
        form.delete_row("positions"),
        Err(FormError::NoRowInEdit("positions".into()))
    );
}

#[test]
fn teardown_releases_row_tasks() {
    let pending = Rc::new(PendingTaskRegistry::new());
    let mut form = positions_form(two_rows(), Rc::clone(&pending));
    form.edit_row("positions", 0).unwrap();
    form.reset();
    assert!(pending.is_empty());

    form.edit_row("positions", 1).unwrap();
    drop(form);
    assert!(pending.is_empty());
}
