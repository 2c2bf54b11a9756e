use std::rc::Rc;

use rhai::{Dynamic, FnPtr, INT};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{ElementType, FormElement, FormModel, Situation};
use crate::environment::FormEnvironment;
use crate::options::FormOptions;
use crate::pending::{PendingChanges, TaskId};
use crate::script::ScriptRuntime;

use super::error::FormError;
use super::state::{ObjectForm, ObjectFormInput};

/// Grid state of one table field. `inner_value` is the working copy of the
/// committed `value`; rows are edited one at a time in a sub-form.
#[derive(Debug)]
pub struct TableState {
    name: String,
    columns: Vec<FormElement>,
    value: Value,
    inner_value: Vec<Value>,
    selected: Option<usize>,
    edit: Option<RowEditSession>,
}

#[derive(Debug)]
pub struct RowEditSession {
    index: Option<usize>,
    form: Box<ObjectForm>,
    task: TaskId,
}

impl RowEditSession {
    /// `None` while a new row is being created.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn form(&self) -> &ObjectForm {
        &self.form
    }

    pub fn task(&self) -> &TaskId {
        &self.task
    }
}

/// What a table needs from its owning form to open a row editor.
pub(crate) struct RowContext<'a> {
    pub options: &'a FormOptions,
    pub env: &'a FormEnvironment,
    pub runtime: Option<Rc<ScriptRuntime>>,
    pub onrowedit: Option<FnPtr>,
    pub readonly: bool,
}

fn rows_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows.clone(),
        _ => Vec::new(),
    }
}

/// Saved cells replace the matching keys of the original row; unknown keys survive.
fn overlay(target: &mut Value, row: Value) {
    match (target, row) {
        (Value::Object(target), Value::Object(row)) => target.extend(row),
        (target, row) => *target = row,
    }
}

impl TableState {
    pub fn new(element: &FormElement) -> Self {
        Self {
            name: element.name.clone(),
            columns: element.elements.clone(),
            value: element.value.clone(),
            inner_value: rows_of(&element.value),
            selected: None,
            edit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[FormElement] {
        &self.columns
    }

    /// Rows as the grid shows them.
    pub fn rows(&self) -> &[Value] {
        &self.inner_value
    }

    pub fn len(&self) -> usize {
        self.inner_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner_value.is_empty()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_editing(&self) -> bool {
        self.edit.is_some()
    }

    pub fn session(&self) -> Option<&RowEditSession> {
        self.edit.as_ref()
    }

    pub fn row_form(&self) -> Option<&ObjectForm> {
        self.edit.as_ref().map(|session| session.form.as_ref())
    }

    /// Nothing unsaved is pending in the row editor.
    pub fn can_navigate_away(&self) -> bool {
        self.edit
            .as_ref()
            .is_none_or(|session| !session.form.is_dirty())
    }

    /// Leave the row editor, asking the pending-changes collaborator when the
    /// row has unsaved edits. Returns `false` when navigation is blocked.
    pub fn navigate_away(&mut self, pending: &dyn PendingChanges) -> bool {
        if !self.can_navigate_away() && pending.check_for_pending_tasks(&[]) {
            return false;
        }
        self.release(pending);
        true
    }

    /// The committed value changed underneath the grid.
    pub(crate) fn sync_value(&mut self, value: &Value, pending: &dyn PendingChanges) {
        self.value = value.clone();
        self.inner_value = rows_of(value);
        let stale = self
            .edit
            .as_ref()
            .and_then(RowEditSession::index)
            .is_some_and(|index| index >= self.inner_value.len());
        if stale {
            self.release(pending);
        }
        self.selected = self
            .selected
            .filter(|index| *index < self.inner_value.len());
    }

    pub(crate) fn release(&mut self, pending: &dyn PendingChanges) {
        if let Some(session) = self.edit.take() {
            pending.finish_task(&session.task);
            debug!(table = %self.name, row = ?session.index, "row editor closed");
        }
    }

    pub(crate) fn open_row(
        &mut self,
        index: Option<usize>,
        ctx: &RowContext<'_>,
    ) -> Result<(), FormError> {
        if let Some(index) = index
            && index >= self.inner_value.len()
        {
            return Err(FormError::RowOutOfRange {
                table: self.name.clone(),
                index,
            });
        }
        let pending = ctx.env.pending.as_ref();
        if !self.can_navigate_away() && pending.check_for_pending_tasks(&[]) {
            return Err(FormError::PendingRowChanges(self.name.clone()));
        }
        self.release(pending);

        let (data, situation) = match index {
            Some(index) => (self.inner_value[index].clone(), Situation::Edit),
            None => (Value::Object(Map::new()), Situation::Create),
        };
        let model = FormModel::new(vec![
            FormElement::new("row", ElementType::O2mGroup).with_elements(self.columns.clone()),
        ])
        .with_name(format!("{}-row", self.name));
        let options = ctx
            .options
            .clone()
            .with_disabled(ctx.options.disabled || ctx.readonly);
        let mut form = ObjectForm::new(
            ObjectFormInput::new(model, data, situation),
            options,
            ctx.env.clone(),
        );

        if let (Some(runtime), Some(handler)) = (&ctx.runtime, &ctx.onrowedit) {
            let row_scope = form.attach_runtime(Rc::clone(runtime));
            let row_index = index
                .and_then(|index| INT::try_from(index).ok())
                .map(Dynamic::from_int)
                .unwrap_or(Dynamic::UNIT);
            if let Err(err) = runtime.call_handler(handler, vec![Dynamic::from(row_scope), row_index])
            {
                runtime.report(&err);
            }
            form.settle_script_changes();
        }

        let task = pending.start_task(&format!("unsaved row in table '{}'", self.name));
        debug!(table = %self.name, row = ?index, %task, "row editor opened");
        self.selected = index;
        self.edit = Some(RowEditSession {
            index,
            form: Box::new(form),
            task,
        });
        Ok(())
    }

    pub(crate) fn update_cell(&mut self, field: &str, value: Value) -> Result<bool, FormError> {
        let session = self
            .edit
            .as_mut()
            .ok_or_else(|| FormError::NoRowInEdit(self.name.clone()))?;
        session.form.set_value(field, value)
    }

    /// Write the edited row into the working copy and commit it. Returns the
    /// new committed value.
    pub(crate) fn save(
        &mut self,
        create_new_row: bool,
        ctx: &RowContext<'_>,
    ) -> Result<Value, FormError> {
        let session = self
            .edit
            .as_ref()
            .ok_or_else(|| FormError::NoRowInEdit(self.name.clone()))?;
        if ctx.readonly {
            return Err(FormError::ReadonlyField(self.name.clone()));
        }
        if !session.form.is_valid() {
            return Err(FormError::InvalidRow(self.name.clone()));
        }
        let row = session.form.extract();
        let position = match session.index {
            Some(index) => {
                let target =
                    self.inner_value
                        .get_mut(index)
                        .ok_or_else(|| FormError::RowOutOfRange {
                            table: self.name.clone(),
                            index,
                        })?;
                overlay(target, row);
                index
            }
            None => {
                self.inner_value.push(row);
                self.inner_value.len() - 1
            }
        };
        self.release(ctx.env.pending.as_ref());
        self.selected = Some(position);
        self.value = Value::Array(self.inner_value.clone());
        if create_new_row {
            self.open_row(None, ctx)?;
        }
        Ok(self.value.clone())
    }

    pub(crate) fn cancel(&mut self, pending: &dyn PendingChanges) -> Result<(), FormError> {
        if self.edit.is_none() {
            return Err(FormError::NoRowInEdit(self.name.clone()));
        }
        self.release(pending);
        Ok(())
    }

    /// Delete the row in edit (or the selected row). The adjacent row is
    /// selected and, when a row was being edited, opened for editing.
    pub(crate) fn delete(&mut self, ctx: &RowContext<'_>) -> Result<Value, FormError> {
        let editing = self.edit.is_some();
        let target = match &self.edit {
            Some(session) => session.index,
            None => self.selected,
        };
        let Some(index) = target else {
            if editing {
                // an unsaved new row simply goes away
                self.release(ctx.env.pending.as_ref());
                return Ok(self.value.clone());
            }
            return Err(FormError::NoRowInEdit(self.name.clone()));
        };
        if ctx.readonly {
            return Err(FormError::ReadonlyField(self.name.clone()));
        }
        if index >= self.inner_value.len() {
            return Err(FormError::RowOutOfRange {
                table: self.name.clone(),
                index,
            });
        }

        self.inner_value.remove(index);
        self.release(ctx.env.pending.as_ref());
        self.value = Value::Array(self.inner_value.clone());
        if self.inner_value.is_empty() {
            self.selected = None;
        } else {
            let next = index.min(self.inner_value.len() - 1);
            self.selected = Some(next);
            if editing {
                self.open_row(Some(next), ctx)?;
            }
        }
        Ok(self.value.clone())
    }
}
