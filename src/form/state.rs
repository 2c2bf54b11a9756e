use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use indexmap::IndexMap;
use rhai::{Dynamic, FnPtr};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{FormModel, Situation};
use crate::environment::FormEnvironment;
use crate::options::FormOptions;
use crate::script::{
    ChangeListener, ModelChange, ModelProperty, ScopeInit, ScriptRuntime, ScriptingScope,
};

use super::builder::{ExtractOptions, FormBuilder};
use super::error::FormError;
use super::status::{Debouncer, FormStatusChangedEvent};
use super::table::{RowContext, TableState};
use super::tree::{FormControl, FormTree};
use super::validators::{ValidationError, compose_validators};

/// Everything a form is built from.
#[derive(Debug, Clone)]
pub struct ObjectFormInput {
    pub model: FormModel,
    pub data: Value,
    pub situation: Situation,
    pub object_id: Option<String>,
    pub context: Value,
    pub objects: Vec<Value>,
}

impl ObjectFormInput {
    pub fn new(model: FormModel, data: Value, situation: Situation) -> Self {
        Self {
            model,
            data,
            situation,
            object_id: None,
            context: Value::Null,
            objects: Vec::new(),
        }
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_objects(mut self, objects: Vec<Value>) -> Self {
        self.objects = objects;
        self
    }
}

type ChangeQueue = Rc<RefCell<Vec<(String, ModelChange)>>>;

#[derive(Debug)]
struct ScriptBinding {
    scope: ScriptingScope,
    runtime: Rc<ScriptRuntime>,
    changes: ChangeQueue,
}

/// Owner of a bound form tree: applies user edits, runs the form script,
/// mirrors script writes into the controls and publishes debounced status.
#[derive(Debug)]
pub struct ObjectForm {
    input: ObjectFormInput,
    options: FormOptions,
    env: FormEnvironment,
    tree: FormTree,
    tables: IndexMap<String, TableState>,
    scripting: Option<ScriptBinding>,
    debouncer: Debouncer,
    initial_snapshot: String,
    last_status: Option<FormStatusChangedEvent>,
}

fn snapshot(data: &Value) -> String {
    serde_json::to_string(data).unwrap_or_default()
}

fn wants_scripts(input: &ObjectFormInput, options: &FormOptions) -> bool {
    options.script.enabled && input.model.script.is_some()
}

fn build_tree(input: &ObjectFormInput, options: &FormOptions) -> FormTree {
    FormBuilder::new(input.situation, options)
        .scripted(wants_scripts(input, options))
        .build(&input.model, &input.data)
}

fn row_context<'a>(
    options: &'a FormOptions,
    env: &'a FormEnvironment,
    tree: &FormTree,
    scripting: Option<&ScriptBinding>,
    table: &str,
) -> Result<RowContext<'a>, FormError> {
    let control = tree
        .control(table)
        .ok_or_else(|| FormError::UnknownField(table.to_string()))?;
    let element = control.element();
    if !element.is_table() {
        return Err(FormError::NotATable(table.to_string()));
    }
    Ok(RowContext {
        options,
        env,
        runtime: scripting.map(|binding| Rc::clone(&binding.runtime)),
        onrowedit: element.onrowedit.clone(),
        readonly: element.readonly,
    })
}

impl ObjectForm {
    pub fn new(input: ObjectFormInput, options: FormOptions, env: FormEnvironment) -> Self {
        let mut form = Self {
            tree: build_tree(&input, &options),
            debouncer: Debouncer::new(options.debounce),
            input,
            options,
            env,
            tables: IndexMap::new(),
            scripting: None,
            initial_snapshot: String::new(),
            last_status: None,
        };
        form.initialize();
        form
    }

    /// Tear down the current tree and scope, then rebuild from `input`.
    pub fn set_input(&mut self, input: ObjectFormInput) {
        self.teardown();
        self.input = input;
        self.tree = build_tree(&self.input, &self.options);
        self.initialize();
    }

    /// Drop all edits and rebuild from the current input.
    pub fn reset(&mut self) {
        self.teardown();
        self.tree = build_tree(&self.input, &self.options);
        self.initialize();
    }

    fn initialize(&mut self) {
        self.tables = self
            .tree
            .controls()
            .into_iter()
            .filter(|control| control.element().is_table())
            .map(|control| (control.name.clone(), TableState::new(&control.element())))
            .collect();

        if wants_scripts(&self.input, &self.options) {
            let runtime = Rc::new(ScriptRuntime::new(
                Rc::clone(&self.env.scripts),
                Rc::clone(&self.env.alerts),
                &self.options.script,
            ));
            let scope = self.attach_runtime(Rc::clone(&runtime));
            if let Some(source) = self.input.model.script.as_deref() {
                // failures are already reported by the runtime
                let _ = runtime.run(&scope, source, self.input.model.script_name());
            }
            self.settle_script_changes();
        }

        self.initial_snapshot = snapshot(&self.tree.to_data());
        self.debouncer.cancel();
        self.last_status = None;
        debug!(
            situation = %self.input.situation,
            controls = self.tree.controls().len(),
            tables = self.tables.len(),
            scripted = self.scripting.is_some(),
            "object form loaded"
        );
    }

    fn teardown(&mut self) {
        if let Some(binding) = self.scripting.take() {
            binding.scope.detach();
        }
        let pending = Rc::clone(&self.env.pending);
        for table in self.tables.values_mut() {
            table.release(pending.as_ref());
        }
        self.tables.clear();
        self.debouncer.cancel();
    }

    /// Bind a scripting scope over this form's elements, replacing any
    /// previous one. Every control gains the script-error validator.
    pub fn attach_runtime(&mut self, runtime: Rc<ScriptRuntime>) -> ScriptingScope {
        if let Some(previous) = self.scripting.take() {
            previous.scope.detach();
        }
        let situation = self.tree.situation;
        for control in self.tree.controls_mut() {
            let validators = compose_validators(&control.element(), situation, true);
            control.set_validators(validators);
        }

        let changes: ChangeQueue = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        let listener: ChangeListener = Rc::new(move |name: &str, change: &ModelChange| {
            sink.borrow_mut().push((name.to_string(), change.clone()));
        });
        let elements: Vec<_> = self
            .tree
            .controls()
            .into_iter()
            .map(|control| (control.name.clone(), Rc::clone(control.shared())))
            .collect();
        let init = ScopeInit {
            data: self.input.data.clone(),
            object_id: self.input.object_id.clone(),
            context: self.input.context.clone(),
            objects: self.input.objects.clone(),
            host: Rc::clone(&self.env.host),
        };
        let scope = ScriptingScope::new(elements, init, listener);
        self.scripting = Some(ScriptBinding {
            scope: scope.clone(),
            runtime,
            changes,
        });
        scope
    }

    pub fn input(&self) -> &ObjectFormInput {
        &self.input
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn situation(&self) -> Situation {
        self.input.situation
    }

    pub fn tree(&self) -> &FormTree {
        &self.tree
    }

    pub fn control(&self, name: &str) -> Option<&FormControl> {
        self.tree.control(name)
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.tree.control(name).map(FormControl::value)
    }

    pub fn scope(&self) -> Option<&ScriptingScope> {
        self.scripting.as_ref().map(|binding| &binding.scope)
    }

    pub fn runtime(&self) -> Option<&Rc<ScriptRuntime>> {
        self.scripting.as_ref().map(|binding| &binding.runtime)
    }

    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.get(name)
    }

    /// A user edit. Fires the field's `onchange` handler when the value
    /// actually changed; returns whether it did.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<bool, FormError> {
        let control = self
            .tree
            .control_mut(name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        if control.is_readonly() {
            return Err(FormError::ReadonlyField(name.to_string()));
        }
        if !control.patch_value(value, true) {
            return Ok(false);
        }
        let current = control.value();
        if let Some(table) = self.tables.get_mut(name) {
            table.sync_value(&current, self.env.pending.as_ref());
        }
        self.debouncer.touch(Instant::now());
        self.invoke_onchange(name);
        self.apply_script_changes();
        Ok(true)
    }

    fn invoke_onchange(&self, name: &str) {
        let Some(binding) = &self.scripting else {
            return;
        };
        let handler: Option<FnPtr> = self
            .tree
            .control(name)
            .and_then(|control| control.element().onchange.clone());
        let (Some(handler), Some(element)) = (handler, binding.scope.element(name)) else {
            return;
        };
        debug!(field = name, "calling onchange");
        if let Err(err) = binding
            .runtime
            .call_handler(&handler, vec![Dynamic::from(element.clone())])
        {
            binding.runtime.report(&err);
        }
    }

    /// Mirror queued script writes into the controls. Returns how many
    /// changes were applied.
    pub fn apply_script_changes(&mut self) -> usize {
        self.drain_script_changes(true)
    }

    /// Like `apply_script_changes`, but the writes count as initial state.
    pub(crate) fn settle_script_changes(&mut self) -> usize {
        self.drain_script_changes(false)
    }

    fn drain_script_changes(&mut self, mark_dirty: bool) -> usize {
        let mut applied = 0;
        loop {
            let batch = match &self.scripting {
                Some(binding) => std::mem::take(&mut *binding.changes.borrow_mut()),
                None => return applied,
            };
            if batch.is_empty() {
                return applied;
            }
            for (name, change) in batch {
                self.apply_model_change(&name, &change, mark_dirty);
                applied += 1;
            }
        }
    }

    /// Push one script write into the bound control.
    pub fn on_scripting_model_change(&mut self, name: &str, change: &ModelChange) {
        self.apply_model_change(name, change, true);
    }

    fn apply_model_change(&mut self, name: &str, change: &ModelChange, mark_dirty: bool) {
        let situation = self.tree.situation;
        let Some(control) = self.tree.control_mut(name) else {
            warn!(field = name, property = %change.property, "script changed an unknown field");
            return;
        };
        match change.property {
            ModelProperty::Value => {
                control.is_not_set_value = false;
                if mark_dirty {
                    control.mark_dirty();
                }
                control.validate();
                let value = control.value();
                if let Some(table) = self.tables.get_mut(name) {
                    table.sync_value(&value, self.env.pending.as_ref());
                }
            }
            ModelProperty::Required => {
                let validators = compose_validators(&control.element(), situation, true);
                control.set_validators(validators);
            }
            ModelProperty::Readonly | ModelProperty::Error => control.validate(),
            ModelProperty::Onchange
            | ModelProperty::Onrowedit
            | ModelProperty::Filter
            | ModelProperty::List => {}
        }
        debug!(field = name, property = %change.property, "applied script change");
        if mark_dirty {
            self.debouncer.touch(Instant::now());
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tree.is_valid()
    }

    pub fn is_dirty(&self) -> bool {
        self.tree.is_dirty()
    }

    pub fn errors(&self) -> IndexMap<String, IndexMap<String, ValidationError>> {
        self.tree.errors()
    }

    pub fn extract(&self) -> Value {
        self.tree.to_data()
    }

    pub fn extract_with(&self, options: ExtractOptions) -> Value {
        self.tree.extract_with(options)
    }

    /// Current status, computed now.
    pub fn status(&self) -> FormStatusChangedEvent {
        let data = self.extract();
        FormStatusChangedEvent {
            invalid: !self.is_valid(),
            dirty: self.is_dirty(),
            indexdata_changed: snapshot(&data) != self.initial_snapshot,
            data,
        }
    }

    /// Status once the debounce window has settled after the last change.
    pub fn poll_status(&mut self, now: Instant) -> Option<FormStatusChangedEvent> {
        if !self.debouncer.poll(now) {
            return None;
        }
        let status = self.status();
        self.last_status = Some(status.clone());
        Some(status)
    }

    pub fn last_status(&self) -> Option<&FormStatusChangedEvent> {
        self.last_status.as_ref()
    }

    pub fn has_pending_status(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn row_form(&self, table: &str) -> Option<&ObjectForm> {
        self.tables.get(table)?.row_form()
    }

    /// Open row `index` of `table` in a row editor.
    pub fn edit_row(&mut self, table: &str, index: usize) -> Result<(), FormError> {
        let ctx = row_context(
            &self.options,
            &self.env,
            &self.tree,
            self.scripting.as_ref(),
            table,
        )?;
        let state = self
            .tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?;
        state.open_row(Some(index), &ctx)?;
        // onrowedit may have written parent fields
        self.apply_script_changes();
        Ok(())
    }

    /// Open an empty row editor; the row is appended on save.
    pub fn add_row(&mut self, table: &str) -> Result<(), FormError> {
        let ctx = row_context(
            &self.options,
            &self.env,
            &self.tree,
            self.scripting.as_ref(),
            table,
        )?;
        let state = self
            .tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?;
        state.open_row(None, &ctx)?;
        self.apply_script_changes();
        Ok(())
    }

    /// Edit one cell of the row in edit.
    pub fn update_row_value(
        &mut self,
        table: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, FormError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?
            .update_cell(field, value)
    }

    pub fn save_row(&mut self, table: &str, create_new_row: bool) -> Result<(), FormError> {
        let ctx = row_context(
            &self.options,
            &self.env,
            &self.tree,
            self.scripting.as_ref(),
            table,
        )?;
        let value = self
            .tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?
            .save(create_new_row, &ctx)?;
        self.commit_table(table, value);
        self.apply_script_changes();
        Ok(())
    }

    pub fn cancel_row(&mut self, table: &str) -> Result<(), FormError> {
        let pending = Rc::clone(&self.env.pending);
        self.tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?
            .cancel(pending.as_ref())
    }

    pub fn delete_row(&mut self, table: &str) -> Result<(), FormError> {
        let ctx = row_context(
            &self.options,
            &self.env,
            &self.tree,
            self.scripting.as_ref(),
            table,
        )?;
        let value = self
            .tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?
            .delete(&ctx)?;
        self.commit_table(table, value);
        self.apply_script_changes();
        Ok(())
    }

    /// Close the row editor of `table`; `false` when unsaved edits block it.
    pub fn leave_table(&mut self, table: &str) -> Result<bool, FormError> {
        let pending = Rc::clone(&self.env.pending);
        Ok(self
            .tables
            .get_mut(table)
            .ok_or_else(|| FormError::NotATable(table.to_string()))?
            .navigate_away(pending.as_ref()))
    }

    fn commit_table(&mut self, table: &str, value: Value) {
        let Some(control) = self.tree.control_mut(table) else {
            return;
        };
        if control.patch_value(value, true) {
            self.debouncer.touch(Instant::now());
            self.invoke_onchange(table);
            self.apply_script_changes();
        }
    }
}

impl Drop for ObjectForm {
    fn drop(&mut self) {
        self.teardown();
    }
}
