use std::time::Instant;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{FormElement, FormModel, Situation};
use crate::environment::FormEnvironment;
use crate::options::FormOptions;

use super::error::FormError;
use super::state::{ObjectForm, ObjectFormInput};
use super::status::FormStatusChangedEvent;

/// Main schema plus the fragments of applied secondary object types.
#[derive(Debug, Clone)]
pub struct CombinedFormInput {
    pub main: FormModel,
    pub extensions: IndexMap<String, FormModel>,
    pub data: Value,
    pub situation: Situation,
    /// Whether fragments may be added or removed while editing.
    pub enable_edit_sot: bool,
}

impl CombinedFormInput {
    pub fn new(main: FormModel, data: Value, situation: Situation) -> Self {
        Self {
            main,
            extensions: IndexMap::new(),
            data,
            situation,
            enable_edit_sot: false,
        }
    }

    pub fn with_extension(mut self, id: impl Into<String>, model: FormModel) -> Self {
        self.extensions.insert(id.into(), model);
        self
    }

    pub fn with_edit_sot(mut self, enabled: bool) -> Self {
        self.enable_edit_sot = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FragmentKey {
    Main,
    Extension(String),
}

/// One logical form assembled from independently validated fragments.
#[derive(Debug)]
pub struct CombinedForm {
    input: CombinedFormInput,
    options: FormOptions,
    env: FormEnvironment,
    main_form: Option<ObjectForm>,
    extension_forms: IndexMap<String, ObjectForm>,
    states: IndexMap<FragmentKey, FormStatusChangedEvent>,
    added: Vec<String>,
    removed: Vec<String>,
    forced_dirty: bool,
}

fn leaf_names<'a>(elements: &'a [FormElement], out: &mut Vec<&'a str>) {
    for element in elements {
        if element.is_group() {
            leaf_names(&element.elements, out);
        } else {
            out.push(&element.name);
        }
    }
}

fn merge_data(target: &mut Map<String, Value>, data: Value) {
    if let Value::Object(fields) = data {
        target.extend(fields);
    }
}

impl CombinedForm {
    pub fn new(input: CombinedFormInput, options: FormOptions, env: FormEnvironment) -> Self {
        let mut form = Self {
            input,
            options,
            env,
            main_form: None,
            extension_forms: IndexMap::new(),
            states: IndexMap::new(),
            added: Vec::new(),
            removed: Vec::new(),
            forced_dirty: false,
        };
        form.load();
        form
    }

    fn load(&mut self) {
        self.main_form = self
            .input
            .main
            .has_elements()
            .then(|| self.build_fragment(&self.input.main, &self.input.data));
        let extensions: Vec<_> = self
            .input
            .extensions
            .iter()
            .filter(|(_, model)| model.has_elements())
            .map(|(id, model)| (id.clone(), self.build_fragment(model, &self.input.data)))
            .collect();
        self.extension_forms = extensions.into_iter().collect();
        self.added.clear();
        self.removed.clear();
        self.forced_dirty = false;
        self.refresh_states();
        debug!(
            main = self.main_form.is_some(),
            extensions = self.extension_forms.len(),
            "combined form loaded"
        );
    }

    fn build_fragment(&self, model: &FormModel, data: &Value) -> ObjectForm {
        ObjectForm::new(
            ObjectFormInput::new(model.clone(), data.clone(), self.input.situation),
            self.options.clone(),
            self.env.clone(),
        )
    }

    pub fn set_input(&mut self, input: CombinedFormInput) {
        self.input = input;
        self.load();
    }

    /// Back to the loaded input: fragment edits and field edits are dropped.
    pub fn reset(&mut self) {
        self.load();
    }

    pub fn input(&self) -> &CombinedFormInput {
        &self.input
    }

    pub fn main_form(&self) -> Option<&ObjectForm> {
        self.main_form.as_ref()
    }

    pub fn main_form_mut(&mut self) -> Option<&mut ObjectForm> {
        self.main_form.as_mut()
    }

    pub fn extension_form(&self, id: &str) -> Option<&ObjectForm> {
        self.extension_forms.get(id)
    }

    pub fn extension_form_mut(&mut self, id: &str) -> Option<&mut ObjectForm> {
        self.extension_forms.get_mut(id)
    }

    pub fn extension_ids(&self) -> impl Iterator<Item = &str> {
        self.extension_forms.keys().map(String::as_str)
    }

    pub fn added_fragments(&self) -> &[String] {
        &self.added
    }

    pub fn removed_fragments(&self) -> &[String] {
        &self.removed
    }

    fn forms(&self) -> impl Iterator<Item = (FragmentKey, &ObjectForm)> {
        self.main_form
            .iter()
            .map(|form| (FragmentKey::Main, form))
            .chain(
                self.extension_forms
                    .iter()
                    .map(|(id, form)| (FragmentKey::Extension(id.clone()), form)),
            )
    }

    /// Apply secondary-type fragments. Applying a fragment is itself a change,
    /// so the combined form turns dirty even without field edits.
    pub fn add_forms(
        &mut self,
        forms: IndexMap<String, FormModel>,
        data: &Value,
    ) -> Result<(), FormError> {
        if !self.input.enable_edit_sot {
            return Err(FormError::FragmentEditingDisabled);
        }
        for (id, model) in forms {
            self.warn_on_collisions(&id, &model);
            let form = self.build_fragment(&model, data);
            self.states
                .insert(FragmentKey::Extension(id.clone()), form.status());
            self.extension_forms.insert(id.clone(), form);
            if let Some(position) = self.removed.iter().position(|removed| *removed == id) {
                self.removed.remove(position);
            } else if !self.added.contains(&id) {
                self.added.push(id.clone());
            }
            debug!(fragment = %id, "fragment added");
        }
        self.forced_dirty = true;
        Ok(())
    }

    pub fn remove_forms(&mut self, ids: &[&str]) -> Result<(), FormError> {
        if !self.input.enable_edit_sot {
            return Err(FormError::FragmentEditingDisabled);
        }
        if let Some(unknown) = ids.iter().find(|id| !self.extension_forms.contains_key(**id)) {
            return Err(FormError::UnknownFragment(unknown.to_string()));
        }
        for id in ids {
            self.extension_forms.shift_remove(*id);
            self.states
                .shift_remove(&FragmentKey::Extension(id.to_string()));
            if let Some(position) = self.added.iter().position(|added| added.as_str() == *id) {
                self.added.remove(position);
            } else {
                self.removed.push(id.to_string());
            }
            debug!(fragment = %id, "fragment removed");
        }
        self.forced_dirty = true;
        Ok(())
    }

    fn warn_on_collisions(&self, id: &str, model: &FormModel) {
        let mut names = Vec::new();
        leaf_names(&model.elements, &mut names);
        for name in names {
            let clash = self
                .forms()
                .filter(|(key, _)| *key != FragmentKey::Extension(id.to_string()))
                .find(|(_, form)| form.control(name).is_some());
            if let Some((owner, _)) = clash {
                warn!(
                    fragment = id,
                    field = name,
                    ?owner,
                    "field defined by more than one fragment"
                );
            }
        }
    }

    /// Record a fragment's published status.
    pub fn update_fragment_status(&mut self, key: FragmentKey, status: FormStatusChangedEvent) {
        self.states.insert(key, status);
    }

    /// Recompute every fragment's status now, bypassing the debounce.
    pub fn refresh_states(&mut self) {
        let states: IndexMap<_, _> = self.forms().map(|(key, form)| (key, form.status())).collect();
        self.states = states;
    }

    /// Fold the cached fragment states into one event.
    pub fn combined_state(&self) -> FormStatusChangedEvent {
        let mut data = Map::new();
        let mut invalid = false;
        let mut dirty = false;
        let mut indexdata_changed = false;
        for state in self.states.values() {
            invalid |= state.invalid;
            dirty |= state.dirty;
            indexdata_changed |= state.indexdata_changed;
            merge_data(&mut data, state.data.clone());
        }
        FormStatusChangedEvent {
            invalid,
            dirty: self.forced_dirty || (dirty && !self.states.is_empty()),
            indexdata_changed,
            data: Value::Object(data),
        }
    }

    /// Poll every fragment's debouncer; yields the combined state when any
    /// fragment published.
    pub fn poll_status(&mut self, now: Instant) -> Option<FormStatusChangedEvent> {
        let mut published = Vec::new();
        if let Some(status) = self.main_form.as_mut().and_then(|form| form.poll_status(now)) {
            published.push((FragmentKey::Main, status));
        }
        for (id, form) in self.extension_forms.iter_mut() {
            if let Some(status) = form.poll_status(now) {
                published.push((FragmentKey::Extension(id.clone()), status));
            }
        }
        if published.is_empty() {
            return None;
        }
        for (key, status) in published {
            self.update_fragment_status(key, status);
        }
        Some(self.combined_state())
    }

    /// Route a user edit to the fragment that owns `field`.
    pub fn set_value(&mut self, field: &str, value: Value) -> Result<bool, FormError> {
        if let Some(form) = self.main_form.as_mut().filter(|form| form.control(field).is_some()) {
            return form.set_value(field, value);
        }
        match self
            .extension_forms
            .values_mut()
            .find(|form| form.control(field).is_some())
        {
            Some(form) => form.set_value(field, value),
            None => Err(FormError::UnknownField(field.to_string())),
        }
    }

    pub fn value(&self, field: &str) -> Option<Value> {
        self.forms().find_map(|(_, form)| form.value(field))
    }

    /// Merged data of all fragments; later fragments win on key collisions.
    pub fn extract(&self) -> Value {
        let mut data = Map::new();
        for (_, form) in self.forms() {
            merge_data(&mut data, form.extract());
        }
        Value::Object(data)
    }

    pub fn is_valid(&self) -> bool {
        self.forms().all(|(_, form)| form.is_valid())
    }

    pub fn is_dirty(&self) -> bool {
        self.forced_dirty || self.forms().any(|(_, form)| form.is_dirty())
    }
}
