use std::cell::{Ref, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::domain::{ElementType, FormElement, SharedElement, Situation};
use crate::script::json_equal;

use super::validators::{ValidationError, Validator, run_validators};

/// `null`, `""` and `[]` all count as "no value".
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Rendering hint derived from type, classifications and resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Email,
    Url,
    Phone,
    Organization,
    Reference,
    Selector,
    Integer,
    Decimal,
    Date,
    Datetime,
    Boolean,
    Range,
    Table,
    Other(String),
}

impl ControlKind {
    pub fn resolve(element: &FormElement, situation: Situation) -> Self {
        if element.is_table() {
            return ControlKind::Table;
        }
        if situation == Situation::Search && element.is_range_capable() {
            return ControlKind::Range;
        }
        for (prefix, kind) in [
            ("email", ControlKind::Email),
            ("url", ControlKind::Url),
            ("phone", ControlKind::Phone),
            ("id:organization", ControlKind::Organization),
            ("id:reference", ControlKind::Reference),
            ("selector", ControlKind::Selector),
        ] {
            if element.has_classification(prefix) {
                return kind;
            }
        }
        match &element.element_type {
            ElementType::String => ControlKind::Text,
            ElementType::Integer => ControlKind::Integer,
            ElementType::Decimal => ControlKind::Decimal,
            ElementType::Datetime if element.is_date_only() => ControlKind::Date,
            ElementType::Datetime => ControlKind::Datetime,
            ElementType::Boolean => ControlKind::Boolean,
            other => ControlKind::Other(other.as_str().to_string()),
        }
    }
}

#[derive(Debug)]
pub struct FormControl {
    pub name: String,
    pub kind: ControlKind,
    element: SharedElement,
    validators: Vec<Validator>,
    errors: IndexMap<String, ValidationError>,
    pub dirty: bool,
    pub touched: bool,
    /// Set by an `EQUAL` search filter without a value.
    pub is_not_set_value: bool,
}

impl FormControl {
    pub(crate) fn new(
        element: FormElement,
        kind: ControlKind,
        validators: Vec<Validator>,
        is_not_set_value: bool,
    ) -> Self {
        let mut control = Self {
            name: element.name.clone(),
            kind,
            element: Rc::new(RefCell::new(element)),
            validators,
            errors: IndexMap::new(),
            dirty: false,
            touched: false,
            is_not_set_value,
        };
        control.validate();
        control
    }

    pub fn value(&self) -> Value {
        self.element.borrow().value.clone()
    }

    pub fn element(&self) -> Ref<'_, FormElement> {
        self.element.borrow()
    }

    pub(crate) fn shared(&self) -> &SharedElement {
        &self.element
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn errors(&self) -> &IndexMap<String, ValidationError> {
        &self.errors
    }

    pub fn is_readonly(&self) -> bool {
        self.element.borrow().readonly
    }

    /// Read-only controls never block the form.
    pub fn is_valid(&self) -> bool {
        self.is_readonly() || self.errors.is_empty()
    }

    /// Returns whether the stored value changed.
    pub fn patch_value(&mut self, value: Value, mark_dirty: bool) -> bool {
        let changed = {
            let mut element = self.element.borrow_mut();
            if json_equal(&element.value, &value) {
                false
            } else {
                element.value = value;
                true
            }
        };
        if changed {
            self.is_not_set_value = false;
            if mark_dirty {
                self.mark_dirty();
            }
        }
        self.validate();
        changed
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.touched = true;
    }

    pub(crate) fn set_validators(&mut self, validators: Vec<Validator>) {
        self.validators = validators;
        self.validate();
    }

    pub fn validate(&mut self) {
        self.errors = run_validators(&self.validators, &self.element.borrow());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLayout {
    Plain,
    Fieldset,
    Tabs,
}

#[derive(Debug)]
pub struct FormGroup {
    pub key: String,
    pub label: Option<String>,
    pub layout: GroupLayout,
    pub children: IndexMap<String, FormNode>,
}

#[derive(Debug)]
pub enum FormNode {
    Group(FormGroup),
    Control(FormControl),
}

impl FormGroup {
    fn collect<'a>(&'a self, out: &mut Vec<&'a FormControl>) {
        for child in self.children.values() {
            match child {
                FormNode::Group(group) => group.collect(out),
                FormNode::Control(control) => out.push(control),
            }
        }
    }

    fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut FormControl>) {
        for child in self.children.values_mut() {
            match child {
                FormNode::Group(group) => group.collect_mut(out),
                FormNode::Control(control) => out.push(control),
            }
        }
    }

    pub fn group(&self, key: &str) -> Option<&FormGroup> {
        match self.children.get(key)? {
            FormNode::Group(group) => Some(group),
            FormNode::Control(_) => None,
        }
    }
}

/// A bound form: groups and controls built from one schema.
#[derive(Debug)]
pub struct FormTree {
    pub root: FormGroup,
    pub situation: Situation,
    /// Data the tree was built from; EDIT extraction consults its keys.
    pub original: Value,
    pub(crate) date_format: String,
}

impl FormTree {
    /// Depth-first, in schema order.
    pub fn controls(&self) -> Vec<&FormControl> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    pub fn controls_mut(&mut self) -> Vec<&mut FormControl> {
        let mut out = Vec::new();
        self.root.collect_mut(&mut out);
        out
    }

    pub fn control(&self, name: &str) -> Option<&FormControl> {
        self.controls().into_iter().find(|control| control.name == name)
    }

    pub fn control_mut(&mut self, name: &str) -> Option<&mut FormControl> {
        self.controls_mut()
            .into_iter()
            .find(|control| control.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.controls().is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.controls().iter().all(|control| control.is_valid())
    }

    pub fn is_dirty(&self) -> bool {
        self.controls().iter().any(|control| control.dirty)
    }

    /// Errors of every control that currently blocks the form.
    pub fn errors(&self) -> IndexMap<String, IndexMap<String, ValidationError>> {
        self.controls()
            .into_iter()
            .filter(|control| !control.is_valid())
            .map(|control| (control.name.clone(), control.errors().clone()))
            .collect()
    }
}
