use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{
    ElementType, FormElement, FormModel, RangeValue, SearchFilter, Situation, parse_filters,
};
use crate::options::FormOptions;
use crate::script::parse_datetime;

use super::tree::{
    ControlKind, FormControl, FormGroup, FormNode, FormTree, GroupLayout, is_empty_value,
};
use super::validators::compose_validators;

/// Turns a form model plus situational data into a bound `FormTree`.
#[derive(Debug, Clone)]
pub struct FormBuilder<'a> {
    situation: Situation,
    options: &'a FormOptions,
    scripted: bool,
}

impl<'a> FormBuilder<'a> {
    pub fn new(situation: Situation, options: &'a FormOptions) -> Self {
        Self {
            situation,
            options,
            scripted: false,
        }
    }

    /// Attach the script-error validator to every control.
    pub fn scripted(mut self, scripted: bool) -> Self {
        self.scripted = scripted;
        self
    }

    pub fn build(&self, model: &FormModel, data: &Value) -> FormTree {
        let filters = if self.situation == Situation::Search {
            parse_filters(data)
        } else {
            Vec::new()
        };
        let elements = data_to_form(&model.elements, data, self.situation);

        let mut children = IndexMap::new();
        for (index, element) in elements.into_iter().enumerate() {
            if let Some((key, node)) = self.build_node(element, 0, index, &filters) {
                children.insert(key, node);
            }
        }

        FormTree {
            root: FormGroup {
                key: "root".to_string(),
                label: model.name.clone(),
                layout: GroupLayout::Plain,
                children,
            },
            situation: self.situation,
            original: data.clone(),
            date_format: self.options.date_format.clone(),
        }
    }

    fn build_node(
        &self,
        element: FormElement,
        depth: usize,
        index: usize,
        filters: &[SearchFilter],
    ) -> Option<(String, FormNode)> {
        if element.is_group() {
            return self.build_group(element, depth, index, filters);
        }
        if element.is_table() && element.elements.is_empty() {
            warn!(field = %element.name, "skipping table without columns");
            return None;
        }
        let key = element.name.clone();
        Some((key, FormNode::Control(self.build_control(element, filters))))
    }

    fn build_group(
        &self,
        mut element: FormElement,
        depth: usize,
        index: usize,
        filters: &[SearchFilter],
    ) -> Option<(String, FormNode)> {
        let key = if element.name.is_empty() {
            format!("group-{index}")
        } else {
            element.name.clone()
        };
        if element.elements.is_empty() {
            warn!(group = %key, "skipping empty group");
            return None;
        }

        let layout = match (&element.element_type, depth) {
            (ElementType::O2mGroupStack, _) => GroupLayout::Tabs,
            (_, 0) => GroupLayout::Plain,
            _ => GroupLayout::Fieldset,
        };
        let mut children = IndexMap::new();
        for (child_index, child) in std::mem::take(&mut element.elements).into_iter().enumerate() {
            if let Some((child_key, node)) = self.build_node(child, depth + 1, child_index, filters)
            {
                children.insert(child_key, node);
            }
        }
        if children.is_empty() {
            warn!(group = %key, "skipping group whose children were all skipped");
            return None;
        }
        Some((
            key.clone(),
            FormNode::Group(FormGroup {
                key,
                label: element.label.clone(),
                layout,
                children,
            }),
        ))
    }

    fn build_control(&self, mut element: FormElement, filters: &[SearchFilter]) -> FormControl {
        if element.label.is_none() {
            element.label = Some(element.name.clone());
        }
        element.readonly = element.readonly || self.options.disabled;

        let mut is_not_set_value = false;
        if self.situation == Situation::Search {
            let filter = filters
                .iter()
                .find(|filter| filter.property == element.qualified_id());
            element.value = match filter {
                Some(filter) if filter.is_not_set() => {
                    is_not_set_value = true;
                    Value::Null
                }
                Some(filter) if element.is_range_capable() => {
                    RangeValue::from_filter(filter).to_value()
                }
                Some(filter) => filter.first_value.clone(),
                None => Value::Null,
            };
        } else if is_empty_value(&element.value) {
            if let Some(default) = element
                .defaultvalue
                .as_ref()
                .filter(|_| self.situation == Situation::Create)
            {
                element.value = default.clone();
            }
        }

        let kind = ControlKind::resolve(&element, self.situation);
        let validators = compose_validators(&element, self.situation, self.scripted);
        debug!(field = %element.name, ?kind, "built control");
        FormControl::new(element, kind, validators, is_not_set_value)
    }
}

/// Build a tree with the default builder settings.
pub fn build(model: &FormModel, data: &Value, situation: Situation, options: &FormOptions) -> FormTree {
    FormBuilder::new(situation, options).build(model, data)
}

/// Merge external data into a copy of the schema: every leaf element whose
/// name appears in `data` takes that value. SEARCH data is a filter list and
/// is applied by the builder instead.
pub fn data_to_form(elements: &[FormElement], data: &Value, situation: Situation) -> Vec<FormElement> {
    let record = match (situation, data) {
        (Situation::Search, _) => None,
        (_, Value::Object(record)) => Some(record),
        _ => None,
    };
    elements
        .iter()
        .map(|element| {
            let mut element = element.clone();
            if element.is_group() {
                element.elements = data_to_form(&element.elements, data, situation);
            } else if let Some(value) = record.and_then(|record| record.get(&element.name)) {
                element.value = value.clone();
            }
            element
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Emit `null` for controls marked "explicitly not set".
    pub include_not_set: bool,
}

impl FormTree {
    /// Situation-specific data snapshot of the form.
    pub fn to_data(&self) -> Value {
        self.extract_with(ExtractOptions::default())
    }

    pub fn extract_with(&self, options: ExtractOptions) -> Value {
        let original = self.original.as_object();
        let mut out = Map::new();
        for control in self.controls() {
            let element = control.element();
            if control.is_not_set_value {
                if options.include_not_set {
                    out.insert(control.name.clone(), Value::Null);
                }
                continue;
            }
            if !is_empty_value(&element.value) {
                out.insert(control.name.clone(), self.output_value(&element));
                continue;
            }
            let had_key = original.is_some_and(|record| record.contains_key(&control.name));
            if self.situation == Situation::Edit && had_key {
                out.insert(control.name.clone(), Value::Null);
            }
        }
        Value::Object(out)
    }

    fn output_value(&self, element: &FormElement) -> Value {
        if element.is_table() || !element.is_date_only() {
            return element.value.clone();
        }
        match &element.value {
            Value::String(raw) => Value::String(self.format_date(raw)),
            Value::Object(_) => match RangeValue::from_value(&element.value) {
                Some(mut range) => {
                    range.first_value = self.format_date_value(&range.first_value);
                    range.second_value = self.format_date_value(&range.second_value);
                    range.to_value()
                }
                None => element.value.clone(),
            },
            other => other.clone(),
        }
    }

    fn format_date_value(&self, value: &Value) -> Value {
        match value {
            Value::String(raw) => Value::String(self.format_date(raw)),
            other => other.clone(),
        }
    }

    fn format_date(&self, raw: &str) -> String {
        match parse_datetime(raw) {
            Some(at) => at.format(&self.date_format).to_string(),
            None => {
                warn!(value = raw, "date-only field holds an unparseable date");
                raw.to_string()
            }
        }
    }
}
