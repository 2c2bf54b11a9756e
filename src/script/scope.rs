//! The `scope` object scripts receive.
//!
//! Each `ScopeElement` is a view over the same `FormElement` the bound
//! control owns. Writes go straight into the shared element and are reported
//! to the registered listener; the owner pushes them into the live control.
//!
//! Nested writes such as `scope.model.x.value.rows.push(1)` reach the `value`
//! setter through Rhai's property write-back: the getter hands out a copy,
//! the statement mutates it, and the setter receives the result once. A
//! JSON-equal result is ignored, which also breaks owner/scope echo loops.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, Map, Position};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::SharedElement;

use super::convert::{dynamic_to_json, json_equal, json_to_dynamic};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Runtime-mutable properties of a form element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelProperty {
    Value,
    Required,
    Readonly,
    Error,
    Onchange,
    Onrowedit,
    Filter,
    List,
}

impl ModelProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelProperty::Value => "value",
            ModelProperty::Required => "required",
            ModelProperty::Readonly => "readonly",
            ModelProperty::Error => "error",
            ModelProperty::Onchange => "onchange",
            ModelProperty::Onrowedit => "onrowedit",
            ModelProperty::Filter => "filter",
            ModelProperty::List => "list",
        }
    }
}

impl fmt::Display for ModelProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelChange {
    pub property: ModelProperty,
    pub new_value: Value,
}

pub type ChangeListener = Rc<dyn Fn(&str, &ModelChange)>;

/// Shared between a scope and all of its elements so `detach` reaches every copy.
struct ScopeHub {
    listener: RefCell<Option<ChangeListener>>,
    attached: Cell<bool>,
}

impl ScopeHub {
    fn emit(&self, name: &str, property: ModelProperty, new_value: Value) {
        let listener = self.listener.borrow().clone();
        if let Some(listener) = listener {
            listener(
                name,
                &ModelChange {
                    property,
                    new_value,
                },
            );
        }
    }
}

#[derive(Clone)]
pub struct ScopeElement {
    name: String,
    element: SharedElement,
    hub: Rc<ScopeHub>,
}

impl fmt::Debug for ScopeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeElement")
            .field("name", &self.name)
            .field("value", &self.element.borrow().value)
            .finish()
    }
}

impl ScopeElement {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Value {
        self.element.borrow().value.clone()
    }

    pub fn required(&self) -> bool {
        self.element.borrow().required
    }

    pub fn readonly(&self) -> bool {
        self.element.borrow().readonly
    }

    pub fn error(&self) -> Option<String> {
        self.element.borrow().error.clone()
    }

    fn writable(&self) -> bool {
        if !self.hub.attached.get() {
            debug!(field = %self.name, "ignoring write to a detached scope");
            return false;
        }
        true
    }

    /// Returns `false` when the value is JSON-equal to the current one.
    pub fn set_value(&self, value: Value) -> bool {
        if !self.writable() {
            return false;
        }
        {
            let mut element = self.element.borrow_mut();
            if json_equal(&element.value, &value) {
                return false;
            }
            element.value = value.clone();
        }
        self.hub.emit(&self.name, ModelProperty::Value, value);
        true
    }

    pub fn set_required(&self, required: bool) -> bool {
        self.set_flag(ModelProperty::Required, required)
    }

    pub fn set_readonly(&self, readonly: bool) -> bool {
        self.set_flag(ModelProperty::Readonly, readonly)
    }

    fn set_flag(&self, property: ModelProperty, flag: bool) -> bool {
        if !self.writable() {
            return false;
        }
        {
            let mut element = self.element.borrow_mut();
            let slot = match property {
                ModelProperty::Required => &mut element.required,
                _ => &mut element.readonly,
            };
            if *slot == flag {
                return false;
            }
            *slot = flag;
        }
        self.hub.emit(&self.name, property, Value::Bool(flag));
        true
    }

    pub fn set_error(&self, error: Option<String>) -> bool {
        if !self.writable() {
            return false;
        }
        {
            let mut element = self.element.borrow_mut();
            if element.error == error {
                return false;
            }
            element.error = error.clone();
        }
        self.hub.emit(
            &self.name,
            ModelProperty::Error,
            error.map(Value::String).unwrap_or(Value::Null),
        );
        true
    }

    pub fn set_handler(&self, property: ModelProperty, handler: Option<FnPtr>) -> bool {
        if !self.writable() {
            return false;
        }
        let name = handler.as_ref().map(|func| func.fn_name().to_string());
        {
            let mut element = self.element.borrow_mut();
            let slot = match property {
                ModelProperty::Onrowedit => &mut element.onrowedit,
                _ => &mut element.onchange,
            };
            let current = slot.as_ref().map(|func| func.fn_name().to_string());
            if current.is_none() && name.is_none() {
                return false;
            }
            *slot = handler;
        }
        self.hub
            .emit(&self.name, property, name.map(Value::String).unwrap_or(Value::Null));
        true
    }

    pub fn set_filter(&self, filter: Value) -> bool {
        self.set_option(ModelProperty::Filter, filter)
    }

    pub fn set_list(&self, list: Value) -> bool {
        self.set_option(ModelProperty::List, list)
    }

    fn set_option(&self, property: ModelProperty, value: Value) -> bool {
        if !self.writable() {
            return false;
        }
        {
            let mut element = self.element.borrow_mut();
            let slot = match property {
                ModelProperty::List => &mut element.list,
                _ => &mut element.filter,
            };
            if slot.as_ref().is_some_and(|current| json_equal(current, &value)) {
                return false;
            }
            *slot = (!value.is_null()).then(|| value.clone());
        }
        self.hub.emit(&self.name, property, value);
        true
    }
}

/// Severity of a script notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotifyLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" => NotifyLevel::Success,
            "warn" | "warning" => NotifyLevel::Warning,
            "error" => NotifyLevel::Error,
            _ => NotifyLevel::Info,
        }
    }
}

/// Host capabilities scripts reach through `scope.actions`.
pub trait ScriptHost {
    fn notify(&self, level: NotifyLevel, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogScriptHost;

impl ScriptHost for LogScriptHost {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info | NotifyLevel::Success => info!(?level, "{message}"),
            NotifyLevel::Warning => warn!("{message}"),
            NotifyLevel::Error => error!("{message}"),
        }
    }
}

#[derive(Clone)]
pub struct ScriptActions {
    host: Rc<dyn ScriptHost>,
}

impl ScriptActions {
    pub fn notify(&self, level: NotifyLevel, message: &str) {
        self.host.notify(level, message);
    }
}

/// Everything besides the model that scripts see on `scope`.
#[derive(Clone)]
pub struct ScopeInit {
    pub data: Value,
    pub object_id: Option<String>,
    pub context: Value,
    pub objects: Vec<Value>,
    pub host: Rc<dyn ScriptHost>,
}

impl Default for ScopeInit {
    fn default() -> Self {
        Self {
            data: Value::Null,
            object_id: None,
            context: Value::Null,
            objects: Vec::new(),
            host: Rc::new(LogScriptHost),
        }
    }
}

struct ScopeInner {
    model: IndexMap<String, ScopeElement>,
    data: Value,
    object_id: Option<String>,
    context: Value,
    objects: Vec<Value>,
    actions: ScriptActions,
    hub: Rc<ScopeHub>,
}

#[derive(Clone)]
pub struct ScriptingScope {
    inner: Rc<ScopeInner>,
}

impl fmt::Debug for ScriptingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptingScope")
            .field("model", &self.inner.model.keys().collect::<Vec<_>>())
            .field("object_id", &self.inner.object_id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ScriptingScope {
    pub fn new(
        elements: impl IntoIterator<Item = (String, SharedElement)>,
        init: ScopeInit,
        listener: ChangeListener,
    ) -> Self {
        let hub = Rc::new(ScopeHub {
            listener: RefCell::new(Some(listener)),
            attached: Cell::new(true),
        });
        let model = elements
            .into_iter()
            .map(|(name, element)| {
                let view = ScopeElement {
                    name: name.clone(),
                    element,
                    hub: Rc::clone(&hub),
                };
                (name, view)
            })
            .collect();
        Self {
            inner: Rc::new(ScopeInner {
                model,
                data: init.data,
                object_id: init.object_id,
                context: init.context,
                objects: init.objects,
                actions: ScriptActions { host: init.host },
                hub,
            }),
        }
    }

    pub fn element(&self, name: &str) -> Option<&ScopeElement> {
        self.inner.model.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.model.keys().map(String::as_str)
    }

    pub fn object_id(&self) -> Option<&str> {
        self.inner.object_id.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.hub.attached.get()
    }

    /// Drop the listener; later script writes (e.g. from stale handlers) are ignored.
    pub fn detach(&self) {
        if self.inner.hub.attached.replace(false) {
            self.inner.hub.listener.borrow_mut().take();
            debug!(fields = self.inner.model.len(), "scripting scope detached");
        }
    }

    fn model_map(&self) -> Map {
        self.inner
            .model
            .iter()
            .map(|(name, element)| (name.as_str().into(), Dynamic::from(element.clone())))
            .collect()
    }
}

fn type_error(property: &str, expected: &str) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(format!("'{property}' expects {expected}")),
        Position::NONE,
    ))
}

fn optional_handler(property: &str, value: Dynamic) -> RhaiResult<Option<FnPtr>> {
    let value = value.flatten();
    if value.is_unit() {
        return Ok(None);
    }
    value
        .try_cast::<FnPtr>()
        .map(Some)
        .ok_or_else(|| type_error(property, "a function or ()"))
}

fn handler_to_dynamic(handler: Option<FnPtr>) -> Dynamic {
    handler.map(Dynamic::from).unwrap_or(Dynamic::UNIT)
}

fn element_value(element: &mut ScopeElement) -> Dynamic {
    json_to_dynamic(&element.element.borrow().value)
}

fn set_element_value(element: &mut ScopeElement, value: Dynamic) -> RhaiResult<()> {
    element.set_value(dynamic_to_json(&value)?);
    Ok(())
}

pub(crate) fn register(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptingScope>("ScriptingScope");
    engine.register_type_with_name::<ScopeElement>("ScopeElement");
    engine.register_type_with_name::<ScriptActions>("ScriptActions");

    engine.register_get("model", |scope: &mut ScriptingScope| scope.model_map());
    // chained writes (`scope.model.x.value = ..`) write the model map back
    engine.register_set("model", |_: &mut ScriptingScope, _: Map| {});
    engine.register_get("data", |scope: &mut ScriptingScope| {
        json_to_dynamic(&scope.inner.data)
    });
    engine.register_get("objectId", |scope: &mut ScriptingScope| {
        scope
            .inner
            .object_id
            .clone()
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_get("context", |scope: &mut ScriptingScope| {
        json_to_dynamic(&scope.inner.context)
    });
    engine.register_get("objects", |scope: &mut ScriptingScope| -> Array {
        scope.inner.objects.iter().map(json_to_dynamic).collect()
    });
    engine.register_get("actions", |scope: &mut ScriptingScope| {
        scope.inner.actions.clone()
    });

    engine.register_fn("notify", |actions: &mut ScriptActions, message: &str| {
        actions.notify(NotifyLevel::Info, message);
    });
    engine.register_fn(
        "notify",
        |actions: &mut ScriptActions, level: &str, message: &str| {
            actions.notify(NotifyLevel::parse(level), message);
        },
    );

    engine.register_get("name", |element: &mut ScopeElement| element.name.clone());
    engine.register_get("label", |element: &mut ScopeElement| {
        element.element.borrow().display_label().to_string()
    });
    engine.register_get("type", |element: &mut ScopeElement| {
        element.element.borrow().element_type.as_str().to_string()
    });
    engine.register_get_set("value", element_value, set_element_value);
    engine.register_get_set(
        "required",
        |element: &mut ScopeElement| element.required(),
        |element: &mut ScopeElement, required: bool| {
            element.set_required(required);
        },
    );
    engine.register_get_set(
        "readonly",
        |element: &mut ScopeElement| element.readonly(),
        |element: &mut ScopeElement, readonly: bool| {
            element.set_readonly(readonly);
        },
    );
    engine.register_get_set(
        "error",
        |element: &mut ScopeElement| element.error().map(Dynamic::from).unwrap_or(Dynamic::UNIT),
        |element: &mut ScopeElement, error: Dynamic| {
            let error = error.flatten();
            let message = if error.is_unit() {
                None
            } else {
                Some(error.to_string())
            };
            element.set_error(message);
        },
    );
    engine.register_get_set(
        "onchange",
        |element: &mut ScopeElement| handler_to_dynamic(element.element.borrow().onchange.clone()),
        |element: &mut ScopeElement, handler: Dynamic| -> RhaiResult<()> {
            element.set_handler(ModelProperty::Onchange, optional_handler("onchange", handler)?);
            Ok(())
        },
    );
    engine.register_get_set(
        "onrowedit",
        |element: &mut ScopeElement| handler_to_dynamic(element.element.borrow().onrowedit.clone()),
        |element: &mut ScopeElement, handler: Dynamic| -> RhaiResult<()> {
            element.set_handler(ModelProperty::Onrowedit, optional_handler("onrowedit", handler)?);
            Ok(())
        },
    );
    engine.register_fn(
        "applyFilter",
        |element: &mut ScopeElement, filter: Dynamic| -> RhaiResult<()> {
            element.set_filter(dynamic_to_json(&filter)?);
            Ok(())
        },
    );
    engine.register_fn(
        "setFilter",
        |element: &mut ScopeElement, filter: Dynamic| -> RhaiResult<()> {
            element.set_filter(dynamic_to_json(&filter)?);
            Ok(())
        },
    );
    engine.register_fn(
        "setList",
        |element: &mut ScopeElement, list: Dynamic| -> RhaiResult<()> {
            element.set_list(dynamic_to_json(&list)?);
            Ok(())
        },
    );
}
