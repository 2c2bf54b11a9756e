use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Value, json};

use crate::domain::{ElementType, FormElement, SharedElement};
use crate::options::ScriptOptions;
use crate::script::{
    ChangeListener, LogAlertSink, MemoryScriptSource, ModelChange, ModelProperty, NotifyLevel,
    ScopeInit, ScriptError, ScriptHost, ScriptRuntime, ScriptingScope,
};

type Recorded = Rc<RefCell<Vec<(String, ModelChange)>>>;

struct Harness {
    scope: ScriptingScope,
    runtime: ScriptRuntime,
    changes: Recorded,
    elements: Vec<SharedElement>,
}

impl Harness {
    fn new(elements: Vec<FormElement>) -> Self {
        Self::with_init(elements, ScopeInit::default())
    }

    fn with_init(elements: Vec<FormElement>, init: ScopeInit) -> Self {
        let shared: Vec<SharedElement> = elements
            .into_iter()
            .map(|element| Rc::new(RefCell::new(element)))
            .collect();
        let changes: Recorded = Rc::default();
        let sink = Rc::clone(&changes);
        let listener: ChangeListener = Rc::new(move |name: &str, change: &ModelChange| {
            sink.borrow_mut().push((name.to_string(), change.clone()));
        });
        let scope = ScriptingScope::new(
            shared
                .iter()
                .map(|element| (element.borrow().name.clone(), Rc::clone(element))),
            init,
            listener,
        );
        let runtime = ScriptRuntime::new(
            Rc::new(MemoryScriptSource::new()),
            Rc::new(LogAlertSink),
            &ScriptOptions::default(),
        );
        Self {
            scope,
            runtime,
            changes,
            elements: shared,
        }
    }

    fn run(&self, source: &str) -> Result<(), ScriptError> {
        self.runtime.run(&self.scope, source, "test")
    }

    fn changes(&self) -> Vec<(String, ModelChange)> {
        self.changes.borrow().clone()
    }
}

fn element_with_value(name: &str, value: Value) -> FormElement {
    let mut element = FormElement::new(name, ElementType::String);
    element.value = value;
    element
}

#[test]
fn reassigning_an_equal_value_is_silent() {
    let harness = Harness::new(vec![element_with_value("x", json!({"a": [1, 2]}))]);
    harness.run("scope.model.x.value = scope.model.x.value;").unwrap();
    harness.run("scope.model.x.value = #{ a: [1, 2.0] };").unwrap();
    assert!(harness.changes().is_empty());
}

#[test]
fn nested_mutation_fires_once() {
    let harness = Harness::new(vec![element_with_value("x", json!({"rows": []}))]);
    harness.run("scope.model.x.value.rows.push(1);").unwrap();
    let changes = harness.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].0, "x");
    assert_eq!(
        changes[0].1,
        ModelChange {
            property: ModelProperty::Value,
            new_value: json!({"rows": [1]}),
        }
    );
    assert_eq!(harness.elements[0].borrow().value, json!({"rows": [1]}));
}

#[test]
fn property_writes_fire_only_on_change() {
    let harness = Harness::new(vec![element_with_value("x", Value::Null)]);
    harness
        .run("scope.model.x.required = true; scope.model.x.required = true;")
        .unwrap();
    harness.run(r#"scope.model.x.error = "too high"; scope.model.x.error = ();"#)
        .unwrap();
    let properties: Vec<_> = harness
        .changes()
        .into_iter()
        .map(|(_, change)| change.property)
        .collect();
    assert_eq!(
        properties,
        [ModelProperty::Required, ModelProperty::Error, ModelProperty::Error]
    );
    assert!(harness.elements[0].borrow().required);
    assert!(harness.elements[0].borrow().error.is_none());
}

#[test]
fn handlers_and_options_are_stored_on_the_element() {
    let harness = Harness::new(vec![element_with_value("x", Value::Null)]);
    harness
        .run(
            r#"
            scope.model.x.onchange = |el| { el.readonly = true; };
            scope.model.x.setList(["a", "b"]);
            scope.model.x.applyFilter(#{ kind: "open" });
            "#,
        )
        .unwrap();
    let element = harness.elements[0].borrow();
    assert!(element.onchange.is_some());
    assert_eq!(element.list, Some(json!(["a", "b"])));
    assert_eq!(element.filter, Some(json!({"kind": "open"})));
    drop(element);

    let properties: Vec<_> = harness
        .changes()
        .into_iter()
        .map(|(_, change)| change.property)
        .collect();
    assert_eq!(
        properties,
        [ModelProperty::Onchange, ModelProperty::List, ModelProperty::Filter]
    );
}

#[test]
fn non_function_handlers_are_rejected() {
    let harness = Harness::new(vec![element_with_value("x", Value::Null)]);
    let err = harness.run("scope.model.x.onchange = 42;").unwrap_err();
    assert!(matches!(err, ScriptError::Runtime { .. }));
}

#[test]
fn detached_scopes_ignore_writes() {
    let harness = Harness::new(vec![element_with_value("x", json!(1))]);
    let view = harness.scope.element("x").unwrap().clone();
    harness.scope.detach();
    assert!(!harness.scope.is_attached());
    assert!(!view.set_value(json!(2)));
    assert_eq!(view.value(), json!(1));
    assert!(matches!(
        harness.run("scope.model.x.value = 3;"),
        Err(ScriptError::Detached { .. })
    ));
    assert!(harness.changes().is_empty());
}

#[derive(Default)]
struct RecordingHost {
    notes: RefCell<Vec<(NotifyLevel, String)>>,
}

impl ScriptHost for RecordingHost {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.notes.borrow_mut().push((level, message.to_string()));
    }
}

#[test]
fn scope_exposes_context_and_actions() {
    let host = Rc::new(RecordingHost::default());
    let init = ScopeInit {
        data: json!({"title": "Invoice"}),
        object_id: Some("obj-1".into()),
        context: json!({"folder": "inbox"}),
        objects: vec![json!({"id": "obj-1"})],
        host: host.clone(),
    };
    let harness = Harness::with_init(
        vec![FormElement::new("title", ElementType::String).with_label("Title")],
        init,
    );
    harness
        .run(
            r#"
            let a = scope.actions;
            a.notify(scope.objectId + " in " + scope.context.folder);
            a.notify("warning", scope.model.title.label + "/" + scope.model.title.type);
            a.notify("error", scope.data.title + " " + scope.objects.len());
            "#,
        )
        .unwrap();
    assert_eq!(
        *host.notes.borrow(),
        [
            (NotifyLevel::Info, "obj-1 in inbox".to_string()),
            (NotifyLevel::Warning, "Title/string".to_string()),
            (NotifyLevel::Error, "Invoice 1".to_string()),
        ]
    );
}
