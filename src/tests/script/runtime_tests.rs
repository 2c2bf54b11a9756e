use std::cell::RefCell;
use std::rc::Rc;

use rhai::Dynamic;
use serde_json::{Value, json};

use crate::domain::{ElementType, FormElement};
use crate::options::ScriptOptions;
use crate::script::{
    Backend, BackendScriptSource, ChangeListener, CollectingAlertSink, MemoryScriptSource,
    ModelChange, ScopeInit, ScriptError, ScriptRuntime, ScriptingScope,
};

fn scope_over(elements: Vec<FormElement>) -> ScriptingScope {
    let listener: ChangeListener = Rc::new(|_: &str, _: &ModelChange| {});
    ScriptingScope::new(
        elements
            .into_iter()
            .map(|element| (element.name.clone(), Rc::new(RefCell::new(element)))),
        ScopeInit::default(),
        listener,
    )
}

fn title_scope() -> ScriptingScope {
    scope_over(vec![FormElement::new("title", ElementType::String)])
}

fn runtime(source: MemoryScriptSource, alerts: Rc<CollectingAlertSink>) -> ScriptRuntime {
    ScriptRuntime::new(Rc::new(source), alerts, &ScriptOptions::default())
}

fn title(scope: &ScriptingScope) -> Value {
    scope.element("title").map(|element| element.value()).unwrap_or_default()
}

#[derive(Default)]
struct RecordingBackend {
    requests: Rc<RefCell<Vec<String>>>,
}

impl Backend for RecordingBackend {
    fn get_text(&self, uri: &str) -> anyhow::Result<String> {
        self.requests.borrow_mut().push(uri.to_string());
        Ok(r#""INV-""#.to_string())
    }
}

#[test]
fn uses_fetches_globals_from_the_backend() {
    let backend = RecordingBackend::default();
    let requests = Rc::clone(&backend.requests);
    let runtime = ScriptRuntime::new(
        Rc::new(BackendScriptSource::new(backend)),
        Rc::new(CollectingAlertSink::default()),
        &ScriptOptions::default(),
    );
    let scope = title_scope();
    runtime
        .run(
            &scope,
            r#"#{ uses: ["invoice prefix"], init: |prefix| { scope.model.title.value = prefix + "7"; } }"#,
            "form-script",
        )
        .unwrap();
    assert_eq!(title(&scope), json!("INV-7"));
    assert_eq!(*requests.borrow(), ["/script/invoice%20prefix/script"]);
}

#[test]
fn init_receives_global_exports_in_order() {
    let source = MemoryScriptSource::new()
        .with_script("greeting", r#"#{ greet: |name| "Hello " + name }"#)
        .with_script("suffix", r#""!""#);
    let runtime = runtime(source, Rc::default());
    let scope = title_scope();
    runtime
        .run(
            &scope,
            r#"
            #{
                uses: ["greeting", "suffix"],
                init: |greeting, suffix| {
                    scope.model.title.value = greeting.greet.call("Ann") + suffix;
                }
            }
            "#,
            "form-script",
        )
        .unwrap();
    assert_eq!(title(&scope), json!("Hello Ann!"));
    assert_eq!(runtime.loaded_globals(), ["greeting", "suffix"]);
}

#[test]
fn globals_can_use_other_globals() {
    let source = MemoryScriptSource::new()
        .with_script("base", "40")
        .with_script(
            "derived",
            r#"#{ uses: ["base"], init: |base| base + 2 }"#,
        );
    let runtime = runtime(source, Rc::default());
    let scope = title_scope();
    runtime
        .run(
            &scope,
            r#"#{ uses: ["derived"], init: |answer| { scope.model.title.value = answer; } }"#,
            "form-script",
        )
        .unwrap();
    assert_eq!(title(&scope), json!(42));
}

#[test]
fn circular_globals_fail() {
    let source = MemoryScriptSource::new()
        .with_script("a", r#"#{ uses: ["b"], init: |b| b }"#)
        .with_script("b", r#"#{ uses: ["a"], init: |a| a }"#);
    let runtime = runtime(source, Rc::default());
    let err = runtime
        .run(&title_scope(), r#"#{ uses: ["a"], init: |a| a }"#, "form-script")
        .unwrap_err();
    assert!(err.to_string().contains("circular"));
}

#[test]
fn missing_globals_are_fetch_errors() {
    let runtime = runtime(MemoryScriptSource::new(), Rc::default());
    let err = runtime
        .run(&title_scope(), r#"#{ uses: ["nowhere"], init: || () }"#, "form-script")
        .unwrap_err();
    assert!(matches!(err, ScriptError::Fetch { ref script, .. } if script == "nowhere"));
}

#[test]
fn only_syntax_errors_raise_alerts() {
    let alerts = Rc::new(CollectingAlertSink::default());
    let runtime = runtime(MemoryScriptSource::new(), Rc::clone(&alerts));
    let scope = title_scope();

    let err = runtime.run(&scope, "let x = ;", "broken").unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(err.script(), "broken");

    let err = runtime.run(&scope, r#"throw "nope";"#, "thrower").unwrap_err();
    assert!(!err.is_syntax());

    let alerts = alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].1.contains("broken"));
}

#[test]
fn operation_limit_stops_runaway_scripts() {
    let options = ScriptOptions::default().with_max_operations(10_000);
    let runtime = ScriptRuntime::new(
        Rc::new(MemoryScriptSource::new()),
        Rc::new(CollectingAlertSink::default()),
        &options,
    );
    let err = runtime.run(&title_scope(), "loop {}", "spin").unwrap_err();
    assert!(matches!(err, ScriptError::Runtime { .. }));
}

#[test]
fn stored_handlers_can_be_called_later() {
    let runtime = runtime(MemoryScriptSource::new(), Rc::default());
    let title = Rc::new(RefCell::new(FormElement::new("title", ElementType::String)));
    let copy = Rc::new(RefCell::new(FormElement::new("copy", ElementType::String)));
    let listener: ChangeListener = Rc::new(|_: &str, _: &ModelChange| {});
    let scope = ScriptingScope::new(
        [
            ("title".to_string(), Rc::clone(&title)),
            ("copy".to_string(), Rc::clone(&copy)),
        ],
        ScopeInit::default(),
        listener,
    );
    runtime
        .run(
            &scope,
            r#"
            scope.model.title.onchange = |el| {
                scope.model.copy.value = utils.get(#{ v: el.value }, "v") + " (copy)";
            };
            "#,
            "form-script",
        )
        .unwrap();

    let element = scope.element("title").unwrap();
    element.set_value(json!("Invoice"));
    let handler = title.borrow().onchange.clone().expect("handler stored");
    runtime
        .call_handler(&handler, vec![Dynamic::from(element.clone())])
        .unwrap();
    assert_eq!(copy.borrow().value, json!("Invoice (copy)"));
}
