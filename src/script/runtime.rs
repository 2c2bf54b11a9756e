use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rhai::{AST, Array, Dynamic, Engine, FnPtr, Map, Scope};
use tracing::{debug, error, info};

use crate::options::ScriptOptions;

use super::error::ScriptError;
use super::moment::{self, MomentLib};
use super::scope::{self, ScriptingScope};
use super::source::{AlertSink, ScriptSource};
use super::utils::{self, UtilityLib};

const SYNTAX_ALERT_TITLE: &str = "Script error";

/// Compiles and runs form scripts against a `ScriptingScope`.
///
/// A script is a Rhai program evaluated with the variables `scope`, `utils`
/// and `moment`. It may end with `#{ uses: [..], init: |..| {..} }`: every
/// global script named in `uses` is loaded and evaluated the same way and its
/// result is passed to `init` positionally. Handlers stored on elements must
/// be closures, since plain `fn` items cannot see `scope`.
pub struct ScriptRuntime {
    engine: Engine,
    functions: RefCell<AST>,
    globals: RefCell<IndexMap<String, Dynamic>>,
    loading: RefCell<Vec<String>>,
    source: Rc<dyn ScriptSource>,
    alerts: Rc<dyn AlertSink>,
}

impl fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("globals", &self.globals.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ScriptRuntime {
    pub fn new(
        source: Rc<dyn ScriptSource>,
        alerts: Rc<dyn AlertSink>,
        options: &ScriptOptions,
    ) -> Self {
        Self {
            engine: build_engine(options),
            functions: RefCell::new(AST::empty()),
            globals: RefCell::new(IndexMap::new()),
            loading: RefCell::new(Vec::new()),
            source,
            alerts,
        }
    }

    /// Run a form script. Failures are reported (syntax errors also raise a
    /// blocking alert) and returned for callers that care.
    pub fn run(&self, scope: &ScriptingScope, source: &str, name: &str) -> Result<(), ScriptError> {
        let result = self.execute(scope, source, name);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Invoke a script-provided handler such as `onchange` or `onrowedit`.
    pub fn call_handler(&self, handler: &FnPtr, args: Vec<Dynamic>) -> Result<Dynamic, ScriptError> {
        let functions = self.functions.borrow();
        handler
            .call::<Dynamic>(&self.engine, &functions, args)
            .map_err(|err| ScriptError::eval(handler.fn_name(), &err))
    }

    /// Log a script failure; syntax errors additionally alert the user.
    pub fn report(&self, err: &ScriptError) {
        error!(script = err.script(), "{err}");
        if err.is_syntax() {
            self.alerts.alert(SYNTAX_ALERT_TITLE, &err.to_string());
        }
    }

    pub fn loaded_globals(&self) -> Vec<String> {
        self.globals.borrow().keys().cloned().collect()
    }

    fn execute(&self, scope: &ScriptingScope, source: &str, name: &str) -> Result<(), ScriptError> {
        if !scope.is_attached() {
            return Err(ScriptError::Detached {
                script: name.to_string(),
            });
        }
        let returned = self.evaluate(scope, source, name)?;
        self.resolve_imports(scope, returned, name)?;
        Ok(())
    }

    fn evaluate(&self, scope: &ScriptingScope, source: &str, name: &str) -> Result<Dynamic, ScriptError> {
        let mut ast = self
            .engine
            .compile(source)
            .map_err(|err| ScriptError::parse(name, &err))?;
        ast.set_source(name);
        self.functions
            .borrow_mut()
            .combine(ast.clone_functions_only());

        let program = self.functions.borrow().merge(&ast);
        let mut variables = Scope::new();
        variables.push("scope", scope.clone());
        variables.push("utils", UtilityLib);
        variables.push("moment", MomentLib);
        debug!(script = name, "running script");
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut variables, &program)
            .map_err(|err| ScriptError::eval(name, &err))
    }

    /// Honor the `uses`/`init` convention; returns what `init` returned, or
    /// the script's own result when it does not follow the convention.
    fn resolve_imports(
        &self,
        scope: &ScriptingScope,
        returned: Dynamic,
        name: &str,
    ) -> Result<Dynamic, ScriptError> {
        let Some(exports) = returned.clone().try_cast::<Map>() else {
            return Ok(returned);
        };
        let Some(init) = exports
            .get("init")
            .and_then(|init| init.clone().try_cast::<FnPtr>())
        else {
            return Ok(returned);
        };

        let uses = exports
            .get("uses")
            .and_then(|uses| uses.clone().try_cast::<Array>())
            .unwrap_or_default();
        let mut imports = Vec::with_capacity(uses.len());
        for used in uses {
            let global = used.to_string();
            imports.push(self.load_global(scope, &global)?);
        }
        debug!(script = name, imports = imports.len(), "calling init");
        self.call_handler(&init, imports).map_err(|err| match err {
            ScriptError::Runtime { message, .. } => ScriptError::Runtime {
                script: name.to_string(),
                message,
            },
            other => other,
        })
    }

    /// Fetch, compile and evaluate a global script once per runtime.
    fn load_global(&self, scope: &ScriptingScope, name: &str) -> Result<Dynamic, ScriptError> {
        if let Some(exports) = self.globals.borrow().get(name) {
            return Ok(exports.clone());
        }
        if self.loading.borrow().iter().any(|loading| loading == name) {
            return Err(ScriptError::Runtime {
                script: name.to_string(),
                message: "circular `uses` between global scripts".to_string(),
            });
        }

        let source = self.source.fetch(name).map_err(|err| ScriptError::Fetch {
            script: name.to_string(),
            message: format!("{err:#}"),
        })?;
        info!(script = name, "loaded global script");

        self.loading.borrow_mut().push(name.to_string());
        let result = self
            .evaluate(scope, &source, name)
            .and_then(|returned| self.resolve_imports(scope, returned, name));
        self.loading.borrow_mut().retain(|loading| loading != name);

        let exports = result?;
        self.globals
            .borrow_mut()
            .insert(name.to_string(), exports.clone());
        Ok(exports)
    }
}

fn build_engine(options: &ScriptOptions) -> Engine {
    let mut engine = Engine::new();
    if let Some(limit) = options.max_operations {
        engine.set_max_operations(limit);
    }
    if let Some(levels) = options.max_call_levels {
        engine.set_max_call_levels(levels);
    }
    engine.on_print(|text| info!(target: "objectform::script", "{text}"));
    engine.on_debug(|text, source, position| {
        debug!(
            target: "objectform::script",
            source = source.unwrap_or("<script>"),
            %position,
            "{text}"
        );
    });
    scope::register(&mut engine);
    utils::register(&mut engine);
    moment::register(&mut engine);
    engine
}
