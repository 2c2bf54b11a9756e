mod convert;
mod error;
mod moment;
mod runtime;
mod scope;
mod source;
mod utils;

pub use convert::{UnsupportedValue, dynamic_to_json, json_equal, json_to_dynamic};
pub use error::ScriptError;
pub use moment::{Moment, MomentLib, parse_datetime};
pub use runtime::ScriptRuntime;
pub use scope::{
    ChangeListener, LogScriptHost, ModelChange, ModelProperty, NotifyLevel, ScopeElement,
    ScopeInit, ScriptActions, ScriptHost, ScriptingScope,
};
pub use source::{
    AlertSink, Backend, BackendScriptSource, CollectingAlertSink, DirectoryScriptSource,
    LogAlertSink, MemoryScriptSource, ScriptSource, global_script_uri,
};
pub use utils::UtilityLib;
