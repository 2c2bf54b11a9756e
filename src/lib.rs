#![deny(rust_2018_idioms)]

pub mod action;
pub mod domain;
mod environment;
pub mod form;
mod io;
mod options;
pub mod pending;
pub mod script;

#[cfg(test)]
mod tests;

pub use action::{Action, ActionKind, ActionRegistry, SelectedObject, SelectionRange};
pub use domain::{
    ElementType, FormElement, FormModel, Operator, RangeValue, SearchFilter, Situation,
    parse_form_model,
};
pub use environment::FormEnvironment;
pub use form::{
    CombinedForm, CombinedFormInput, ExtractOptions, FormError, FormStatusChangedEvent,
    ObjectForm, ObjectFormInput, ValidationError,
};
pub use io::{
    DocumentFormat, OutputDestination, OutputOptions, emit, load_document, parse_document_str,
    parse_form_document,
};
pub use options::{FormOptions, ScriptOptions};
pub use pending::{PendingChanges, PendingTaskRegistry, TaskId};
pub use script::{
    DirectoryScriptSource, MemoryScriptSource, ScriptError, ScriptRuntime, ScriptingScope,
};

pub mod prelude {
    pub use super::{
        CombinedForm, CombinedFormInput, FormEnvironment, FormOptions, ObjectForm,
        ObjectFormInput, Situation,
    };
}
