mod builder;
mod combined;
mod error;
mod state;
mod status;
mod table;
mod tree;
mod validators;

pub use builder::{ExtractOptions, FormBuilder, build, data_to_form};
pub use combined::{CombinedForm, CombinedFormInput, FragmentKey};
pub use error::FormError;
pub use state::{ObjectForm, ObjectFormInput};
pub use status::{Debouncer, FormStatusChangedEvent};
pub use table::{RowEditSession, TableState};
pub use tree::{
    ControlKind, FormControl, FormGroup, FormNode, FormTree, GroupLayout, is_empty_value,
};
pub use validators::{ValidationError, Validator, compose_validators, run_validators};
