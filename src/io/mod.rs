mod format;
mod input;
mod output;

pub use format::DocumentFormat;
pub use input::{load_document, parse_document_str, parse_form_document};
pub use output::{OutputDestination, OutputOptions, emit};
