mod parser;
mod schema;
mod search;

pub use parser::parse_form_model;
pub use schema::{ElementType, FormElement, FormModel, SharedElement, Situation};
pub use search::{
    Operator, RangeValue, SearchFilter, parse_filters, parse_stored_filters,
};
