use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("form has no field named '{0}'")]
    UnknownField(String),
    #[error("field '{0}' is read-only")]
    ReadonlyField(String),
    #[error("field '{0}' is not a table")]
    NotATable(String),
    #[error("table '{table}' has no row {index}")]
    RowOutOfRange { table: String, index: usize },
    #[error("table '{0}' has no row in edit")]
    NoRowInEdit(String),
    #[error("row of table '{0}' is invalid and cannot be saved")]
    InvalidRow(String),
    #[error("table '{0}' has unsaved row changes")]
    PendingRowChanges(String),
    #[error("no form fragment '{0}'")]
    UnknownFragment(String),
    #[error("form fragments cannot be added or removed for this object")]
    FragmentEditingDisabled,
}
