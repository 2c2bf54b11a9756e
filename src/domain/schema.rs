use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rhai::FnPtr;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Editing situation a form is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Situation {
    Create,
    #[default]
    Edit,
    Search,
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Situation::Create => write!(f, "CREATE"),
            Situation::Edit => write!(f, "EDIT"),
            Situation::Search => write!(f, "SEARCH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementType {
    #[default]
    String,
    Integer,
    Decimal,
    Datetime,
    Boolean,
    Table,
    O2mGroup,
    O2mGroupStack,
    Other(String),
}

impl ElementType {
    pub fn as_str(&self) -> &str {
        match self {
            ElementType::String => "string",
            ElementType::Integer => "integer",
            ElementType::Decimal => "decimal",
            ElementType::Datetime => "datetime",
            ElementType::Boolean => "boolean",
            ElementType::Table => "table",
            ElementType::O2mGroup => "o2mGroup",
            ElementType::O2mGroupStack => "o2mGroupStack",
            ElementType::Other(raw) => raw,
        }
    }
}

impl From<String> for ElementType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "string" => ElementType::String,
            "integer" => ElementType::Integer,
            "decimal" => ElementType::Decimal,
            "datetime" => ElementType::Datetime,
            "boolean" => ElementType::Boolean,
            "table" => ElementType::Table,
            "o2mGroup" => ElementType::O2mGroup,
            "o2mGroupStack" => ElementType::O2mGroupStack,
            _ => ElementType::Other(raw),
        }
    }
}

impl From<ElementType> for String {
    fn from(kind: ElementType) -> Self {
        match kind {
            ElementType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// The single element instance shared by a bound control and the scripting scope.
pub type SharedElement = Rc<RefCell<FormElement>>;

/// One node of a server-supplied form schema.
///
/// The serde-skipped fields are runtime properties: scripts set them through
/// the scripting scope and the form tree reads them back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormElement {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub element_type: ElementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub multiselect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaultvalue: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<FormElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Value>,

    #[serde(skip)]
    pub error: Option<String>,
    #[serde(skip)]
    pub onchange: Option<FnPtr>,
    #[serde(skip)]
    pub onrowedit: Option<FnPtr>,
    #[serde(skip)]
    pub filter: Option<Value>,
    #[serde(skip)]
    pub list: Option<Value>,
}

impl FormElement {
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
            ..Self::default()
        }
    }

    /// Identifier used to match search filters; falls back to the name.
    pub fn qualified_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn is_group(&self) -> bool {
        matches!(
            self.element_type,
            ElementType::O2mGroup | ElementType::O2mGroupStack
        )
    }

    pub fn is_table(&self) -> bool {
        self.element_type == ElementType::Table
    }

    pub fn is_range_capable(&self) -> bool {
        matches!(
            self.element_type,
            ElementType::Datetime | ElementType::Integer | ElementType::Decimal
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.element_type,
            ElementType::Integer | ElementType::Decimal
        )
    }

    pub fn is_date_only(&self) -> bool {
        self.resolution.as_deref() == Some("date")
    }

    pub fn has_classification(&self, prefix: &str) -> bool {
        self.classifications
            .iter()
            .any(|classification| classification.starts_with(prefix))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_elements(mut self, elements: Vec<FormElement>) -> Self {
        self.elements = elements;
        self
    }
}

/// Root of a form schema: the `core`/`data` partitions plus an optional script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<Situation>,
    #[serde(default)]
    pub elements: Vec<FormElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl FormModel {
    pub fn new(elements: Vec<FormElement>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// True when at least one leaf element would render.
    pub fn has_elements(&self) -> bool {
        fn any_leaf(elements: &[FormElement]) -> bool {
            elements.iter().any(|element| {
                if element.is_group() {
                    any_leaf(&element.elements)
                } else {
                    true
                }
            })
        }
        any_leaf(&self.elements)
    }

    pub fn script_name(&self) -> &str {
        self.name.as_deref().unwrap_or("form-script")
    }
}
