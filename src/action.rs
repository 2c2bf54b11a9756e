use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many selected objects an action can work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionRange {
    SingleSelect,
    MultiSelect,
    #[default]
    DontCare,
}

impl SelectionRange {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            SelectionRange::SingleSelect => count == 1,
            SelectionRange::MultiSelect => count >= 1,
            SelectionRange::DontCare => true,
        }
    }
}

/// What running an action does; decided when the action is declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionKind {
    Simple,
    List {
        #[serde(rename = "subActions", default)]
        sub_actions: Vec<Action>,
    },
    Link {
        uri: String,
    },
    Component {
        component: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub range: SelectionRange,
    /// Object types the action applies to; empty means all.
    #[serde(default)]
    pub supported_types: Vec<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// One selected object as the action menu sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedObject {
    pub id: String,
    pub object_type: String,
}

impl SelectedObject {
    pub fn new(id: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
        }
    }
}

impl Action {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            priority: 0,
            range: SelectionRange::default(),
            supported_types: Vec::new(),
            kind,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_range(mut self, range: SelectionRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_supported_types(mut self, types: Vec<String>) -> Self {
        self.supported_types = types;
        self
    }

    pub fn is_executable(&self, selection: &[SelectedObject]) -> bool {
        self.range.accepts(selection.len())
            && (self.supported_types.is_empty()
                || selection
                    .iter()
                    .all(|item| self.supported_types.contains(&item.object_type)))
    }

    /// The action narrowed to `selection`; list actions keep only executable
    /// children and vanish when none remain.
    fn narrowed(&self, selection: &[SelectedObject]) -> Option<Action> {
        if !self.is_executable(selection) {
            return None;
        }
        let ActionKind::List { sub_actions } = &self.kind else {
            return Some(self.clone());
        };
        let sub_actions = sort_by_priority(
            sub_actions
                .iter()
                .filter_map(|action| action.narrowed(selection))
                .collect(),
        );
        if sub_actions.is_empty() {
            return None;
        }
        Some(Action {
            kind: ActionKind::List { sub_actions },
            ..self.clone()
        })
    }
}

fn sort_by_priority(mut actions: Vec<Action>) -> Vec<Action> {
    actions.sort_by_key(|action| action.priority);
    actions
}

#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load action declarations from a JSON array.
    pub fn from_value(value: &Value) -> Result<Self> {
        let actions = serde_json::from_value(value.clone()).context("invalid action declarations")?;
        Ok(Self { actions })
    }

    pub fn register(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Actions that can run on `selection`, lowest priority value first.
    pub fn available_for(&self, selection: &[SelectedObject]) -> Vec<Action> {
        sort_by_priority(
            self.actions
                .iter()
                .filter_map(|action| action.narrowed(selection))
                .collect(),
        )
    }
}
