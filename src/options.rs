use std::time::Duration;

/// Behaviour switches for an object form and everything it builds.
#[derive(Debug, Clone)]
pub struct FormOptions {
    pub debounce: Duration,
    pub disabled: bool,
    pub date_format: String,
    pub script: ScriptOptions,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            disabled: false,
            date_format: "%Y-%m-%d".to_string(),
            script: ScriptOptions::default(),
        }
    }
}

impl FormOptions {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_script_options(mut self, script: ScriptOptions) -> Self {
        self.script = script;
        self
    }

    pub fn with_scripts_enabled(mut self, enabled: bool) -> Self {
        self.script.enabled = enabled;
        self
    }
}

/// Limits applied to the embedded script engine. `None` leaves a limit off.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    pub enabled: bool,
    pub max_operations: Option<u64>,
    pub max_call_levels: Option<usize>,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_operations: None,
            max_call_levels: None,
        }
    }
}

impl ScriptOptions {
    pub fn with_max_operations(mut self, limit: u64) -> Self {
        self.max_operations = Some(limit);
        self
    }

    pub fn with_max_call_levels(mut self, levels: usize) -> Self {
        self.max_call_levels = Some(levels);
        self
    }
}
