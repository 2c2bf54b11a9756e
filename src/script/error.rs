use rhai::{EvalAltResult, ParseError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("syntax error in script '{script}': {message}")]
    Syntax { script: String, message: String },
    #[error("script '{script}' failed: {message}")]
    Runtime { script: String, message: String },
    #[error("failed to load global script '{script}': {message}")]
    Fetch { script: String, message: String },
    #[error("scripting scope of '{script}' has been torn down")]
    Detached { script: String },
}

impl ScriptError {
    pub(crate) fn parse(script: &str, err: &ParseError) -> Self {
        ScriptError::Syntax {
            script: script.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn eval(script: &str, err: &EvalAltResult) -> Self {
        match err {
            EvalAltResult::ErrorParsing(kind, position) => ScriptError::Syntax {
                script: script.to_string(),
                message: format!("{kind} ({position})"),
            },
            other => ScriptError::Runtime {
                script: script.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn script(&self) -> &str {
        match self {
            ScriptError::Syntax { script, .. }
            | ScriptError::Runtime { script, .. }
            | ScriptError::Fetch { script, .. }
            | ScriptError::Detached { script } => script,
        }
    }

    /// Syntax errors are administrator-facing configuration defects.
    pub fn is_syntax(&self) -> bool {
        matches!(self, ScriptError::Syntax { .. })
    }
}
