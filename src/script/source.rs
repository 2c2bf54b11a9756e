use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, error};

/// Resolves the source text of shared "global" scripts named in `uses`.
pub trait ScriptSource {
    fn fetch(&self, name: &str) -> Result<String>;
}

/// Plain-text GET access to the backend; network concerns live behind it.
pub trait Backend {
    fn get_text(&self, uri: &str) -> Result<String>;
}

/// Receives the blocking alert raised for broken administrator scripts.
pub trait AlertSink {
    fn alert(&self, title: &str, message: &str);
}

/// Backend resource path of a global script.
pub fn global_script_uri(name: &str) -> String {
    format!("/script/{}/script", utf8_percent_encode(name, NON_ALPHANUMERIC))
}

#[derive(Debug, Clone)]
pub struct BackendScriptSource<B> {
    backend: B,
}

impl<B: Backend> BackendScriptSource<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: Backend> ScriptSource for BackendScriptSource<B> {
    fn fetch(&self, name: &str) -> Result<String> {
        let uri = global_script_uri(name);
        debug!(script = name, %uri, "fetching global script");
        self.backend
            .get_text(&uri)
            .with_context(|| format!("GET {uri} failed"))
    }
}

/// Reads `<dir>/<name>.rhai`.
#[derive(Debug, Clone)]
pub struct DirectoryScriptSource {
    root: PathBuf,
}

impl DirectoryScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ScriptSource for DirectoryScriptSource {
    fn fetch(&self, name: &str) -> Result<String> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(anyhow!("invalid global script name '{name}'"));
        }
        let path = self.root.join(format!("{name}.rhai"));
        debug!(script = name, path = %path.display(), "reading global script");
        fs::read_to_string(&path)
            .with_context(|| format!("failed to read global script {}", path.display()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryScriptSource {
    scripts: RefCell<HashMap<String, String>>,
}

impl MemoryScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.scripts.borrow_mut().insert(name.into(), source.into());
    }
}

impl ScriptSource for MemoryScriptSource {
    fn fetch(&self, name: &str) -> Result<String> {
        self.scripts
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("no global script named '{name}'"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, title: &str, message: &str) {
        error!(title, "{message}");
    }
}

/// Records alerts; handy for hosts that show them later and for tests.
#[derive(Default)]
pub struct CollectingAlertSink {
    alerts: RefCell<Vec<(String, String)>>,
}

impl CollectingAlertSink {
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.borrow().clone()
    }
}

impl fmt::Debug for CollectingAlertSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectingAlertSink")
            .field("alerts", &self.alerts.borrow().len())
            .finish()
    }
}

impl AlertSink for CollectingAlertSink {
    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .borrow_mut()
            .push((title.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend;

    impl Backend for FakeBackend {
        fn get_text(&self, uri: &str) -> Result<String> {
            Ok(format!("// {uri}"))
        }
    }

    #[test]
    fn global_scripts_are_fetched_by_encoded_name() {
        assert_eq!(global_script_uri("date utils"), "/script/date%20utils/script");
        let source = BackendScriptSource::new(FakeBackend);
        assert_eq!(source.fetch("lib").unwrap(), "// /script/lib/script");
    }

    #[test]
    fn directory_source_rejects_path_escapes() {
        let source = DirectoryScriptSource::new("/tmp");
        assert!(source.fetch("../etc/passwd").is_err());
    }
}
