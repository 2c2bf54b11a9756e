use std::fmt;
use std::rc::Rc;

use crate::pending::{PendingChanges, PendingTaskRegistry};
use crate::script::{AlertSink, LogAlertSink, LogScriptHost, MemoryScriptSource, ScriptHost, ScriptSource};

/// Collaborators a form talks to, injected once per hosting view.
#[derive(Clone)]
pub struct FormEnvironment {
    pub scripts: Rc<dyn ScriptSource>,
    pub alerts: Rc<dyn AlertSink>,
    pub host: Rc<dyn ScriptHost>,
    pub pending: Rc<dyn PendingChanges>,
}

impl Default for FormEnvironment {
    fn default() -> Self {
        Self {
            scripts: Rc::new(MemoryScriptSource::new()),
            alerts: Rc::new(LogAlertSink),
            host: Rc::new(LogScriptHost),
            pending: Rc::new(PendingTaskRegistry::new()),
        }
    }
}

impl fmt::Debug for FormEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEnvironment").finish_non_exhaustive()
    }
}

impl FormEnvironment {
    pub fn with_scripts(mut self, scripts: Rc<dyn ScriptSource>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_alerts(mut self, alerts: Rc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_host(mut self, host: Rc<dyn ScriptHost>) -> Self {
        self.host = host;
        self
    }

    pub fn with_pending(mut self, pending: Rc<dyn PendingChanges>) -> Self {
        self.pending = pending;
        self
    }
}
