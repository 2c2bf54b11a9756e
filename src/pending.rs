use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

/// Handle for one unit of uncommitted work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pending-changes protocol used to block navigation while edits are uncommitted.
pub trait PendingChanges {
    fn start_task(&self, message: &str) -> TaskId;

    /// With `None`, reports whether any task is pending.
    fn has_pending_task(&self, id: Option<&TaskId>) -> bool;

    fn finish_task(&self, id: &TaskId);

    /// Returns `true` when navigation must be blocked. Tasks in `ignore` are
    /// not considered; when the user agrees to discard, the remaining tasks
    /// are dropped and navigation proceeds.
    fn check_for_pending_tasks(&self, ignore: &[TaskId]) -> bool;
}

/// In-memory registry; the "discard changes?" answer is configured up front.
#[derive(Debug, Default)]
pub struct PendingTaskRegistry {
    tasks: RefCell<IndexMap<TaskId, String>>,
    next_id: Cell<u64>,
    discard: Cell<bool>,
}

impl PendingTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discard(self, discard: bool) -> Self {
        self.discard.set(discard);
        self
    }

    pub fn set_discard(&self, discard: bool) {
        self.discard.set(discard);
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.tasks.borrow().values().cloned().collect()
    }
}

impl PendingChanges for PendingTaskRegistry {
    fn start_task(&self, message: &str) -> TaskId {
        let next = self.next_id.get() + 1;
        self.next_id.set(next);
        let id = TaskId(format!("task-{next}"));
        self.tasks.borrow_mut().insert(id.clone(), message.to_string());
        debug!(task = %id, message, "pending task started");
        id
    }

    fn has_pending_task(&self, id: Option<&TaskId>) -> bool {
        let tasks = self.tasks.borrow();
        match id {
            Some(id) => tasks.contains_key(id),
            None => !tasks.is_empty(),
        }
    }

    fn finish_task(&self, id: &TaskId) {
        if self.tasks.borrow_mut().shift_remove(id).is_some() {
            debug!(task = %id, "pending task finished");
        }
    }

    fn check_for_pending_tasks(&self, ignore: &[TaskId]) -> bool {
        let blocking = self
            .tasks
            .borrow()
            .keys()
            .filter(|id| !ignore.contains(id))
            .cloned()
            .collect::<Vec<_>>();
        if blocking.is_empty() {
            return false;
        }
        if self.discard.get() {
            let mut tasks = self.tasks.borrow_mut();
            for id in &blocking {
                tasks.shift_remove(id);
            }
            return false;
        }
        true
    }
}
