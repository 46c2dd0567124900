use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub type TaskId = i64;
pub type ColumnId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A task on the board. Only `id`, `column_id` and `position` matter to the
/// reorder engine; everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub column_id: ColumnId,
    pub position: f64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>, column_id: ColumnId, position: f64) -> Self {
        Self {
            id,
            title: title.into(),
            column_id,
            position,
            priority: Priority::default(),
            description: None,
            due_date: None,
        }
    }

    /// Display order inside a column: ascending position, ties broken by id.
    pub fn display_order(a: &Task, b: &Task) -> Ordering {
        a.position
            .total_cmp(&b.position)
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Same task placed somewhere else.
    pub fn placed(&self, column_id: ColumnId, position: f64) -> Task {
        Task {
            column_id,
            position,
            ..self.clone()
        }
    }
}

/// A status lane. Inside a `BoardSnapshot` the `tasks` vector is always kept
/// in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    /// Order of the column on the board, not of its tasks.
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn new(id: ColumnId, name: impl Into<String>, position: i32) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            tasks: Vec::new(),
        }
    }

    pub fn index_of(&self, task_id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.index_of(task_id).is_some()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    pub fn positions(&self) -> Vec<f64> {
        self.tasks.iter().map(|t| t.position).collect()
    }

    pub(crate) fn sort_tasks(&mut self) {
        self.tasks.sort_by(Task::display_order);
    }
}

/// Flat board listing as served by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardListing {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}
