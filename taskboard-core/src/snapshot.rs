/// Immutable board snapshots.
///
/// A snapshot is never edited in place: every change produces a new value and
/// the coordinator swaps it in wholesale. Columns sit behind `Arc` so a new
/// snapshot shares every column it did not touch with its predecessor.
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{BoardListing, Column, ColumnId, Task, TaskId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardSnapshot {
    columns: Vec<Arc<Column>>,
}

impl BoardSnapshot {
    /// Build a snapshot from columns that already carry their tasks.
    /// Columns are ordered by their board position, tasks by display order.
    pub fn new(columns: Vec<Column>) -> Self {
        let mut columns: Vec<Column> = columns
            .into_iter()
            .map(|mut col| {
                let id = col.id;
                for task in &mut col.tasks {
                    task.column_id = id;
                }
                col.sort_tasks();
                col
            })
            .collect();
        columns.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Self {
            columns: columns.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build a snapshot from a flat listing, grouping tasks by `column_id`.
    /// Tasks pointing at an unknown column are dropped.
    pub fn from_listing(listing: BoardListing) -> Self {
        let BoardListing { mut columns, tasks } = listing;
        let index: HashMap<ColumnId, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();
        for task in tasks {
            match index.get(&task.column_id) {
                Some(&i) => columns[i].tasks.push(task),
                None => log::warn!(
                    target: "taskboard.snapshot",
                    "Dropping task {} from listing: unknown column {}",
                    task.id,
                    task.column_id
                ),
            }
        }
        Self::new(columns)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().map(|c| c.as_ref())
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns().find(|c| c.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.columns().flat_map(|c| c.tasks.iter()).find(|t| t.id == id)
    }

    pub fn task_count(&self) -> usize {
        self.columns().map(|c| c.tasks.len()).sum()
    }

    /// Number of columns holding the given task. Anything other than 0 or 1
    /// means column membership is corrupt.
    pub fn occurrences(&self, id: TaskId) -> usize {
        self.columns()
            .map(|c| c.tasks.iter().filter(|t| t.id == id).count())
            .sum()
    }

    /// New snapshot in which `id` is in state `state`: removed when `None`,
    /// otherwise placed in `state.column_id` at its display-order slot.
    /// A task whose column does not exist is left out.
    pub fn with_task_state(&self, id: TaskId, state: Option<&Task>) -> BoardSnapshot {
        let mut columns = self.columns.clone();
        for col in columns.iter_mut() {
            if col.contains(id) {
                Arc::make_mut(col).tasks.retain(|t| t.id != id);
            }
        }
        if let Some(task) = state {
            match columns.iter_mut().find(|c| c.id == task.column_id) {
                Some(col) => {
                    let col = Arc::make_mut(col);
                    let at = col
                        .tasks
                        .partition_point(|t| Task::display_order(t, task).is_lt());
                    col.tasks.insert(at, task.clone());
                }
                None => log::warn!(
                    target: "taskboard.snapshot",
                    "Cannot place task {}: column {} is not on the board",
                    id,
                    task.column_id
                ),
            }
        }
        BoardSnapshot { columns }
    }

    /// Apply several task states in order.
    pub fn with_task_states<'a, I>(&self, states: I) -> BoardSnapshot
    where
        I: IntoIterator<Item = (TaskId, Option<&'a Task>)>,
    {
        states
            .into_iter()
            .fold(self.clone(), |snap, (id, state)| snap.with_task_state(id, state))
    }
}

/// A single task-level difference between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDiff {
    Added {
        task_id: TaskId,
        column_id: ColumnId,
    },
    Removed {
        task_id: TaskId,
        column_id: ColumnId,
    },
    Moved {
        task_id: TaskId,
        old_column: ColumnId,
        new_column: ColumnId,
    },
    Repositioned {
        task_id: TaskId,
        old_position: f64,
        new_position: f64,
    },
    Modified {
        task_id: TaskId,
    },
}

fn index_tasks(snapshot: &BoardSnapshot) -> HashMap<TaskId, &Task> {
    snapshot
        .columns()
        .flat_map(|c| c.tasks.iter())
        .map(|t| (t.id, t))
        .collect()
}

/// Compute task-level changes from `old` to `new`, sorted by task id.
pub fn diff_snapshots(old: &BoardSnapshot, new: &BoardSnapshot) -> Vec<TaskDiff> {
    let old_tasks = index_tasks(old);
    let new_tasks = index_tasks(new);
    let mut changes = Vec::new();

    for (id, before) in &old_tasks {
        match new_tasks.get(id) {
            None => changes.push(TaskDiff::Removed {
                task_id: *id,
                column_id: before.column_id,
            }),
            Some(after) => {
                if before.column_id != after.column_id {
                    changes.push(TaskDiff::Moved {
                        task_id: *id,
                        old_column: before.column_id,
                        new_column: after.column_id,
                    });
                } else if before.position != after.position {
                    changes.push(TaskDiff::Repositioned {
                        task_id: *id,
                        old_position: before.position,
                        new_position: after.position,
                    });
                }
                let same_payload = before.title == after.title
                    && before.priority == after.priority
                    && before.description == after.description
                    && before.due_date == after.due_date;
                if !same_payload {
                    changes.push(TaskDiff::Modified { task_id: *id });
                }
            }
        }
    }

    for (id, after) in &new_tasks {
        if !old_tasks.contains_key(id) {
            changes.push(TaskDiff::Added {
                task_id: *id,
                column_id: after.column_id,
            });
        }
    }

    changes.sort_by_key(diff_task_id);
    changes
}

fn diff_task_id(diff: &TaskDiff) -> TaskId {
    match diff {
        TaskDiff::Added { task_id, .. }
        | TaskDiff::Removed { task_id, .. }
        | TaskDiff::Moved { task_id, .. }
        | TaskDiff::Repositioned { task_id, .. }
        | TaskDiff::Modified { task_id } => *task_id,
    }
}
