/// Drop target resolution.
///
/// Turns the end of a drag gesture ("task X released over Y") into a target
/// column and an insertion index, plus the neighbour list the position
/// allocator works on. The dragged task is never part of that list, even for
/// moves inside its own column.
///
/// Droppable ids follow the rendering layer's convention: `col-<id>` for the
/// body of a column, the bare task id for a task card.
use std::fmt;

use crate::snapshot::BoardSnapshot;
use crate::types::{ColumnId, TaskId};

const COLUMN_PREFIX: &str = "col-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropTarget {
    Column(ColumnId),
    Task(TaskId),
}

impl DropTarget {
    /// Parse a droppable id. Returns `None` for anything unrecognised.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.strip_prefix(COLUMN_PREFIX) {
            Some(col) => col.parse().ok().map(DropTarget::Column),
            None => raw.parse().ok().map(DropTarget::Task),
        }
    }
}

impl fmt::Display for DropTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropTarget::Column(id) => write!(f, "{}{}", COLUMN_PREFIX, id),
            DropTarget::Task(id) => write!(f, "{}", id),
        }
    }
}

/// Payload of a finished drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEnd {
    pub active: TaskId,
    pub over: Option<DropTarget>,
    /// Index last reported by the rendering layer while hovering, relative
    /// to the target column without the dragged task. Takes precedence over
    /// the index derived from `over`.
    pub hover_index: Option<usize>,
}

impl GestureEnd {
    pub fn new(active: TaskId, over: DropTarget) -> Self {
        Self {
            active,
            over: Some(over),
            hover_index: None,
        }
    }

    pub fn with_hover_index(mut self, index: usize) -> Self {
        self.hover_index = Some(index);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub task_id: TaskId,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDrop {
    pub task_id: TaskId,
    pub from_column: ColumnId,
    pub column_id: ColumnId,
    pub insertion_index: usize,
    /// Target column in display order, dragged task excluded.
    pub neighbors: Vec<Neighbor>,
}

impl ResolvedDrop {
    pub fn positions(&self) -> Vec<f64> {
        self.neighbors.iter().map(|n| n.position).collect()
    }

    /// True when the drop puts the task back where it already is.
    pub fn is_noop(&self, snapshot: &BoardSnapshot) -> bool {
        self.from_column == self.column_id
            && snapshot
                .column(self.column_id)
                .and_then(|c| c.index_of(self.task_id))
                == Some(self.insertion_index)
    }
}

/// Resolve a gesture against `snapshot`. Returns `None` when the gesture
/// cannot be mapped to a target; callers treat that as "no move".
pub fn resolve(gesture: &GestureEnd, snapshot: &BoardSnapshot) -> Option<ResolvedDrop> {
    let Some(over) = gesture.over else {
        log::debug!(target: "taskboard.resolver", "Task {} dropped outside any target", gesture.active);
        return None;
    };
    let Some(active) = snapshot.task(gesture.active) else {
        log::debug!(target: "taskboard.resolver", "Dragged task {} is not on the board", gesture.active);
        return None;
    };

    let column_id = match over {
        DropTarget::Column(id) => id,
        DropTarget::Task(id) => match snapshot.task(id) {
            Some(task) => task.column_id,
            None => {
                log::debug!(target: "taskboard.resolver", "Drop target task {} is not on the board", id);
                return None;
            }
        },
    };
    let Some(column) = snapshot.column(column_id) else {
        log::debug!(target: "taskboard.resolver", "Drop target column {} is not on the board", column_id);
        return None;
    };

    let neighbors: Vec<Neighbor> = column
        .tasks
        .iter()
        .filter(|t| t.id != active.id)
        .map(|t| Neighbor {
            task_id: t.id,
            position: t.position,
        })
        .collect();

    let derived = match over {
        DropTarget::Column(_) => neighbors.len(),
        // Dropping onto a task inserts before it. Dropping onto itself maps
        // to its current slot.
        DropTarget::Task(id) if id == active.id => column.index_of(id).unwrap_or(neighbors.len()),
        DropTarget::Task(id) => neighbors
            .iter()
            .position(|n| n.task_id == id)
            .unwrap_or(neighbors.len()),
    };
    let insertion_index = gesture.hover_index.unwrap_or(derived).min(neighbors.len());

    Some(ResolvedDrop {
        task_id: active.id,
        from_column: active.column_id,
        column_id,
        insertion_index,
        neighbors,
    })
}
