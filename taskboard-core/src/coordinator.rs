//! Optimistic mutation bookkeeping.
//!
//! The coordinator is the only writer of the board snapshot. A mutation is
//! applied locally right away, recorded as pending under its task, and later
//! settled with the outcome of the matching remote call:
//!
//! ```text
//! Idle -> OptimisticallyApplied -> Settled(Confirmed)
//!                               -> Settled(RolledBack)
//!                               -> Settled(Stale)      (superseded)
//! ```
//!
//! Several mutations may be in flight at once and their responses may arrive
//! in any order, so everything is keyed by task (and lane), never by issue
//! order. A failed mutation only undoes its own change, together with any
//! unacknowledged mutation it superseded: if nothing touched the snapshot
//! since it was applied the pre-mutation snapshot is swapped back in,
//! otherwise each affected task is reverted only while it still shows the
//! failed change.
//!
//! Nothing here awaits. Callers run the remote call themselves and report back
//! through [`MutationCoordinator::settle`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::position::{Allocation, PositionAllocator};
use crate::remote::{MoveRequest, Placement, RebalanceRequest, RemoteMutation};
use crate::resolver::{self, GestureEnd, ResolvedDrop};
use crate::snapshot::{diff_snapshots, BoardSnapshot, TaskDiff};
use crate::types::{ColumnId, Task, TaskId};

pub type MutationId = u64;

/// How many settled mutations are remembered for [`MutationCoordinator::state`].
const SETTLED_HISTORY: usize = 256;

/// Where a task sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub column_id: ColumnId,
    pub position: f64,
}

impl Slot {
    pub fn of(task: &Task) -> Self {
        Self {
            column_id: task.column_id,
            position: task.position,
        }
    }
}

/// One task-level effect of a mutation, with enough information to replay
/// it on another snapshot or to undo it.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskChange {
    Place { task_id: TaskId, from: Slot, to: Slot },
    Retitle { task_id: TaskId, from: String, to: String },
    Remove { task: Task },
}

impl TaskChange {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskChange::Place { task_id, .. } | TaskChange::Retitle { task_id, .. } => *task_id,
            TaskChange::Remove { task } => task.id,
        }
    }

    /// Replay this change on `snapshot`. Changes to tasks that are gone are
    /// skipped.
    fn apply(&self, snapshot: &BoardSnapshot) -> BoardSnapshot {
        match self {
            TaskChange::Place { task_id, to, .. } => match snapshot.task(*task_id) {
                Some(task) => {
                    let moved = task.placed(to.column_id, to.position);
                    snapshot.with_task_state(*task_id, Some(&moved))
                }
                None => snapshot.clone(),
            },
            TaskChange::Retitle { task_id, to, .. } => match snapshot.task(*task_id) {
                Some(task) => {
                    let renamed = Task {
                        title: to.clone(),
                        ..task.clone()
                    };
                    snapshot.with_task_state(*task_id, Some(&renamed))
                }
                None => snapshot.clone(),
            },
            TaskChange::Remove { task } => snapshot.with_task_state(task.id, None),
        }
    }

    /// Take the starting state from an earlier change to the same task, so
    /// undoing `self` also undoes `earlier`.
    fn rebase_onto(self, earlier: &TaskChange) -> TaskChange {
        match (self, earlier) {
            (TaskChange::Place { task_id, to, .. }, TaskChange::Place { from, .. }) => TaskChange::Place {
                task_id,
                from: *from,
                to,
            },
            (TaskChange::Retitle { task_id, to, .. }, TaskChange::Retitle { from, .. }) => {
                TaskChange::Retitle {
                    task_id,
                    from: from.clone(),
                    to,
                }
            }
            (TaskChange::Remove { task }, TaskChange::Place { from, .. }) => TaskChange::Remove {
                task: task.placed(from.column_id, from.position),
            },
            (TaskChange::Remove { task }, TaskChange::Retitle { from, .. }) => TaskChange::Remove {
                task: Task {
                    title: from.clone(),
                    ..task
                },
            },
            (change, _) => change,
        }
    }

    /// Undo this change on `snapshot`, but only while the task still shows
    /// exactly this change. Returns `None` when something else has touched
    /// the task since.
    fn revert(&self, snapshot: &BoardSnapshot) -> Option<BoardSnapshot> {
        match self {
            TaskChange::Place { task_id, from, to } => {
                let current = snapshot.task(*task_id)?;
                if Slot::of(current) != *to {
                    return None;
                }
                let restored = current.placed(from.column_id, from.position);
                Some(snapshot.with_task_state(*task_id, Some(&restored)))
            }
            TaskChange::Retitle { task_id, from, to } => {
                let current = snapshot.task(*task_id)?;
                if current.title != *to {
                    return None;
                }
                let restored = Task {
                    title: from.clone(),
                    ..current.clone()
                };
                Some(snapshot.with_task_state(*task_id, Some(&restored)))
            }
            TaskChange::Remove { task } => match snapshot.task(task.id) {
                Some(_) => None,
                None => Some(snapshot.with_task_state(task.id, Some(task))),
            },
        }
    }
}

/// Independent lanes of mutations per task. A title edit does not supersede
/// an in-flight move; a delete supersedes everything for its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Move,
    EditTitle,
    Delete,
}

/// Fold the changes of a superseded mutation into the one replacing it. The
/// result starts from wherever the superseded mutation started, and keeps
/// its changes to tasks the new mutation does not touch.
fn inherit(changes: Vec<TaskChange>, earlier: Vec<TaskChange>) -> Vec<TaskChange> {
    let mut merged: Vec<TaskChange> = changes
        .into_iter()
        .map(|change| {
            let id = change.task_id();
            earlier
                .iter()
                .filter(|e| e.task_id() == id)
                .fold(change, |c, e| c.rebase_onto(e))
        })
        .collect();
    for change in earlier {
        if !merged.iter().any(|c| c.task_id() == change.task_id()) {
            merged.push(change);
        }
    }
    merged
}

#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: MutationId,
    pub task_id: TaskId,
    pub kind: MutationKind,
    pub changes: Vec<TaskChange>,
    /// Last state without this mutation or anything it superseded. `None`
    /// when other changes were interleaved, in which case only a targeted
    /// rollback is possible.
    pub snapshot_before: Option<Arc<BoardSnapshot>>,
    /// Snapshot version right after this mutation was applied.
    pub applied_version: u64,
    pub request: RemoteMutation,
    target: Option<(ColumnId, usize)>,
}

impl PendingMutation {
    fn primary_place(&self) -> Option<(Slot, Slot)> {
        self.changes.iter().find_map(|c| match c {
            TaskChange::Place { task_id, from, to } if *task_id == self.task_id => Some((*from, *to)),
            _ => None,
        })
    }

    pub fn from_column(&self) -> Option<ColumnId> {
        self.primary_place().map(|(from, _)| from.column_id)
    }

    pub fn to_column(&self) -> Option<ColumnId> {
        self.primary_place().map(|(_, to)| to.column_id)
    }

    pub fn previous_position(&self) -> Option<f64> {
        self.primary_place().map(|(from, _)| from.position)
    }

    pub fn new_position(&self) -> Option<f64> {
        self.primary_place().map(|(_, to)| to.position)
    }
}

/// Handle for the remote call that belongs to an applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub mutation_id: MutationId,
    pub task_id: TaskId,
    pub kind: MutationKind,
    pub request: RemoteMutation,
    /// The destination column was compacted as part of this move.
    pub renormalized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied(Ticket),
    /// Same mutation already in flight; nothing was done.
    Coalesced { pending: MutationId },
    /// The mutation would not change anything.
    Unchanged,
    /// The gesture or task could not be resolved.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    RolledBack { wholesale: bool },
    /// Superseded by a newer mutation, or already settled; the response was
    /// ignored.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    OptimisticallyApplied,
    Settled(Settlement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    confirmed_at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub version: u64,
    /// Where the server disagreed with local state. The server always wins.
    pub conflicts: Vec<TaskDiff>,
}

pub struct MutationCoordinator {
    snapshot: Arc<BoardSnapshot>,
    version: u64,
    allocator: PositionAllocator,
    pending: HashMap<(TaskId, MutationKind), PendingMutation>,
    next_mutation: MutationId,
    settled: VecDeque<(MutationId, Settlement)>,
    next_fetch: u64,
    applied_fetch: Option<u64>,
    confirmed: u64,
}

impl MutationCoordinator {
    pub fn new(snapshot: BoardSnapshot, config: &EngineConfig) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            version: 0,
            allocator: PositionAllocator::from_config(config),
            pending: HashMap::new(),
            next_mutation: 1,
            settled: VecDeque::with_capacity(SETTLED_HISTORY),
            next_fetch: 0,
            applied_fetch: None,
            confirmed: 0,
        }
    }

    /// Current snapshot. Cheap to clone and never changes under the caller.
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, task_id: TaskId, kind: MutationKind) -> Option<&PendingMutation> {
        self.pending.get(&(task_id, kind))
    }

    pub fn is_pending(&self, ticket: &Ticket) -> bool {
        self.pending
            .get(&(ticket.task_id, ticket.kind))
            .is_some_and(|p| p.id == ticket.mutation_id)
    }

    pub fn state(&self, mutation_id: MutationId) -> MutationState {
        if self.pending.values().any(|p| p.id == mutation_id) {
            return MutationState::OptimisticallyApplied;
        }
        self.settled
            .iter()
            .find(|(id, _)| *id == mutation_id)
            .map(|(_, s)| MutationState::Settled(*s))
            .unwrap_or(MutationState::Idle)
    }

    /// Resolve a finished drag and apply it.
    pub fn handle_drop(&mut self, gesture: &GestureEnd) -> MutationOutcome {
        match resolver::resolve(gesture, &self.snapshot) {
            Some(drop) => self.apply_move(drop),
            None => MutationOutcome::Discarded,
        }
    }

    /// Apply an already resolved move.
    pub fn apply_move(&mut self, drop: ResolvedDrop) -> MutationOutcome {
        let target = (drop.column_id, drop.insertion_index);
        if let Some(p) = self.pending.get(&(drop.task_id, MutationKind::Move)) {
            if p.target == Some(target) {
                log::debug!(
                    target: "taskboard.coordinator",
                    "Ignoring duplicate move of task {} (mutation {} in flight)",
                    drop.task_id,
                    p.id
                );
                return MutationOutcome::Coalesced { pending: p.id };
            }
        }
        if drop.is_noop(&self.snapshot) {
            return MutationOutcome::Unchanged;
        }
        let Some(task) = self.snapshot.task(drop.task_id).cloned() else {
            return MutationOutcome::Discarded;
        };
        if self.snapshot.column(drop.column_id).is_none() {
            return MutationOutcome::Discarded;
        }

        let (changes, request, renormalized) =
            match self.allocator.allocate(&drop.positions(), drop.insertion_index) {
                Allocation::Position(position) => {
                    let to = Slot {
                        column_id: drop.column_id,
                        position,
                    };
                    let change = TaskChange::Place {
                        task_id: task.id,
                        from: Slot::of(&task),
                        to,
                    };
                    let request = RemoteMutation::Move(MoveRequest {
                        task_id: task.id,
                        destination_column_id: drop.column_id,
                        new_position: position,
                    });
                    (vec![change], request, false)
                }
                Allocation::Degenerate => {
                    log::info!(
                        target: "taskboard.coordinator",
                        "No room at index {} of column {}, compacting",
                        drop.insertion_index,
                        drop.column_id
                    );
                    let (changes, request) = self.compact_with(&task, &drop);
                    (changes, RemoteMutation::Rebalance(request), true)
                }
            };

        let ticket = self.begin(task.id, MutationKind::Move, changes, request, Some(target));
        MutationOutcome::Applied(Ticket {
            renormalized,
            ..ticket
        })
    }

    /// Evenly respace the destination column with the moved task inserted.
    fn compact_with(&self, task: &Task, drop: &ResolvedDrop) -> (Vec<TaskChange>, RebalanceRequest) {
        let mut order: Vec<TaskId> = drop.neighbors.iter().map(|n| n.task_id).collect();
        order.insert(drop.insertion_index.min(order.len()), task.id);
        let spread = self.allocator.spread(order.len());

        let mut changes = Vec::with_capacity(order.len());
        let mut placements = Vec::with_capacity(order.len());
        for (&id, position) in order.iter().zip(spread) {
            placements.push(Placement {
                task_id: id,
                position,
            });
            let Some(current) = self.snapshot.task(id) else {
                continue;
            };
            let to = Slot {
                column_id: drop.column_id,
                position,
            };
            if Slot::of(current) != to {
                changes.push(TaskChange::Place {
                    task_id: id,
                    from: Slot::of(current),
                    to,
                });
            }
        }
        // Keep the moved task first so it reads as the primary change.
        changes.sort_by_key(|c| c.task_id() != task.id);

        let request = RebalanceRequest {
            column_id: drop.column_id,
            placements,
        };
        (changes, request)
    }

    /// Optimistically change a task's title.
    pub fn edit_title(&mut self, task_id: TaskId, title: &str) -> MutationOutcome {
        let Some(task) = self.snapshot.task(task_id) else {
            return MutationOutcome::Discarded;
        };
        if task.title == title {
            return match self.pending.get(&(task_id, MutationKind::EditTitle)) {
                Some(p) => MutationOutcome::Coalesced { pending: p.id },
                None => MutationOutcome::Unchanged,
            };
        }
        let change = TaskChange::Retitle {
            task_id,
            from: task.title.clone(),
            to: title.to_string(),
        };
        let request = RemoteMutation::EditTitle {
            task_id,
            title: title.to_string(),
        };
        MutationOutcome::Applied(self.begin(task_id, MutationKind::EditTitle, vec![change], request, None))
    }

    /// Optimistically remove a task.
    pub fn delete_task(&mut self, task_id: TaskId) -> MutationOutcome {
        let Some(task) = self.snapshot.task(task_id).cloned() else {
            return match self.pending.get(&(task_id, MutationKind::Delete)) {
                Some(p) => MutationOutcome::Coalesced { pending: p.id },
                None => MutationOutcome::Discarded,
            };
        };
        let request = RemoteMutation::Delete { task_id };
        let change = TaskChange::Remove { task };
        MutationOutcome::Applied(self.begin(task_id, MutationKind::Delete, vec![change], request, None))
    }

    fn begin(
        &mut self,
        task_id: TaskId,
        kind: MutationKind,
        changes: Vec<TaskChange>,
        request: RemoteMutation,
        target: Option<(ColumnId, usize)>,
    ) -> Ticket {
        let superseded: Vec<MutationKind> = match kind {
            MutationKind::Delete => vec![MutationKind::Move, MutationKind::EditTitle, MutationKind::Delete],
            other => vec![other],
        };
        let before = self.snapshot();
        let next = changes.iter().fold((*before).clone(), |snap, c| c.apply(&snap));
        let mut changes = changes;
        let mut baseline = Some(Arc::clone(&before));
        let mut superseded_any = false;
        for lane in superseded {
            if let Some(prev) = self.pending.remove(&(task_id, lane)) {
                log::debug!(
                    target: "taskboard.coordinator",
                    "Mutation {} on task {} superseded",
                    prev.id,
                    task_id
                );
                // Undoing the successor also undoes the superseded change.
                baseline = if !superseded_any && prev.applied_version == self.version {
                    prev.snapshot_before.clone()
                } else {
                    None
                };
                superseded_any = true;
                changes = inherit(changes, prev.changes);
                self.remember(prev.id, Settlement::Stale);
            }
        }

        self.commit(next);

        let id = self.next_mutation;
        self.next_mutation += 1;
        log::debug!(
            target: "taskboard.coordinator",
            "Applied mutation {} optimistically: {}",
            id,
            request.describe()
        );
        self.pending.insert(
            (task_id, kind),
            PendingMutation {
                id,
                task_id,
                kind,
                changes,
                snapshot_before: baseline,
                applied_version: self.version,
                request: request.clone(),
                target,
            },
        );
        Ticket {
            mutation_id: id,
            task_id,
            kind,
            request,
            renormalized: false,
        }
    }

    /// Report the outcome of a ticket's remote call. `succeeded` is false for
    /// any failure; the rollback does not depend on the failure kind.
    pub fn settle(&mut self, ticket: &Ticket, succeeded: bool) -> Settlement {
        let key = (ticket.task_id, ticket.kind);
        let current = self.pending.get(&key).map(|p| p.id);
        if current != Some(ticket.mutation_id) {
            log::debug!(
                target: "taskboard.coordinator",
                "Ignoring stale response for mutation {}",
                ticket.mutation_id
            );
            return Settlement::Stale;
        }
        let Some(pending) = self.pending.remove(&key) else {
            return Settlement::Stale;
        };

        let settlement = if succeeded {
            self.confirmed += 1;
            Settlement::Confirmed
        } else {
            self.roll_back(&pending)
        };
        self.remember(pending.id, settlement);
        settlement
    }

    fn roll_back(&mut self, pending: &PendingMutation) -> Settlement {
        if let Some(before) = &pending.snapshot_before {
            if self.version == pending.applied_version {
                log::info!(
                    target: "taskboard.coordinator",
                    "Rolling back mutation {} by restoring the previous snapshot",
                    pending.id
                );
                self.commit((**before).clone());
                return Settlement::RolledBack { wholesale: true };
            }
        }

        let mut snapshot = (*self.snapshot).clone();
        let mut reverted = 0;
        for change in pending.changes.iter().rev() {
            match change.revert(&snapshot) {
                Some(next) => {
                    snapshot = next;
                    reverted += 1;
                }
                None => log::debug!(
                    target: "taskboard.coordinator",
                    "Not reverting task {}: changed since mutation {}",
                    change.task_id(),
                    pending.id
                ),
            }
        }
        log::info!(
            target: "taskboard.coordinator",
            "Rolled back mutation {} on {} of {} tasks",
            pending.id,
            reverted,
            pending.changes.len()
        );
        if reverted > 0 {
            self.commit(snapshot);
        }
        Settlement::RolledBack { wholesale: false }
    }

    /// Start an authoritative fetch. The ticket is needed to reconcile.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_fetch += 1;
        FetchTicket {
            seq: self.next_fetch,
            confirmed_at: self.confirmed,
        }
    }

    /// Adopt an authoritative snapshot, then replay every mutation still in
    /// flight on top of it. Returns `None` when the fetch is outdated: a newer
    /// fetch was already adopted, or a mutation was confirmed after this
    /// fetch started.
    pub fn reconcile(&mut self, ticket: FetchTicket, authoritative: BoardSnapshot) -> Option<ReconcileReport> {
        if self.applied_fetch.is_some_and(|seq| ticket.seq < seq) || ticket.confirmed_at < self.confirmed {
            log::debug!(
                target: "taskboard.coordinator",
                "Discarding outdated fetch {}",
                ticket.seq
            );
            return None;
        }
        self.applied_fetch = Some(ticket.seq);

        let mut in_flight: Vec<&PendingMutation> = self.pending.values().collect();
        in_flight.sort_by_key(|p| p.id);
        let rebased = in_flight
            .iter()
            .flat_map(|p| p.changes.iter())
            .fold(authoritative, |snap, c| c.apply(&snap));

        let conflicts = diff_snapshots(&self.snapshot, &rebased);
        if !conflicts.is_empty() {
            log::debug!(
                target: "taskboard.coordinator",
                "Server state differs from local state on {} tasks, adopting server state",
                conflicts.len()
            );
            self.commit(rebased);
        }
        Some(ReconcileReport {
            version: self.version,
            conflicts,
        })
    }

    /// Position for a task appended to `column_id`, compacting nothing.
    /// `None` when the column does not exist or has no headroom left.
    pub fn append_position(&self, column_id: ColumnId) -> Option<f64> {
        let column = self.snapshot.column(column_id)?;
        match self.allocator.append(&column.positions()) {
            Allocation::Position(p) => Some(p),
            Allocation::Degenerate => None,
        }
    }

    fn commit(&mut self, snapshot: BoardSnapshot) {
        self.snapshot = Arc::new(snapshot);
        self.version += 1;
    }

    fn remember(&mut self, id: MutationId, settlement: Settlement) {
        if self.settled.len() == SETTLED_HISTORY {
            self.settled.pop_front();
        }
        self.settled.push_back((id, settlement));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DropTarget;
    use crate::snapshot::tests::{board, order};

    const TODO: ColumnId = 1;
    const DONE: ColumnId = 2;
    const REVIEW: ColumnId = 3;

    fn coordinator(snapshot: BoardSnapshot) -> MutationCoordinator {
        MutationCoordinator::new(snapshot, &EngineConfig::default())
    }

    fn todo_done() -> BoardSnapshot {
        board(vec![(TODO, "Todo", vec![(1, 1000.0), (2, 2000.0)]), (DONE, "Done", vec![])])
    }

    fn applied(outcome: MutationOutcome) -> Ticket {
        match outcome {
            MutationOutcome::Applied(ticket) => ticket,
            other => panic!("expected an applied mutation, got {:?}", other),
        }
    }

    #[test]
    fn test_move_to_empty_column_uses_default_position() {
        let mut coord = coordinator(todo_done());
        let ticket = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));

        let snap = coord.snapshot();
        assert_eq!(order(&snap, DONE), vec![(2, 1000.0)]);
        assert_eq!(order(&snap, TODO), vec![(1, 1000.0)]);
        assert_eq!(
            ticket.request,
            RemoteMutation::Move(MoveRequest {
                task_id: 2,
                destination_column_id: DONE,
                new_position: 1000.0
            })
        );

        let pending = coord.pending(2, MutationKind::Move).unwrap();
        assert_eq!(pending.from_column(), Some(TODO));
        assert_eq!(pending.to_column(), Some(DONE));
        assert_eq!(pending.previous_position(), Some(2000.0));
        assert_eq!(pending.new_position(), Some(1000.0));
        assert_eq!(coord.state(ticket.mutation_id), MutationState::OptimisticallyApplied);
    }

    #[test]
    fn test_insert_between_uses_midpoint() {
        let snap = board(vec![
            (TODO, "Todo", vec![(1, 1000.0), (2, 2000.0)]),
            (DONE, "Done", vec![(3, 1000.0)]),
        ]);
        let mut coord = coordinator(snap);
        applied(coord.handle_drop(&GestureEnd::new(3, DropTarget::Task(2))));
        assert_eq!(order(&coord.snapshot(), TODO), vec![(1, 1000.0), (3, 1500.0), (2, 2000.0)]);
    }

    #[test]
    fn test_duplicate_drop_is_coalesced() {
        let mut coord = coordinator(todo_done());
        let gesture = GestureEnd::new(2, DropTarget::Column(DONE));
        let ticket = applied(coord.handle_drop(&gesture));
        let again = coord.handle_drop(&gesture);

        assert_eq!(again, MutationOutcome::Coalesced { pending: ticket.mutation_id });
        let snap = coord.snapshot();
        assert_eq!(snap.occurrences(2), 1);
        assert_eq!(order(&snap, DONE), vec![(2, 1000.0)]);
        assert_eq!(coord.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_drop_after_settle_is_unchanged() {
        let mut coord = coordinator(todo_done());
        let gesture = GestureEnd::new(2, DropTarget::Column(DONE));
        let ticket = applied(coord.handle_drop(&gesture));
        assert_eq!(coord.settle(&ticket, true), Settlement::Confirmed);
        assert_eq!(coord.handle_drop(&gesture), MutationOutcome::Unchanged);
        assert_eq!(coord.snapshot().occurrences(2), 1);
    }

    #[test]
    fn test_failed_move_restores_previous_snapshot() {
        let s0 = todo_done();
        let mut coord = coordinator(s0.clone());
        let ticket = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        assert_ne!(*coord.snapshot(), s0);

        let settlement = coord.settle(&ticket, false);
        assert_eq!(settlement, Settlement::RolledBack { wholesale: true });
        assert_eq!(*coord.snapshot(), s0);
        assert_eq!(coord.pending_count(), 0);
        assert_eq!(coord.state(ticket.mutation_id), MutationState::Settled(settlement));
    }

    #[test]
    fn test_failed_move_only_undoes_itself_when_others_landed() {
        let snap = board(vec![
            (TODO, "Todo", vec![(1, 1000.0), (2, 2000.0), (3, 3000.0)]),
            (DONE, "Done", vec![]),
        ]);
        let mut coord = coordinator(snap);
        let first = applied(coord.handle_drop(&GestureEnd::new(1, DropTarget::Column(DONE))));
        let second = applied(coord.handle_drop(&GestureEnd::new(3, DropTarget::Column(DONE))));

        // Responses arrive out of order: the earlier move fails last.
        assert_eq!(coord.settle(&second, true), Settlement::Confirmed);
        assert_eq!(coord.settle(&first, false), Settlement::RolledBack { wholesale: false });

        let snap = coord.snapshot();
        assert_eq!(order(&snap, TODO), vec![(1, 1000.0), (2, 2000.0)]);
        assert_eq!(order(&snap, DONE), vec![(3, 2000.0)]);
    }

    fn todo_done_review() -> BoardSnapshot {
        board(vec![
            (TODO, "Todo", vec![(1, 1000.0), (2, 2000.0)]),
            (DONE, "Done", vec![]),
            (REVIEW, "Review", vec![]),
        ])
    }

    #[test]
    fn test_stale_response_does_not_clobber_later_move_of_same_task() {
        let mut coord = coordinator(todo_done_review());
        let first = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        let second = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(REVIEW))));

        assert_eq!(coord.state(first.mutation_id), MutationState::Settled(Settlement::Stale));
        assert_eq!(coord.settle(&first, false), Settlement::Stale);
        assert_eq!(order(&coord.snapshot(), REVIEW), vec![(2, 1000.0)]);
        assert!(coord.is_pending(&second));
    }

    #[test]
    fn test_failed_move_also_undoes_the_move_it_superseded() {
        let s0 = todo_done_review();
        let mut coord = coordinator(s0.clone());
        let first = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        let second = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(REVIEW))));

        let pending = coord.pending(2, MutationKind::Move).unwrap();
        assert_eq!(pending.from_column(), Some(TODO));
        assert_eq!(pending.previous_position(), Some(2000.0));

        assert_eq!(coord.settle(&second, false), Settlement::RolledBack { wholesale: true });
        assert_eq!(coord.settle(&first, false), Settlement::Stale);
        assert_eq!(*coord.snapshot(), s0);
        assert_eq!(coord.pending_count(), 0);
    }

    #[test]
    fn test_superseded_response_first_then_failure_restores_origin() {
        let s0 = todo_done_review();
        let mut coord = coordinator(s0.clone());
        let first = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        let second = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(REVIEW))));

        // The superseded request succeeds, but its response is ignored.
        assert_eq!(coord.settle(&first, true), Settlement::Stale);
        assert_eq!(coord.settle(&second, false), Settlement::RolledBack { wholesale: true });
        assert_eq!(*coord.snapshot(), s0);
    }

    #[test]
    fn test_superseded_chain_reverts_precisely_when_others_interleave() {
        let mut coord = coordinator(todo_done_review());
        let first = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        let other = applied(coord.handle_drop(&GestureEnd::new(1, DropTarget::Column(DONE))));
        let second = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(REVIEW))));

        assert_eq!(coord.settle(&other, true), Settlement::Confirmed);
        assert_eq!(coord.settle(&second, false), Settlement::RolledBack { wholesale: false });
        assert_eq!(coord.settle(&first, false), Settlement::Stale);

        let snap = coord.snapshot();
        assert_eq!(order(&snap, TODO), vec![(2, 2000.0)]);
        assert_eq!(order(&snap, DONE), vec![(1, 2000.0)]);
        assert!(order(&snap, REVIEW).is_empty());
    }

    #[test]
    fn test_failed_delete_restores_task_before_superseded_move() {
        let s0 = todo_done();
        let mut coord = coordinator(s0.clone());
        applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        applied(coord.edit_title(2, "Ship it"));
        let deleted = applied(coord.delete_task(2));

        assert_eq!(coord.settle(&deleted, false), Settlement::RolledBack { wholesale: false });
        let snap = coord.snapshot();
        let task = snap.task(2).unwrap();
        assert_eq!((task.column_id, task.position), (TODO, 2000.0));
        assert_eq!(task.title, "Task 2");
    }

    #[test]
    fn test_targeted_rollback_skips_task_changed_since() {
        let mut coord = coordinator(todo_done());
        let moved = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        let renamed = applied(coord.edit_title(2, "Ship it"));

        // The rename does not supersede the move.
        assert!(coord.is_pending(&moved));
        assert!(coord.is_pending(&renamed));

        coord.settle(&moved, false);
        let snap = coord.snapshot();
        let task = snap.task(2).unwrap();
        assert_eq!(task.column_id, TODO);
        assert_eq!(task.position, 2000.0);
        assert_eq!(task.title, "Ship it");
    }

    #[test]
    fn test_edit_and_delete_roll_back() {
        let s0 = todo_done();
        let mut coord = coordinator(s0.clone());

        let edit = applied(coord.edit_title(1, "Renamed"));
        assert_eq!(coord.snapshot().task(1).unwrap().title, "Renamed");
        coord.settle(&edit, false);
        assert_eq!(*coord.snapshot(), s0);

        let delete = applied(coord.delete_task(1));
        assert!(coord.snapshot().task(1).is_none());
        assert_eq!(coord.delete_task(1), MutationOutcome::Coalesced { pending: delete.mutation_id });
        coord.settle(&delete, false);
        assert_eq!(*coord.snapshot(), s0);
    }

    #[test]
    fn test_delete_supersedes_pending_move() {
        let mut coord = coordinator(todo_done());
        let moved = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        let deleted = applied(coord.delete_task(2));
        assert!(!coord.is_pending(&moved));
        assert_eq!(coord.settle(&moved, false), Settlement::Stale);
        assert!(coord.snapshot().task(2).is_none());
        assert_eq!(coord.settle(&deleted, true), Settlement::Confirmed);
    }

    #[test]
    fn test_noop_drop_is_unchanged() {
        let mut coord = coordinator(todo_done());
        assert_eq!(
            coord.handle_drop(&GestureEnd::new(1, DropTarget::Task(1))),
            MutationOutcome::Unchanged
        );
        assert_eq!(
            coord.handle_drop(&GestureEnd::new(99, DropTarget::Column(DONE))),
            MutationOutcome::Discarded
        );
        assert_eq!(coord.version(), 0);
    }

    #[test]
    fn test_repeated_boundary_inserts_trigger_compaction() {
        let backlog: Vec<(TaskId, f64)> = (100..160).map(|id| (id, id as f64 * 1000.0)).collect();
        let mut coord = coordinator(board(vec![
            (TODO, "Todo", vec![(1, 1000.0), (2, 2000.0)]),
            (DONE, "Backlog", backlog),
        ]));

        let mut compactions = 0;
        for id in 100..160 {
            let gesture = GestureEnd::new(id, DropTarget::Column(TODO)).with_hover_index(1);
            let ticket = applied(coord.handle_drop(&gesture));
            if ticket.renormalized {
                compactions += 1;
                assert!(matches!(ticket.request, RemoteMutation::Rebalance(_)));
            }
            coord.settle(&ticket, true);
        }
        assert!(compactions > 0);

        let snap = coord.snapshot();
        let ids: Vec<TaskId> = snap.column(TODO).unwrap().task_ids();
        let mut expected = vec![1];
        expected.extend((100..160).rev());
        expected.push(2);
        assert_eq!(ids, expected);

        let positions = snap.column(TODO).unwrap().positions();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!coord.allocator().is_cramped(&positions));
    }

    #[test]
    fn test_compaction_rolls_back_whole_column() {
        let tight = vec![(1, 1000.0), (2, 1000.0 + 5e-7), (3, 5000.0)];
        let s0 = board(vec![(TODO, "Todo", tight), (DONE, "Done", vec![(9, 1000.0)])]);
        let mut coord = coordinator(s0.clone());

        let ticket = applied(coord.handle_drop(&GestureEnd::new(9, DropTarget::Task(2))));
        assert!(ticket.renormalized);
        let RemoteMutation::Rebalance(req) = &ticket.request else {
            panic!("expected a rebalance request");
        };
        assert_eq!(req.column_id, TODO);
        let placed: Vec<(TaskId, f64)> = req.placements.iter().map(|p| (p.task_id, p.position)).collect();
        assert_eq!(placed, vec![(1, 1000.0), (9, 2000.0), (2, 3000.0), (3, 4000.0)]);
        assert_eq!(order(&coord.snapshot(), TODO), placed);

        coord.settle(&ticket, false);
        assert_eq!(*coord.snapshot(), s0);
    }

    #[test]
    fn test_reconcile_adopts_server_and_keeps_in_flight_moves() {
        let mut coord = coordinator(board(vec![
            (TODO, "Todo", vec![(1, 1000.0), (2, 2000.0), (3, 3000.0)]),
            (DONE, "Done", vec![]),
        ]));
        let confirmed = applied(coord.handle_drop(&GestureEnd::new(1, DropTarget::Column(DONE))));
        let in_flight = applied(coord.handle_drop(&GestureEnd::new(3, DropTarget::Task(2))));
        coord.settle(&confirmed, true);

        // Server renumbered task 1 and knows nothing about the second move yet.
        let fetch = coord.begin_fetch();
        let server = board(vec![
            (TODO, "Todo", vec![(2, 2000.0), (3, 3000.0)]),
            (DONE, "Done", vec![(1, 1.0)]),
        ]);
        let report = coord.reconcile(fetch, server).unwrap();

        assert_eq!(
            report.conflicts,
            vec![TaskDiff::Repositioned {
                task_id: 1,
                old_position: 1000.0,
                new_position: 1.0
            }]
        );
        let snap = coord.snapshot();
        assert_eq!(order(&snap, DONE), vec![(1, 1.0)]);
        assert_eq!(order(&snap, TODO), vec![(3, 1000.0), (2, 2000.0)]);
        assert!(coord.is_pending(&in_flight));
    }

    #[test]
    fn test_outdated_fetch_is_discarded() {
        let mut coord = coordinator(todo_done());
        let old_fetch = coord.begin_fetch();
        let ticket = applied(coord.handle_drop(&GestureEnd::new(2, DropTarget::Column(DONE))));
        coord.settle(&ticket, true);

        assert!(coord.reconcile(old_fetch, todo_done()).is_none());
        assert_eq!(order(&coord.snapshot(), DONE), vec![(2, 1000.0)]);

        let first = coord.begin_fetch();
        let second = coord.begin_fetch();
        let server = board(vec![(TODO, "Todo", vec![(1, 1000.0)]), (DONE, "Done", vec![(2, 1000.0)])]);
        assert!(coord.reconcile(second, server.clone()).is_some());
        assert!(coord.reconcile(first, todo_done()).is_none());
        assert_eq!(*coord.snapshot(), server);
    }

    #[test]
    fn test_matching_fetch_keeps_version() {
        let mut coord = coordinator(todo_done());
        let fetch = coord.begin_fetch();
        let report = coord.reconcile(fetch, todo_done()).unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(report.version, 0);
    }

    #[test]
    fn test_append_position() {
        let coord = coordinator(todo_done());
        assert_eq!(coord.append_position(TODO), Some(3000.0));
        assert_eq!(coord.append_position(DONE), Some(1000.0));
        assert_eq!(coord.append_position(42), None);
    }
}
