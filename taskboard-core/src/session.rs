/// Async driver around the coordinator.
///
/// A `BoardSession` owns the coordinator behind a mutex that is only held for
/// synchronous snapshot work, never across a remote call. Any number of
/// `drop_task` / `edit_title` / `delete_task` futures may run concurrently;
/// each applies its change immediately, awaits its own request, and settles.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::{EngineConfig, ReconcilePolicy};
use crate::coordinator::{
    FetchTicket, MutationCoordinator, MutationOutcome, ReconcileReport, Settlement, Ticket,
};
use crate::error::{FailureKind, PersistenceError};
use crate::remote::{NewTask, PersistOutcome, RemoteStore, RequestContext};
use crate::resolver::GestureEnd;
use crate::snapshot::BoardSnapshot;
use crate::types::{BoardListing, ColumnId, Task, TaskId};

const EVENT_CAPACITY: usize = 256;

/// Notifications for whoever renders the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    SnapshotChanged { version: u64 },
    /// A mutation was rolled back. Meant to be shown as a transient,
    /// non-blocking notice.
    #[serde(rename_all = "camelCase")]
    MutationFailed {
        task_id: TaskId,
        kind: FailureKind,
        message: String,
    },
    Reconciled { version: u64, conflicts: usize },
}

/// What became of one user action.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationReport {
    Discarded,
    Unchanged,
    Coalesced,
    Confirmed,
    RolledBack(PersistenceError),
    /// Superseded while in flight; the response was ignored.
    Stale,
}

pub struct BoardSession<S> {
    store: S,
    context: RequestContext,
    config: EngineConfig,
    coordinator: Mutex<MutationCoordinator>,
    events: broadcast::Sender<BoardEvent>,
}

impl<S: RemoteStore> BoardSession<S> {
    pub fn new(store: S, context: RequestContext, config: EngineConfig, snapshot: BoardSnapshot) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let coordinator = Mutex::new(MutationCoordinator::new(snapshot, &config));
        Self {
            store,
            context,
            config,
            coordinator,
            events,
        }
    }

    /// Fetch the board and start a session on it.
    pub async fn open(store: S, context: RequestContext, config: EngineConfig) -> Result<Self, PersistenceError> {
        let listing = store.fetch_board(&context).await?;
        let snapshot = BoardSnapshot::from_listing(listing);
        log::info!(
            target: "taskboard.session",
            "Opened board with {} columns and {} tasks",
            snapshot.columns().count(),
            snapshot.task_count()
        );
        Ok(Self::new(store, context, config, snapshot))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.coordinator().snapshot()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn coordinator(&self) -> MutexGuard<'_, MutationCoordinator> {
        self.coordinator.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub async fn drop_task(&self, gesture: GestureEnd) -> MutationReport {
        let outcome = self.coordinator().handle_drop(&gesture);
        self.run(outcome).await
    }

    pub async fn edit_title(&self, task_id: TaskId, title: &str) -> MutationReport {
        let outcome = self.coordinator().edit_title(task_id, title);
        self.run(outcome).await
    }

    pub async fn delete_task(&self, task_id: TaskId) -> MutationReport {
        let outcome = self.coordinator().delete_task(task_id);
        self.run(outcome).await
    }

    /// Create a task at the end of `column_id`. Not optimistic: the id comes
    /// from the server, so the board is refreshed afterwards. `Ok(None)` when
    /// the column is unknown or has no room left; nothing is sent then.
    pub async fn create_task(&self, column_id: ColumnId, title: &str) -> Result<Option<Task>, PersistenceError> {
        let Some(position) = self.coordinator().append_position(column_id) else {
            log::debug!(target: "taskboard.session", "Column {} cannot take new tasks", column_id);
            return Ok(None);
        };
        let request = NewTask {
            column_id,
            title: title.to_string(),
            position,
        };
        let created = self.store.create_task(&self.context, &request).await?;
        log::info!(target: "taskboard.session", "Created task {} in column {}", created.id, column_id);
        if let Err(e) = self.refresh().await {
            log::warn!(target: "taskboard.session", "Refresh after create failed: {}", e);
        }
        Ok(Some(created))
    }

    /// Fetch the board and reconcile. `Ok(None)` when the listing turned out
    /// to be outdated by the time it arrived.
    pub async fn refresh(&self) -> Result<Option<ReconcileReport>, PersistenceError> {
        let ticket = self.coordinator().begin_fetch();
        let listing = self.store.fetch_board(&self.context).await?;
        Ok(self.adopt(ticket, listing))
    }

    fn adopt(&self, ticket: FetchTicket, listing: BoardListing) -> Option<ReconcileReport> {
        let report = self
            .coordinator()
            .reconcile(ticket, BoardSnapshot::from_listing(listing))?;
        if !report.conflicts.is_empty() {
            self.emit(BoardEvent::SnapshotChanged {
                version: report.version,
            });
        }
        self.emit(BoardEvent::Reconciled {
            version: report.version,
            conflicts: report.conflicts.len(),
        });
        Some(report)
    }

    async fn run(&self, outcome: MutationOutcome) -> MutationReport {
        let ticket = match outcome {
            MutationOutcome::Applied(ticket) => ticket,
            MutationOutcome::Coalesced { .. } => return MutationReport::Coalesced,
            MutationOutcome::Unchanged => return MutationReport::Unchanged,
            MutationOutcome::Discarded => return MutationReport::Discarded,
        };
        let version = self.coordinator().version();
        self.emit(BoardEvent::SnapshotChanged { version });

        let report = match self.persist(&ticket).await {
            Ok(outcome) => {
                let settlement = self.coordinator().settle(&ticket, true);
                match (settlement, outcome) {
                    (Settlement::Stale, _) => MutationReport::Stale,
                    (_, PersistOutcome::Authoritative(listing)) => {
                        let fetch = self.coordinator().begin_fetch();
                        self.adopt(fetch, listing);
                        return MutationReport::Confirmed;
                    }
                    (_, PersistOutcome::Accepted) => MutationReport::Confirmed,
                }
            }
            Err(e) => {
                let settlement = self.coordinator().settle(&ticket, false);
                if settlement == Settlement::Stale {
                    MutationReport::Stale
                } else {
                    log::warn!(
                        target: "taskboard.session",
                        "{} failed, rolled back: {}",
                        ticket.request.describe(),
                        e
                    );
                    let version = self.coordinator().version();
                    self.emit(BoardEvent::SnapshotChanged { version });
                    self.emit(BoardEvent::MutationFailed {
                        task_id: ticket.task_id,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    MutationReport::RolledBack(e)
                }
            }
        };

        // Stale responses re-sync too.
        if self.config.reconcile == ReconcilePolicy::Refetch {
            if let Err(e) = self.refresh().await {
                log::warn!(target: "taskboard.session", "Re-sync after settle failed: {}", e);
            }
        }
        report
    }

    /// Send the ticket's request, retrying transient failures while the
    /// mutation is still the current one for its task.
    async fn persist(&self, ticket: &Ticket) -> Result<PersistOutcome, PersistenceError> {
        let mut attempt = 0;
        loop {
            let result = self.store.persist(&self.context, &ticket.request).await;
            match result {
                Err(e) if e.is_transient() && attempt < self.config.transient_retries => {
                    if !self.coordinator().is_pending(ticket) {
                        return Err(e);
                    }
                    attempt += 1;
                    log::warn!(
                        target: "taskboard.session",
                        "{} failed ({}), retry {}/{}",
                        ticket.request.describe(),
                        e,
                        attempt,
                        self.config.transient_retries
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                other => return other,
            }
        }
    }
}
