//! Reorder engine for a client-side task board.
//!
//! Tasks live in columns and are ordered by sparse numeric positions. A drag
//! gesture is resolved to a column and insertion index, a new position is
//! allocated without renumbering neighbours, and the move is applied to the
//! local snapshot optimistically while the remote store is updated. Failed
//! requests roll back only their own change.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod position;
pub mod remote;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod types;

pub use config::{EngineConfig, ReconcilePolicy};
pub use coordinator::{MutationCoordinator, MutationOutcome, Settlement};
pub use error::{FailureKind, PersistenceError};
pub use position::{Allocation, PositionAllocator};
pub use remote::{RemoteStore, RequestContext};
pub use resolver::{DropTarget, GestureEnd};
pub use session::{BoardEvent, BoardSession, MutationReport};
pub use snapshot::BoardSnapshot;
pub use types::{BoardListing, Column, ColumnId, Priority, Task, TaskId};
