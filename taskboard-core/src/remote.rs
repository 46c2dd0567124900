/// The remote store seam.
///
/// The engine owns position assignment: every request carries the exact
/// key the client computed and the server is expected to store it as-is.
/// Insertion indices never go over the wire.
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::types::{BoardListing, ColumnId, Task, TaskId};

/// Credentials for one request, passed explicitly instead of being read from
/// ambient storage.
#[derive(Clone, Default)]
pub struct RequestContext {
    bearer_token: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub task_id: TaskId,
    pub destination_column_id: ColumnId,
    pub new_position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub task_id: TaskId,
    pub position: f64,
}

/// Compacting rewrite of one column. Every task listed ends up in
/// `column_id` at the given position, which lets a move and the compaction
/// of its destination travel as one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    pub column_id: ColumnId,
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteMutation {
    Move(MoveRequest),
    Rebalance(RebalanceRequest),
    EditTitle { task_id: TaskId, title: String },
    Delete { task_id: TaskId },
}

impl RemoteMutation {
    pub fn describe(&self) -> String {
        match self {
            RemoteMutation::Move(m) => format!(
                "move task {} to column {} at {}",
                m.task_id, m.destination_column_id, m.new_position
            ),
            RemoteMutation::Rebalance(r) => format!(
                "rebalance column {} ({} tasks)",
                r.column_id,
                r.placements.len()
            ),
            RemoteMutation::EditTitle { task_id, .. } => format!("rename task {}", task_id),
            RemoteMutation::Delete { task_id } => format!("delete task {}", task_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub column_id: ColumnId,
    pub title: String,
    pub position: f64,
}

/// Successful answer to a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    /// Accepted without a body; the client's own order stands until the
    /// next fetch.
    Accepted,
    /// Accepted, and the server sent the resulting board.
    Authoritative(BoardListing),
}

pub trait RemoteStore {
    fn fetch_board(
        &self,
        ctx: &RequestContext,
    ) -> impl Future<Output = Result<BoardListing, PersistenceError>> + Send;

    fn persist(
        &self,
        ctx: &RequestContext,
        mutation: &RemoteMutation,
    ) -> impl Future<Output = Result<PersistOutcome, PersistenceError>> + Send;

    fn create_task(
        &self,
        ctx: &RequestContext,
        task: &NewTask,
    ) -> impl Future<Output = Result<Task, PersistenceError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let ctx = RequestContext::with_bearer("secret-token");
        let printed = format!("{:?}", ctx);
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("redacted"));
        assert_eq!(ctx.bearer_token(), Some("secret-token"));
        assert_eq!(RequestContext::anonymous().bearer_token(), None);
    }

    #[test]
    fn test_move_request_wire_shape() {
        let req = MoveRequest {
            task_id: 2,
            destination_column_id: 3,
            new_position: 1000.0,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["taskId"], 2);
        assert_eq!(json["destinationColumnId"], 3);
        assert_eq!(json["newPosition"], 1000.0);
        assert!(json.get("insertionIndex").is_none());
    }
}
