/// HTTP implementation of the remote store.
///
/// REST routes consumed:
///
///   GET    /api/board                  -> { columns, tasks }
///   POST   /api/tasks                  -> create task (body: columnId, title, position)
///   PATCH  /api/tasks/{id}             -> edit title
///   DELETE /api/tasks/{id}             -> delete task
///   PATCH  /api/tasks/{id}/reorder     -> move (body: taskId, destinationColumnId, newPosition)
///   PUT    /api/columns/{id}/order     -> compacting rewrite of one column
///
/// Mutation responses are either empty or the full board listing.
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use taskboard_core::remote::{NewTask, PersistOutcome, RemoteMutation, RemoteStore, RequestContext};
use taskboard_core::{BoardListing, PersistenceError, Task};

use crate::config::ClientConfig;

pub struct HttpTaskStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(builder: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
        match ctx.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, ctx: &RequestContext) -> Result<Response, PersistenceError> {
        let response = Self::authorize(builder, ctx).send().await.map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let error = PersistenceError::from_status(status.as_u16(), body);
        if status.is_server_error() {
            log::error!(target: "taskboard.http", "Request failed: {}", error);
        } else {
            log::warn!(target: "taskboard.http", "Request failed: {}", error);
        }
        Err(error)
    }
}

fn transport(e: reqwest::Error) -> PersistenceError {
    if e.is_decode() {
        PersistenceError::Decode(e.to_string())
    } else {
        PersistenceError::Transient(e.to_string())
    }
}

impl RemoteStore for HttpTaskStore {
    async fn fetch_board(&self, ctx: &RequestContext) -> Result<BoardListing, PersistenceError> {
        let response = self.send(self.client.get(self.url("/api/board")), ctx).await?;
        let listing: BoardListing = response.json().await.map_err(transport)?;
        log::debug!(
            target: "taskboard.http",
            "Fetched board: {} columns, {} tasks",
            listing.columns.len(),
            listing.tasks.len()
        );
        Ok(listing)
    }

    async fn persist(&self, ctx: &RequestContext, mutation: &RemoteMutation) -> Result<PersistOutcome, PersistenceError> {
        let builder = match mutation {
            RemoteMutation::Move(m) => self
                .client
                .patch(self.url(&format!("/api/tasks/{}/reorder", m.task_id)))
                .json(m),
            RemoteMutation::Rebalance(r) => self
                .client
                .put(self.url(&format!("/api/columns/{}/order", r.column_id)))
                .json(r),
            RemoteMutation::EditTitle { task_id, title } => self
                .client
                .patch(self.url(&format!("/api/tasks/{}", task_id)))
                .json(&serde_json::json!({ "title": title })),
            RemoteMutation::Delete { task_id } => {
                self.client.delete(self.url(&format!("/api/tasks/{}", task_id)))
            }
        };
        log::debug!(target: "taskboard.http", "Sending {}", mutation.describe());

        let response = self.send(builder, ctx).await?;
        let body = response.bytes().await.map_err(transport)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(PersistOutcome::Accepted);
        }
        match serde_json::from_slice::<BoardListing>(&body) {
            Ok(listing) => Ok(PersistOutcome::Authoritative(listing)),
            Err(e) => {
                log::debug!(
                    target: "taskboard.http",
                    "Response to {} is not a board listing ({}), ignoring body",
                    mutation.describe(),
                    e
                );
                Ok(PersistOutcome::Accepted)
            }
        }
    }

    async fn create_task(&self, ctx: &RequestContext, task: &NewTask) -> Result<Task, PersistenceError> {
        let response = self
            .send(self.client.post(self.url("/api/tasks")).json(task), ctx)
            .await?;
        response.json().await.map_err(transport)
    }
}
