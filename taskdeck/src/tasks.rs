use crate::client::ApiClient;
use crate::error::ClientError;
use crate::http::Transport;
use crate::store::TokenStore;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Completion state of a task. The server defaults new tasks to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    /// The opposite state, for toggle-style updates.
    pub fn toggled(self) -> TaskStatus {
        match self {
            TaskStatus::Pending => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Pending,
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "done" => Ok(TaskStatus::Done),
            _ => Err(anyhow!("unknown task status: {}", s)),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

/// A titled to-do item. Identity is server-issued; the client never makes
/// up ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
}

/// Partial update body for `PUT /api/tasks/{id}`; absent fields are left
/// untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.status.is_none()
    }
}

/// Local cache of the server's task list, plus request status flags.
///
/// The list is only mutated in response to confirmed server responses,
/// never optimistically. Order is server response order; no client-side
/// sort, no dedup beyond server id uniqueness.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    loading: bool,
    error: Option<String>,
}

impl TaskStore {
    pub fn new() -> TaskStore {
        TaskStore::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn find(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Replaces the local list with the server's. The only operation that
    /// drives the loading flag.
    pub fn fetch_all<T: Transport, S: TokenStore>(
        &mut self,
        client: &mut ApiClient<T, S>,
    ) -> Result<(), ClientError> {
        self.loading = true;
        self.error = None;
        let result = client
            .get("/api/tasks/")
            .and_then(|body| Ok(serde_json::from_value(body.unwrap_or(Value::Null))?));
        self.loading = false;
        match result {
            Ok(tasks) => {
                self.tasks = tasks;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.message_or("Failed to fetch tasks"));
                Err(err)
            }
        }
    }

    /// Fetches a single task without touching the local collection; the
    /// server stays the source of truth for anything not listed yet.
    pub fn get<T: Transport, S: TokenStore>(
        &mut self,
        client: &mut ApiClient<T, S>,
        id: i64,
    ) -> Result<Task, ClientError> {
        self.error = None;
        match client
            .get(&format!("/api/tasks/{}", id))
            .and_then(decode_task)
        {
            Ok(task) => Ok(task),
            Err(err) => {
                self.error = Some(err.message_or("Failed to fetch task"));
                Err(err)
            }
        }
    }

    /// Creates a task and appends the server-returned row to the list.
    pub fn add<T: Transport, S: TokenStore>(
        &mut self,
        client: &mut ApiClient<T, S>,
        title: &str,
    ) -> Result<Task, ClientError> {
        self.error = None;
        match client
            .post("/api/tasks/", json!({ "title": title }))
            .and_then(decode_task)
        {
            Ok(task) => {
                self.tasks.push(task.clone());
                Ok(task)
            }
            Err(err) => {
                self.error = Some(err.message_or("Failed to add task"));
                Err(err)
            }
        }
    }

    /// Updates a task and replaces the matching element by id. If the id is
    /// not held locally the list is left alone.
    pub fn update<T: Transport, S: TokenStore>(
        &mut self,
        client: &mut ApiClient<T, S>,
        id: i64,
        patch: &TaskPatch,
    ) -> Result<Task, ClientError> {
        self.error = None;
        let body = serde_json::to_value(patch)?;
        match client
            .put(&format!("/api/tasks/{}", id), body)
            .and_then(decode_task)
        {
            Ok(task) => {
                if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
                    *slot = task.clone();
                }
                Ok(task)
            }
            Err(err) => {
                self.error = Some(err.message_or("Failed to update task"));
                Err(err)
            }
        }
    }

    /// Deletes a task and filters it out of the list.
    pub fn remove<T: Transport, S: TokenStore>(
        &mut self,
        client: &mut ApiClient<T, S>,
        id: i64,
    ) -> Result<(), ClientError> {
        self.error = None;
        match client.delete(&format!("/api/tasks/{}", id)) {
            Ok(_) => {
                self.tasks.retain(|task| task.id != id);
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.message_or("Failed to delete task"));
                Err(err)
            }
        }
    }

    /// Convenience: issues an update flipping the task between pending and
    /// done. The current status comes from the local list, so fetch first.
    pub fn toggle<T: Transport, S: TokenStore>(
        &mut self,
        client: &mut ApiClient<T, S>,
        id: i64,
    ) -> Result<Task, ClientError> {
        let status = match self.find(id) {
            Some(task) => task.status.toggled(),
            None => {
                let err = ClientError::UnknownTask(id);
                self.error = Some(err.to_string());
                return Err(err);
            }
        };
        self.update(
            client,
            id,
            &TaskPatch {
                title: None,
                status: Some(status),
            },
        )
    }
}

fn decode_task(body: Option<Value>) -> Result<Task, ClientError> {
    Ok(serde_json::from_value(body.unwrap_or(Value::Null))?)
}

#[cfg(test)]
use crate::http::{ApiResponse, FakeTransport};
#[cfg(test)]
use crate::session::SessionManager;
#[cfg(test)]
use crate::store::MemTokenStore;

#[cfg(test)]
fn task_client(
    responses: Vec<Result<ApiResponse, ClientError>>,
) -> ApiClient<FakeTransport, MemTokenStore> {
    ApiClient::new(
        FakeTransport::new(responses),
        SessionManager::new(MemTokenStore::with_tokens("a1", "r1")),
    )
}

#[cfg(test)]
fn task_json(id: i64, title: &str, status: &str) -> Value {
    json!({ "id": id, "title": title, "status": status })
}

#[test]
fn test_status_parse_and_display() {
    assert_eq!(TaskStatus::from_str("pending").unwrap(), TaskStatus::Pending);
    assert_eq!(TaskStatus::from_str("done").unwrap(), TaskStatus::Done);
    assert!(TaskStatus::from_str("finished").is_err());
    assert!(TaskStatus::from_str("").is_err());
    assert_eq!(TaskStatus::Pending.to_string(), "pending");
    assert_eq!(TaskStatus::Done.to_string(), "done");
    assert_eq!(TaskStatus::Pending.toggled(), TaskStatus::Done);
    assert_eq!(TaskStatus::Done.toggled(), TaskStatus::Pending);
}

#[test]
fn test_patch_serialization_skips_absent_fields() {
    let patch = TaskPatch {
        title: None,
        status: Some(TaskStatus::Done),
    };
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!({ "status": "done" })
    );

    let patch = TaskPatch {
        title: Some("New title".to_string()),
        status: None,
    };
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!({ "title": "New title" })
    );

    assert!(TaskPatch::default().is_empty());
}

#[test]
fn test_fetch_all_replaces_list() {
    let mut client = task_client(vec![
        FakeTransport::reply(200, json!([task_json(1, "A", "pending")])),
        FakeTransport::reply(
            200,
            json!([task_json(2, "B", "done"), task_json(3, "C", "pending")]),
        ),
    ]);
    let mut store = TaskStore::new();

    store.fetch_all(&mut client).unwrap();
    assert_eq!(store.tasks().len(), 1);
    assert!(!store.is_loading());
    assert_eq!(store.error(), None);

    // a second fetch replaces, not appends
    store.fetch_all(&mut client).unwrap();
    let ids: Vec<i64> = store.tasks().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_fetch_all_failure_keeps_prior_list() {
    let mut client = task_client(vec![
        FakeTransport::reply(200, json!([task_json(1, "A", "pending")])),
        FakeTransport::reply(500, json!({ "error": "database down" })),
    ]);
    let mut store = TaskStore::new();
    store.fetch_all(&mut client).unwrap();

    assert!(store.fetch_all(&mut client).is_err());
    assert_eq!(store.tasks().len(), 1);
    assert!(!store.is_loading());
    assert_eq!(store.error(), Some("database down"));
}

#[test]
fn test_fetch_all_failure_generic_fallback() {
    let mut client = task_client(vec![FakeTransport::reply_empty(502)]);
    let mut store = TaskStore::new();
    assert!(store.fetch_all(&mut client).is_err());
    assert_eq!(store.error(), Some("Failed to fetch tasks"));
}

#[test]
fn test_add_then_fetch_round_trip() {
    let created = task_json(1, "Buy milk", "pending");
    let mut client = task_client(vec![
        FakeTransport::reply(201, created.clone()),
        FakeTransport::reply(200, json!([created])),
    ]);
    let mut store = TaskStore::new();

    let task = store.add(&mut client, "Buy milk").unwrap();
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(store.tasks().len(), 1);

    store.fetch_all(&mut client).unwrap();
    assert!(store
        .tasks()
        .iter()
        .any(|t| t.title == "Buy milk" && t.status == TaskStatus::Pending));

    let requests = client_requests(&client);
    assert_eq!(requests[0].1, Some(json!({ "title": "Buy milk" })));
}

#[test]
fn test_add_failure_leaves_list_alone() {
    let mut client = task_client(vec![FakeTransport::reply(
        422,
        json!({ "error": "Title too short" }),
    )]);
    let mut store = TaskStore::new();
    assert!(store.add(&mut client, "ab").is_err());
    assert!(store.tasks().is_empty());
    assert_eq!(store.error(), Some("Title too short"));
}

#[test]
fn test_update_replaces_only_matching_task() {
    let mut client = task_client(vec![
        FakeTransport::reply(
            200,
            json!([task_json(1, "A", "pending"), task_json(2, "B", "done")]),
        ),
        FakeTransport::reply(200, task_json(1, "A", "done")),
    ]);
    let mut store = TaskStore::new();
    store.fetch_all(&mut client).unwrap();

    let patch = TaskPatch {
        title: None,
        status: Some(TaskStatus::Done),
    };
    let task = store.update(&mut client, 1, &patch).unwrap();
    assert_eq!(task.id, 1);
    assert_eq!(task.title, "A");

    assert_eq!(
        store.tasks(),
        &[
            Task {
                id: 1,
                title: "A".to_string(),
                status: TaskStatus::Done
            },
            Task {
                id: 2,
                title: "B".to_string(),
                status: TaskStatus::Done
            },
        ]
    );
}

#[test]
fn test_update_unknown_id_leaves_collection_and_sets_error() {
    let mut client = task_client(vec![
        FakeTransport::reply(200, json!([task_json(1, "A", "pending")])),
        FakeTransport::reply(404, json!({ "error": "Task not found" })),
    ]);
    let mut store = TaskStore::new();
    store.fetch_all(&mut client).unwrap();

    let patch = TaskPatch {
        title: Some("New".to_string()),
        status: None,
    };
    assert!(store.update(&mut client, 99, &patch).is_err());
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].title, "A");
    assert_eq!(store.error(), Some("Task not found"));
}

#[test]
fn test_remove_filters_exactly_one_id() {
    // duplicate titles: deletion must go by id, not title
    let mut client = task_client(vec![
        FakeTransport::reply(
            200,
            json!([
                task_json(1, "Buy milk", "pending"),
                task_json(2, "Buy milk", "pending"),
            ]),
        ),
        FakeTransport::reply_empty(204),
    ]);
    let mut store = TaskStore::new();
    store.fetch_all(&mut client).unwrap();

    store.remove(&mut client, 1).unwrap();
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].id, 2);
}

#[test]
fn test_remove_failure_keeps_task() {
    let mut client = task_client(vec![
        FakeTransport::reply(200, json!([task_json(1, "A", "pending")])),
        FakeTransport::reply(404, json!({ "error": "Task not found" })),
    ]);
    let mut store = TaskStore::new();
    store.fetch_all(&mut client).unwrap();

    assert!(store.remove(&mut client, 1).is_err());
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.error(), Some("Task not found"));
}

#[test]
fn test_toggle_flips_pending_task_to_done() {
    let mut client = task_client(vec![
        FakeTransport::reply(
            200,
            json!([task_json(1, "A", "pending"), task_json(2, "B", "done")]),
        ),
        FakeTransport::reply(200, task_json(1, "A", "done")),
    ]);
    let mut store = TaskStore::new();
    store.fetch_all(&mut client).unwrap();

    store.toggle(&mut client, 1).unwrap();

    // the toggle issued a status-only update derived from the local state
    let requests = client_requests(&client);
    assert_eq!(requests[1].0, "/api/tasks/1");
    assert_eq!(requests[1].1, Some(json!({ "status": "done" })));

    let statuses: Vec<TaskStatus> = store.tasks().iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Done, TaskStatus::Done]);
}

#[test]
fn test_toggle_unknown_id_issues_no_request() {
    let mut client = task_client(vec![]);
    let mut store = TaskStore::new();
    let err = store.toggle(&mut client, 42).unwrap_err();
    assert!(matches!(err, ClientError::UnknownTask(42)));
    assert_eq!(store.error(), Some("unknown task id: 42"));
}

#[test]
fn test_get_does_not_touch_collection() {
    let mut client = task_client(vec![FakeTransport::reply(200, task_json(5, "E", "done"))]);
    let mut store = TaskStore::new();
    let task = store.get(&mut client, 5).unwrap();
    assert_eq!(task.id, 5);
    assert!(store.tasks().is_empty());
}

#[test]
fn test_get_failure_sets_error() {
    let mut client = task_client(vec![FakeTransport::reply_empty(500)]);
    let mut store = TaskStore::new();
    assert!(store.get(&mut client, 5).is_err());
    assert_eq!(store.error(), Some("Failed to fetch task"));
}

/// (path, body) pairs of every request the fake transport saw.
#[cfg(test)]
fn client_requests(
    client: &ApiClient<FakeTransport, MemTokenStore>,
) -> Vec<(String, Option<Value>)> {
    client
        .transport_ref()
        .requests
        .borrow()
        .iter()
        .map(|r| (r.path.clone(), r.body.clone()))
        .collect()
}
