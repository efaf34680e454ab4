use crate::error::Result;
use crate::http::{ApiRequest, HttpTransport, Method, Transport};
use crate::session::{Session, SessionManager};
use crate::store::{FsTokenStore, TokenStore};
use log::debug;
use serde_json::Value;
use std::path::PathBuf;

/// Task-API client: wraps every request with bearer-credential injection
/// and a single refresh-and-retry on authorization failure.
pub struct ApiClient<T: Transport, S: TokenStore> {
    transport: T,
    session: SessionManager<S>,
}

impl ApiClient<HttpTransport, FsTokenStore> {
    /// The standard client: blocking HTTP transport plus a session file on
    /// disk.
    pub fn connect(host: &str, session_file: PathBuf) -> Result<Self> {
        let transport = HttpTransport::new(host.to_string())?;
        let session = SessionManager::new(FsTokenStore::new(session_file));
        Ok(ApiClient::new(transport, session))
    }
}

impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    pub fn new(transport: T, session: SessionManager<S>) -> Self {
        ApiClient { transport, session }
    }

    pub fn session(&self) -> &Session {
        self.session.session()
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.session.login(&self.transport, username, password)
    }

    pub fn register(&mut self, username: &str, password: &str) -> Result<String> {
        self.session.register(&self.transport, username, password)
    }

    pub fn logout(&mut self) {
        self.session.logout()
    }

    pub fn reset_error(&mut self) {
        self.session.reset_error()
    }

    /// Issues a request with the current access token attached. On a 401
    /// response the session is refreshed exactly once and the original
    /// request re-sent once with the new token; the retried response is
    /// taken verbatim, so a second 401 maps to an error rather than another
    /// refresh. Refresh failure propagates (the session is already forced
    /// to unauthenticated by then). Any other failure propagates unchanged.
    pub fn execute(&mut self, method: Method, path: &str, body: Option<Value>) -> Result<Option<Value>> {
        let mut request = ApiRequest {
            method,
            path: path.to_string(),
            body,
            token: self.session.access_token().map(|t| t.to_string()),
        };
        let response = self.transport.send(&request)?;
        let response = if response.status == 401 {
            debug!("access token rejected for {}, refreshing session", path);
            self.session.refresh(&self.transport)?;
            request.token = self.session.access_token().map(|t| t.to_string());
            self.transport.send(&request)?
        } else {
            response
        };
        response.into_result()
    }

    pub fn get(&mut self, path: &str) -> Result<Option<Value>> {
        self.execute(Method::Get, path, None)
    }

    pub fn post(&mut self, path: &str, body: Value) -> Result<Option<Value>> {
        self.execute(Method::Post, path, Some(body))
    }

    pub fn put(&mut self, path: &str, body: Value) -> Result<Option<Value>> {
        self.execute(Method::Put, path, Some(body))
    }

    pub fn delete(&mut self, path: &str) -> Result<Option<Value>> {
        self.execute(Method::Delete, path, None)
    }
}

#[cfg(test)]
impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
use crate::http::{ApiResponse, FakeTransport};
#[cfg(test)]
use crate::store::MemTokenStore;

#[cfg(test)]
fn client_with(
    responses: Vec<Result<ApiResponse>>,
    store: MemTokenStore,
) -> ApiClient<FakeTransport, MemTokenStore> {
    ApiClient::new(FakeTransport::new(responses), SessionManager::new(store))
}

#[test]
fn test_plain_success_attaches_token() {
    use serde_json::json;

    let mut client = client_with(
        vec![FakeTransport::reply(200, json!([{"id": 1, "title": "A", "status": "pending"}]))],
        MemTokenStore::with_tokens("a1", "r1"),
    );
    let body = client.get("/api/tasks/").unwrap();
    assert!(body.unwrap().is_array());

    let requests = client.transport.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].token.as_deref(), Some("a1"));
}

#[test]
fn test_request_without_token() {
    use serde_json::json;

    let mut client = client_with(
        vec![FakeTransport::reply(200, json!([]))],
        MemTokenStore::new(),
    );
    client.get("/api/tasks/").unwrap();
    assert_eq!(client.transport.requests.borrow()[0].token, None);
}

#[test]
fn test_refresh_and_retry_once() {
    use serde_json::json;

    let final_body = json!({"id": 2, "title": "B", "status": "done"});
    let mut client = client_with(
        vec![
            FakeTransport::reply(401, json!({"error": "Token expired"})),
            FakeTransport::reply(200, json!({"access_token": "a2", "refresh_token": "r2"})),
            FakeTransport::reply(200, final_body.clone()),
        ],
        MemTokenStore::with_tokens("a1", "r1"),
    );

    let body = client.get("/api/tasks/2").unwrap();
    assert_eq!(body, Some(final_body));

    let requests = client.transport.requests.borrow();
    assert_eq!(requests.len(), 3);
    // original attempt with the stale token
    assert_eq!(requests[0].path, "/api/tasks/2");
    assert_eq!(requests[0].token.as_deref(), Some("a1"));
    // exactly one refresh call
    assert_eq!(requests[1].path, "/api/auth/refresh-token");
    assert_eq!(requests[1].body, Some(json!({"refresh_token": "r1"})));
    // exactly one retry, carrying the new token
    assert_eq!(requests[2].path, "/api/tasks/2");
    assert_eq!(requests[2].token.as_deref(), Some("a2"));

    assert_eq!(client.session().access_token.as_deref(), Some("a2"));
}

#[test]
fn test_second_401_does_not_loop() {
    use serde_json::json;

    let mut client = client_with(
        vec![
            FakeTransport::reply(401, json!({"error": "Token expired"})),
            FakeTransport::reply(200, json!({"access_token": "a2", "refresh_token": "r2"})),
            FakeTransport::reply(401, json!({"error": "Still not allowed"})),
        ],
        MemTokenStore::with_tokens("a1", "r1"),
    );

    let err = client.get("/api/tasks/").unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.message_or("x"), "Still not allowed");
    // one refresh, one retry, nothing more
    assert_eq!(client.transport.request_count(), 3);
}

#[test]
fn test_refresh_failure_propagates_and_logs_out() {
    use serde_json::json;

    let mut client = client_with(
        vec![
            FakeTransport::reply(401, json!({"error": "Token expired"})),
            FakeTransport::reply(401, json!({"error": "Refresh token expired"})),
        ],
        MemTokenStore::with_tokens("a1", "r1"),
    );

    let err = client.get("/api/tasks/").unwrap_err();
    assert_eq!(err.message_or("x"), "Refresh token expired");
    assert_eq!(client.transport.request_count(), 2);

    let session = client.session();
    assert!(!session.is_authenticated);
    assert_eq!(session.access_token, None);
    assert_eq!(session.error.as_deref(), Some("Refresh token expired"));
}

#[test]
fn test_non_401_failure_does_not_refresh() {
    use serde_json::json;

    let mut client = client_with(
        vec![FakeTransport::reply(500, json!({"error": "boom"}))],
        MemTokenStore::with_tokens("a1", "r1"),
    );

    let err = client.get("/api/tasks/").unwrap_err();
    assert!(!err.is_unauthorized());
    assert_eq!(client.transport.request_count(), 1);
    // session untouched
    assert!(client.session().is_authenticated);
}
