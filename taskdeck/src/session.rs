use crate::error::{ClientError, Result};
use crate::http::{ApiRequest, Method, Transport};
use crate::store::{TokenPair, TokenStore};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

/// Snapshot of authentication state. Read-only outside this module; all
/// mutation goes through `SessionManager`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub is_authenticated: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Wire shape of the login and refresh responses.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    message: String,
}

/// Owns authentication state and the durable token store.
///
/// Login and refresh persist the token pair on acquisition; logout and a
/// failed refresh erase it.
pub struct SessionManager<S: TokenStore> {
    session: Session,
    store: S,
}

impl<S: TokenStore> SessionManager<S> {
    /// Builds the initial session from whatever the durable store holds.
    pub fn new(store: S) -> Self {
        let session = match store.load() {
            Some(tokens) => Session {
                is_authenticated: true,
                access_token: Some(tokens.access_token),
                refresh_token: Some(tokens.refresh_token),
                ..Session::default()
            },
            None => Session::default(),
        };
        SessionManager { session, store }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.access_token.as_deref()
    }

    /// Exchanges credentials for a token pair. On success the pair is
    /// persisted and the session becomes authenticated; on failure `error`
    /// records the server message (or a generic fallback) and the
    /// authenticated flag is left unchanged.
    pub fn login<T: Transport>(
        &mut self,
        transport: &T,
        username: &str,
        password: &str,
    ) -> Result<()> {
        self.session.loading = true;
        self.session.error = None;
        let result = self
            .request_tokens(
                transport,
                "/api/auth/login",
                json!({ "username": username, "password": password }),
            )
            .and_then(|tokens| self.commit_tokens(tokens));
        self.session.loading = false;
        match result {
            Ok(()) => {
                self.session.is_authenticated = true;
                info!("logged in as {}", username);
                Ok(())
            }
            Err(err) => {
                self.session.error = Some(err.message_or("Login failed"));
                Err(err)
            }
        }
    }

    /// Creates an account. Does not authenticate; the returned server
    /// message tells the caller to go log in.
    pub fn register<T: Transport>(
        &mut self,
        transport: &T,
        username: &str,
        password: &str,
    ) -> Result<String> {
        self.session.loading = true;
        self.session.error = None;
        let result = self.post_register(transport, username, password);
        self.session.loading = false;
        if let Err(ref err) = result {
            self.session.error = Some(err.message_or("Registration failed"));
        }
        result
    }

    /// Trades the refresh token for a fresh pair. Failure here is terminal:
    /// the session is forced to unauthenticated and the caller must log in
    /// again. No retry.
    pub fn refresh<T: Transport>(&mut self, transport: &T) -> Result<()> {
        let result = match self.session.refresh_token.clone() {
            Some(refresh_token) => self
                .request_tokens(
                    transport,
                    "/api/auth/refresh-token",
                    json!({ "refresh_token": refresh_token }),
                )
                .and_then(|tokens| self.commit_tokens(tokens)),
            None => Err(ClientError::Status {
                status: 401,
                message: None,
            }),
        };
        if let Err(ref err) = result {
            let message = err.message_or("Token refresh failed");
            self.force_logout();
            self.session.error = Some(message);
        }
        result
    }

    /// Clears tokens from durable storage and resets the session. No
    /// network call; calling it while already logged out is a no-op.
    pub fn logout(&mut self) {
        self.force_logout();
    }

    /// Clears the error field without other side effects.
    pub fn reset_error(&mut self) {
        self.session.error = None;
    }

    fn force_logout(&mut self) {
        if let Err(err) = self.store.clear() {
            warn!("failed to clear stored tokens: {}", err);
        }
        self.session.is_authenticated = false;
        self.session.access_token = None;
        self.session.refresh_token = None;
    }

    fn commit_tokens(&mut self, tokens: TokenPair) -> Result<()> {
        self.store.save(&tokens)?;
        self.session.access_token = Some(tokens.access_token);
        self.session.refresh_token = Some(tokens.refresh_token);
        Ok(())
    }

    fn request_tokens<T: Transport>(
        &self,
        transport: &T,
        path: &str,
        body: Value,
    ) -> Result<TokenPair> {
        let response = transport.send(&ApiRequest {
            method: Method::Post,
            path: path.to_string(),
            body: Some(body),
            token: None,
        })?;
        let value = response.into_result()?.unwrap_or(Value::Null);
        let parsed: TokenResponse = serde_json::from_value(value)?;
        Ok(TokenPair {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
        })
    }

    fn post_register<T: Transport>(
        &self,
        transport: &T,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let response = transport.send(&ApiRequest {
            method: Method::Post,
            path: "/api/auth/register".to_string(),
            body: Some(json!({ "username": username, "password": password })),
            token: None,
        })?;
        let value = response.into_result()?.unwrap_or(Value::Null);
        let parsed: RegisterResponse = serde_json::from_value(value)?;
        Ok(parsed.message)
    }
}

#[cfg(test)]
use crate::http::FakeTransport;
#[cfg(test)]
use crate::store::MemTokenStore;

#[cfg(test)]
fn token_body(access: &str, refresh: &str) -> Value {
    json!({ "access_token": access, "refresh_token": refresh })
}

#[test]
fn test_initial_session_from_store() {
    let manager = SessionManager::new(MemTokenStore::new());
    assert_eq!(manager.session(), &Session::default());
    assert!(!manager.session().is_authenticated);

    let manager = SessionManager::new(MemTokenStore::with_tokens("a1", "r1"));
    let session = manager.session();
    assert!(session.is_authenticated);
    assert_eq!(session.access_token.as_deref(), Some("a1"));
    assert_eq!(session.refresh_token.as_deref(), Some("r1"));
}

#[test]
fn test_login_success() {
    let transport = FakeTransport::new(vec![FakeTransport::reply(200, token_body("a1", "r1"))]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    manager.login(&transport, "alice", "hunter2A!").unwrap();

    let session = manager.session();
    assert!(session.is_authenticated);
    assert!(!session.loading);
    assert_eq!(session.error, None);
    assert_eq!(session.access_token.as_deref(), Some("a1"));
    assert_eq!(session.refresh_token.as_deref(), Some("r1"));

    let requests = transport.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/auth/login");
    assert_eq!(requests[0].token, None);
    assert_eq!(
        requests[0].body,
        Some(json!({ "username": "alice", "password": "hunter2A!" }))
    );
}

#[test]
fn test_login_persists_tokens_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let transport = FakeTransport::new(vec![FakeTransport::reply(200, token_body("a1", "r1"))]);
    let mut manager = SessionManager::new(crate::store::FsTokenStore::new(path.clone()));
    manager.login(&transport, "alice", "pw").unwrap();
    drop(manager);

    // a new process sees the stored pair and starts out authenticated
    let manager = SessionManager::new(crate::store::FsTokenStore::new(path));
    assert!(manager.session().is_authenticated);
    assert_eq!(manager.access_token(), Some("a1"));
}

#[test]
fn test_login_failure_records_server_message() {
    let transport = FakeTransport::new(vec![FakeTransport::reply(
        401,
        json!({ "error": "Invalid credentials" }),
    )]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    assert!(manager.login(&transport, "alice", "wrong").is_err());

    let session = manager.session();
    assert!(!session.is_authenticated);
    assert!(!session.loading);
    assert_eq!(session.error.as_deref(), Some("Invalid credentials"));
    assert_eq!(session.access_token, None);
}

#[test]
fn test_login_failure_generic_fallback() {
    let transport = FakeTransport::new(vec![FakeTransport::reply_empty(500)]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    assert!(manager.login(&transport, "alice", "pw").is_err());
    assert_eq!(manager.session().error.as_deref(), Some("Login failed"));
}

#[test]
fn test_register_returns_message_without_authenticating() {
    let transport = FakeTransport::new(vec![FakeTransport::reply(
        201,
        json!({ "message": "Registration successful" }),
    )]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    let message = manager.register(&transport, "alice", "Str0ng!pw").unwrap();
    assert_eq!(message, "Registration successful");
    assert!(!manager.session().is_authenticated);
    assert_eq!(manager.session().error, None);

    let requests = transport.requests.borrow();
    assert_eq!(requests[0].path, "/api/auth/register");
    assert_eq!(requests[0].token, None);
}

#[test]
fn test_register_failure_records_error() {
    let transport = FakeTransport::new(vec![FakeTransport::reply(
        409,
        json!({ "error": "Username already taken" }),
    )]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    assert!(manager.register(&transport, "alice", "Str0ng!pw").is_err());
    assert_eq!(
        manager.session().error.as_deref(),
        Some("Username already taken")
    );
}

#[test]
fn test_refresh_replaces_both_tokens() {
    let transport = FakeTransport::new(vec![FakeTransport::reply(200, token_body("a2", "r2"))]);
    let mut manager = SessionManager::new(MemTokenStore::with_tokens("a1", "r1"));
    manager.refresh(&transport).unwrap();

    let session = manager.session();
    assert!(session.is_authenticated);
    assert_eq!(session.access_token.as_deref(), Some("a2"));
    assert_eq!(session.refresh_token.as_deref(), Some("r2"));

    let requests = transport.requests.borrow();
    assert_eq!(requests[0].path, "/api/auth/refresh-token");
    assert_eq!(requests[0].body, Some(json!({ "refresh_token": "r1" })));
}

#[test]
fn test_refresh_failure_is_terminal() {
    let transport = FakeTransport::new(vec![FakeTransport::reply(
        401,
        json!({ "error": "Refresh token expired" }),
    )]);
    let mut manager = SessionManager::new(MemTokenStore::with_tokens("a1", "r1"));
    assert!(manager.refresh(&transport).is_err());

    let session = manager.session();
    assert!(!session.is_authenticated);
    assert_eq!(session.access_token, None);
    assert_eq!(session.refresh_token, None);
    assert_eq!(session.error.as_deref(), Some("Refresh token expired"));
}

#[test]
fn test_refresh_without_refresh_token_fails_without_network() {
    let transport = FakeTransport::new(vec![]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    let err = manager.refresh(&transport).unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(transport.request_count(), 0);
    assert_eq!(
        manager.session().error.as_deref(),
        Some("Token refresh failed")
    );
}

#[test]
fn test_logout_is_idempotent() {
    let mut manager = SessionManager::new(MemTokenStore::with_tokens("a1", "r1"));
    manager.logout();
    let session = manager.session().clone();
    assert!(!session.is_authenticated);
    assert_eq!(session.access_token, None);
    assert_eq!(session.refresh_token, None);

    // logging out while already logged out changes nothing
    manager.logout();
    assert_eq!(manager.session(), &session);
}

#[test]
fn test_reset_error() {
    let transport = FakeTransport::new(vec![FakeTransport::reply_empty(500)]);
    let mut manager = SessionManager::new(MemTokenStore::new());
    let _ = manager.login(&transport, "alice", "pw");
    assert!(manager.session().error.is_some());
    manager.reset_error();
    assert_eq!(manager.session().error, None);
}
