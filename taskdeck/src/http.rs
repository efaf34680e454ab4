use crate::error::Result;
use log::debug;
use reqwest::header;
use serde_json::Value;
use std::time::Duration;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// HTTP verbs used by the task API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A single outbound API call, before any transport concerns are applied.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub token: Option<String>,
}

/// Status and decoded JSON body of a completed call.
///
/// Non-2xx responses come back here as data, not errors; the caller decides
/// how to map them (the resilient client treats 401 specially).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The server's `{error: ...}` message, if the body carries one.
    pub fn error_message(&self) -> Option<String> {
        self.body
            .as_ref()?
            .get("error")?
            .as_str()
            .map(|s| s.to_string())
    }

    /// Maps non-2xx statuses to `ClientError::Status`.
    pub fn into_result(self) -> Result<Option<Value>> {
        if self.is_success() {
            Ok(self.body)
        } else {
            let message = self.error_message();
            Err(crate::error::ClientError::Status {
                status: self.status,
                message,
            })
        }
    }
}

/// Transport seam: everything above this trait is testable without a network.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Blocking `reqwest` transport against a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: String) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(HttpTransport {
            http_client,
            base_url,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        debug!(
            "{:?} {} body={:?}",
            request.method, request.path, request.body
        );
        let url = format!("{}{}", self.base_url, request.path);
        let mut req = match request.method {
            Method::Get => self.http_client.get(&url),
            Method::Post => self.http_client.post(&url),
            Method::Put => self.http_client.put(&url),
            Method::Delete => self.http_client.delete(&url),
        };
        if let Some(token) = &request.token {
            let mut auth_value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .expect("header formatting");
            auth_value.set_sensitive(true);
            req = req.header(header::AUTHORIZATION, auth_value);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        let res = req.send()?;
        let status = res.status().as_u16();
        // DELETE answers 204 with an empty body; anything non-JSON decodes to None
        let body: Option<Value> = if res.content_length() == Some(0) {
            None
        } else {
            res.json().ok()
        };
        Ok(ApiResponse { status, body })
    }
}

/// Scripted transport for protocol tests: pops canned responses in order and
/// records every request it saw.
#[cfg(test)]
pub(crate) struct FakeTransport {
    responses: std::cell::RefCell<Vec<Result<ApiResponse>>>,
    pub requests: std::cell::RefCell<Vec<ApiRequest>>,
}

#[cfg(test)]
impl FakeTransport {
    pub fn new(responses: Vec<Result<ApiResponse>>) -> Self {
        FakeTransport {
            responses: std::cell::RefCell::new(responses),
            requests: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn reply(status: u16, body: Value) -> Result<ApiResponse> {
        Ok(ApiResponse {
            status,
            body: Some(body),
        })
    }

    pub fn reply_empty(status: u16) -> Result<ApiResponse> {
        Ok(ApiResponse { status, body: None })
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

#[cfg(test)]
impl Transport for FakeTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.borrow_mut().push(request.clone());
        self.responses.borrow_mut().remove(0)
    }
}

#[test]
fn test_into_result() {
    use serde_json::json;

    let res = ApiResponse {
        status: 200,
        body: Some(json!({"id": 1})),
    };
    assert_eq!(res.into_result().unwrap(), Some(json!({"id": 1})));

    let res = ApiResponse {
        status: 204,
        body: None,
    };
    assert_eq!(res.into_result().unwrap(), None);

    let res = ApiResponse {
        status: 404,
        body: Some(json!({"error": "Task not found"})),
    };
    match res.into_result() {
        Err(crate::error::ClientError::Status { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message.as_deref(), Some("Task not found"));
        }
        other => panic!("expected status error, got {:?}", other),
    }

    // error body without the expected field
    let res = ApiResponse {
        status: 500,
        body: Some(json!({"detail": "boom"})),
    };
    match res.into_result() {
        Err(crate::error::ClientError::Status { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, None);
        }
        other => panic!("expected status error, got {:?}", other),
    }
}
