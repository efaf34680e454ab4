pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod session;
pub mod store;
pub mod tasks;

pub use client::ApiClient;
pub use error::{ClientError, Result};
pub use http::{HttpTransport, Transport};
pub use session::{Session, SessionManager};
pub use store::{FsTokenStore, MemTokenStore, TokenPair, TokenStore};
pub use tasks::{Task, TaskPatch, TaskStatus, TaskStore};
