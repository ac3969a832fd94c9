#![doc = "The `sessionforge` library crate."]
#![doc = ""]
#![doc = "Cookie-based session lifecycle: short-lived access tokens, rotating refresh"]
#![doc = "tokens backed by a credential store, the HTTP endpoints that issue and revoke"]
#![doc = "them, and a client that renews expired sessions with a single refresh call."]
#![doc = "The binary (`main.rs`) wires these into an Actix server."]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

pub use crate::error::AppError;
pub use crate::state::AppState;
