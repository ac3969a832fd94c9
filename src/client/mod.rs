//! Client side of the session lifecycle: keeps the cookie jar, remembers who
//! is signed in and transparently renews an expired access token.

pub mod coordinator;
pub mod http;
pub mod session;

pub use coordinator::{RefreshCoordinator, Refresher};
pub use http::{HttpRefresher, SessionClient};
pub use session::ClientSession;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered 401. Triggers a refresh inside the coordinator.
    #[error("unauthorized")]
    Unauthorized,

    /// Refreshing failed; the user has to log in again.
    #[error("session expired, login required")]
    SessionExpired,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Streaming bodies cannot be replayed after a refresh.
    #[error("request body cannot be replayed")]
    BodyNotReplayable,

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}
