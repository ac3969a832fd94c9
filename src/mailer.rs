//! Outbound mail. Delivery itself lives outside this crate; the server only
//! needs somewhere to hand a password-reset credential.

use async_trait::async_trait;

use crate::error::AppError;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers the plaintext reset credential to `email`.
    async fn send_password_reset(&self, email: &str, reset_token: &str) -> Result<(), AppError>;
}

/// Logs that a reset mail would be sent. The token itself is not logged.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, email: &str, _reset_token: &str) -> Result<(), AppError> {
        log::info!("password reset mail queued for {}", email);
        Ok(())
    }
}
