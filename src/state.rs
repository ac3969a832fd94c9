use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::SessionSettings;
use crate::mailer::Mailer;
use crate::store::CredentialStore;

/// Shared by every worker through `web::Data<AppState>`.
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub issuer: TokenIssuer,
    pub mailer: Arc<dyn Mailer>,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn new(
        settings: SessionSettings,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(&settings),
            store,
            mailer,
            settings,
        }
    }
}
