use parking_lot::RwLock;
use tokio::sync::watch;

use crate::models::PrincipalView;

/// What the client remembers about its session: who is signed in (display
/// fields only) and whether it is authenticated. Owned by the client; the
/// server never sees it.
///
/// Changes to the authenticated flag are published on a `watch` channel; a UI
/// sends the user to its login screen when it flips to `false`.
#[derive(Debug)]
pub struct ClientSession {
    user: RwLock<Option<PrincipalView>>,
    authenticated: watch::Sender<bool>,
}

impl ClientSession {
    pub fn new() -> Self {
        let (authenticated, _) = watch::channel(false);
        Self {
            user: RwLock::new(None),
            authenticated,
        }
    }

    /// Called after a successful login, registration or refresh.
    pub fn establish(&self, user: PrincipalView) {
        *self.user.write() = Some(user);
        self.authenticated.send_replace(true);
    }

    /// Called on logout and on refresh failure.
    pub fn clear(&self) {
        *self.user.write() = None;
        self.authenticated.send_replace(false);
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    pub fn user(&self) -> Option<PrincipalView> {
        self.user.read().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}
