use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::{Request, Response, StatusCode};
use serde_json::json;

use super::coordinator::{RefreshCoordinator, Refresher};
use super::session::ClientSession;
use super::ClientError;
use crate::auth::{AuthResponse, RefreshResponse, RegisterRequest};
use crate::config::ClientConfig;
use crate::models::PrincipalView;

/// Calls `POST {base}/auth/refresh` with whatever refresh cookie the shared
/// jar holds. The rotated cookies land back in the same jar.
pub struct HttpRefresher {
    http: reqwest::Client,
    url: String,
}

impl HttpRefresher {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            url: format!("{}/auth/refresh", base_url),
        }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self) -> Result<PrincipalView, ClientError> {
        let response = check(self.http.post(&self.url).send().await?).await?;
        let body: RefreshResponse = response.json().await?;
        Ok(body.user)
    }
}

/// API client that keeps the session alive across access token expiry.
///
/// Every request made through [`SessionClient::send`] goes through the
/// [`RefreshCoordinator`], so a burst of requests hitting an expired token
/// results in a single refresh call.
pub struct SessionClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<ClientSession>,
    coordinator: Arc<RefreshCoordinator>,
}

impl SessionClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        let session = Arc::new(ClientSession::new());
        let refresher = Arc::new(HttpRefresher::new(http.clone(), &config.base_url));
        let coordinator = Arc::new(RefreshCoordinator::new(
            refresher,
            session.clone(),
            config.refresh_timeout,
        ));

        Ok(Self {
            http,
            config,
            session,
            coordinator,
        })
    }

    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Login and registration never go through the coordinator: a 401 here
    /// means wrong credentials, not an expired token.
    pub async fn register(&self, request: &RegisterRequest) -> Result<PrincipalView, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        self.establish(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PrincipalView, ClientError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        self.establish(response).await
    }

    /// Ends the session on the server and locally. The local session is
    /// cleared even when the server cannot be reached.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.http.post(self.url("/auth/logout")).send().await;
        self.session.clear();
        check(result?).await.map(|_| ())
    }

    pub async fn me(&self) -> Result<PrincipalView, ClientError> {
        let request = self.http.get(self.url("/auth/me")).build()?;
        Ok(self.send(request).await?.json().await?)
    }

    /// Sends `request`, refreshing and replaying it once if the access token
    /// has expired. Non-2xx answers come back as errors.
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let http = &self.http;
        let request = &request;
        self.coordinator
            .run(move || async move {
                let attempt = request.try_clone().ok_or(ClientError::BodyNotReplayable)?;
                debug!("{} {}", attempt.method(), attempt.url());
                check(http.execute(attempt).await?).await
            })
            .await
    }

    async fn establish(&self, response: Response) -> Result<PrincipalView, ClientError> {
        let body: AuthResponse = check(response).await?.json().await?;
        self.session.establish(body.user.clone());
        Ok(body.user)
    }
}

/// Maps 401 to `Unauthorized` and any other non-success status to `Rejected`
/// with the server's `error` message.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_owned))
        .unwrap_or_else(|| status.to_string());
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}
