use crate::{
    auth::{
        cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE},
        hash_password, reset, session, verify_password, AuthResponse, AuthenticatedPrincipal,
        ForgotPasswordRequest, LoginRequest, RefreshResponse, RegisterRequest,
        ResetPasswordRequest, TokenPair,
    },
    error::AppError,
    models::NewPrincipal,
    state::AppState,
};
use actix_web::{get, post, web, HttpRequest, HttpResponse, HttpResponseBuilder, Responder};
use serde_json::json;
use validator::Validate;

/// Register a new principal
///
/// Creates the account, starts its session and returns the sanitized principal.
///
/// ## Responses:
/// - `201 Created`: session cookies set, body `{"user": ...}`.
/// - `409 Conflict`: email already registered.
/// - `422 Unprocessable Entity`: validation failed.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let register_data = register_data.into_inner();

    if state.store.find_by_email(&register_data.email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&register_data.password, state.settings.bcrypt_cost)?;
    let principal = state
        .store
        .create_principal(NewPrincipal {
            email: register_data.email,
            username: register_data.username,
            full_name: register_data.full_name,
            password_hash,
        })
        .await?;

    let tokens = session::establish_session(state.store.as_ref(), &state.issuer, principal.id).await?;
    Ok(with_session(HttpResponse::Created(), &tokens, &state).json(AuthResponse {
        user: principal.view(),
    }))
}

/// Login
///
/// Verifies identity and secret, then starts a new session. Any session the
/// principal had on another client is superseded.
///
/// ## Responses:
/// - `200 OK`: session cookies set, body `{"user": ...}`.
/// - `401 Unauthorized`: unknown email or wrong password, however malformed.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let principal = match state.store.find_by_email(&login_data.email).await? {
        Some(principal) if verify_password(&login_data.password, &principal.password_hash)? => {
            principal
        }
        _ => return Err(AppError::Unauthorized("Invalid credentials".into())),
    };

    let tokens = session::establish_session(state.store.as_ref(), &state.issuer, principal.id).await?;
    Ok(with_session(HttpResponse::Ok(), &tokens, &state).json(AuthResponse {
        user: principal.view(),
    }))
}

/// Refresh
///
/// Reads the `refresh_token` cookie, validates it against the stored hash and
/// rotates both cookies.
///
/// ## Responses:
/// - `200 OK`: body `{"success": true, "user": ...}`.
/// - `401 Unauthorized`: "invalid refresh token", "refresh token revoked" or
///   "refresh token mismatch".
#[post("/refresh")]
pub async fn refresh(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let presented = cookies::read(&req, REFRESH_COOKIE);
    let rotated =
        session::rotate_session(state.store.as_ref(), &state.issuer, presented.as_deref()).await?;

    Ok(
        with_session(HttpResponse::Ok(), &rotated.tokens, &state).json(RefreshResponse {
            success: true,
            user: rotated.principal.view(),
        }),
    )
}

/// Logout
///
/// Revokes the stored credential when the caller can be identified and always
/// clears both cookies. Never fails from the caller's point of view.
#[post("/logout")]
pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let access_cookie = cookies::read(&req, ACCESS_COOKIE);
    let refresh_cookie = cookies::read(&req, REFRESH_COOKIE);

    let principal_id = session::resolve_logout_principal(
        state.store.as_ref(),
        &state.issuer,
        access_cookie.as_deref(),
        refresh_cookie.as_deref(),
    )
    .await;

    match principal_id {
        Some(id) => {
            if let Err(e) = session::end_session(state.store.as_ref(), id).await {
                log::warn!("failed to revoke session for principal {}: {}", id, e);
            }
        }
        None => log::debug!("logout without a known identity"),
    }

    without_session(HttpResponse::Ok(), &state).json(json!({ "success": true }))
}

/// Current principal
///
/// Requires a valid access token (enforced by `AuthMiddleware`).
#[get("/me")]
pub async fn me(
    state: web::Data<AppState>,
    principal: AuthenticatedPrincipal,
) -> Result<impl Responder, AppError> {
    let principal = state
        .store
        .get_principal_with_credential(principal.0)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown principal".into()))?;
    Ok(HttpResponse::Ok().json(principal.view()))
}

/// Request a password reset
///
/// Always answers 200 with the same body so account existence does not leak.
#[post("/forgot-password")]
pub async fn forgot_password(
    state: web::Data<AppState>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    reset::request_password_reset(
        state.store.as_ref(),
        state.mailer.as_ref(),
        state.settings.reset_ttl,
        &body.email,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "If the account exists, a reset link has been sent"
    })))
}

/// Complete a password reset
///
/// Replaces the password and revokes every existing session.
///
/// ## Responses:
/// - `200 OK`: cookies cleared.
/// - `400 Bad Request`: unknown or expired reset token.
#[post("/reset-password")]
pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    reset::complete_password_reset(
        state.store.as_ref(),
        &body.token,
        &body.password,
        state.settings.bcrypt_cost,
    )
    .await?;

    Ok(without_session(HttpResponse::Ok(), &state).json(json!({
        "message": "Password has been reset"
    })))
}

fn with_session(
    mut builder: HttpResponseBuilder,
    tokens: &TokenPair,
    state: &AppState,
) -> HttpResponseBuilder {
    let (access_cookie, refresh_cookie) = cookies::session_cookies(tokens, state.settings.secure_cookies);
    builder.cookie(access_cookie).cookie(refresh_cookie);
    builder
}

fn without_session(mut builder: HttpResponseBuilder, state: &AppState) -> HttpResponseBuilder {
    let (access_cookie, refresh_cookie) = cookies::clear_session_cookies(state.settings.secure_cookies);
    builder.cookie(access_cookie).cookie(refresh_cookie);
    builder
}
