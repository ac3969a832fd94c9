use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

use crate::auth::token::TokenPair;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Both credentials travel only in httpOnly, SameSite=Strict cookies scoped to `/`.
pub fn session_cookies(pair: &TokenPair, secure: bool) -> (Cookie<'static>, Cookie<'static>) {
    let access = build(
        ACCESS_COOKIE,
        pair.access_token.clone(),
        Duration::seconds(pair.access_expires_in.num_seconds()),
        secure,
    );
    let refresh = build(
        REFRESH_COOKIE,
        pair.refresh_token.clone(),
        Duration::seconds(pair.refresh_expires_in.num_seconds()),
        secure,
    );
    (access, refresh)
}

/// Expired, empty replacements for both cookies.
pub fn clear_session_cookies(secure: bool) -> (Cookie<'static>, Cookie<'static>) {
    (
        build(ACCESS_COOKIE, String::new(), Duration::ZERO, secure),
        build(REFRESH_COOKIE, String::new(), Duration::ZERO, secure),
    )
}

/// Value of a non-empty cookie on the request.
pub fn read(req: &HttpRequest, name: &str) -> Option<String> {
    req.cookie(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn build(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(max_age)
        .finish()
}
