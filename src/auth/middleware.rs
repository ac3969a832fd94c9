use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::cookies::ACCESS_COOKIE;
use crate::auth::AuthenticatedPrincipal;
use crate::error::AppError;
use crate::state::AppState;

/// Endpoints reachable without an access token. Refresh and logout are here
/// because they are exactly what a client calls once its access token expired.
const PUBLIC_AUTH_PATHS: [&str; 6] = [
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/refresh",
    "/api/auth/logout",
    "/api/auth/forgot-password",
    "/api/auth/reset-password",
];

/// Gate for everything under the scope it wraps: requires a valid access token
/// in the `access_token` cookie and records the principal for
/// `AuthenticatedPrincipal`. A refresh token is never accepted here.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

pub fn is_public_path(path: &str) -> bool {
    let path = path.strip_suffix('/').unwrap_or(path);
    path == "/health" || PUBLIC_AUTH_PATHS.contains(&path)
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_public_path(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        let verified = match (req.app_data::<web::Data<AppState>>(), req.cookie(ACCESS_COOKIE)) {
            (None, _) => Err(AppError::InternalServerError(
                "AppState is not registered".into(),
            )),
            (Some(_), None) => Err(AppError::Unauthorized("Missing token".into())),
            (Some(state), Some(cookie)) => state.issuer.verify_access(cookie.value()),
        };

        match verified {
            Ok(claims) => {
                req.extensions_mut()
                    .insert(AuthenticatedPrincipal(claims.sub));
                let fut = self.service.call(req);
                Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
            }
            Err(app_err) => {
                log::debug!("access denied for {}: {}", req.path(), app_err);
                // Answered here so the rejection is an ordinary 401 response.
                let response = req.error_response(app_err).map_into_right_body();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/api/auth/login"));
        assert!(is_public_path("/api/auth/refresh"));
        assert!(is_public_path("/api/auth/logout"));
        assert!(!is_public_path("/api/auth/me"));
        assert!(!is_public_path("/api/projects"));
    }

    #[test]
    fn test_nested_auth_suffix_is_not_public() {
        assert!(!is_public_path("/api/teams/7/auth/logout"));
        assert!(!is_public_path("/api/projects/auth/login"));
        assert!(!is_public_path("/auth/login"));
        assert!(is_public_path("/api/auth/login/"));
    }
}
