pub mod auth;
pub mod health;

use actix_web::web;

/// Mounts the API routes. Callers wrap the enclosing scope in `AuthMiddleware`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::register)
            .service(auth::login)
            .service(auth::refresh)
            .service(auth::logout)
            .service(auth::me)
            .service(auth::forgot_password)
            .service(auth::reset_password),
    );
}
