pub mod cookies;
pub mod extractors;
pub mod middleware;
pub mod password;
pub mod reset;
pub mod session;
pub mod token;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::PrincipalView;

pub use extractors::AuthenticatedPrincipal;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use session::{RefreshRejection, RefreshStage};
pub use token::{hash_credential, Claims, TokenIssuer, TokenPair, TokenType};

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Represents the payload for a user login request.
///
/// Not validated: any unknown identity or wrong secret is simply a 401.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Login identity. Must be a valid email format.
    #[validate(email)]
    pub email: String,
    /// Login secret. At least 5 characters.
    #[validate(length(min = 5))]
    pub password: String,
    /// Display handle: 3 to 32 characters, alphanumeric, underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 5))]
    pub password: String,
}

/// Body returned by login and registration. The tokens themselves travel in
/// cookies only.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: PrincipalView,
}

/// Body returned by a successful refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub user: PrincipalView,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_register_password_length() {
        let with_password = |password: &str| RegisterRequest {
            email: "a@x.com".to_string(),
            password: password.to_string(),
            username: "alice".to_string(),
            full_name: None,
        };

        assert!(with_password("pw123").validate().is_ok());
        assert!(with_password("pw12").validate().is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let register = |username: &str, full_name: Option<String>| RegisterRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
            username: username.to_string(),
            full_name,
        };

        assert!(register("test_user-123", Some("Test User".into())).validate().is_ok());
        assert!(register("test user!", None).validate().is_err());
        assert!(register("tu", None).validate().is_err());
        assert!(register(&"a".repeat(33), None).validate().is_err());
        assert!(register("test_user", Some("x".repeat(256))).validate().is_err());
    }

    #[test]
    fn test_reset_request_validation() {
        let ok = ResetPasswordRequest {
            token: "abc".into(),
            password: "newpass1".into(),
        };
        assert!(ok.validate().is_ok());

        let empty_token = ResetPasswordRequest {
            token: "".into(),
            password: "newpass1".into(),
        };
        assert!(empty_token.validate().is_err());

        assert!(ForgotPasswordRequest { email: "nope".into() }.validate().is_err());
    }
}
