use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::PollId;
use crate::realtime::{ConnectionId, EventKind};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Could not validate credentials")]
    Unauthorized,
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Username already taken")]
    UsernameTaken,
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Token creation error")]
    TokenCreationError,
    #[error("Password hashing error")]
    PasswordHashError,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Could not validate credentials")]
    Unauthorized,
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Poll not found")]
    PollNotFound,
    #[error("Invalid option for this poll")]
    OptionNotFound,
    #[error("Poll is not active")]
    PollInactive,
    #[error("You have already voted on this poll")]
    AlreadyVoted,
    #[error("You have already liked this poll")]
    AlreadyLiked,
    #[error("Like not found")]
    LikeNotFound,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Failures of the live-update core. Delivery problems are not errors; they
/// show up as pruned connections in a `DeliveryReport`.
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
    #[error("failed to serialize {kind} event for poll {poll_id}: {source}")]
    Serialize {
        kind: EventKind,
        poll_id: PollId,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            AuthError::EmailTaken => (StatusCode::CONFLICT, "Email already registered"),
            AuthError::UsernameTaken => (StatusCode::CONFLICT, "Username already taken"),
            AuthError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            AuthError::TokenCreationError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
            }
            AuthError::PasswordHashError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password")
            }
            AuthError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        error_response(status, error_message, self.to_string())
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            PollError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::PollNotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            PollError::OptionNotFound => (StatusCode::BAD_REQUEST, "Invalid option"),
            PollError::PollInactive => (StatusCode::BAD_REQUEST, "Poll is not active"),
            PollError::AlreadyVoted => (StatusCode::CONFLICT, "Already voted"),
            PollError::AlreadyLiked => (StatusCode::CONFLICT, "Already liked"),
            PollError::LikeNotFound => (StatusCode::NOT_FOUND, "Like not found"),
            PollError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        error_response(status, error_message, self.to_string())
    }
}

/// JSON error body. Every 401 carries a bearer challenge.
fn error_response(status: StatusCode, error_message: &str, details: String) -> Response {
    let mut response = (
        status,
        Json(json!({
            "error": error_message,
            "details": details
        })),
    )
        .into_response();

    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            axum::http::HeaderValue::from_static("Bearer"),
        );
    }
    response
}

impl From<sqlx::Error> for PollError {
    fn from(error: sqlx::Error) -> Self {
        error!("Database error: {error}");
        PollError::DatabaseError(error.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        // a registration that lost the race against a concurrent one
        if let sqlx::Error::Database(db_error) = &error {
            if db_error.is_unique_violation() {
                return duplicate_user(db_error.constraint());
            }
        }
        error!("Database error: {error}");
        AuthError::DatabaseError(error.to_string())
    }
}

/// Postgres names the column constraints `users_email_key` and `users_username_key`.
fn duplicate_user(constraint: Option<&str>) -> AuthError {
    match constraint {
        Some(name) if name.contains("username") => AuthError::UsernameTaken,
        _ => AuthError::EmailTaken,
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AuthError::Unauthorized
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(error: bcrypt::BcryptError) -> Self {
        error!("bcrypt error: {error}");
        AuthError::PasswordHashError
    }
}

impl From<AuthError> for PollError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::DatabaseError(msg) => PollError::DatabaseError(msg),
            _ => PollError::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_error_status_codes() {
        assert_eq!(
            PollError::PollNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PollError::AlreadyVoted.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PollError::InvalidRequest("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = AuthError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(axum::http::header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn poll_unauthorized_carries_bearer_challenge() {
        let response = PollError::from(AuthError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(axum::http::header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let response = PollError::PollNotFound.into_response();
        assert!(response.headers().get(axum::http::header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn auth_failures_map_to_poll_unauthorized() {
        assert!(matches!(
            PollError::from(AuthError::InvalidCredentials),
            PollError::Unauthorized
        ));
        assert!(matches!(
            PollError::from(AuthError::DatabaseError("down".into())),
            PollError::DatabaseError(_)
        ));
    }

    #[test]
    fn unique_violations_become_conflicts() {
        assert!(matches!(
            duplicate_user(Some("users_username_key")),
            AuthError::UsernameTaken
        ));
        assert!(matches!(
            duplicate_user(Some("users_email_key")),
            AuthError::EmailTaken
        ));
        assert!(matches!(duplicate_user(None), AuthError::EmailTaken));
        assert_eq!(
            duplicate_user(Some("users_username_key")).into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
