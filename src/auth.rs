use crate::db::{self, User, UserId};
use crate::error::AuthError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// bcrypt only looks at the first 72 bytes.
const BCRYPT_MAX_BYTES: usize = 72;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a string.
    pub sub: String,
    pub exp: usize,
}

pub fn create_access_token(
    user_id: UserId,
    secret: &str,
    ttl_minutes: i64,
) -> Result<String, AuthError> {
    let expires_at = Utc::now() + Duration::minutes(ttl_minutes);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expires_at.timestamp().max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::TokenCreationError)
}

pub fn decode_token(token: &str, secret: &str) -> Result<UserId, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;

    data.claims.sub.parse().map_err(|_| AuthError::Unauthorized)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn truncate_password(password: &str) -> &str {
    if password.len() <= BCRYPT_MAX_BYTES {
        return password;
    }
    let mut end = BCRYPT_MAX_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

pub async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        bcrypt::hash(truncate_password(&password), bcrypt::DEFAULT_COST)
    })
    .await
    .map_err(|_| AuthError::PasswordHashError)?
    .map_err(AuthError::from)
}

pub async fn verify_password(password: String, hashed: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(truncate_password(&password), &hashed))
        .await
        .map_err(|_| AuthError::PasswordHashError)?
        .map_err(AuthError::from)
}

/// The caller, if a valid bearer token for an active user was sent.
pub async fn optional_user(
    app_state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<User>, AuthError> {
    let Some(token) = bearer_token(headers) else {
        return Ok(None);
    };
    let Ok(user_id) = decode_token(token, &app_state.config.secret_key) else {
        return Ok(None);
    };

    let user = db::get_user(&app_state.db, user_id).await?;
    Ok(user.filter(|u| u.is_active))
}

pub async fn require_user(app_state: &AppState, headers: &HeaderMap) -> Result<User, AuthError> {
    optional_user(app_state, headers)
        .await?
        .ok_or(AuthError::Unauthorized)
}

pub async fn register(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = payload.email.trim().to_lowercase();
    let username = payload.username.trim().to_string();

    if !email.contains('@') {
        return Err(AuthError::InvalidRequest("email is not valid"));
    }
    if username.is_empty() {
        return Err(AuthError::InvalidRequest("username is required"));
    }
    if payload.password.is_empty() {
        return Err(AuthError::InvalidRequest("password is required"));
    }

    if db::get_user_by_email(&app_state.db, &email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }
    if db::username_exists(&app_state.db, &username).await? {
        return Err(AuthError::UsernameTaken);
    }

    let hashed = hash_password(payload.password).await?;
    let user = db::create_user(&app_state.db, &email, &username, &hashed).await?;

    info!(user_id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn login(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = payload.email.trim().to_lowercase();

    let user = db::get_user_by_email(&app_state.db, &email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(payload.password, user.hashed_password.clone()).await? {
        warn!(user_id = user.id, "Failed login attempt");
        return Err(AuthError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AuthError::InvalidCredentials);
    }

    let access_token = create_access_token(
        user.id,
        &app_state.config.secret_key,
        app_state.config.access_token_expire_minutes,
    )?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

pub async fn me(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let user = require_user(&app_state, &headers).await?;
    Ok(Json(UserResponse::from(user)))
}
