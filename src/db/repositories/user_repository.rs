use crate::db::connection::DbPool;
use crate::db::models::User;
use crate::db::UserId;
use sqlx::Error;

const USER_COLUMNS: &str = "id, email, username, hashed_password, is_active, created_at";

pub async fn create_user(
    pool: &DbPool,
    email: &str,
    username: &str,
    hashed_password: &str,
) -> Result<User, Error> {
    sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, username, hashed_password) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .bind(username)
    .bind(hashed_password)
    .fetch_one(pool)
    .await
}

pub async fn get_user(pool: &DbPool, user_id: UserId) -> Result<Option<User>, Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn username_exists(pool: &DbPool, username: &str) -> Result<bool, Error> {
    let row = sqlx::query("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}
