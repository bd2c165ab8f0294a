use crate::db::connection::DbPool;
use crate::db::models::Like;
use crate::db::{PollId, UserId};
use sqlx::Error;
use sqlx::Row;

/// Returns `None` when the user already likes the poll.
pub async fn add_like(pool: &DbPool, poll_id: PollId, user_id: UserId) -> Result<Option<Like>, Error> {
    sqlx::query_as::<_, Like>(
        "INSERT INTO likes (poll_id, user_id) VALUES ($1, $2) ON CONFLICT (poll_id, user_id) DO NOTHING RETURNING id, poll_id, user_id, created_at",
    )
    .bind(poll_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Returns whether a like was removed.
pub async fn remove_like(pool: &DbPool, poll_id: PollId, user_id: UserId) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM likes WHERE poll_id = $1 AND user_id = $2")
        .bind(poll_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn user_has_liked(pool: &DbPool, poll_id: PollId, user_id: UserId) -> Result<bool, Error> {
    let row = sqlx::query("SELECT id FROM likes WHERE poll_id = $1 AND user_id = $2")
        .bind(poll_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

pub async fn like_count(pool: &DbPool, poll_id: PollId) -> Result<i64, Error> {
    let row = sqlx::query("SELECT COUNT(id) AS likes FROM likes WHERE poll_id = $1")
        .bind(poll_id)
        .fetch_one(pool)
        .await?;

    Ok(row.get("likes"))
}
