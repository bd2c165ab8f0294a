use crate::db::connection::DbPool;
use crate::db::models::{Poll, PollOption};
use crate::db::{OptionId, PollId, UserId};
use sqlx::Error;
use sqlx::Row;

const POLL_SELECT: &str = r#"
    SELECT p.id, p.title, p.description, p.creator_id, u.username AS creator_username,
           p.is_active, p.allow_multiple_votes, p.created_at
    FROM polls p
    JOIN users u ON u.id = p.creator_id
"#;

/// Insert a poll and its options in one transaction.
pub async fn create_poll(
    pool: &DbPool,
    creator_id: UserId,
    title: &str,
    description: Option<&str>,
    allow_multiple_votes: bool,
    options: &[String],
) -> Result<PollId, Error> {
    let mut tx = pool.begin().await?;

    let poll_id: PollId = sqlx::query(
        "INSERT INTO polls (title, description, creator_id, allow_multiple_votes) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(title)
    .bind(description)
    .bind(creator_id)
    .bind(allow_multiple_votes)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    for option_text in options {
        sqlx::query("INSERT INTO poll_options (poll_id, text) VALUES ($1, $2)")
            .bind(poll_id)
            .bind(option_text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(poll_id)
}

pub async fn get_poll(pool: &DbPool, poll_id: PollId) -> Result<Option<Poll>, Error> {
    sqlx::query_as::<_, Poll>(&format!("{POLL_SELECT} WHERE p.id = $1"))
        .bind(poll_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_active_polls(pool: &DbPool, skip: i64, limit: i64) -> Result<Vec<Poll>, Error> {
    sqlx::query_as::<_, Poll>(&format!(
        "{POLL_SELECT} WHERE p.is_active = TRUE ORDER BY p.created_at DESC, p.id DESC OFFSET $1 LIMIT $2"
    ))
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_poll_options(pool: &DbPool, poll_id: PollId) -> Result<Vec<PollOption>, Error> {
    sqlx::query_as::<_, PollOption>(
        "SELECT id, poll_id, text FROM poll_options WHERE poll_id = $1 ORDER BY id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await
}

pub async fn option_belongs_to_poll(
    pool: &DbPool,
    poll_id: PollId,
    option_id: OptionId,
) -> Result<bool, Error> {
    let row = sqlx::query("SELECT id FROM poll_options WHERE id = $1 AND poll_id = $2")
        .bind(option_id)
        .bind(poll_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}
