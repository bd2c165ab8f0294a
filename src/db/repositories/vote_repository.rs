use std::collections::BTreeMap;

use crate::db::connection::DbPool;
use crate::db::models::Vote;
use crate::db::{OptionId, PollId, UserId};
use sqlx::Error;
use sqlx::Row;

/// Record a vote. Returns `None` when the poll is single-vote and this user
/// already voted on it.
///
/// The poll row is locked for the duration, so concurrent votes by the same
/// user on a single-vote poll cannot both pass the check.
pub async fn cast_vote(
    pool: &DbPool,
    poll_id: PollId,
    option_id: OptionId,
    user_id: UserId,
    allow_multiple_votes: bool,
) -> Result<Option<Vote>, Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM polls WHERE id = $1 FOR UPDATE")
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

    let vote = sqlx::query_as::<_, Vote>(
        r#"
        INSERT INTO votes (poll_id, option_id, user_id)
        SELECT $1, $2, $3
        WHERE $4 OR NOT EXISTS (SELECT 1 FROM votes WHERE poll_id = $1 AND user_id = $3)
        RETURNING id, poll_id, option_id, user_id, created_at
        "#,
    )
    .bind(poll_id)
    .bind(option_id)
    .bind(user_id)
    .bind(allow_multiple_votes)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(vote)
}

/// Option ids this user has voted for on the poll.
pub async fn user_votes(
    pool: &DbPool,
    poll_id: PollId,
    user_id: UserId,
) -> Result<Vec<OptionId>, Error> {
    let rows = sqlx::query("SELECT option_id FROM votes WHERE poll_id = $1 AND user_id = $2 ORDER BY id")
        .bind(poll_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|r| r.get("option_id")).collect())
}

pub async fn vote_counts(pool: &DbPool, poll_id: PollId) -> Result<BTreeMap<OptionId, i64>, Error> {
    let rows = sqlx::query(
        "SELECT option_id, COUNT(id) AS votes FROM votes WHERE poll_id = $1 GROUP BY option_id",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| (r.get("option_id"), r.get("votes")))
        .collect())
}
