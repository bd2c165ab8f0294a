use std::collections::BTreeMap;

use crate::auth::{optional_user, require_user};
use crate::db::{self, OptionId, Poll, PollId, PollOption, UserId};
use crate::error::PollError;
use crate::realtime::VoteUpdate;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPollsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl ListPollsQuery {
    fn page(&self) -> (i64, i64) {
        let skip = self.skip.unwrap_or(0).max(0);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (skip, limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollOptionResponse {
    pub id: OptionId,
    pub poll_id: PollId,
    pub text: String,
    pub vote_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResponse {
    pub id: PollId,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: UserId,
    pub creator_username: String,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOptionResponse>,
    pub total_votes: i64,
    pub total_likes: i64,
    pub user_has_voted: bool,
    pub user_has_liked: bool,
    pub user_voted_options: Vec<OptionId>,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub option_id: OptionId,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub id: i64,
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub id: i64,
    pub poll_id: PollId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// What the viewing user has done on a poll.
#[derive(Debug, Default)]
struct Viewer {
    voted_options: Vec<OptionId>,
    has_liked: bool,
}

fn build_poll_response(
    poll: Poll,
    options: Vec<PollOption>,
    vote_counts: &BTreeMap<OptionId, i64>,
    total_likes: i64,
    viewer: Viewer,
) -> PollResponse {
    let user_has_voted = if poll.allow_multiple_votes {
        !viewer.voted_options.is_empty()
    } else {
        viewer.voted_options.len() == 1
    };

    let options = options
        .into_iter()
        .map(|opt| PollOptionResponse {
            vote_count: vote_counts.get(&opt.id).copied().unwrap_or(0),
            id: opt.id,
            poll_id: opt.poll_id,
            text: opt.text,
        })
        .collect();

    PollResponse {
        id: poll.id,
        title: poll.title,
        description: poll.description,
        creator_id: poll.creator_id,
        creator_username: poll.creator_username,
        is_active: poll.is_active,
        allow_multiple_votes: poll.allow_multiple_votes,
        created_at: poll.created_at,
        options,
        total_votes: vote_counts.values().sum(),
        total_likes,
        user_has_voted,
        user_has_liked: viewer.has_liked,
        user_voted_options: viewer.voted_options,
    }
}

async fn format_poll_response(
    app_state: &AppState,
    poll: Poll,
    user_id: Option<UserId>,
) -> Result<PollResponse, PollError> {
    let options = db::get_poll_options(&app_state.db, poll.id).await?;
    let vote_counts = db::vote_counts(&app_state.db, poll.id).await?;
    let total_likes = db::like_count(&app_state.db, poll.id).await?;

    let viewer = match user_id {
        Some(uid) => Viewer {
            voted_options: db::user_votes(&app_state.db, poll.id, uid).await?,
            has_liked: db::user_has_liked(&app_state.db, poll.id, uid).await?,
        },
        None => Viewer::default(),
    };

    Ok(build_poll_response(poll, options, &vote_counts, total_likes, viewer))
}

async fn load_poll(app_state: &AppState, poll_id: PollId) -> Result<Poll, PollError> {
    db::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(PollError::PollNotFound)
}

/// Create a new poll (authenticated users only)
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    let user = require_user(&app_state, &headers).await?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(PollError::InvalidRequest("title is required"));
    }

    let options: Vec<String> = payload
        .options
        .iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if options.len() < 2 {
        return Err(PollError::InvalidRequest("poll must have at least 2 options"));
    }

    let poll_id = db::create_poll(
        &app_state.db,
        user.id,
        title,
        payload.description.as_deref(),
        payload.allow_multiple_votes,
        &options,
    )
    .await?;

    let poll = load_poll(&app_state, poll_id).await?;
    let response = format_poll_response(&app_state, poll, Some(user.id)).await?;

    info!(poll_id, creator_id = user.id, "Poll created");
    app_state.events.poll_created(response.clone());

    Ok((StatusCode::CREATED, Json(response)))
}

/// Active polls, newest first
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListPollsQuery>,
) -> Result<impl IntoResponse, PollError> {
    let user_id = optional_user(&app_state, &headers).await?.map(|u| u.id);
    let (skip, limit) = query.page();

    let polls = db::get_active_polls(&app_state.db, skip, limit).await?;

    let mut poll_responses = Vec::with_capacity(polls.len());
    for poll in polls {
        poll_responses.push(format_poll_response(&app_state, poll, user_id).await?);
    }

    Ok(Json(poll_responses))
}

pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<PollId>,
) -> Result<impl IntoResponse, PollError> {
    let user_id = optional_user(&app_state, &headers).await?.map(|u| u.id);
    let poll = load_poll(&app_state, poll_id).await?;

    Ok(Json(format_poll_response(&app_state, poll, user_id).await?))
}

/// Cast a vote on a poll option (authenticated users only)
pub async fn vote_on_poll(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<PollId>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, PollError> {
    let user = require_user(&app_state, &headers).await?;

    let poll = load_poll(&app_state, poll_id).await?;
    if !poll.is_active {
        return Err(PollError::PollInactive);
    }

    if !db::option_belongs_to_poll(&app_state.db, poll_id, payload.option_id).await? {
        return Err(PollError::OptionNotFound);
    }

    let vote = db::cast_vote(
        &app_state.db,
        poll_id,
        payload.option_id,
        user.id,
        poll.allow_multiple_votes,
    )
    .await?
    .ok_or(PollError::AlreadyVoted)?;

    let vote_counts = db::vote_counts(&app_state.db, poll_id).await?;
    app_state
        .events
        .vote_cast(VoteUpdate::new(poll_id, payload.option_id, vote_counts));

    Ok(Json(VoteResponse {
        id: vote.id,
        poll_id: vote.poll_id,
        option_id: vote.option_id,
        user_id: vote.user_id,
        created_at: vote.created_at,
    }))
}

pub async fn like_poll(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<PollId>,
) -> Result<impl IntoResponse, PollError> {
    let user = require_user(&app_state, &headers).await?;
    load_poll(&app_state, poll_id).await?;

    let like = db::add_like(&app_state.db, poll_id, user.id)
        .await?
        .ok_or(PollError::AlreadyLiked)?;

    let total_likes = db::like_count(&app_state.db, poll_id).await?;
    app_state.events.like_changed(poll_id, total_likes);

    Ok(Json(LikeResponse {
        id: like.id,
        poll_id: like.poll_id,
        user_id: like.user_id,
        created_at: like.created_at,
    }))
}

pub async fn unlike_poll(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(poll_id): Path<PollId>,
) -> Result<impl IntoResponse, PollError> {
    let user = require_user(&app_state, &headers).await?;

    if !db::remove_like(&app_state.db, poll_id, user.id).await? {
        return Err(PollError::LikeNotFound);
    }

    let total_likes = db::like_count(&app_state.db, poll_id).await?;
    app_state.events.like_changed(poll_id, total_likes);

    Ok(Json(json!({ "message": "Like removed" })))
}
