use askama::Template;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{Level, ProgressItem, StorySummary, STORY_LEVELS};
use crate::db::{progress, stories};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::routes::{select_options, Html, SelectOption};
use crate::state::AppState;

const CONTINUE_READING_LIMIT: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/library", get(library_page))
        .route("/library/progress", post(save_progress))
}

/// A library row: the story plus this user's saved percentage.
pub struct LibraryStory {
    pub story: StorySummary,
    pub percentage: i64,
}

#[derive(Template)]
#[template(path = "library/index.html")]
pub struct LibraryTemplate {
    pub stories: Vec<LibraryStory>,
    pub continue_reading: Vec<ProgressItem>,
    pub levels: Vec<SelectOption>,
    pub all_levels_active: bool,
}

#[derive(Deserialize)]
pub struct LibraryQuery {
    pub level: Option<String>,
}

/// The listing itself is public; signed-in readers additionally get
/// their saved percentages and the continue-reading shelf.
pub async fn library_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<LibraryQuery>,
) -> AppResult<Response> {
    // An unknown level code falls back to the unfiltered view.
    let level = query
        .level
        .as_deref()
        .and_then(Level::parse)
        .map(|l| l.as_str());

    let saved = match &user {
        Some(user) => progress::map_for_user(&state.db, user.id)?,
        None => Default::default(),
    };
    let stories = stories::list(&state.db, level)?
        .into_iter()
        .map(|story| {
            let percentage = saved.get(&story.id).copied().unwrap_or(0);
            LibraryStory { story, percentage }
        })
        .collect();

    let continue_reading = match &user {
        Some(user) => progress::in_progress(&state.db, user.id, CONTINUE_READING_LIMIT)?,
        None => Vec::new(),
    };

    let level_names: Vec<&str> = STORY_LEVELS.iter().map(Level::as_str).collect();

    Ok(Html(LibraryTemplate {
        stories,
        continue_reading,
        levels: select_options(&level_names, level.unwrap_or_default()),
        all_levels_active: level.is_none(),
    })
    .into_response())
}

/// Accept integers or numeric strings; the reading page posts whatever
/// its scroll handler has at hand.
fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Save a reading position. Percentages are clamped to 0-100 rather
/// than rejected, so an over-eager scroll handler cannot fail the save.
pub async fn save_progress(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<Value>,
) -> AppResult<Response> {
    if !state.rate_limiter.register_hit(user.id) {
        return Ok(json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many progress updates. Slow down.",
        ));
    }

    let Some(story_id) = coerce_i64(body.get("storyId")) else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid story."));
    };
    // A missing or garbled percentage counts as 0, not as an error
    let percentage = coerce_i64(body.get("percentage")).unwrap_or(0);

    if stories::get(&state.db, story_id)?.is_none() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid story."));
    }

    let clamped = percentage.clamp(0, 100);
    progress::upsert(&state.db, user.id, story_id, clamped)?;

    Ok(Json(json!({ "success": true, "percentage": clamped })).into_response())
}
