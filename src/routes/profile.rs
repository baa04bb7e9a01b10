use askama::Template;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auth::session;
use crate::db::models::{Level, ProgressItem, STORY_LEVELS};
use crate::db::{progress, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::i18n;
use crate::routes::{select_options, Html, SelectOption};
use crate::state::AppState;
use crate::uploads::{self, AVATAR_LIMIT_BYTES};

const RECENT_IN_PROGRESS: usize = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile_page))
        .route("/profile/avatar", post(upload_avatar))
        .route("/profile/settings", post(save_settings))
        .route("/profile/subscription/cancel", post(cancel_subscription))
        .route("/support/ticket", post(support_ticket))
}

/// Reading totals shown at the top of the profile page.
pub struct ReadingOverview {
    pub started: usize,
    pub finished: usize,
    pub minutes: i64,
}

#[derive(Template)]
#[template(path = "profile/index.html")]
pub struct ProfileTemplate {
    pub email: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub joined: Option<String>,
    pub overview: ReadingOverview,
    pub in_progress: Vec<ProgressItem>,
    pub plan: &'static str,
    pub dark_theme: bool,
    pub languages: Vec<SelectOption>,
    pub levels: Vec<SelectOption>,
}

/// The subscription tier is derived from the learning level, not
/// stored: B1/B2 map to medium, C1/C2 to advanced, everything else is
/// basic.
fn plan_for_level(level: Option<&str>) -> &'static str {
    match level {
        Some("B1") | Some("B2") => "medium",
        Some("C1") | Some("C2") => "advanced",
        _ => "basic",
    }
}

fn normalize_avatar(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub async fn profile_page(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    let account = users::find_by_id(&state.db, user.id)?.ok_or(AppError::NotFound)?;
    let joined = users::joined_at(&state.db, user.id)?;

    let rows = progress::all_for_user(&state.db, user.id)?;
    let overview = ReadingOverview {
        started: rows.iter().filter(|r| r.percentage > 0).count(),
        finished: rows.iter().filter(|r| r.percentage >= 100).count(),
        minutes: rows.iter().map(|r| r.estimated_minutes).sum(),
    };
    let in_progress: Vec<ProgressItem> = rows
        .into_iter()
        .filter(|r| r.percentage > 0 && r.percentage < 100)
        .take(RECENT_IN_PROGRESS)
        .collect();

    let avatar = account
        .avatar_path
        .as_deref()
        .map(normalize_avatar)
        .or(user.photo.clone());

    let level_names: Vec<&str> = STORY_LEVELS.iter().map(Level::as_str).collect();

    Ok(Html(ProfileTemplate {
        email: account.email,
        display_name: user.name.clone(),
        avatar,
        joined,
        overview,
        in_progress,
        plan: plan_for_level(account.level.as_deref()),
        dark_theme: account.ui_theme.as_deref() != Some("light"),
        languages: select_options(
            &i18n::SUPPORTED_LANGUAGES,
            account.ui_language.as_deref().unwrap_or_default(),
        ),
        levels: select_options(&level_names, account.level.as_deref().unwrap_or_default()),
    })
    .into_response())
}

fn json_failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message })),
    )
        .into_response()
}

/// Avatars are small enough to buffer whole: validate, crop to a
/// 128x128 PNG, swap the file on disk and mirror the new path into the
/// active session.
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut upload: Option<(Vec<u8>, Option<String>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => {
                return Ok(json_failure(
                    StatusCode::BAD_REQUEST,
                    "Invalid avatar upload.",
                ))
            }
        };
        if field.name() != Some("avatar") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let mut buffer = Vec::new();
        let mut field = field;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    if buffer.len() > AVATAR_LIMIT_BYTES {
                        return Ok(json_failure(
                            StatusCode::BAD_REQUEST,
                            "Invalid avatar upload.",
                        ));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    return Ok(json_failure(
                        StatusCode::BAD_REQUEST,
                        "Invalid avatar upload.",
                    ))
                }
            }
        }
        upload = Some((buffer, content_type));
    }

    let Some((buffer, content_type)) = upload else {
        return Ok(json_failure(StatusCode::BAD_REQUEST, "No file uploaded"));
    };

    users::ensure_settings_row(&state.db, user.id)?;

    let avatars_dir = state.config.avatars_dir();
    if let Some(previous) = users::avatar_path(&state.db, user.id)? {
        uploads::delete_previous_avatar(&avatars_dir, &previous);
    }

    let filename =
        match uploads::process_avatar(&buffer, content_type.as_deref(), &avatars_dir, user.id) {
            Ok(filename) => filename,
            Err(AppError::Upload(msg)) => {
                return Ok(json_failure(StatusCode::BAD_REQUEST, &msg));
            }
            Err(e) => return Err(e),
        };

    let public_path = format!("uploads/avatars/{filename}");
    users::set_avatar_path(&state.db, user.id, &public_path)?;

    let normalized = format!("/{public_path}");
    session::set_session_photo(&state.db, &user.token, &normalized)?;

    Ok(Json(json!({ "success": true, "avatarUrl": normalized })).into_response())
}

fn normalize_theme(value: Option<&Value>) -> &'static str {
    match value.and_then(Value::as_str) {
        Some("light") => "light",
        _ => "dark",
    }
}

pub async fn save_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<Value>,
) -> AppResult<Response> {
    let language = body
        .get("language")
        .and_then(Value::as_str)
        .and_then(i18n::normalize_language);
    let theme = normalize_theme(body.get("theme"));
    let level = body
        .get("level")
        .and_then(Value::as_str)
        .and_then(Level::parse)
        .map(|l| l.as_str());

    users::update_settings(&state.db, user.id, language, theme, level)?;

    if let Some(language) = language {
        session::set_session_locale(&state.db, &user.token, language)?;
    }

    Ok(Json(json!({ "success": true })).into_response())
}

/// Stub acknowledgement; billing is handled out of band.
pub async fn cancel_subscription(_user: CurrentUser) -> Response {
    Json(json!({
        "success": true,
        "message": "Cancellation request recorded. Please contact support for assistance.",
    }))
    .into_response()
}

fn truncated(value: Option<&Value>, max_chars: usize) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.chars().take(max_chars).collect())
        .unwrap_or_default()
}

/// Accept a support request and echo the (capped) content back.
pub async fn support_ticket(user: CurrentUser, Json(body): Json<Value>) -> Response {
    let subject = truncated(body.get("subject"), 255);
    let description = truncated(body.get("description"), 2000);

    if subject.is_empty() && description.is_empty() {
        return json_failure(StatusCode::BAD_REQUEST, "Missing content");
    }

    tracing::info!(user_id = user.id, "Support ticket received");

    Json(json!({
        "success": true,
        "subject": subject,
        "description": description,
        "message": "Support request received.",
    }))
    .into_response()
}
