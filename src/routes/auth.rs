use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use rand::Rng;
use serde::Deserialize;

use crate::auth::{self, google, session, AuthenticatedUser};
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_from_headers, MaybeUser, RETURN_TO_COOKIE};
use crate::routes::{html_with_status, Html};
use crate::state::AppState;

const OAUTH_STATE_COOKIE: &str = "lesewelt_oauth_state";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/signup", get(signup_page).post(signup_submit))
        .route("/logout", post(logout))
        .route("/auth/google", get(google_start))
        .route("/auth/google/callback", get(google_callback))
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn oauth_state_cookie(state: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age=600",
        OAUTH_STATE_COOKIE, state
    )
}

fn clear_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// Replay target stored before a login redirect. Only same-site paths
/// are honored.
fn safe_return_to(headers: &HeaderMap) -> Option<String> {
    cookie_from_headers(headers, RETURN_TO_COOKIE)
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .map(str::to_string)
}

// -- Templates --

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub email: String,
    pub google_enabled: bool,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
    pub email: String,
    pub google_enabled: bool,
}

// -- Form types --

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Session row plus cookies for a freshly authenticated user, then a
/// redirect to the stored return target (or home).
fn sign_in_response(
    state: &AppState,
    user: &AuthenticatedUser,
    headers: &HeaderMap,
) -> AppResult<Response> {
    let account = users::find_by_id(&state.db, user.id())?
        .ok_or_else(|| AppError::Internal("Authenticated user vanished".into()))?;

    let identity = auth::identity_for(user, account.avatar_path.as_deref());
    let token = session::establish_session(
        &state.db,
        &identity,
        account.ui_language.as_deref(),
        state.config.auth.session_hours,
    )?;

    let target = safe_return_to(headers).unwrap_or_else(|| "/".to_string());

    Ok((
        StatusCode::SEE_OTHER,
        [(header::LOCATION, target)],
        AppendHeaders([
            (
                header::SET_COOKIE,
                session_cookie(
                    &state.config.auth.cookie_name,
                    &token,
                    state.config.auth.session_hours,
                ),
            ),
            (header::SET_COOKIE, clear_cookie(RETURN_TO_COOKIE)),
        ]),
    )
        .into_response())
}

// -- Handlers --

pub async fn login_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(LoginTemplate {
        error: None,
        email: String::new(),
        google_enabled: state.config.google.is_some(),
    })
    .into_response()
}

pub async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    match auth::login_with_password(&state.db, &form.email, &form.password) {
        Ok(user) => sign_in_response(&state, &user, &headers),
        Err(AppError::Validation(msg)) | Err(AppError::Auth(msg)) => Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            LoginTemplate {
                error: Some(msg),
                email: form.email,
                google_enabled: state.config.google.is_some(),
            },
        )),
        Err(e) => Err(e),
    }
}

pub async fn signup_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(SignupTemplate {
        error: None,
        email: String::new(),
        google_enabled: state.config.google.is_some(),
    })
    .into_response()
}

pub async fn signup_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    match auth::register_with_password(
        &state.db,
        &form.email,
        &form.password,
        &form.confirm_password,
    ) {
        Ok(user) => sign_in_response(&state, &user, &headers),
        Err(AppError::Validation(msg)) | Err(AppError::Conflict(msg)) => Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            SignupTemplate {
                error: Some(msg),
                email: form.email,
                google_enabled: state.config.google.is_some(),
            },
        )),
        Err(e) => Err(e),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = cookie_from_headers(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                clear_cookie(&state.config.auth.cookie_name),
            ),
        ],
    )
        .into_response())
}

/// Kick off the consent flow. The anti-forgery state token round-trips
/// through a short-lived cookie.
pub async fn google_start(State(state): State<AppState>) -> AppResult<Response> {
    let Some(google) = &state.config.google else {
        return Err(AppError::NotFound);
    };

    let nonce = generate_state_token();
    let url = google::authorization_url(google, &nonce)?;

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, url),
            (header::SET_COOKIE, oauth_state_cookie(&nonce)),
        ],
    )
        .into_response())
}

pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let Some(google) = &state.config.google else {
        return Err(AppError::NotFound);
    };

    let failure = |msg: &str| {
        html_with_status(
            StatusCode::BAD_REQUEST,
            LoginTemplate {
                error: Some(msg.to_string()),
                email: String::new(),
                google_enabled: true,
            },
        )
    };

    if query.error.is_some() {
        return Ok(failure("Google sign-in was cancelled."));
    }

    let expected = cookie_from_headers(&headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || expected != query.state.as_deref() {
        return Ok(failure("Sign-in session expired. Please try again."));
    }

    let Some(code) = query.code.as_deref() else {
        return Ok(failure("Google sign-in failed. Please try again."));
    };

    let profile = match google::fetch_profile(google, code).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("Google token exchange failed: {}", e);
            return Ok(failure("Google sign-in failed. Please try again."));
        }
    };

    match google::login_with_google(&state.db, profile) {
        Ok(user) => {
            let mut response = sign_in_response(&state, &user, &headers)?;
            response.headers_mut().append(
                header::SET_COOKIE,
                clear_cookie(OAUTH_STATE_COOKIE)
                    .parse()
                    .map_err(|_| AppError::Internal("Invalid cookie header".into()))?,
            );
            Ok(response)
        }
        Err(AppError::Auth(msg)) => Ok(failure(&msg)),
        Err(e) => Err(e),
    }
}

fn generate_state_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
