use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rusqlite::{params, OptionalExtension};

use crate::auth;
use crate::auth::session::set_session_locale;
use crate::error::AppError;
use crate::i18n;
use crate::state::AppState;

pub const RETURN_TO_COOKIE: &str = "lesewelt_return_to";

/// The currently authenticated user, resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub locale: Option<String>,
    pub token: String,
    pub is_admin: bool,
}

/// Rejection for protected pages: remember where the user was headed and
/// send them to the login page (the stored target is replayed after a
/// successful login).
pub struct LoginRedirect {
    return_to: String,
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        (
            StatusCode::SEE_OTHER,
            [
                (header::LOCATION, "/login".to_string()),
                (
                    header::SET_COOKIE,
                    format!(
                        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age=300",
                        RETURN_TO_COOKIE, self.return_to
                    ),
                ),
            ],
        )
            .into_response()
    }
}

pub fn get_cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    cookie_from_headers(&parts.headers, name)
}

pub fn cookie_from_headers<'a>(
    headers: &'a axum::http::HeaderMap,
    name: &str,
) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}

fn lookup_user(state: &AppState, token: &str) -> Result<Option<CurrentUser>, AppError> {
    let conn = state.db.get()?;
    let row = conn
        .query_row(
            "SELECT u.id, u.email, s.display_name, s.photo_url, s.locale FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(id, email, name, photo, locale)| {
        let is_admin = auth::is_admin(&state.config, &email);
        CurrentUser {
            id,
            email,
            name,
            photo,
            locale,
            token: token.to_string(),
            is_admin,
        }
    }))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(parts, &state.config.auth.cookie_name);
        let user = match token {
            Some(token) => lookup_user(state, token).map_err(IntoResponse::into_response)?,
            None => None,
        };

        user.ok_or_else(|| {
            LoginRedirect {
                return_to: original_url(parts),
            }
            .into_response()
        })
    }
}

/// Optional variant: None instead of a login redirect.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(parts, &state.config.auth.cookie_name);
        let user = match token {
            Some(token) => lookup_user(state, token).map_err(IntoResponse::into_response)?,
            None => None,
        };
        Ok(MaybeUser(user))
    }
}

/// Requires an authenticated admin; non-admins get 403.
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(crate::routes::forbidden_page());
        }
        Ok(AdminUser(user))
    }
}

/// Request-scoped context passed to handlers: who is asking and in which
/// language. An explicit `?lang=` override is persisted into the session
/// row as a side effect.
pub struct RequestContext {
    pub user: Option<CurrentUser>,
    pub locale: &'static str,
}

fn query_param<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.uri.query()?.split('&').find_map(|pair| {
        let mut split = pair.splitn(2, '=');
        let key = split.next()?;
        let val = split.next()?;
        (key == name).then_some(val)
    })
}

fn original_url(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;

        let accept_language = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|h| h.to_str().ok());

        let (locale, from_query) = i18n::determine_locale(
            query_param(parts, "lang"),
            user.as_ref().and_then(|u| u.locale.as_deref()),
            accept_language,
        );

        if from_query {
            if let Some(user) = &user {
                set_session_locale(&state.db, &user.token, locale)
                    .map_err(IntoResponse::into_response)?;
            }
        }

        Ok(RequestContext { user, locale })
    }
}
