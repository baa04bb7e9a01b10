pub mod auth;
pub mod home;
pub mod learning;
pub mod library;
pub mod profile;
pub mod stories;

use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(home::router())
        .merge(auth::router())
        .merge(stories::router())
        .merge(library::router())
        .merge(profile::router())
        .merge(learning::router())
}

/// One entry of a select list or filter bar, with its active state
/// resolved ahead of rendering.
pub struct SelectOption {
    pub value: String,
    pub selected: bool,
}

pub fn select_options(values: &[&str], current: &str) -> Vec<SelectOption> {
    values
        .iter()
        .map(|value| SelectOption {
            value: value.to_string(),
            selected: *value == current,
        })
        .collect()
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// Render a template with an explicit status code, for re-rendered forms
/// carrying a validation error.
pub fn html_with_status<T: Template>(status: StatusCode, template: T) -> Response {
    let mut response = Html(template).into_response();
    if response.status() == StatusCode::OK {
        *response.status_mut() = status;
    }
    response
}

#[derive(Template)]
#[template(path = "errors/404.html")]
struct NotFoundTemplate;

#[derive(Template)]
#[template(path = "errors/403.html")]
struct ForbiddenTemplate;

pub fn not_found_page() -> Response {
    html_with_status(StatusCode::NOT_FOUND, NotFoundTemplate)
}

pub fn forbidden_page() -> Response {
    html_with_status(StatusCode::FORBIDDEN, ForbiddenTemplate)
}
