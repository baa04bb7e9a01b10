use askama::Template;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::db::models::StorySummary;
use crate::db::stories;
use crate::error::AppResult;
use crate::extractors::RequestContext;
use crate::routes::Html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/about", get(about))
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub stories: Vec<StorySummary>,
    pub signed_in: bool,
}

#[derive(Template)]
#[template(path = "about.html")]
pub struct AboutTemplate;

/// Public story listing, newest first.
pub async fn index(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let stories = stories::list(&state.db, None)?;
    Ok(Html(HomeTemplate {
        stories,
        signed_in: ctx.user.is_some(),
    })
    .into_response())
}

pub async fn about() -> Html<AboutTemplate> {
    Html(AboutTemplate)
}
