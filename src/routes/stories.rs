use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::db::models::{Level, Question, Story, StoryRef, STORY_LEVELS};
use crate::db::stories;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser};
use crate::forms::{self, QuestionDraft};
use crate::routes::{html_with_status, not_found_page, select_options, Html, SelectOption};
use crate::state::AppState;
use crate::uploads::{self, StoredFile, AUDIO_POLICY};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/story/{id}", get(story_page))
        .route("/stories/new", get(new_story_page))
        .route("/stories", axum::routing::post(create_story))
        .route("/questions/new", get(new_question_page))
        .route("/questions", axum::routing::post(create_question))
}

// -- Templates --

#[derive(Template)]
#[template(path = "story.html")]
pub struct StoryTemplate {
    pub story: Story,
    pub prev: Option<StoryRef>,
    pub next: Option<StoryRef>,
    pub questions: Vec<Question>,
    pub progress: Option<i64>,
}

#[derive(Template)]
#[template(path = "stories/new.html")]
pub struct StoryFormTemplate {
    pub error: Option<String>,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub levels: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "questions/new.html")]
pub struct QuestionFormTemplate {
    pub error: Option<String>,
    pub created: Option<i64>,
    pub stories: Vec<StoryRef>,
}

fn level_options(current: &str) -> Vec<SelectOption> {
    let names: Vec<&str> = STORY_LEVELS.iter().map(Level::as_str).collect();
    select_options(&names, current)
}

fn blank_story_form() -> StoryFormTemplate {
    StoryFormTemplate {
        error: None,
        title: String::new(),
        summary: String::new(),
        body: String::new(),
        levels: level_options(""),
    }
}

// -- Reading --

/// A story with its neighbors and quiz. Reading requires an account so
/// progress can be tracked. A non-numeric id is a 404, not a bad
/// request.
pub async fn story_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let Ok(id) = id.parse::<i64>() else {
        return Ok(not_found_page());
    };
    let Some(story) = stories::get(&state.db, id)? else {
        return Ok(not_found_page());
    };

    let (prev, next) = stories::adjacent(&state.db, id)?;
    let questions = stories::questions_for_story(&state.db, id)?;
    let progress = crate::db::progress::map_for_user(&state.db, user.id)?
        .get(&id)
        .copied();

    Ok(Html(StoryTemplate {
        story,
        prev,
        next,
        questions,
        progress,
    })
    .into_response())
}

// -- Authoring --

pub async fn new_story_page(AdminUser(_): AdminUser) -> Html<StoryFormTemplate> {
    Html(blank_story_form())
}

struct StorySubmission {
    fields: Vec<(String, String)>,
    files: Vec<StoredFile>,
}

impl StorySubmission {
    fn field(&self, name: &str) -> &str {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.trim())
            .unwrap_or_default()
    }
}

/// Drain a story form: text fields are collected verbatim, audio files
/// (fields named `questions[N][audio]`) are streamed to disk. Files from
/// unexpected fields are not stored at all.
async fn read_story_submission(
    state: &AppState,
    multipart: &mut Multipart,
) -> AppResult<StorySubmission> {
    let mut fields = Vec::new();
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                uploads::cleanup_files(&files);
                return Err(AppError::Upload(format!("Malformed upload: {e}")));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            if !name.ends_with("[audio]") {
                continue;
            }
            match uploads::store_field(field, &state.config.question_audio_dir(), &AUDIO_POLICY)
                .await
            {
                Ok(stored) => files.push(stored),
                Err(e) => {
                    uploads::cleanup_files(&files);
                    return Err(e);
                }
            }
        } else {
            let value = match field.text().await {
                Ok(value) => value,
                Err(e) => {
                    uploads::cleanup_files(&files);
                    return Err(AppError::Upload(format!("Malformed upload: {e}")));
                }
            };
            fields.push((name, value));
        }
    }

    Ok(StorySubmission { fields, files })
}

fn validate_story_fields(submission: &StorySubmission) -> Result<Level, String> {
    if submission.field("title").is_empty()
        || submission.field("summary").is_empty()
        || submission.field("body").is_empty()
    {
        return Err("Title, summary and story text are all required.".to_string());
    }
    Level::parse(submission.field("level"))
        .ok_or_else(|| "Please choose a valid level.".to_string())
}

fn echo_story_form(submission: &StorySubmission, error: String) -> StoryFormTemplate {
    StoryFormTemplate {
        error: Some(error),
        title: submission.field("title").to_string(),
        summary: submission.field("summary").to_string(),
        body: submission.field("body").to_string(),
        levels: level_options(submission.field("level")),
    }
}

fn audio_public_path(file: &StoredFile) -> String {
    format!("/uploads/questions/{}", file.file_name)
}

/// Persist a story and its questions in one transaction. Callers clean
/// up stored audio files when this fails.
fn persist_story(
    state: &AppState,
    author_id: i64,
    submission: &StorySubmission,
    level: Level,
    drafts: &[QuestionDraft],
) -> AppResult<i64> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let story_id = stories::insert_story(
        &tx,
        &stories::NewStory {
            title: submission.field("title"),
            level: level.as_str(),
            summary: submission.field("summary"),
            body: submission.field("body"),
            author_id,
        },
    )?;

    for draft in drafts {
        let audio_path = draft.audio.as_ref().map(audio_public_path);
        stories::insert_question(
            &tx,
            &stories::NewQuestion {
                story_id,
                prompt: &draft.prompt,
                answers: &draft.answers,
                correct_index: draft.correct_index as i64,
                audio_path: audio_path.as_deref(),
                author_id,
            },
        )?;
    }

    tx.commit()?;
    Ok(story_id)
}

/// All-or-nothing story creation: a failure anywhere leaves no story
/// row, no question rows and no orphaned audio files.
pub async fn create_story(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let submission = match read_story_submission(&state, &mut multipart).await {
        Ok(submission) => submission,
        Err(AppError::Upload(msg)) => {
            let mut form = blank_story_form();
            form.error = Some(msg);
            return Ok(html_with_status(StatusCode::BAD_REQUEST, form));
        }
        Err(e) => return Err(e),
    };

    let level = match validate_story_fields(&submission) {
        Ok(level) => level,
        Err(msg) => {
            uploads::cleanup_files(&submission.files);
            return Ok(html_with_status(
                StatusCode::BAD_REQUEST,
                echo_story_form(&submission, msg),
            ));
        }
    };

    let drafts = forms::parse_story_questions(&submission.fields, None, submission.files.clone());
    if let Err(AppError::Validation(msg)) = forms::validate_drafts(&drafts) {
        uploads::cleanup_files(&submission.files);
        return Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            echo_story_form(&submission, msg),
        ));
    }

    match persist_story(&state, admin.id, &submission, level, &drafts) {
        Ok(story_id) => {
            tracing::info!(story_id, "Story created");
            Ok(Redirect::to(&format!("/story/{story_id}")).into_response())
        }
        Err(e) => {
            uploads::cleanup_files(&submission.files);
            tracing::error!("Story creation failed: {}", e);
            Ok(html_with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                echo_story_form(
                    &submission,
                    "Something went wrong saving the story. Nothing was saved.".to_string(),
                ),
            ))
        }
    }
}

#[derive(serde::Deserialize)]
pub struct NewQuestionQuery {
    pub created: Option<i64>,
}

pub async fn new_question_page(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    axum::extract::Query(query): axum::extract::Query<NewQuestionQuery>,
) -> AppResult<Response> {
    let stories = stories::refs(&state.db)?;
    Ok(Html(QuestionFormTemplate {
        error: None,
        created: query.created,
        stories,
    })
    .into_response())
}

/// Attach a single question (with optional audio) to an existing story.
pub async fn create_question(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut audio: Option<StoredFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(file) = &audio {
                    uploads::cleanup_files(std::slice::from_ref(file));
                }
                return Err(AppError::Upload(format!("Malformed upload: {e}")));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            if name != "audio" {
                continue;
            }
            audio = Some(
                uploads::store_field(field, &state.config.question_audio_dir(), &AUDIO_POLICY)
                    .await?,
            );
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Upload(format!("Malformed upload: {e}")))?;
            fields.push((name, value));
        }
    }

    let failure = |state: &AppState, audio: Option<&StoredFile>, msg: String| -> AppResult<Response> {
        if let Some(file) = audio {
            uploads::cleanup_files(std::slice::from_ref(file));
        }
        let stories = stories::refs(&state.db)?;
        Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            QuestionFormTemplate {
                error: Some(msg),
                created: None,
                stories,
            },
        ))
    };

    let lookup = |name: &str| {
        fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default()
    };

    let Ok(story_id) = lookup("storyId").parse::<i64>() else {
        return failure(&state, audio.as_ref(), "Please choose a story.".to_string());
    };
    if stories::get(&state.db, story_id)?.is_none() {
        return failure(&state, audio.as_ref(), "Please choose a story.".to_string());
    }

    let draft = QuestionDraft {
        prompt: lookup("prompt"),
        answers: [
            lookup("answers[0]"),
            lookup("answers[1]"),
            lookup("answers[2]"),
            lookup("answers[3]"),
        ],
        correct_index: lookup("correctIndex").parse().unwrap_or(4),
        audio: audio.clone(),
    };

    if let Err(AppError::Validation(msg)) = forms::validate_drafts(std::slice::from_ref(&draft)) {
        return failure(&state, audio.as_ref(), msg);
    }

    let audio_path = draft.audio.as_ref().map(audio_public_path);
    let conn = state.db.get()?;
    let question_id = stories::insert_question(
        &conn,
        &stories::NewQuestion {
            story_id,
            prompt: &draft.prompt,
            answers: &draft.answers,
            correct_index: draft.correct_index as i64,
            audio_path: audio_path.as_deref(),
            author_id: admin.id,
        },
    )?;

    Ok(Redirect::to(&format!("/questions/new?created={question_id}")).into_response())
}
