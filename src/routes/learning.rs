use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;

use crate::db::models::VocabularyTopic;
use crate::db::vocabulary::{self, slugify_topic};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, RequestContext};
use crate::i18n::{self, GrammarSection, GrammarSubtopic};
use crate::routes::{html_with_status, not_found_page, Html};
use crate::state::AppState;
use crate::uploads::{self, StoredFile, PHOTO_POLICY};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/learning/vocabulary",
            get(vocabulary_page).post(create_topic),
        )
        .route("/learning/vocabulary/new", get(new_topic_page))
        .route("/learning/vocabulary/{slug}", get(vocabulary_topic_page))
        .route(
            "/learning/vocabulary/topics/{id}/words/new",
            get(new_word_page),
        )
        .route(
            "/learning/vocabulary/topics/{id}/words",
            axum::routing::post(create_word),
        )
        .route("/learning/grammar", get(grammar_overview).post(create_grammar_topic))
        .route("/learning/grammar/new", get(new_grammar_page))
        .route("/learning/grammar/{section}", get(grammar_section_page))
        .route(
            "/learning/grammar/{section}/{subtopic}",
            get(grammar_lesson_page),
        )
}

// -- Vocabulary --

/// A vocabulary topic prepared for listing: URL slug and word count
/// are derived, not stored.
pub struct TopicCard {
    pub slug: String,
    pub word_count: usize,
    pub topic: VocabularyTopic,
}

fn topic_cards(topics: Vec<VocabularyTopic>) -> Vec<TopicCard> {
    topics
        .into_iter()
        .map(|topic| TopicCard {
            slug: slugify_topic(&topic.name),
            word_count: topic.words.len(),
            topic,
        })
        .collect()
}

#[derive(Template)]
#[template(path = "learning/vocabulary.html")]
pub struct VocabularyTemplate {
    pub topics: Vec<TopicCard>,
    pub query: String,
    pub selected_sort: String,
}

#[derive(Template)]
#[template(path = "learning/vocabulary_topic.html")]
pub struct VocabularyTopicTemplate {
    pub card: TopicCard,
}

#[derive(Template)]
#[template(path = "learning/vocabulary_new.html")]
pub struct TopicFormTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub name: String,
    pub description: String,
}

#[derive(Template)]
#[template(path = "learning/vocabulary_word_new.html")]
pub struct WordFormTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub topic_id: i64,
    pub topic_name: String,
    pub term: String,
    pub translation: String,
    pub example_sentence: String,
}

#[derive(Deserialize)]
pub struct VocabularyQuery {
    pub q: Option<String>,
    pub sort: Option<String>,
}

pub async fn vocabulary_page(
    State(state): State<AppState>,
    Query(query): Query<VocabularyQuery>,
) -> AppResult<Response> {
    let search = query.q.as_deref().unwrap_or_default().trim().to_lowercase();
    let sort = match query.sort.as_deref() {
        Some("az") => "az",
        _ => "newest",
    };

    let mut topics = topic_cards(vocabulary::topics_with_words(&state.db)?);

    if !search.is_empty() {
        topics.retain(|card| card.topic.name.to_lowercase().contains(&search));
    }
    if sort == "az" {
        topics.sort_by(|a, b| a.topic.name.to_lowercase().cmp(&b.topic.name.to_lowercase()));
    }

    Ok(Html(VocabularyTemplate {
        topics,
        query: query.q.unwrap_or_default(),
        selected_sort: sort.to_string(),
    })
    .into_response())
}

pub async fn vocabulary_topic_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Response> {
    let slug = slug.to_lowercase();
    let card = topic_cards(vocabulary::topics_with_words(&state.db)?)
        .into_iter()
        .find(|card| card.slug == slug);

    match card {
        Some(card) => Ok(Html(VocabularyTopicTemplate { card }).into_response()),
        None => Ok(not_found_page()),
    }
}

fn blank_topic_form() -> TopicFormTemplate {
    TopicFormTemplate {
        error: None,
        success: None,
        name: String::new(),
        description: String::new(),
    }
}

pub async fn new_topic_page(AdminUser(_): AdminUser) -> Html<TopicFormTemplate> {
    Html(blank_topic_form())
}

#[derive(Deserialize)]
pub struct TopicForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_topic(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Form(form): Form<TopicForm>,
) -> AppResult<Response> {
    let name = form.name.trim().to_string();
    let description = form.description.trim().to_string();

    if name.is_empty() {
        return Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            TopicFormTemplate {
                error: Some("Please provide a topic name.".to_string()),
                success: None,
                name,
                description,
            },
        ));
    }

    let description = (!description.is_empty()).then_some(description);
    vocabulary::create_topic(&state.db, &name, description.as_deref(), admin.id)?;

    let mut form = blank_topic_form();
    form.success = Some("Topic created successfully.".to_string());
    Ok(Html(form).into_response())
}

fn word_form(topic: &VocabularyTopic) -> WordFormTemplate {
    WordFormTemplate {
        error: None,
        success: None,
        topic_id: topic.id,
        topic_name: topic.name.clone(),
        term: String::new(),
        translation: String::new(),
        example_sentence: String::new(),
    }
}

pub async fn new_word_page(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(topic_id): Path<i64>,
) -> AppResult<Response> {
    let Some(topic) = vocabulary::topic_by_id(&state.db, topic_id)? else {
        return Ok(not_found_page());
    };
    Ok(Html(word_form(&topic)).into_response())
}

struct WordSubmission {
    term: String,
    translation: String,
    example_sentence: String,
    photo: Option<StoredFile>,
}

async fn read_word_submission(
    state: &AppState,
    multipart: &mut Multipart,
) -> AppResult<WordSubmission> {
    let mut submission = WordSubmission {
        term: String::new(),
        translation: String::new(),
        example_sentence: String::new(),
        photo: None,
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(photo) = &submission.photo {
                    uploads::cleanup_files(std::slice::from_ref(photo));
                }
                return Err(AppError::Upload(format!("Malformed upload: {e}")));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            if name != "photo" {
                continue;
            }
            match uploads::store_field(field, &state.config.word_photos_dir(), &PHOTO_POLICY).await
            {
                Ok(stored) => submission.photo = Some(stored),
                Err(e) => {
                    if let Some(photo) = &submission.photo {
                        uploads::cleanup_files(std::slice::from_ref(photo));
                    }
                    return Err(e);
                }
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Upload(format!("Malformed upload: {e}")))?;
            let value = value.trim().to_string();
            match name.as_str() {
                "term" => submission.term = value,
                "translation" => submission.translation = value,
                "exampleSentence" => submission.example_sentence = value,
                _ => {}
            }
        }
    }

    Ok(submission)
}

/// Add a word to a topic. The photo is mandatory; when the insert fails
/// the stored photo is deleted again.
pub async fn create_word(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(topic_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let Some(topic) = vocabulary::topic_by_id(&state.db, topic_id)? else {
        return Ok(not_found_page());
    };

    let echo = |submission: &WordSubmission, error: String| {
        let mut form = word_form(&topic);
        form.error = Some(error);
        form.term = submission.term.clone();
        form.translation = submission.translation.clone();
        form.example_sentence = submission.example_sentence.clone();
        form
    };

    let submission = match read_word_submission(&state, &mut multipart).await {
        Ok(submission) => submission,
        Err(AppError::Upload(msg)) => {
            let mut form = word_form(&topic);
            form.error = Some(msg);
            return Ok(html_with_status(StatusCode::BAD_REQUEST, form));
        }
        Err(e) => return Err(e),
    };

    if submission.term.is_empty() {
        if let Some(photo) = &submission.photo {
            uploads::cleanup_files(std::slice::from_ref(photo));
        }
        return Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            echo(&submission, "Please provide a word.".to_string()),
        ));
    }

    let Some(photo) = &submission.photo else {
        return Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            echo(
                &submission,
                "Please upload an image for the word.".to_string(),
            ),
        ));
    };

    let photo_path = format!("wordsPhotos/{}", photo.file_name);
    let translation = (!submission.translation.is_empty()).then_some(&submission.translation);
    let example =
        (!submission.example_sentence.is_empty()).then_some(&submission.example_sentence);

    if let Err(e) = vocabulary::create_word(
        &state.db,
        topic_id,
        &submission.term,
        translation.map(String::as_str),
        example.map(String::as_str),
        &photo_path,
        admin.id,
    ) {
        uploads::cleanup_files(std::slice::from_ref(photo));
        return Err(e);
    }

    let mut form = word_form(&topic);
    form.success = Some("Word added successfully.".to_string());
    Ok(Html(form).into_response())
}

// -- Grammar --

pub struct Breadcrumb {
    pub label: String,
    pub url: Option<String>,
    pub current: bool,
}

#[derive(Template)]
#[template(path = "grammar/overview.html")]
pub struct GrammarOverviewTemplate {
    pub title: String,
    pub sidebar_label: String,
    pub intro: String,
    pub sections: &'static [GrammarSection],
    pub breadcrumbs: Vec<Breadcrumb>,
}

#[derive(Template)]
#[template(path = "grammar/section.html")]
pub struct GrammarSectionTemplate {
    pub title: String,
    pub sidebar_label: String,
    pub sections: &'static [GrammarSection],
    pub section: &'static GrammarSection,
    pub breadcrumbs: Vec<Breadcrumb>,
}

#[derive(Template)]
#[template(path = "grammar/lesson.html")]
pub struct GrammarLessonTemplate {
    pub title: String,
    pub sidebar_label: String,
    pub sections: &'static [GrammarSection],
    pub section: &'static GrammarSection,
    pub subtopic: &'static GrammarSubtopic,
    pub takeaways_label: String,
    pub breadcrumbs: Vec<Breadcrumb>,
}

fn grammar_strings(locale: &str) -> (String, String) {
    let meta = i18n::grammar_meta(locale);
    let title = if meta.title.is_empty() {
        "Grammar".to_string()
    } else {
        meta.title.clone()
    };
    let sidebar = meta
        .sidebar_label
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| title.clone());
    (title, sidebar)
}

fn crumb_label(locale: &str, key: &str, fallback: &str) -> String {
    i18n::grammar_meta(locale)
        .breadcrumbs
        .get(key)
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

pub async fn grammar_overview(ctx: RequestContext) -> Response {
    let locale = ctx.locale;
    let meta = i18n::grammar_meta(locale);
    let (title, sidebar_label) = grammar_strings(locale);

    let breadcrumbs = vec![
        Breadcrumb {
            label: crumb_label(locale, "learning", "Learning"),
            url: None,
            current: false,
        },
        Breadcrumb {
            label: crumb_label(locale, "grammar", &title),
            url: None,
            current: true,
        },
    ];

    Html(GrammarOverviewTemplate {
        title,
        sidebar_label,
        intro: meta.overview.get("intro").cloned().unwrap_or_default(),
        sections: i18n::grammar_sections(locale),
        breadcrumbs,
    })
    .into_response()
}

pub async fn grammar_section_page(
    ctx: RequestContext,
    Path(section_slug): Path<String>,
) -> Response {
    let locale = ctx.locale;
    let Some(section) = i18n::section(locale, &section_slug) else {
        return not_found_page();
    };
    let (title, sidebar_label) = grammar_strings(locale);

    let breadcrumbs = vec![
        Breadcrumb {
            label: crumb_label(locale, "learning", "Learning"),
            url: None,
            current: false,
        },
        Breadcrumb {
            label: crumb_label(locale, "grammar", &title),
            url: Some("/learning/grammar".to_string()),
            current: false,
        },
        Breadcrumb {
            label: section.title.clone(),
            url: None,
            current: true,
        },
    ];

    Html(GrammarSectionTemplate {
        title,
        sidebar_label,
        sections: i18n::grammar_sections(locale),
        section,
        breadcrumbs,
    })
    .into_response()
}

pub async fn grammar_lesson_page(
    ctx: RequestContext,
    Path((section_slug, subtopic_slug)): Path<(String, String)>,
) -> Response {
    let locale = ctx.locale;
    let Some(section) = i18n::section(locale, &section_slug) else {
        return not_found_page();
    };
    let Some(subtopic) = i18n::subtopic(locale, &section_slug, &subtopic_slug) else {
        return not_found_page();
    };
    let (title, sidebar_label) = grammar_strings(locale);

    let breadcrumbs = vec![
        Breadcrumb {
            label: crumb_label(locale, "learning", "Learning"),
            url: None,
            current: false,
        },
        Breadcrumb {
            label: crumb_label(locale, "grammar", &title),
            url: Some("/learning/grammar".to_string()),
            current: false,
        },
        Breadcrumb {
            label: section.title.clone(),
            url: Some(format!("/learning/grammar/{}", section.slug)),
            current: false,
        },
        Breadcrumb {
            label: subtopic.title.clone(),
            url: None,
            current: true,
        },
    ];

    Html(GrammarLessonTemplate {
        title,
        sidebar_label,
        sections: i18n::grammar_sections(locale),
        section,
        subtopic,
        takeaways_label: i18n::grammar_meta(locale)
            .ui
            .get("takeaways")
            .cloned()
            .unwrap_or_else(|| "Key takeaways".to_string()),
        breadcrumbs,
    })
    .into_response()
}

// -- Grammar topic authoring --

#[derive(Template)]
#[template(path = "learning/grammar_new.html")]
pub struct GrammarFormTemplate {
    pub error: Option<String>,
    pub success: Option<String>,
    pub title: String,
    pub explanation: String,
}

fn blank_grammar_form() -> GrammarFormTemplate {
    GrammarFormTemplate {
        error: None,
        success: None,
        title: String::new(),
        explanation: String::new(),
    }
}

pub async fn new_grammar_page(AdminUser(_): AdminUser) -> Html<GrammarFormTemplate> {
    Html(blank_grammar_form())
}

#[derive(Deserialize)]
pub struct GrammarForm {
    pub title: String,
    #[serde(default)]
    pub explanation: String,
}

pub async fn create_grammar_topic(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Form(form): Form<GrammarForm>,
) -> AppResult<Response> {
    let title = form.title.trim().to_string();
    let explanation = form.explanation.trim().to_string();

    if title.is_empty() || explanation.is_empty() {
        return Ok(html_with_status(
            StatusCode::BAD_REQUEST,
            GrammarFormTemplate {
                error: Some(
                    "Please provide a title and explanation for the grammar topic.".to_string(),
                ),
                success: None,
                title,
                explanation,
            },
        ));
    }

    vocabulary::create_grammar_topic(&state.db, &title, &explanation, admin.id)?;

    let mut form = blank_grammar_form();
    form.success = Some("Grammar topic saved successfully.".to_string());
    Ok(Html(form).into_response())
}
