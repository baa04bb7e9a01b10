use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tempfile::TempDir;
use tower::util::ServiceExt;

use lesewelt::auth;
use lesewelt::config::Config;
use lesewelt::db;
use lesewelt::rate_limit::InMemoryRateLimiter;
use lesewelt::routes;
use lesewelt::state::AppState;

const BOUNDARY: &str = "----lesewelt-test-boundary";

fn test_state(dir: &TempDir) -> AppState {
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test db");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.database.path = Some(dir.path().join("test.db"));
    config.storage.uploads = Some(dir.path().join("uploads"));
    config.auth.admin_email = Some("admin@example.com".to_string());

    AppState {
        db: pool,
        config,
        rate_limiter: Arc::new(InMemoryRateLimiter::per_minute(60)),
    }
}

fn admin_session(state: &AppState) -> String {
    let user =
        auth::register_with_password(&state.db, "admin@example.com", "secret123", "secret123")
            .unwrap();
    let identity = auth::identity_for(&user, None);
    auth::session::establish_session(&state.db, &identity, None, 24).unwrap()
}

/// Hand-rolled multipart encoder so the tests control the exact wire
/// shape the browser form produces.
#[derive(Default)]
struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    fn into_request(mut self, uri: &str, session: &str) -> Request<Body> {
        self.bytes.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, format!("lesewelt_session={}", session))
            .body(Body::from(self.bytes))
            .unwrap()
    }
}

fn story_fields() -> MultipartBody {
    MultipartBody::default()
        .text("title", "Der Ausflug")
        .text("level", "B1")
        .text("summary", "Eine Klasse faehrt an den See.")
        .text("body", "Am Morgen trafen sich alle am Bahnhof.")
}

fn audio_files_in(dir: &std::path::Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn story_with_quiz_and_audio_is_created_atomically() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let session = admin_session(&state);

    let body = story_fields()
        .text("questions[0][prompt]", "Wohin faehrt die Klasse?")
        .text("questions[0][answers][0]", "An den See")
        .text("questions[0][answers][1]", "In die Berge")
        .text("questions[0][answers][2]", "In die Stadt")
        .text("questions[0][answers][3]", "Nach Hause")
        .text("questions[0][correctIndex]", "0")
        .file(
            "questions[0][audio]",
            "frage.mp3",
            "audio/mpeg",
            b"ID3fake-mp3-payload",
        );

    let response = routes::router()
        .with_state(state.clone())
        .oneshot(body.into_request("/stories", &session))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(location.starts_with("/story/"), "got {location}");

    let conn = state.db.get().unwrap();
    let (title, level): (String, String) = conn
        .query_row("SELECT title, level FROM stories", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(title, "Der Ausflug");
    assert_eq!(level, "B1");

    let audio_path: String = conn
        .query_row("SELECT audio_path FROM questions", [], |row| row.get(0))
        .unwrap();
    assert!(audio_path.starts_with("/uploads/questions/"));

    let stored = audio_files_in(&state.config.question_audio_dir());
    assert_eq!(stored.len(), 1);
    assert!(audio_path.ends_with(&stored[0]));
}

#[tokio::test]
async fn incomplete_question_rolls_back_story_and_audio() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let session = admin_session(&state);

    // A prompt without answers fails validation after the audio has
    // already been streamed to disk.
    let body = story_fields()
        .text("questions[0][prompt]", "Wohin faehrt die Klasse?")
        .text("questions[0][correctIndex]", "0")
        .file(
            "questions[0][audio]",
            "frage.mp3",
            "audio/mpeg",
            b"ID3fake-mp3-payload",
        );

    let response = routes::router()
        .with_state(state.clone())
        .oneshot(body.into_request("/stories", &session))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let conn = state.db.get().unwrap();
    let stories: i64 = conn
        .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))
        .unwrap();
    let questions: i64 = conn
        .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stories, 0);
    assert_eq!(questions, 0);
    assert!(
        audio_files_in(&state.config.question_audio_dir()).is_empty(),
        "Rejected submissions must not leave audio files behind"
    );
}

#[tokio::test]
async fn non_mp3_audio_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let session = admin_session(&state);

    let body = story_fields().file(
        "questions[0][audio]",
        "frage.wav",
        "audio/wav",
        b"RIFFfake-wav",
    );

    let response = routes::router()
        .with_state(state.clone())
        .oneshot(body.into_request("/stories", &session))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(audio_files_in(&state.config.question_audio_dir()).is_empty());
}

#[tokio::test]
async fn standalone_question_redirects_with_created_id() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);
    let session = admin_session(&state);

    // Seed a story to attach the question to
    let seed = story_fields();
    routes::router()
        .with_state(state.clone())
        .oneshot(seed.into_request("/stories", &session))
        .await
        .unwrap();

    let conn = state.db.get().unwrap();
    let story_id: i64 = conn
        .query_row("SELECT id FROM stories", [], |row| row.get(0))
        .unwrap();
    drop(conn);

    let body = MultipartBody::default()
        .text("storyId", &story_id.to_string())
        .text("prompt", "Wer war am Bahnhof?")
        .text("answers[0]", "Alle")
        .text("answers[1]", "Niemand")
        .text("answers[2]", "Der Lehrer")
        .text("answers[3]", "Zwei Kinder")
        .text("correctIndex", "0");

    let response = routes::router()
        .with_state(state.clone())
        .oneshot(body.into_request("/questions", &session))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let conn = state.db.get().unwrap();
    let question_id: i64 = conn
        .query_row("SELECT id FROM questions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(location, format!("/questions/new?created={question_id}"));
}

#[tokio::test]
async fn authoring_is_admin_only() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir);

    let user = auth::register_with_password(&state.db, "reader@example.com", "secret123", "secret123")
        .unwrap();
    let identity = auth::identity_for(&user, None);
    let session = auth::session::establish_session(&state.db, &identity, None, 24).unwrap();

    let response = routes::router()
        .with_state(state)
        .oneshot(story_fields().into_request("/stories", &session))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
