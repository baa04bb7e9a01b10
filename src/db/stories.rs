use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{estimated_minutes, Question, Story, StoryRef, StorySummary};
use crate::error::AppResult;
use crate::state::DbPool;

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StorySummary> {
    let body_chars: i64 = row.get(4)?;
    Ok(StorySummary {
        id: row.get(0)?,
        title: row.get(1)?,
        level: row.get(2)?,
        summary: row.get(3)?,
        estimated_minutes: estimated_minutes(body_chars),
        created_at: row.get(5)?,
    })
}

/// Newest-first listing, optionally restricted to one level.
pub fn list(pool: &DbPool, level: Option<&str>) -> AppResult<Vec<StorySummary>> {
    let conn = pool.get()?;
    let base = "SELECT id, title, level, summary, length(body), date(created_at) \
                FROM stories";
    let order = "ORDER BY created_at DESC, id DESC";

    let mut stories = Vec::new();
    match level {
        Some(level) => {
            let mut stmt = conn.prepare(&format!("{base} WHERE level = ?1 {order}"))?;
            let rows = stmt.query_map(params![level], summary_from_row)?;
            for row in rows {
                stories.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} {order}"))?;
            let rows = stmt.query_map([], summary_from_row)?;
            for row in rows {
                stories.push(row?);
            }
        }
    }
    Ok(stories)
}

/// id + title pairs for the question form's story selector.
pub fn refs(pool: &DbPool) -> AppResult<Vec<StoryRef>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, title FROM stories ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(StoryRef {
            id: row.get(0)?,
            title: row.get(1)?,
        })
    })?;
    let mut refs = Vec::new();
    for row in rows {
        refs.push(row?);
    }
    Ok(refs)
}

pub fn get(pool: &DbPool, id: i64) -> AppResult<Option<Story>> {
    let conn = pool.get()?;
    let story = conn
        .query_row(
            "SELECT id, title, level, summary, body, date(created_at) \
             FROM stories WHERE id = ?1 LIMIT 1",
            params![id],
            |row| {
                Ok(Story {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    level: row.get(2)?,
                    summary: row.get(3)?,
                    body: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(story)
}

/// Previous/next neighbors by id, for the story page navigation.
pub fn adjacent(pool: &DbPool, id: i64) -> AppResult<(Option<StoryRef>, Option<StoryRef>)> {
    let conn = pool.get()?;
    let prev = conn
        .query_row(
            "SELECT id, title FROM stories WHERE id < ?1 ORDER BY id DESC LIMIT 1",
            params![id],
            |row| {
                Ok(StoryRef {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            },
        )
        .optional()?;
    let next = conn
        .query_row(
            "SELECT id, title FROM stories WHERE id > ?1 ORDER BY id ASC LIMIT 1",
            params![id],
            |row| {
                Ok(StoryRef {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok((prev, next))
}

pub fn questions_for_story(pool: &DbPool, story_id: i64) -> AppResult<Vec<Question>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, prompt, answer_a, answer_b, answer_c, answer_d, correct_index, audio_path \
         FROM questions WHERE story_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![story_id], |row| {
        Ok(Question {
            id: row.get(0)?,
            prompt: row.get(1)?,
            answers: [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?],
            correct_index: row.get(6)?,
            audio_path: row.get(7)?,
        })
    })?;
    let mut questions = Vec::new();
    for row in rows {
        questions.push(row?);
    }
    Ok(questions)
}

pub struct NewStory<'a> {
    pub title: &'a str,
    pub level: &'a str,
    pub summary: &'a str,
    pub body: &'a str,
    pub author_id: i64,
}

pub struct NewQuestion<'a> {
    pub story_id: i64,
    pub prompt: &'a str,
    pub answers: &'a [String; 4],
    pub correct_index: i64,
    pub audio_path: Option<&'a str>,
    pub author_id: i64,
}

/// Insert a story on a plain connection; used inside the story-creation
/// transaction so the story and its questions commit together.
pub fn insert_story(conn: &Connection, story: &NewStory<'_>) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO stories (title, level, summary, body, author_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            story.title,
            story.level,
            story.summary,
            story.body,
            story.author_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_question(conn: &Connection, question: &NewQuestion<'_>) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO questions \
         (story_id, prompt, answer_a, answer_b, answer_c, answer_d, correct_index, audio_path, author_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            question.story_id,
            question.prompt,
            question.answers[0],
            question.answers[1],
            question.answers[2],
            question.answers[3],
            question.correct_index,
            question.audio_path,
            question.author_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
