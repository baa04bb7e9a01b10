use rusqlite::{params, OptionalExtension};

use crate::db::models::{VocabularyTopic, VocabularyWord};
use crate::error::AppResult;
use crate::state::DbPool;

/// URL slug for a topic name: ASCII-lowercased, non-alphanumeric runs
/// collapsed to single dashes. Falls back to "topic" when nothing is left.
pub fn slugify_topic(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "topic".to_string()
    } else {
        slug
    }
}

/// All topics newest-first, each with its words newest-first.
pub fn topics_with_words(pool: &DbPool) -> AppResult<Vec<VocabularyTopic>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, description, date(created_at) \
         FROM vocabulary_topics ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(VocabularyTopic {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            words: Vec::new(),
        })
    })?;
    let mut topics = Vec::new();
    for row in rows {
        topics.push(row?);
    }

    let mut word_stmt = conn.prepare(
        "SELECT id, term, translation, example_sentence, photo_path, date(created_at) \
         FROM vocabulary_words WHERE topic_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    for topic in &mut topics {
        let rows = word_stmt.query_map(params![topic.id], |row| {
            Ok(VocabularyWord {
                id: row.get(0)?,
                term: row.get(1)?,
                translation: row.get(2)?,
                example_sentence: row.get(3)?,
                photo_path: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        for row in rows {
            topic.words.push(row?);
        }
    }

    Ok(topics)
}

pub fn topic_by_id(pool: &DbPool, id: i64) -> AppResult<Option<VocabularyTopic>> {
    let conn = pool.get()?;
    let topic = conn
        .query_row(
            "SELECT id, name, description, date(created_at) \
             FROM vocabulary_topics WHERE id = ?1 LIMIT 1",
            params![id],
            |row| {
                Ok(VocabularyTopic {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                    words: Vec::new(),
                })
            },
        )
        .optional()?;
    Ok(topic)
}

pub fn create_topic(
    pool: &DbPool,
    name: &str,
    description: Option<&str>,
    author_id: i64,
) -> AppResult<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO vocabulary_topics (name, description, author_id) VALUES (?1, ?2, ?3)",
        params![name, description, author_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn create_word(
    pool: &DbPool,
    topic_id: i64,
    term: &str,
    translation: Option<&str>,
    example_sentence: Option<&str>,
    photo_path: &str,
    author_id: i64,
) -> AppResult<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO vocabulary_words \
         (topic_id, term, translation, example_sentence, photo_path, author_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            topic_id,
            term,
            translation,
            example_sentence,
            photo_path,
            author_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn create_grammar_topic(
    pool: &DbPool,
    title: &str,
    explanation: &str,
    author_id: i64,
) -> AppResult<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO grammar_topics (title, explanation, author_id) VALUES (?1, ?2, ?3)",
        params![title, explanation, author_id],
    )?;
    Ok(conn.last_insert_rowid())
}
