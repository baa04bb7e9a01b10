use std::collections::HashMap;

use rusqlite::params;

use crate::db::models::{estimated_minutes, ProgressItem};
use crate::error::AppResult;
use crate::state::DbPool;

/// Insert-or-update one user's progress on one story.
pub fn upsert(pool: &DbPool, user_id: i64, story_id: i64, percentage: i64) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO reading_progress (user_id, story_id, percentage) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT (user_id, story_id) DO UPDATE \
         SET percentage = excluded.percentage, last_read_at = datetime('now')",
        params![user_id, story_id, percentage],
    )?;
    Ok(())
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressItem> {
    let body_chars: i64 = row.get(5)?;
    Ok(ProgressItem {
        story_id: row.get(0)?,
        percentage: row.get(1)?,
        last_read_at: row.get(2)?,
        title: row.get(3)?,
        level: row.get(4)?,
        estimated_minutes: estimated_minutes(body_chars),
    })
}

const ITEM_SELECT: &str =
    "SELECT rp.story_id, rp.percentage, date(rp.last_read_at), s.title, s.level, length(s.body) \
     FROM reading_progress rp \
     INNER JOIN stories s ON s.id = rp.story_id \
     WHERE rp.user_id = ?1";

/// Stories the user is partway through (1-99%), most recently read first.
pub fn in_progress(pool: &DbPool, user_id: i64, limit: i64) -> AppResult<Vec<ProgressItem>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{ITEM_SELECT} AND rp.percentage BETWEEN 1 AND 99 \
         ORDER BY rp.last_read_at DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![user_id, limit], item_from_row)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

/// Every progress row for the user, most recently read first.
pub fn all_for_user(pool: &DbPool, user_id: i64) -> AppResult<Vec<ProgressItem>> {
    let conn = pool.get()?;
    let mut stmt = stmt_all(&conn)?;
    let rows = stmt.query_map(params![user_id], item_from_row)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

fn stmt_all(conn: &rusqlite::Connection) -> rusqlite::Result<rusqlite::Statement<'_>> {
    conn.prepare(&format!(
        "{ITEM_SELECT} ORDER BY rp.last_read_at DESC, rp.story_id DESC"
    ))
}

/// story id -> percentage map for annotating the library listing.
pub fn map_for_user(pool: &DbPool, user_id: i64) -> AppResult<HashMap<i64, i64>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT story_id, percentage FROM reading_progress WHERE user_id = ?1",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut map = HashMap::new();
    for row in rows {
        let (story_id, percentage) = row?;
        map.insert(story_id, percentage);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::stories::{insert_story, NewStory};

    fn seeded() -> (tempfile::TempDir, DbPool, i64, i64) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&dir.path().join("t.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let user = db::users::create(&pool, "reader@example.com", None).unwrap();
        let conn = pool.get().unwrap();
        let story = insert_story(
            &conn,
            &NewStory {
                title: "Erste",
                level: "A1",
                summary: "s",
                body: "b",
                author_id: user,
            },
        )
        .unwrap();
        drop(conn);
        (dir, pool, user, story)
    }

    #[test]
    fn upsert_overwrites_percentage() {
        let (_dir, pool, user, story) = seeded();
        upsert(&pool, user, story, 40).unwrap();
        upsert(&pool, user, story, 70).unwrap();

        let map = map_for_user(&pool, user).unwrap();
        assert_eq!(map.get(&story), Some(&70));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn in_progress_excludes_finished_and_unstarted() {
        let (_dir, pool, user, story) = seeded();
        let conn = pool.get().unwrap();
        let done = insert_story(
            &conn,
            &NewStory {
                title: "Zweite",
                level: "A1",
                summary: "s",
                body: "b",
                author_id: user,
            },
        )
        .unwrap();
        let untouched = insert_story(
            &conn,
            &NewStory {
                title: "Dritte",
                level: "A1",
                summary: "s",
                body: "b",
                author_id: user,
            },
        )
        .unwrap();
        drop(conn);

        upsert(&pool, user, story, 50).unwrap();
        upsert(&pool, user, done, 100).unwrap();
        upsert(&pool, user, untouched, 0).unwrap();

        let items = in_progress(&pool, user, 5).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].story_id, story);
        assert_eq!(items[0].percentage, 50);

        assert_eq!(all_for_user(&pool, user).unwrap().len(), 3);
    }
}
