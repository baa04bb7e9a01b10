use rusqlite::{params, OptionalExtension};

use crate::error::AppResult;
use crate::state::DbPool;

/// A user row joined with its (optional) settings row, the shape most
/// auth and profile code works with.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    pub password_hash: Option<String>,
    pub ui_language: Option<String>,
    pub ui_theme: Option<String>,
    pub level: Option<String>,
    pub avatar_path: Option<String>,
    pub ai_teacher_id: Option<String>,
}

const ACCOUNT_SELECT: &str = "SELECT u.id, u.email, u.password_hash, us.ui_language, us.ui_theme, \
     us.level, us.avatar_path, us.ai_teacher_id \
     FROM users u \
     LEFT JOIN user_settings us ON us.user_id = u.id";

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAccount> {
    Ok(UserAccount {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        ui_language: row.get(3)?,
        ui_theme: row.get(4)?,
        level: row.get(5)?,
        avatar_path: row.get(6)?,
        ai_teacher_id: row.get(7)?,
    })
}

pub fn find_by_email(pool: &DbPool, email: &str) -> AppResult<Option<UserAccount>> {
    let conn = pool.get()?;
    let account = conn
        .query_row(
            &format!("{ACCOUNT_SELECT} WHERE u.email = ?1 LIMIT 1"),
            params![email],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

pub fn find_by_id(pool: &DbPool, id: i64) -> AppResult<Option<UserAccount>> {
    let conn = pool.get()?;
    let account = conn
        .query_row(
            &format!("{ACCOUNT_SELECT} WHERE u.id = ?1 LIMIT 1"),
            params![id],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

/// Insert a user; password_hash is None for OAuth-only accounts.
pub fn create(pool: &DbPool, email: &str, password_hash: Option<&str>) -> AppResult<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
        params![email, password_hash],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn joined_at(pool: &DbPool, user_id: i64) -> AppResult<Option<String>> {
    let conn = pool.get()?;
    let joined = conn
        .query_row(
            "SELECT date(created_at) FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(joined)
}

/// Settings rows are created lazily on first write.
pub fn ensure_settings_row(pool: &DbPool, user_id: i64) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO user_settings (user_id) VALUES (?1) \
         ON CONFLICT (user_id) DO NOTHING",
        params![user_id],
    )?;
    Ok(())
}

pub fn update_settings(
    pool: &DbPool,
    user_id: i64,
    language: Option<&str>,
    theme: &str,
    level: Option<&str>,
) -> AppResult<()> {
    ensure_settings_row(pool, user_id)?;
    let conn = pool.get()?;
    conn.execute(
        "UPDATE user_settings \
         SET ui_language = ?1, ui_theme = ?2, level = ?3, updated_at = datetime('now') \
         WHERE user_id = ?4",
        params![language, theme, level, user_id],
    )?;
    Ok(())
}

pub fn avatar_path(pool: &DbPool, user_id: i64) -> AppResult<Option<String>> {
    let conn = pool.get()?;
    let path: Option<Option<String>> = conn
        .query_row(
            "SELECT avatar_path FROM user_settings WHERE user_id = ?1 LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(path.flatten())
}

pub fn set_avatar_path(pool: &DbPool, user_id: i64, path: &str) -> AppResult<()> {
    ensure_settings_row(pool, user_id)?;
    let conn = pool.get()?;
    conn.execute(
        "UPDATE user_settings SET avatar_path = ?1, updated_at = datetime('now') \
         WHERE user_id = ?2",
        params![path, user_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&dir.path().join("t.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (dir, pool)
    }

    #[test]
    fn create_and_find_round_trip() {
        let (_dir, pool) = test_pool();
        let id = create(&pool, "anna@example.com", Some("hash")).unwrap();
        let account = find_by_email(&pool, "anna@example.com").unwrap().unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.password_hash.as_deref(), Some("hash"));
        // No settings row yet
        assert!(account.ui_language.is_none());
        assert!(find_by_id(&pool, id).unwrap().is_some());
        assert!(find_by_email(&pool, "nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected_by_schema() {
        let (_dir, pool) = test_pool();
        create(&pool, "anna@example.com", None).unwrap();
        assert!(create(&pool, "anna@example.com", None).is_err());
    }

    #[test]
    fn settings_row_is_created_lazily_and_updated() {
        let (_dir, pool) = test_pool();
        let id = create(&pool, "anna@example.com", None).unwrap();
        ensure_settings_row(&pool, id).unwrap();
        ensure_settings_row(&pool, id).unwrap();

        update_settings(&pool, id, Some("en"), "light", Some("B1")).unwrap();
        let account = find_by_id(&pool, id).unwrap().unwrap();
        assert_eq!(account.ui_language.as_deref(), Some("en"));
        assert_eq!(account.ui_theme.as_deref(), Some("light"));
        assert_eq!(account.level.as_deref(), Some("B1"));
    }

    #[test]
    fn avatar_path_round_trip() {
        let (_dir, pool) = test_pool();
        let id = create(&pool, "anna@example.com", None).unwrap();
        assert!(avatar_path(&pool, id).unwrap().is_none());
        set_avatar_path(&pool, id, "uploads/avatars/user-1-1.png").unwrap();
        assert_eq!(
            avatar_path(&pool, id).unwrap().as_deref(),
            Some("uploads/avatars/user-1-1.png")
        );
    }
}
