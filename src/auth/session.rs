use rand::Rng;
use rusqlite::params;

use crate::auth::SessionIdentity;
use crate::error::AppResult;
use crate::i18n;
use crate::state::DbPool;

/// Write a session row for an authenticated identity. When the user has
/// a stored language preference the session locale is set alongside.
/// Returns the session token.
pub fn establish_session(
    pool: &DbPool,
    identity: &SessionIdentity,
    preferred_language: Option<&str>,
    hours: u64,
) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let locale = preferred_language.and_then(i18n::normalize_language);

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, display_name, photo_url, locale, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now', ?7))",
        params![
            id,
            identity.user_id,
            token,
            identity.name,
            identity.photo,
            locale,
            format!("+{} hours", hours)
        ],
    )?;

    Ok(token)
}

pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Persist a locale chosen via query override or a settings change.
pub fn set_session_locale(pool: &DbPool, token: &str, locale: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE sessions SET locale = ?1 WHERE token = ?2",
        params![locale, token],
    )?;
    Ok(())
}

/// Mirror a freshly uploaded avatar into the active session.
pub fn set_session_photo(pool: &DbPool, token: &str, photo: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE sessions SET photo_url = ?1 WHERE token = ?2",
        params![photo, token],
    )?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
