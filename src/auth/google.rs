use serde::Deserialize;
use url::Url;

use crate::auth::{normalize_email, AuthenticatedUser};
use crate::config::GoogleConfig;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// The slice of the OpenID userinfo response this application cares
/// about.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GoogleProfile {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Consent-screen URL the browser is redirected to.
pub fn authorization_url(config: &GoogleConfig, state: &str) -> AppResult<String> {
    let mut url = Url::parse(AUTH_ENDPOINT)
        .map_err(|e| AppError::Internal(format!("Invalid OAuth endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.callback_url)
        .append_pair("response_type", "code")
        .append_pair("scope", "openid email profile")
        .append_pair("state", state);
    Ok(url.into())
}

/// Exchange the callback code for tokens and fetch the user's profile.
pub async fn fetch_profile(config: &GoogleConfig, code: &str) -> AppResult<GoogleProfile> {
    let client = reqwest::Client::new();

    let token: TokenResponse = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let profile = client
        .get(USERINFO_ENDPOINT)
        .bearer_auth(token.access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(profile)
}

/// Find-or-create the user behind an OAuth profile. Accounts created
/// here have no password hash.
pub fn login_with_google(pool: &DbPool, profile: GoogleProfile) -> AppResult<AuthenticatedUser> {
    let email = profile
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| {
            AppError::Auth("Your Google account does not have a public email.".into())
        })?;
    let email = normalize_email(email);

    let id = match users::find_by_email(pool, &email)? {
        Some(user) => user.id,
        None => users::create(pool, &email, None)?,
    };

    Ok(AuthenticatedUser::OAuth {
        id,
        email,
        name: profile.name.filter(|n| !n.is_empty()),
        photo: profile.picture.filter(|p| !p.is_empty()),
    })
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
    fn authorization_url_carries_client_and_state() {
        let config = GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            callback_url: "https://app.example/auth/google/callback".into(),
        };
        let url = authorization_url(&config, "state-token").unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=state-token"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn login_requires_an_email() {
        let (_dir, pool) = test_pool();
        let err = login_with_google(&pool, GoogleProfile::default()).unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[test]
    fn login_creates_user_once_and_reuses_it() {
        let (_dir, pool) = test_pool();
        let profile = GoogleProfile {
            email: Some("Anna@Example.com".into()),
            name: Some("Anna".into()),
            picture: Some("https://lh3.example/p.jpg".into()),
        };

        let first = login_with_google(&pool, profile.clone()).unwrap();
        let second = login_with_google(&pool, profile).unwrap();
        assert_eq!(first.id(), second.id());

        let account = db::users::find_by_email(&pool, "anna@example.com")
            .unwrap()
            .unwrap();
        assert!(account.password_hash.is_none());
    }
}
