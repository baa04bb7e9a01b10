pub mod google;
pub mod session;

use crate::config::Config;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Trim and lowercase. Idempotent.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_admin(config: &Config, email: &str) -> bool {
    config
        .auth
        .admin_email
        .as_deref()
        .map(|admin| normalize_email(admin) == normalize_email(email))
        .unwrap_or(false)
}

/// How the user proved who they are. Both variants normalize into one
/// `SessionIdentity` via `identity_for`.
#[derive(Debug, Clone)]
pub enum AuthenticatedUser {
    Password {
        id: i64,
        email: String,
    },
    OAuth {
        id: i64,
        email: String,
        name: Option<String>,
        photo: Option<String>,
    },
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        match self {
            AuthenticatedUser::Password { id, .. } => *id,
            AuthenticatedUser::OAuth { id, .. } => *id,
        }
    }
}

/// What the session stores about the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub email: String,
    pub name: Option<String>,
    /// Public path of the avatar shown in the header; a stored avatar
    /// beats the OAuth profile photo.
    pub photo: Option<String>,
}

fn normalize_avatar(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// The single mapping from an authentication outcome (plus the optional
/// stored avatar) to the identity the session carries.
pub fn identity_for(user: &AuthenticatedUser, stored_avatar: Option<&str>) -> SessionIdentity {
    let (user_id, email, name, oauth_photo) = match user {
        AuthenticatedUser::Password { id, email } => (*id, email.clone(), None, None),
        AuthenticatedUser::OAuth {
            id,
            email,
            name,
            photo,
        } => (*id, email.clone(), name.clone(), photo.clone()),
    };

    let photo = stored_avatar
        .map(normalize_avatar)
        .or(oauth_photo);

    SessionIdentity {
        user_id,
        email: normalize_email(&email),
        name,
        photo,
    }
}

const BCRYPT_COST: u32 = 12;
const MIN_PASSWORD_LEN: usize = 8;

pub fn register_with_password(
    pool: &DbPool,
    email: &str,
    password: &str,
    confirm: &str,
) -> AppResult<AuthenticatedUser> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(AppError::Validation("Please fill in all fields.".into()));
    }
    if password != confirm {
        return Err(AppError::Validation("Passwords do not match.".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "Password must be at least 8 characters.".into(),
        ));
    }

    if users::find_by_email(pool, &email)?.is_some() {
        return Err(AppError::Conflict(
            "An account already exists for that email.".into(),
        ));
    }

    let hash = bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))?;
    let id = users::create(pool, &email, Some(&hash))?;

    Ok(AuthenticatedUser::Password { id, email })
}

/// One generic message for "no such user" and "wrong password"; the
/// OAuth-only case gets its own hint since the user has an account.
pub fn login_with_password(
    pool: &DbPool,
    email: &str,
    password: &str,
) -> AppResult<AuthenticatedUser> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Please enter your email and password.".into(),
        ));
    }

    let user = users::find_by_email(pool, &email)?
        .ok_or_else(|| AppError::Auth("Email or password is incorrect.".into()))?;

    let hash = user.password_hash.as_deref().ok_or_else(|| {
        AppError::Auth("This account uses Google sign-in. Continue with Google instead.".into())
    })?;

    let matches = bcrypt::verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {e}")))?;
    if !matches {
        return Err(AppError::Auth("Email or password is incorrect.".into()));
    }

    Ok(AuthenticatedUser::Password {
        id: user.id,
        email: user.email,
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
    fn normalize_email_is_idempotent() {
        let once = normalize_email("  Anna@Example.COM ");
        assert_eq!(once, "anna@example.com");
        assert_eq!(normalize_email(&once), once);
    }

    #[test]
    fn register_rejects_short_and_mismatched_passwords() {
        let (_dir, pool) = test_pool();
        assert!(matches!(
            register_with_password(&pool, "a@b.com", "secret12", "different"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            register_with_password(&pool, "a@b.com", "short", "short"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            register_with_password(&pool, "", "secret12", "secret12"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn register_then_login_round_trip() {
        let (_dir, pool) = test_pool();
        let user = register_with_password(&pool, " Anna@Example.com ", "secret12", "secret12")
            .unwrap();
        assert!(matches!(
            &user,
            AuthenticatedUser::Password { email, .. } if email == "anna@example.com"
        ));

        // Duplicate email conflicts, regardless of case
        assert!(matches!(
            register_with_password(&pool, "ANNA@example.com", "secret12", "secret12"),
            Err(AppError::Conflict(_))
        ));

        let logged_in = login_with_password(&pool, "anna@example.com", "secret12").unwrap();
        assert_eq!(logged_in.id(), user.id());

        assert!(matches!(
            login_with_password(&pool, "anna@example.com", "wrong-password"),
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            login_with_password(&pool, "nobody@example.com", "secret12"),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn login_rejects_oauth_only_accounts() {
        let (_dir, pool) = test_pool();
        db::users::create(&pool, "google@example.com", None).unwrap();
        let err = login_with_password(&pool, "google@example.com", "whatever").unwrap_err();
        assert!(matches!(err, AppError::Auth(msg) if msg.contains("Google")));
    }

    #[test]
    fn identity_prefers_stored_avatar_over_oauth_photo() {
        let user = AuthenticatedUser::OAuth {
            id: 1,
            email: "Anna@Example.com".into(),
            name: Some("Anna".into()),
            photo: Some("https://lh3.example/photo.jpg".into()),
        };

        let identity = identity_for(&user, Some("uploads/avatars/user-1-5.png"));
        assert_eq!(identity.email, "anna@example.com");
        assert_eq!(
            identity.photo.as_deref(),
            Some("/uploads/avatars/user-1-5.png")
        );

        let identity = identity_for(&user, None);
        assert_eq!(
            identity.photo.as_deref(),
            Some("https://lh3.example/photo.jpg")
        );
    }

    #[test]
    fn admin_check_uses_normalized_emails() {
        let mut config = Config::default();
        assert!(!is_admin(&config, "anyone@example.com"));
        config.auth.admin_email = Some("Admin@Example.com".into());
        assert!(is_admin(&config, " admin@example.COM "));
        assert!(!is_admin(&config, "other@example.com"));
    }
}
