/// Account management
///
/// Registration, login and logout, profile reads and edits, and the
/// admin-only role and listing operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::ValidateEmail;

use super::{check_length, non_empty, FileUpload, Page, PageRequest, ServiceError, ServiceResult};
use crate::auth::authorization::require_self_or_admin;
use crate::auth::jwt::JwtSettings;
use crate::auth::middleware::AuthContext;
use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::cache::blacklist::TokenBlacklist;
use crate::models::user::{CreateUser, Role, User, MAX_EMAIL_LENGTH, MAX_NICKNAME_LENGTH};
use crate::storage::uploads::{FileStore, UploadPurpose};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;

/// User as returned to clients
///
/// `avatar` is a public URL (or empty). `token` is only set by register and
/// login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub nickname: String,
    pub avatar: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct UserService {
    db: PgPool,
    files: FileStore,
    blacklist: TokenBlacklist,
    jwt: JwtSettings,
}

/// Checks the username length in characters
pub fn validate_username(username: &str) -> ServiceResult<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(ServiceError::Validation(format!(
            "username must be between {} and {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> ServiceResult<()> {
    if !email.validate_email() {
        return Err(ServiceError::Validation("invalid email format".to_string()));
    }
    check_length("email", email, MAX_EMAIL_LENGTH)
}

impl UserService {
    pub fn new(db: PgPool, files: FileStore, blacklist: TokenBlacklist, jwt: JwtSettings) -> Self {
        Self {
            db,
            files,
            blacklist,
            jwt,
        }
    }

    fn record(&self, user: User, token: Option<String>) -> UserRecord {
        UserRecord {
            id: user.id,
            username: user.username,
            email: user.email,
            nickname: user.nickname,
            avatar: self.files.public_url(&user.avatar),
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
            token,
        }
    }

    async fn find(&self, id: Uuid) -> ServiceResult<User> {
        User::find_by_id(&self.db, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))
    }

    /// Creates an account with role `user` and returns it with a session token
    ///
    /// The nickname starts out equal to the username.
    pub async fn register(&self, input: RegisterInput) -> ServiceResult<UserRecord> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&input.password).map_err(ServiceError::Validation)?;

        if User::username_taken(&self.db, &username, None).await? {
            return Err(ServiceError::Duplicate("username already exists".to_string()));
        }
        if User::email_taken(&self.db, &email, None).await? {
            return Err(ServiceError::Duplicate("email already exists".to_string()));
        }

        let password_hash = hash_password(&input.password)?;

        // A concurrent registration can still win the race; the unique
        // constraint turns that into Duplicate through From<sqlx::Error>
        let user = User::create(
            &self.db,
            CreateUser {
                nickname: username.clone(),
                username,
                email,
                password_hash,
            },
        )
        .await?;

        let token = self.jwt.issue(user.id)?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(self.record(user, Some(token)))
    }

    /// Verifies credentials and issues a session token
    ///
    /// Unknown usernames and wrong passwords fail identically.
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<UserRecord> {
        let user = User::find_by_username(&self.db, username.trim())
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Failed login attempt");
            return Err(ServiceError::InvalidCredentials);
        }

        let token = self.jwt.issue(user.id)?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(self.record(user, Some(token)))
    }

    /// Blacklists the caller's token until it would have expired anyway
    pub async fn logout(&self, auth: &AuthContext) -> ServiceResult<()> {
        let remaining = (auth.expires_at - Utc::now()).to_std().unwrap_or_default();
        self.blacklist
            .revoke(&auth.token, auth.user_id, remaining)
            .await?;
        Ok(())
    }

    pub async fn get_profile(&self, user_id: Uuid) -> ServiceResult<UserRecord> {
        let user = self.find(user_id).await?;
        Ok(self.record(user, None))
    }

    /// Updates nickname and/or avatar
    ///
    /// A new avatar is written before the row changes; the previous file is
    /// removed only once the row points at the new one.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        nickname: Option<String>,
        avatar: Option<FileUpload>,
    ) -> ServiceResult<UserRecord> {
        let nickname = non_empty(nickname);
        if let Some(nickname) = &nickname {
            check_length("nickname", nickname, MAX_NICKNAME_LENGTH)?;
        }
        let current = self.find(user_id).await?;

        let new_avatar = match avatar {
            Some(upload) => Some(
                self.files
                    .save(
                        UploadPurpose::Avatar,
                        &upload.file_name,
                        &upload.content_type,
                        upload.data,
                    )
                    .await?,
            ),
            None => None,
        };

        if nickname.is_none() && new_avatar.is_none() {
            return Ok(self.record(current, None));
        }

        let updated =
            User::update_profile(&self.db, user_id, nickname.as_deref(), new_avatar.as_deref()).await;

        let user = match updated {
            Ok(Some(user)) => user,
            Ok(None) => {
                if let Some(path) = &new_avatar {
                    self.files.delete_quietly(path).await;
                }
                return Err(ServiceError::NotFound("user not found".to_string()));
            }
            Err(e) => {
                if let Some(path) = &new_avatar {
                    self.files.delete_quietly(path).await;
                }
                return Err(e.into());
            }
        };

        if new_avatar.is_some() && !current.avatar.is_empty() && current.avatar != user.avatar {
            self.files.delete_quietly(&current.avatar).await;
        }

        tracing::info!(user_id = %user_id, avatar_changed = new_avatar.is_some(), "Profile updated");
        Ok(self.record(user, None))
    }

    /// Changes username and/or email of `target`
    ///
    /// Allowed for the account owner and for admins.
    pub async fn update_username_email(
        &self,
        caller: &AuthContext,
        target: Uuid,
        username: Option<String>,
        email: Option<String>,
    ) -> ServiceResult<UserRecord> {
        require_self_or_admin(caller.user_id, caller.role, target)?;

        let username = non_empty(username);
        let email = non_empty(email);

        if let Some(username) = &username {
            validate_username(username)?;
        }
        if let Some(email) = &email {
            validate_email(email)?;
        }

        let current = self.find(target).await?;
        if username.is_none() && email.is_none() {
            return Ok(self.record(current, None));
        }

        if let Some(username) = &username {
            if User::username_taken(&self.db, username, Some(target)).await? {
                return Err(ServiceError::Duplicate("username already exists".to_string()));
            }
        }
        if let Some(email) = &email {
            if User::email_taken(&self.db, email, Some(target)).await? {
                return Err(ServiceError::Duplicate("email already exists".to_string()));
            }
        }

        let user = User::update_identity(&self.db, target, username.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))?;

        tracing::info!(user_id = %target, caller_id = %caller.user_id, "Username/email updated");
        Ok(self.record(user, None))
    }

    /// Sets `target`'s role
    ///
    /// The caller's role is re-read from the store, so a demotion takes
    /// effect even for tokens issued before it.
    pub async fn update_role(&self, caller: &AuthContext, target: Uuid, role: Role) -> ServiceResult<()> {
        if !caller.is_admin() {
            return Err(ServiceError::Forbidden("admin role required".to_string()));
        }
        if caller.user_id == target {
            return Err(ServiceError::Forbidden("cannot change your own role".to_string()));
        }

        let stored = User::find_by_id(&self.db, caller.user_id).await?;
        if !stored.map(|u| u.role.is_admin()).unwrap_or(false) {
            return Err(ServiceError::Forbidden("admin role required".to_string()));
        }

        if !User::update_role(&self.db, target, role).await? {
            return Err(ServiceError::NotFound("user not found".to_string()));
        }

        tracing::info!(user_id = %target, caller_id = %caller.user_id, role = %role, "Role changed");
        Ok(())
    }

    /// Lists users newest first, optionally filtered by username/email
    pub async fn list_users(
        &self,
        page: Option<i64>,
        page_size: Option<i64>,
        search: Option<String>,
    ) -> ServiceResult<Page<UserRecord>> {
        let page = PageRequest::strict(page, page_size)?;
        let search = non_empty(search);

        let users = User::list(&self.db, search.as_deref(), page.limit(), page.offset()).await?;
        let total = User::count(&self.db, search.as_deref()).await?;

        Ok(Page {
            items: users.into_iter().map(|u| self.record(u, None)).collect(),
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::cache::memory::MemoryCache;
    use crate::storage::uploads::DEFAULT_MAX_FILE_SIZE;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn service() -> (UserService, TokenBlacklist) {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/imagehub_unused")
            .unwrap();
        let blacklist = TokenBlacklist::new(Arc::new(MemoryCache::new()));
        let files = FileStore::new("uploads", "http://localhost:8080", DEFAULT_MAX_FILE_SIZE);
        let jwt = JwtSettings::new(SECRET, Duration::hours(1));
        (UserService::new(pool, files, blacklist.clone(), jwt), blacklist)
    }

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            token: "token".to_string(),
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username(&"a".repeat(50)).is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
        // Counted in characters, not bytes
        assert!(validate_username("éé").is_err());
        assert!(validate_username("ééé").is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());

        // Valid shape, longer than the column
        let domain = vec!["b".repeat(60); 3].join(".");
        let long = format!("{}@{}.example.com", "a".repeat(64), domain);
        assert!(long.chars().count() > MAX_EMAIL_LENGTH);
        assert!(matches!(validate_email(&long), Err(ServiceError::Validation(m)) if m.starts_with("email must be at most")));
    }

    #[tokio::test]
    async fn test_overlong_nickname_is_rejected_before_store() {
        let (service, _) = service();

        let err = service
            .update_profile(Uuid::new_v4(), Some("n".repeat(MAX_NICKNAME_LENGTH + 1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(m) if m == "nickname must be at most 100 characters"));
    }

    #[test]
    fn test_user_record_omits_empty_token() {
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            nickname: "alice".to_string(),
            avatar: String::new(),
            role: Role::User,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            token: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("token").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_register_validation_runs_before_store() {
        let (service, _) = service();

        let cases = [
            ("al", "alice@example.com", "secret1"),
            ("alice", "nope", "secret1"),
            ("alice", "alice@example.com", "short"),
        ];
        for (username, email, password) in cases {
            let err = service
                .register(RegisterInput {
                    username: username.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{username}/{email}");
        }
    }

    #[tokio::test]
    async fn test_update_identity_requires_owner_or_admin() {
        let (service, _) = service();
        let caller = ctx(Role::User);

        let err = service
            .update_username_email(&caller, Uuid::new_v4(), Some("newname".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_role_rejections() {
        let (service, _) = service();

        let user = ctx(Role::User);
        let err = service.update_role(&user, Uuid::new_v4(), Role::Admin).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let admin = ctx(Role::Admin);
        let err = service.update_role(&admin, admin.user_id, Role::User).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(m) if m == "cannot change your own role"));
    }

    #[tokio::test]
    async fn test_list_users_rejects_bad_page_size() {
        let (service, _) = service();
        let err = service.list_users(Some(1), Some(101), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_logout_blacklists_token() {
        let (service, blacklist) = service();
        let caller = ctx(Role::User);

        service.logout(&caller).await.expect("Should log out");
        assert!(blacklist.is_revoked(&caller.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_with_expired_context_still_blacklists() {
        let (service, blacklist) = service();
        let mut caller = ctx(Role::User);
        caller.expires_at = Utc::now() - Duration::minutes(1);

        service.logout(&caller).await.unwrap();
        assert!(blacklist.is_revoked(&caller.token).await.unwrap());
    }
}
