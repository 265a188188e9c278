/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the password policy
/// - [`jwt`]: HS256 session token issue and validation
/// - [`middleware`]: bearer header parsing and the authentication chain
/// - [`authorization`]: role, authorship and account ownership checks
///
/// # Example
///
/// ```no_run
/// use imagehub_shared::auth::password::{hash_password, verify_password};
/// use imagehub_shared::auth::jwt::{issue_token, validate_token};
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let token = issue_token(Uuid::new_v4(), "secret-key-at-least-32-bytes-long", Duration::hours(24))?;
/// let claims = validate_token(&token, "secret-key-at-least-32-bytes-long")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
