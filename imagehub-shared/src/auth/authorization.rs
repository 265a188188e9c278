/// Authorization checks on an authenticated caller
///
/// - [`require_role`]: role gate (admin-only endpoints)
/// - [`require_author`]: only an image's author may modify it
/// - [`require_self_or_admin`]: account edits by the owner or an admin

use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::user::Role;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Insufficient permissions: requires {required}, has {actual}")]
    InsufficientRole { required: Role, actual: Role },

    #[error("Only the author can modify this image")]
    NotAuthor,

    #[error("Not authorized to modify this account")]
    NotAccountOwner,
}

/// Requires the caller to hold exactly `role`
pub fn require_role(auth: &AuthContext, role: Role) -> Result<(), AuthzError> {
    if auth.role != role {
        return Err(AuthzError::InsufficientRole {
            required: role,
            actual: auth.role,
        });
    }

    Ok(())
}

/// Requires the caller to be the author of a resource
pub fn require_author(caller: Uuid, author: Uuid) -> Result<(), AuthzError> {
    if caller != author {
        return Err(AuthzError::NotAuthor);
    }

    Ok(())
}

/// Requires the caller to be `target` or an admin
pub fn require_self_or_admin(caller: Uuid, caller_role: Role, target: Uuid) -> Result<(), AuthzError> {
    if caller != target && !caller_role.is_admin() {
        return Err(AuthzError::NotAccountOwner);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            token: "t".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(&ctx(Role::Admin), Role::Admin).is_ok());
        assert_eq!(
            require_role(&ctx(Role::User), Role::Admin),
            Err(AuthzError::InsufficientRole {
                required: Role::Admin,
                actual: Role::User
            })
        );
    }

    #[test]
    fn test_require_author() {
        let user = Uuid::new_v4();
        assert!(require_author(user, user).is_ok());
        assert_eq!(require_author(user, Uuid::new_v4()), Err(AuthzError::NotAuthor));
    }

    #[test]
    fn test_require_self_or_admin() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(require_self_or_admin(me, Role::User, me).is_ok());
        assert!(require_self_or_admin(me, Role::Admin, other).is_ok());
        assert_eq!(
            require_self_or_admin(me, Role::User, other),
            Err(AuthzError::NotAccountOwner)
        );
    }

    #[test]
    fn test_authz_error_display() {
        let err = AuthzError::InsufficientRole {
            required: Role::Admin,
            actual: Role::User,
        };
        assert_eq!(err.to_string(), "Insufficient permissions: requires admin, has user");
    }
}
