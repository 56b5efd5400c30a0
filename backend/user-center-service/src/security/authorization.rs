//! Role gate for authenticated callers
//!
//! Callers run session validation first and pass the resulting [`Identity`] here.
use crate::error::{Result, UserCenterError};
use crate::models::{Identity, Role};

/// Roles admitted to the admin surface
pub const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::SuperAdmin];

/// Pure membership check
pub fn authorize(identity: &Identity, allowed: &[Role]) -> bool {
    allowed.contains(&identity.role)
}

pub fn require_role(identity: &Identity, allowed: &[Role]) -> Result<()> {
    if authorize(identity, allowed) {
        Ok(())
    } else {
        Err(UserCenterError::Forbidden(
            "insufficient role for this operation".to_string(),
        ))
    }
}

/// An admin may manage users and admins; only a superadmin may manage a superadmin.
pub fn ensure_can_manage(actor: &Identity, target_role: Role) -> Result<()> {
    require_role(actor, ADMIN_ROLES)?;
    if target_role == Role::SuperAdmin && actor.role != Role::SuperAdmin {
        return Err(UserCenterError::Forbidden(
            "only a superadmin may manage superadmin accounts".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_not_self(actor: &Identity, target_id: i64) -> Result<()> {
    if actor.id == target_id {
        return Err(UserCenterError::Forbidden(
            "cannot perform this operation on your own account".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;

    fn identity(id: i64, role: Role) -> Identity {
        Identity {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.com", id),
            nickname: String::new(),
            avatar: None,
            role,
            status: Status::Active,
        }
    }

    #[test]
    fn test_authorize_membership() {
        let user = identity(1, Role::User);
        let admin = identity(2, Role::Admin);

        assert!(authorize(&user, &[Role::User]));
        assert!(!authorize(&user, ADMIN_ROLES));
        assert!(authorize(&admin, ADMIN_ROLES));
        assert!(!authorize(&admin, &[]));
    }

    #[test]
    fn test_require_role_forbidden() {
        let user = identity(1, Role::User);
        assert!(matches!(
            require_role(&user, ADMIN_ROLES),
            Err(UserCenterError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_cannot_manage_superadmin() {
        let admin = identity(2, Role::Admin);
        let root = identity(3, Role::SuperAdmin);

        assert!(ensure_can_manage(&admin, Role::User).is_ok());
        assert!(ensure_can_manage(&admin, Role::Admin).is_ok());
        assert!(ensure_can_manage(&admin, Role::SuperAdmin).is_err());
        assert!(ensure_can_manage(&root, Role::SuperAdmin).is_ok());
        assert!(ensure_can_manage(&identity(4, Role::User), Role::User).is_err());
    }

    #[test]
    fn test_ensure_not_self() {
        let admin = identity(2, Role::Admin);
        assert!(ensure_not_self(&admin, 2).is_err());
        assert!(ensure_not_self(&admin, 5).is_ok());
    }
}
