use super::principal::{Principal, Role};

/// Why a coarse role check refused the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient role")]
    Forbidden,
}

/// Returns the principal if it is present and holds one of `allowed`.
pub fn require_role<'a>(principal: Option<&'a Principal>, allowed: &[Role]) -> Result<&'a Principal, DenyReason> {
    let principal = principal.ok_or(DenyReason::Unauthenticated)?;

    if !allowed.contains(&principal.role) {
        tracing::debug!(
            user_id = %principal.id,
            role = %principal.role,
            allowed = ?allowed,
            "role check failed"
        );
        return Err(DenyReason::Forbidden);
    }

    Ok(principal)
}

/// Role sets used by the HTTP handlers.
pub mod allow {
    use super::Role;

    pub const ANY: &[Role] = &Role::ALL;
    pub const ADMIN: &[Role] = &[Role::Admin];
    pub const STAFF: &[Role] = &[Role::Admin, Role::Hr];
    pub const SUPERVISORS: &[Role] = &[Role::Admin, Role::Hr, Role::DepartmentHead];
}
