use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Role carried by every user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Hr,
    DepartmentHead,
    Employee,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Hr, Role::DepartmentHead, Role::Employee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Hr => "HR",
            Role::DepartmentHead => "DEPARTMENT_HEAD",
            Role::Employee => "EMPLOYEE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "HR" => Ok(Role::Hr),
            "DEPARTMENT_HEAD" => Ok(Role::DepartmentHead),
            "EMPLOYEE" => Ok(Role::Employee),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// The authenticated actor a decision is made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub department: Option<String>,
    /// Only meaningful for department heads. Not validated here.
    pub managed_department: Option<String>,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self {
            id,
            role,
            department: None,
            managed_department: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_managed_department(mut self, department: impl Into<String>) -> Self {
        self.managed_department = Some(department.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

/// Ownership and targeting fields of a request, assignment or attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub created_by_id: Uuid,
    /// HR processor the request was routed to.
    pub assigned_to_id: Option<Uuid>,
    /// Employees targeted by the request's assignments.
    pub employee_target_ids: HashSet<Uuid>,
}

impl ResourceDescriptor {
    pub fn new(created_by_id: Uuid) -> Self {
        Self {
            created_by_id,
            ..Self::default()
        }
    }

    pub fn with_assigned_to(mut self, assigned_to_id: Option<Uuid>) -> Self {
        self.assigned_to_id = assigned_to_id;
        self
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = Uuid>) -> Self {
        self.employee_target_ids = targets.into_iter().collect();
        self
    }

    pub fn is_creator(&self, principal: &Principal) -> bool {
        self.created_by_id == principal.id
    }

    pub fn is_assigned_processor(&self, principal: &Principal) -> bool {
        self.assigned_to_id == Some(principal.id)
    }

    pub fn is_target(&self, principal: &Principal) -> bool {
        self.employee_target_ids.contains(&principal.id)
    }
}
