use super::departments::{accessible_departments, DepartmentSet};
use super::principal::{Principal, ResourceDescriptor, Role};

/// What kind of object the caller is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Request and assignment records. Needs a direct relationship.
    Record,
    /// Attachment downloads. HR and department heads are also allowed.
    Attachment,
}

/// The rule that granted access, for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRule {
    Admin,
    Creator,
    AssignedProcessor,
    Target,
    OrganizationalViewer,
}

/// Pluggable access decisions. Implementations must be pure.
pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, principal: &Principal, resource: &ResourceDescriptor, scope: AccessScope) -> bool;

    fn accessible_departments(&self, principal: &Principal) -> DepartmentSet {
        accessible_departments(principal)
    }

    fn can_access_request_record(&self, principal: &Principal, resource: &ResourceDescriptor) -> bool {
        self.can_access(principal, resource, AccessScope::Record)
    }

    fn can_access_attachment(&self, principal: &Principal, resource: &ResourceDescriptor) -> bool {
        self.can_access(principal, resource, AccessScope::Attachment)
    }
}

/// Default policy
///
/// Any of the following grants access:
/// 1. ADMIN role
/// 2. principal created the resource
/// 3. principal is the HR processor the resource was routed to
/// 4. principal is one of the targeted employees
/// 5. HR or DEPARTMENT_HEAD role, attachments only
#[derive(Debug, Clone, Default)]
pub struct DefaultAccessPolicy;

impl DefaultAccessPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn matched_rule(
        principal: &Principal,
        resource: &ResourceDescriptor,
        scope: AccessScope,
    ) -> Option<AccessRule> {
        if principal.is_admin() {
            return Some(AccessRule::Admin);
        }
        if resource.is_creator(principal) {
            return Some(AccessRule::Creator);
        }
        if resource.is_assigned_processor(principal) {
            return Some(AccessRule::AssignedProcessor);
        }
        if resource.is_target(principal) {
            return Some(AccessRule::Target);
        }
        if scope == AccessScope::Attachment && matches!(principal.role, Role::Hr | Role::DepartmentHead) {
            return Some(AccessRule::OrganizationalViewer);
        }
        None
    }
}

impl AccessPolicy for DefaultAccessPolicy {
    fn can_access(&self, principal: &Principal, resource: &ResourceDescriptor, scope: AccessScope) -> bool {
        match Self::matched_rule(principal, resource, scope) {
            Some(rule) => {
                tracing::debug!(
                    user_id = %principal.id,
                    role = %principal.role,
                    scope = ?scope,
                    rule = ?rule,
                    "access granted"
                );
                true
            }
            None => {
                tracing::debug!(
                    user_id = %principal.id,
                    role = %principal.role,
                    scope = ?scope,
                    "access denied"
                );
                false
            }
        }
    }
}

/// Rules 1–4.
pub fn can_access_request_record(principal: &Principal, resource: &ResourceDescriptor) -> bool {
    DefaultAccessPolicy.can_access_request_record(principal, resource)
}

/// Rules 1–5.
pub fn can_access_attachment(principal: &Principal, resource: &ResourceDescriptor) -> bool {
    DefaultAccessPolicy.can_access_attachment(principal, resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn unrelated_resource() -> ResourceDescriptor {
        ResourceDescriptor::new(Uuid::new_v4())
            .with_assigned_to(Some(Uuid::new_v4()))
            .with_targets([Uuid::new_v4(), Uuid::new_v4()])
    }

    #[test]
    fn admin_accesses_every_resource() {
        let admin = Principal::new(Uuid::new_v4(), Role::Admin);
        let resources = [
            unrelated_resource(),
            ResourceDescriptor::new(Uuid::new_v4()),
            ResourceDescriptor::new(admin.id),
        ];

        for resource in &resources {
            assert!(can_access_request_record(&admin, resource));
            assert!(can_access_attachment(&admin, resource));
        }
    }

    #[test]
    fn creator_accesses_regardless_of_role() {
        for role in Role::ALL {
            let principal = Principal::new(Uuid::new_v4(), role);
            let resource = ResourceDescriptor::new(principal.id).with_assigned_to(Some(Uuid::new_v4()));

            assert!(can_access_request_record(&principal, &resource), "{role} creator");
            assert!(can_access_attachment(&principal, &resource), "{role} creator");
        }
    }

    #[test]
    fn assigned_hr_accesses_record() {
        let hr = Principal::new(Uuid::new_v4(), Role::Hr);
        let resource = ResourceDescriptor::new(Uuid::new_v4()).with_assigned_to(Some(hr.id));

        assert!(can_access_request_record(&hr, &resource));
        assert_eq!(
            DefaultAccessPolicy::matched_rule(&hr, &resource, AccessScope::Record),
            Some(AccessRule::AssignedProcessor)
        );
    }

    #[test]
    fn targeted_employee_accesses_record() {
        let employee = Principal::new(Uuid::new_v4(), Role::Employee);
        let other = Uuid::new_v4();
        let resource = ResourceDescriptor::new(Uuid::new_v4())
            .with_assigned_to(Some(Uuid::new_v4()))
            .with_targets([employee.id, other]);

        assert!(can_access_request_record(&employee, &resource));
        assert!(can_access_attachment(&employee, &resource));
    }

    #[test]
    fn unrelated_employee_is_denied_both_scopes() {
        let employee = Principal::new(Uuid::new_v4(), Role::Employee).with_department("IT");
        let resource = unrelated_resource();

        assert!(!can_access_request_record(&employee, &resource));
        assert!(!can_access_attachment(&employee, &resource));
    }

    #[test]
    fn organizational_viewers_reach_attachments_but_not_records() {
        let head = Principal::new(Uuid::new_v4(), Role::DepartmentHead).with_managed_department("IT");
        let hr = Principal::new(Uuid::new_v4(), Role::Hr);
        let resource = unrelated_resource();

        for principal in [&head, &hr] {
            assert!(can_access_attachment(principal, &resource));
            assert!(!can_access_request_record(principal, &resource));
        }
        assert_eq!(
            DefaultAccessPolicy::matched_rule(&head, &resource, AccessScope::Attachment),
            Some(AccessRule::OrganizationalViewer)
        );
    }

    #[test]
    fn missing_processor_does_not_match_anyone() {
        let hr = Principal::new(Uuid::new_v4(), Role::Hr);
        let resource = ResourceDescriptor::new(Uuid::new_v4()).with_assigned_to(None);

        assert!(!can_access_request_record(&hr, &resource));
    }

    #[test]
    fn policy_trait_exposes_department_resolver() {
        let policy = DefaultAccessPolicy::new();
        let head = Principal::new(Uuid::new_v4(), Role::DepartmentHead).with_managed_department("IT");

        assert_eq!(policy.accessible_departments(&head), DepartmentSet::single("IT"));
    }
}
