use std::collections::BTreeSet;

use super::principal::{Principal, Role};

/// Departments a principal may see in department-scoped listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentSet {
    /// Unrestricted.
    All,
    /// Exactly these departments. Empty means no department-level access.
    Only(BTreeSet<String>),
}

impl DepartmentSet {
    pub fn none() -> Self {
        DepartmentSet::Only(BTreeSet::new())
    }

    pub fn single(department: impl Into<String>) -> Self {
        DepartmentSet::Only(BTreeSet::from([department.into()]))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, DepartmentSet::All)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DepartmentSet::All => false,
            DepartmentSet::Only(set) => set.is_empty(),
        }
    }

    pub fn contains(&self, department: &str) -> bool {
        match self {
            DepartmentSet::All => true,
            DepartmentSet::Only(set) => set.contains(department),
        }
    }

    /// Keeps the departments of `known` visible through this set.
    pub fn restrict<I, S>(&self, known: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        known
            .into_iter()
            .map(Into::into)
            .filter(|d| self.contains(d))
            .collect()
    }
}

/// Resolves which departments `principal` can see.
pub fn accessible_departments(principal: &Principal) -> DepartmentSet {
    match principal.role {
        Role::Admin | Role::Hr => DepartmentSet::All,
        Role::DepartmentHead => match principal.managed_department.as_deref() {
            Some(dept) => DepartmentSet::single(dept),
            None => DepartmentSet::none(),
        },
        Role::Employee => DepartmentSet::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn admin_and_hr_see_all_departments() {
        for role in [Role::Admin, Role::Hr] {
            let principal = Principal::new(Uuid::new_v4(), role);
            assert_eq!(accessible_departments(&principal), DepartmentSet::All);
        }
    }

    #[test]
    fn department_head_sees_only_managed_department() {
        let principal = Principal::new(Uuid::new_v4(), Role::DepartmentHead)
            .with_department("Finance")
            .with_managed_department("IT");
        let set = accessible_departments(&principal);

        assert_eq!(set, DepartmentSet::single("IT"));
        assert!(set.contains("IT"));
        assert!(!set.contains("Finance"));
    }

    #[test]
    fn department_head_without_managed_department_sees_nothing() {
        let principal = Principal::new(Uuid::new_v4(), Role::DepartmentHead).with_department("IT");
        let set = accessible_departments(&principal);

        assert_eq!(set, DepartmentSet::none());
        assert!(set.is_empty());
    }

    #[test]
    fn employee_has_no_department_visibility() {
        let principal = Principal::new(Uuid::new_v4(), Role::Employee).with_department("IT");
        assert!(accessible_departments(&principal).is_empty());
    }

    #[test]
    fn restrict_filters_known_departments() {
        let known = ["HR", "IT", "Sales"];
        assert_eq!(DepartmentSet::All.restrict(known), vec!["HR", "IT", "Sales"]);
        assert_eq!(DepartmentSet::single("IT").restrict(known), vec!["IT"]);
        assert!(DepartmentSet::none().restrict(known).is_empty());
    }
}
