//! Authorization - access decision engine
//!
//! Pure, synchronous decisions over an authenticated [`Principal`]:
//! - department visibility for list filters ([`accessible_departments`])
//! - record-level access for requests and assignments (rules 1-4)
//! - attachment access, which also admits HR and department heads (rules 1-5)
//! - coarse role gating ([`require_role`])
//!
//! Nothing here touches storage or HTTP. Handlers project persisted rows into a
//! [`ResourceDescriptor`] and translate `false` / [`DenyReason`] into responses.

mod departments;
mod evaluator;
mod guard;
mod principal;

pub use departments::{accessible_departments, DepartmentSet};
pub use evaluator::{
    can_access_attachment, can_access_request_record, AccessPolicy, AccessRule, AccessScope, DefaultAccessPolicy,
};
pub use guard::{allow, require_role, DenyReason};
pub use principal::{Principal, ResourceDescriptor, Role, UnknownRole};
