use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepartmentList {
    /// True when the caller is not restricted to specific departments.
    pub unrestricted: bool,
    pub departments: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepartmentRegisterRequest {
    #[schema(example = "Legal")]
    pub name: String,
}

/// Registration is advisory: nothing is stored until a user carries the name.
#[derive(Debug, Serialize, ToSchema)]
pub struct DepartmentRegisterResponse {
    pub name: String,
    pub persisted: bool,
    pub message: String,
}
