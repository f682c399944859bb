use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "PENDING",
            AssignmentStatus::Submitted => "SUBMITTED",
            AssignmentStatus::Approved => "APPROVED",
            AssignmentStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "PENDING" => Ok(AssignmentStatus::Pending),
            "SUBMITTED" => Ok(AssignmentStatus::Submitted),
            "APPROVED" => Ok(AssignmentStatus::Approved),
            "REJECTED" => Ok(AssignmentStatus::Rejected),
            other => Err(AppError::internal(format!("invalid assignment status: {other}"))),
        }
    }

    /// Uploads are accepted until a submission has been approved.
    pub fn accepts_uploads(&self) -> bool {
        !matches!(self, AssignmentStatus::Approved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Assignment {
    pub id: Uuid,
    pub request_id: Uuid,
    pub employee_id: Uuid,
    pub status: AssignmentStatus,
    pub review_note: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Assignment {
    fn entity_type() -> &'static str { "assignment" }
    fn subject_id(&self) -> Uuid { self.id }
}

pub(crate) const ASSIGNMENT_COLUMNS: &str = "id, request_id, employee_id, status, review_note, submitted_at, reviewed_at, reviewed_by_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbAssignment {
    pub id: Uuid,
    pub request_id: Uuid,
    pub employee_id: Uuid,
    pub status: String,
    pub review_note: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAssignment> for Assignment {
    type Error = AppError;

    fn try_from(value: DbAssignment) -> Result<Self, Self::Error> {
        Ok(Assignment {
            id: value.id,
            request_id: value.request_id,
            employee_id: value.employee_id,
            status: AssignmentStatus::parse(&value.status)?,
            review_note: value.review_note,
            submitted_at: value.submitted_at,
            reviewed_at: value.reviewed_at,
            reviewed_by_id: value.reviewed_by_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Targets for new assignments. A department expands to its active users.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignmentCreateRequest {
    #[serde(default)]
    pub employee_ids: Vec<Uuid>,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignmentCreateResponse {
    pub created: Vec<Assignment>,
    /// Employees that already had an assignment on this request.
    pub skipped: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn outcome(&self) -> AssignmentStatus {
        match self {
            ReviewDecision::Approve => AssignmentStatus::Approved,
            ReviewDecision::Reject => AssignmentStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[schema(example = "Document is expired, please upload a recent one.")]
    pub note: Option<String>,
}
