use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::ResourceDescriptor;
use crate::errors::AppError;
use crate::models::assignment::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Open,
    Closed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "OPEN",
            RequestStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "OPEN" => Ok(RequestStatus::Open),
            "CLOSED" => Ok(RequestStatus::Closed),
            other => Err(AppError::internal(format!("invalid request status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentRequest {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub document_type: String,
    pub created_by_id: Uuid,
    /// HR user processing the request.
    pub assigned_to_id: Option<Uuid>,
    /// Department the request is aimed at, if any.
    pub department: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for DocumentRequest {
    fn entity_type() -> &'static str { "request" }
    fn subject_id(&self) -> Uuid { self.id }
}

pub(crate) const REQUEST_COLUMNS: &str = "id, title, description, document_type, created_by_id, assigned_to_id, department, due_date, status, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbDocumentRequest {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub document_type: String,
    pub created_by_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub department: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DbDocumentRequest {
    /// Descriptor for record-level checks; `targets` are the employees of its assignments.
    pub fn descriptor(&self, targets: impl IntoIterator<Item = Uuid>) -> ResourceDescriptor {
        ResourceDescriptor::new(self.created_by_id)
            .with_assigned_to(self.assigned_to_id)
            .with_targets(targets)
    }
}

impl TryFrom<DbDocumentRequest> for DocumentRequest {
    type Error = AppError;

    fn try_from(value: DbDocumentRequest) -> Result<Self, Self::Error> {
        Ok(DocumentRequest {
            id: value.id,
            title: value.title,
            description: value.description,
            document_type: value.document_type,
            created_by_id: value.created_by_id,
            assigned_to_id: value.assigned_to_id,
            department: value.department,
            due_date: value.due_date,
            status: RequestStatus::parse(&value.status)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentRequestDetail {
    #[serde(flatten)]
    pub request: DocumentRequest,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentRequestCreateRequest {
    #[schema(example = "Proof of address")]
    pub title: String,
    #[schema(example = "Utility bill or bank statement, issued within 3 months.")]
    pub description: Option<String>,
    #[schema(example = "PROOF_OF_ADDRESS")]
    pub document_type: String,
    /// HR processor. Defaults to the creator when the creator is HR.
    pub assigned_to_id: Option<Uuid>,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    #[schema(example = "2026-12-01")]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentRequestUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<RequestStatus>,
}
