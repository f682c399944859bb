use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Metadata of a document uploaded against an assignment.
/// The bytes live in the external store under `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Attachment {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub uploaded_by_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

impl crate::events::Loggable for Attachment {
    fn entity_type() -> &'static str { "attachment" }
    fn subject_id(&self) -> Uuid { self.id }
}

pub(crate) const ATTACHMENT_COLUMNS: &str =
    "id, assignment_id, uploaded_by_id, file_name, content_type, size_bytes, storage_key, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachmentUploadRequest {
    #[schema(example = "passport.pdf")]
    pub file_name: String,
    #[schema(example = "application/pdf")]
    pub content_type: String,
    #[schema(example = 482113)]
    pub size_bytes: i64,
    #[schema(example = "uploads/2026/10/3f2a9c.pdf")]
    pub storage_key: String,
}
