use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{allow, require_role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::MaybePrincipal;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::attachment::{Attachment, AttachmentUploadRequest, ATTACHMENT_COLUMNS};
use crate::models::request::RequestStatus;
use crate::rate_limit;
use crate::routes::assignments::AssignmentContext;
use crate::routes::requests::ensure_record_access;
use crate::utils::{non_empty, utc_now};

/// Registers an uploaded document against an assignment and marks it submitted.
#[utoipa::path(
    post,
    path = "/assignments/{id}/attachments",
    tag = "Attachments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    request_body = AttachmentUploadRequest,
    responses(
        (status = 201, description = "Attachment stored", body = Attachment),
        (status = 400, description = "Invalid metadata"),
        (status = 403, description = "Not a participant of the assignment"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Assignment already approved or request closed"),
        (status = 429, description = "Too many uploads")
    ),
    security(("bearerAuth" = []))
)]
pub async fn upload_attachment(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(assignment_id): Path<Uuid>,
    Json(payload): Json<AttachmentUploadRequest>,
) -> AppResult<(StatusCode, Json<Attachment>)> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;
    rate_limit::enforce(state.rate_limiter.as_ref(), &format!("upload:{}", principal.id)).await?;

    let ctx = AssignmentContext::load(&state.pool, assignment_id).await?;
    ensure_record_access(&state, principal, &ctx.descriptor())?;

    if RequestStatus::parse(&ctx.request.status)? == RequestStatus::Closed {
        return Err(AppError::conflict("request is closed"));
    }
    if !ctx.status()?.accepts_uploads() {
        return Err(AppError::conflict("assignment is already approved"));
    }

    let file_name = non_empty(&payload.file_name, "file_name")?;
    let content_type = non_empty(&payload.content_type, "content_type")?;
    let storage_key = non_empty(&payload.storage_key, "storage_key")?;
    if payload.size_bytes < 0 {
        return Err(AppError::bad_request("size_bytes must not be negative"));
    }

    let now = utc_now();
    let attachment = Attachment {
        id: Uuid::new_v4(),
        assignment_id,
        uploaded_by_id: principal.id,
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        size_bytes: payload.size_bytes,
        storage_key: storage_key.to_string(),
        created_at: now,
    };

    let mut tx = state.pool.begin().await?;

    // A review may have approved the assignment since it was loaded.
    let moved = sqlx::query(
        "UPDATE assignments SET status = ?, submitted_at = ?, updated_at = ? WHERE id = ? AND status IN (?, ?, ?)",
    )
    .bind(AssignmentStatus::Submitted.as_str())
    .bind(now)
    .bind(now)
    .bind(assignment_id)
    .bind(AssignmentStatus::Pending.as_str())
    .bind(AssignmentStatus::Submitted.as_str())
    .bind(AssignmentStatus::Rejected.as_str())
    .execute(&mut *tx)
    .await?;

    if moved.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::conflict("assignment is already approved"));
    }

    sqlx::query(
        "INSERT INTO attachments (id, assignment_id, uploaded_by_id, file_name, content_type, size_bytes, storage_key, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(attachment.id)
    .bind(attachment.assignment_id)
    .bind(attachment.uploaded_by_id)
    .bind(&attachment.file_name)
    .bind(&attachment.content_type)
    .bind(attachment.size_bytes)
    .bind(&attachment.storage_key)
    .bind(attachment.created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let context = RequestContext::from_headers(&headers);
    log_activity_with_context(
        &state.event_bus,
        "uploaded",
        Some(principal.id),
        &attachment,
        None,
        Some(context.clone()),
    );

    let before: Assignment = ctx.assignment.try_into()?;
    let after: Assignment = AssignmentContext::load(&state.pool, assignment_id)
        .await?
        .assignment
        .try_into()?;
    log_activity_with_context(
        &state.event_bus,
        "submitted",
        Some(principal.id),
        &after,
        Some(&before),
        Some(context),
    );

    Ok((StatusCode::CREATED, Json(attachment)))
}

#[utoipa::path(
    get,
    path = "/assignments/{id}/attachments",
    tag = "Attachments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Attachments of the assignment", body = [Attachment]),
        (status = 403, description = "No relationship to the assignment"),
        (status = 404, description = "Assignment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_attachments(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(assignment_id): Path<Uuid>,
) -> AppResult<Json<Vec<Attachment>>> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;

    let ctx = AssignmentContext::load(&state.pool, assignment_id).await?;
    ensure_record_access(&state, principal, &ctx.descriptor())?;

    let attachments = sqlx::query_as::<_, Attachment>(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE assignment_id = ? ORDER BY created_at"
    ))
    .bind(assignment_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(attachments))
}

/// Returns the download descriptor of an attachment.
///
/// Unlike request and assignment records, any HR user or department head may
/// download attachments.
#[utoipa::path(
    get,
    path = "/attachments/{id}",
    tag = "Attachments",
    params(("id" = Uuid, Path, description = "Attachment id")),
    responses(
        (status = 200, description = "Attachment metadata and storage key", body = Attachment),
        (status = 403, description = "Not allowed to download"),
        (status = 404, description = "Attachment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn download_attachment(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Attachment>> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;

    let attachment = sqlx::query_as::<_, Attachment>(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("attachment not found"))?;

    let ctx = AssignmentContext::load(&state.pool, attachment.assignment_id).await?;
    if !state.policy.can_access_attachment(principal, &ctx.descriptor()) {
        tracing::info!(user_id = %principal.id, role = %principal.role, attachment_id = %id, "attachment access denied");
        return Err(AppError::forbidden("no access to this attachment"));
    }

    log_activity_with_context(
        &state.event_bus,
        "downloaded",
        Some(principal.id),
        &attachment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(attachment))
}
