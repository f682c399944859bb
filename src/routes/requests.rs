use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{allow, require_role, DepartmentSet, Principal, ResourceDescriptor, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::MaybePrincipal;
use crate::models::assignment::{Assignment, DbAssignment, ASSIGNMENT_COLUMNS};
use crate::models::request::{
    DbDocumentRequest, DocumentRequest, DocumentRequestCreateRequest, DocumentRequestDetail,
    DocumentRequestUpdateRequest, RequestStatus, REQUEST_COLUMNS,
};
use crate::models::user::DbUser;
use crate::utils::{non_empty, utc_now};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestListQuery {
    /// Only requests in this status.
    pub status: Option<RequestStatus>,
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "Requests",
    request_body = DocumentRequestCreateRequest,
    responses(
        (status = 201, description = "Request created", body = DocumentRequest),
        (status = 400, description = "Invalid input or processor is not HR"),
        (status = 403, description = "Only HR and admins create requests")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_request(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Json(payload): Json<DocumentRequestCreateRequest>,
) -> AppResult<(StatusCode, Json<DocumentRequest>)> {
    let principal = require_role(principal.as_ref(), allow::STAFF)?;

    let title = non_empty(&payload.title, "title")?;
    let document_type = non_empty(&payload.document_type, "document_type")?;
    let department = payload.department.as_deref().map(str::trim).filter(|d| !d.is_empty());

    let assigned_to_id = match payload.assigned_to_id {
        Some(id) => {
            ensure_processor(&state.pool, id).await?;
            Some(id)
        }
        None if principal.has_role(Role::Hr) => Some(principal.id),
        None => None,
    };

    let now = utc_now();
    let request_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO document_requests (id, title, description, document_type, created_by_id, assigned_to_id, department, due_date, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(request_id)
    .bind(title)
    .bind(&payload.description)
    .bind(document_type)
    .bind(principal.id)
    .bind(assigned_to_id)
    .bind(department)
    .bind(payload.due_date)
    .bind(RequestStatus::Open.as_str())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let request: DocumentRequest = fetch_request(&state.pool, request_id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(principal.id),
        &request,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(request)))
}

/// Lists requests visible to the caller.
///
/// HR and admins see everything. Everyone else sees requests they created, were
/// routed to, or are targeted by, plus requests aimed at a department they can see.
#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    params(RequestListQuery),
    responses((status = 200, description = "Visible requests", body = [DocumentRequest])),
    security(("bearerAuth" = []))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Query(query): Query<RequestListQuery>,
) -> AppResult<Json<Vec<DocumentRequest>>> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;
    let visible = state.policy.accessible_departments(principal);

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {REQUEST_COLUMNS} FROM document_requests WHERE deleted_at IS NULL"
    ));

    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }

    if let DepartmentSet::Only(names) = &visible {
        builder
            .push(" AND (created_by_id = ")
            .push_bind(principal.id)
            .push(" OR assigned_to_id = ")
            .push_bind(principal.id)
            .push(" OR id IN (SELECT request_id FROM assignments WHERE employee_id = ")
            .push_bind(principal.id)
            .push(")");

        if !names.is_empty() {
            builder.push(" OR department IN (");
            let mut separated = builder.separated(", ");
            for name in names {
                separated.push_bind(name.as_str());
            }
            separated.push_unseparated(")");
        }
        builder.push(")");
    }

    builder.push(" ORDER BY created_at DESC");

    let requests = builder
        .build_query_as::<DbDocumentRequest>()
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(DocumentRequest::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(requests))
}

#[utoipa::path(
    get,
    path = "/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 200, description = "Request with its assignments", body = DocumentRequestDetail),
        (status = 403, description = "No relationship to the request"),
        (status = 404, description = "Request not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_request(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DocumentRequestDetail>> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;

    let request = fetch_request(&state.pool, id).await?;
    let assignments = fetch_assignments(&state.pool, id).await?;
    let descriptor = request.descriptor(assignments.iter().map(|a| a.employee_id));

    ensure_record_access(&state, principal, &descriptor)?;

    let assignments = assignments
        .into_iter()
        .map(Assignment::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(DocumentRequestDetail {
        request: request.try_into()?,
        assignments,
    }))
}

#[utoipa::path(
    put,
    path = "/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = DocumentRequestUpdateRequest,
    responses(
        (status = 200, description = "Request updated", body = DocumentRequest),
        (status = 403, description = "Not allowed to update this request"),
        (status = 404, description = "Request not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_request(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentRequestUpdateRequest>,
) -> AppResult<Json<DocumentRequest>> {
    let principal = require_role(principal.as_ref(), allow::STAFF)?;

    let mut request = fetch_request(&state.pool, id).await?;
    let descriptor = request_descriptor(&state.pool, &request).await?;
    ensure_record_access(&state, principal, &descriptor)?;

    let before: DocumentRequest = request.clone().try_into()?;

    if let Some(title) = payload.title.as_deref() {
        request.title = non_empty(title, "title")?.to_string();
    }
    if payload.description.is_some() {
        request.description = payload.description.clone();
    }
    if let Some(assigned_to_id) = payload.assigned_to_id {
        ensure_processor(&state.pool, assigned_to_id).await?;
        request.assigned_to_id = Some(assigned_to_id);
    }
    if payload.due_date.is_some() {
        request.due_date = payload.due_date;
    }
    if let Some(status) = payload.status {
        request.status = status.as_str().to_string();
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE document_requests SET title = ?, description = ?, assigned_to_id = ?, due_date = ?, status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.assigned_to_id)
    .bind(request.due_date)
    .bind(&request.status)
    .bind(now)
    .bind(id)
    .execute(&state.pool)
    .await?;

    request.updated_at = now;
    let request: DocumentRequest = request.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(principal.id),
        &request,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(request))
}

/// Soft-deletes a request. Only its creator or an admin may do this.
#[utoipa::path(
    delete,
    path = "/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "Request id")),
    responses(
        (status = 204, description = "Request deleted"),
        (status = 403, description = "Only the creator or an admin can delete"),
        (status = 404, description = "Request not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_request(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;

    let request = fetch_request(&state.pool, id).await?;
    if !principal.is_admin() && request.created_by_id != principal.id {
        return Err(AppError::forbidden("only the creator or an admin can delete a request"));
    }

    let now = utc_now();
    let affected = sqlx::query("UPDATE document_requests SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("request not found"));
    }

    let request: DocumentRequest = request.try_into()?;
    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(principal.id),
        &request,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn ensure_record_access(
    state: &AppState,
    principal: &Principal,
    descriptor: &ResourceDescriptor,
) -> AppResult<()> {
    if state.policy.can_access_request_record(principal, descriptor) {
        return Ok(());
    }
    tracing::info!(user_id = %principal.id, role = %principal.role, "record access denied");
    Err(AppError::forbidden("no access to this request"))
}

pub(crate) async fn fetch_request(pool: &SqlitePool, id: Uuid) -> AppResult<DbDocumentRequest> {
    sqlx::query_as::<_, DbDocumentRequest>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM document_requests WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("request not found"))
}

pub(crate) async fn fetch_assignments(pool: &SqlitePool, request_id: Uuid) -> AppResult<Vec<DbAssignment>> {
    let rows = sqlx::query_as::<_, DbAssignment>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE request_id = ? ORDER BY created_at"
    ))
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub(crate) async fn request_descriptor(pool: &SqlitePool, request: &DbDocumentRequest) -> AppResult<ResourceDescriptor> {
    let targets: Vec<Uuid> = sqlx::query_scalar("SELECT employee_id FROM assignments WHERE request_id = ?")
        .bind(request.id)
        .fetch_all(pool)
        .await?;

    Ok(request.descriptor(targets))
}

/// The processor of a request must be an active HR user or admin.
async fn ensure_processor(pool: &SqlitePool, user_id: Uuid) -> AppResult<()> {
    let user = DbUser::find_active(pool, user_id)
        .await?
        .ok_or_else(|| AppError::bad_request("assigned_to_id does not refer to an active user"))?;

    match user.role()? {
        Role::Hr | Role::Admin => Ok(()),
        other => Err(AppError::bad_request(format!(
            "assigned_to_id must be an HR user or admin, got {other}"
        ))),
    }
}
