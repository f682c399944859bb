use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{allow, require_role, ResourceDescriptor};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::MaybePrincipal;
use crate::models::assignment::{
    Assignment, AssignmentCreateRequest, AssignmentCreateResponse, AssignmentStatus, DbAssignment, ReviewRequest,
    ASSIGNMENT_COLUMNS,
};
use crate::models::request::{DbDocumentRequest, RequestStatus};
use crate::routes::requests::{ensure_record_access, fetch_assignments, fetch_request};
use crate::utils::utc_now;

/// An assignment together with the request it belongs to.
pub(crate) struct AssignmentContext {
    pub assignment: DbAssignment,
    pub request: DbDocumentRequest,
}

impl AssignmentContext {
    pub async fn load(pool: &SqlitePool, assignment_id: Uuid) -> AppResult<Self> {
        let assignment = sqlx::query_as::<_, DbAssignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?"
        ))
        .bind(assignment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("assignment not found"))?;

        let request = fetch_request(pool, assignment.request_id).await?;

        Ok(Self { assignment, request })
    }

    /// Creator and processor come from the request; the only target is the assignee.
    pub fn descriptor(&self) -> ResourceDescriptor {
        self.request.descriptor([self.assignment.employee_id])
    }

    pub fn status(&self) -> AppResult<AssignmentStatus> {
        AssignmentStatus::parse(&self.assignment.status)
    }
}

/// Assigns a request to employees, directly or through a department.
#[utoipa::path(
    post,
    path = "/requests/{id}/assignments",
    tag = "Assignments",
    params(("id" = Uuid, Path, description = "Request id")),
    request_body = AssignmentCreateRequest,
    responses(
        (status = 201, description = "Assignments created", body = AssignmentCreateResponse),
        (status = 400, description = "No valid targets"),
        (status = 403, description = "Not allowed to assign this request"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is closed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_assignments(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<AssignmentCreateRequest>,
) -> AppResult<(StatusCode, Json<AssignmentCreateResponse>)> {
    let principal = require_role(principal.as_ref(), allow::STAFF)?;

    let request = fetch_request(&state.pool, request_id).await?;
    let existing = fetch_assignments(&state.pool, request_id).await?;
    let descriptor = request.descriptor(existing.iter().map(|a| a.employee_id));
    ensure_record_access(&state, principal, &descriptor)?;

    if RequestStatus::parse(&request.status)? == RequestStatus::Closed {
        return Err(AppError::conflict("request is closed"));
    }

    let targets = resolve_targets(&state.pool, &payload).await?;
    if targets.is_empty() {
        return Err(AppError::bad_request("no employees to assign"));
    }

    let already: HashSet<Uuid> = descriptor.employee_target_ids;
    let (mut skipped, fresh): (Vec<Uuid>, Vec<Uuid>) = targets.into_iter().partition(|id| already.contains(id));

    let now = utc_now();
    let mut tx = state.pool.begin().await?;
    let mut created_ids = Vec::with_capacity(fresh.len());
    for employee_id in fresh {
        let id = Uuid::new_v4();
        // a concurrent call may have assigned the same employee in the meantime
        let inserted = sqlx::query(
            "INSERT INTO assignments (id, request_id, employee_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (request_id, employee_id) DO NOTHING",
        )
        .bind(id)
        .bind(request_id)
        .bind(employee_id)
        .bind(AssignmentStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            skipped.push(employee_id);
        } else {
            created_ids.push(id);
        }
    }
    tx.commit().await?;

    let created = fetch_assignments(&state.pool, request_id)
        .await?
        .into_iter()
        .filter(|a| created_ids.contains(&a.id))
        .map(Assignment::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let context = RequestContext::from_headers(&headers);
    for assignment in &created {
        log_activity_with_context(
            &state.event_bus,
            "created",
            Some(principal.id),
            assignment,
            None,
            Some(context.clone()),
        );
    }

    tracing::info!(
        request_id = %request_id,
        created = created.len(),
        skipped = skipped.len(),
        "assignments created"
    );

    Ok((StatusCode::CREATED, Json(AssignmentCreateResponse { created, skipped })))
}

#[utoipa::path(
    get,
    path = "/assignments/{id}",
    tag = "Assignments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment detail", body = Assignment),
        (status = 403, description = "No relationship to the assignment"),
        (status = 404, description = "Assignment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_assignment(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Assignment>> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;

    let ctx = AssignmentContext::load(&state.pool, id).await?;
    ensure_record_access(&state, principal, &ctx.descriptor())?;

    Ok(Json(ctx.assignment.try_into()?))
}

/// Approves or rejects a submitted assignment.
#[utoipa::path(
    post,
    path = "/assignments/{id}/review",
    tag = "Assignments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Assignment reviewed", body = Assignment),
        (status = 403, description = "Not allowed to review"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Nothing submitted to review")
    ),
    security(("bearerAuth" = []))
)]
pub async fn review_assignment(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<Json<Assignment>> {
    let principal = require_role(principal.as_ref(), allow::STAFF)?;

    let ctx = AssignmentContext::load(&state.pool, id).await?;
    ensure_record_access(&state, principal, &ctx.descriptor())?;

    if ctx.status()? != AssignmentStatus::Submitted {
        return Err(AppError::conflict(format!(
            "assignment is {}, only SUBMITTED assignments can be reviewed",
            ctx.assignment.status
        )));
    }

    let outcome = payload.decision.outcome();
    let note = payload.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let now = utc_now();

    let affected = sqlx::query(
        "UPDATE assignments SET status = ?, review_note = ?, reviewed_at = ?, reviewed_by_id = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(outcome.as_str())
    .bind(note)
    .bind(now)
    .bind(principal.id)
    .bind(now)
    .bind(id)
    .bind(AssignmentStatus::Submitted.as_str())
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::conflict("assignment was reviewed concurrently"));
    }

    let before: Assignment = ctx.assignment.try_into()?;
    let after: Assignment = AssignmentContext::load(&state.pool, id).await?.assignment.try_into()?;

    let action = match outcome {
        AssignmentStatus::Approved => "approved",
        _ => "rejected",
    };
    log_activity_with_context(
        &state.event_bus,
        action,
        Some(principal.id),
        &after,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(after))
}

/// Explicit employees plus active users of the given department, deduplicated.
async fn resolve_targets(pool: &SqlitePool, payload: &AssignmentCreateRequest) -> AppResult<Vec<Uuid>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for id in &payload.employee_ids {
        let active: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(*id)
            .fetch_one(pool)
            .await?;
        if active == 0 {
            return Err(AppError::bad_request(format!("employee {id} does not exist")));
        }
        if seen.insert(*id) {
            targets.push(*id);
        }
    }

    if let Some(department) = payload.department.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        let members: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE department = ? AND deleted_at IS NULL ORDER BY name")
                .bind(department)
                .fetch_all(pool)
                .await?;
        if members.is_empty() {
            return Err(AppError::bad_request(format!("department {department} has no active users")));
        }
        for id in members {
            if seen.insert(id) {
                targets.push(id);
            }
        }
    }

    Ok(targets)
}
