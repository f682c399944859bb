//! Departments are not stored on their own; a department exists while at least
//! one active user carries its name (as member or as department head).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::{allow, require_role};
use crate::errors::{AppError, AppResult};
use crate::jwt::MaybePrincipal;
use crate::models::department::{DepartmentList, DepartmentRegisterRequest, DepartmentRegisterResponse};
use crate::utils::non_empty;

#[utoipa::path(
    get,
    path = "/departments",
    tag = "Departments",
    responses(
        (status = 200, description = "Departments visible to the caller", body = DepartmentList),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_departments(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
) -> AppResult<Json<DepartmentList>> {
    let principal = require_role(principal.as_ref(), allow::ANY)?;
    let visible = state.policy.accessible_departments(principal);

    let known = known_departments(&state.pool).await?;

    Ok(Json(DepartmentList {
        unrestricted: visible.is_all(),
        departments: visible.restrict(known),
    }))
}

/// Validates a new department name. Nothing is persisted.
#[utoipa::path(
    post,
    path = "/departments",
    tag = "Departments",
    request_body = DepartmentRegisterRequest,
    responses(
        (status = 202, description = "Name accepted; it becomes visible once a user is assigned to it", body = DepartmentRegisterResponse),
        (status = 400, description = "Empty name"),
        (status = 403, description = "Role not allowed"),
        (status = 409, description = "Department already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn register_department(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    Json(payload): Json<DepartmentRegisterRequest>,
) -> AppResult<(StatusCode, Json<DepartmentRegisterResponse>)> {
    let principal = require_role(principal.as_ref(), allow::STAFF)?;
    let name = non_empty(&payload.name, "name")?;

    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE (department = ? OR managed_department = ?) AND deleted_at IS NULL")
        .bind(name)
        .bind(name)
        .fetch_one(&state.pool)
        .await?;

    if in_use > 0 {
        return Err(AppError::conflict(format!("department {name} already exists")));
    }

    tracing::info!(actor_id = %principal.id, department = %name, "department registration accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DepartmentRegisterResponse {
            name: name.to_string(),
            persisted: false,
            message: "Department accepted. Assign a user to it to make it visible.".to_string(),
        }),
    ))
}

async fn known_departments(pool: &SqlitePool) -> AppResult<Vec<String>> {
    let departments = sqlx::query_scalar::<_, String>(
        "SELECT department FROM users WHERE department IS NOT NULL AND department <> '' AND deleted_at IS NULL \
         UNION \
         SELECT managed_department FROM users WHERE managed_department IS NOT NULL AND managed_department <> '' AND deleted_at IS NULL \
         ORDER BY 1",
    )
    .fetch_all(pool)
    .await?;

    Ok(departments)
}
