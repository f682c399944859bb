use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{allow, require_role, DepartmentSet, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::MaybePrincipal;
use crate::models::user::{DbUser, RoleUpdateRequest, User, USER_COLUMNS};
use crate::routes::auth::fetch_user_by_id;
use crate::utils::utc_now;

/// Lists active users in the departments the caller can see.
#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "Visible users", body = [User]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Role not allowed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, MaybePrincipal(principal): MaybePrincipal) -> AppResult<Json<Vec<User>>> {
    let principal = require_role(principal.as_ref(), allow::SUPERVISORS)?;
    let visible = state.policy.accessible_departments(principal);

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL"));

    if let DepartmentSet::Only(names) = &visible {
        if names.is_empty() {
            return Ok(Json(Vec::new()));
        }
        query.push(" AND department IN (");
        let mut separated = query.separated(", ");
        for name in names {
            separated.push_bind(name.as_str());
        }
        separated.push_unseparated(")");
    }
    query.push(" ORDER BY name");

    let users = query
        .build_query_as::<DbUser>()
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

/// Changes a user's role and department attributes.
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Department head without managed department"),
        (status = 403, description = "Only admins can change roles"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    MaybePrincipal(principal): MaybePrincipal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<User>> {
    let principal = require_role(principal.as_ref(), allow::ADMIN)?;

    let department = clean(payload.department);
    let managed_department = match payload.role {
        Role::DepartmentHead => Some(
            clean(payload.managed_department)
                .ok_or_else(|| AppError::bad_request("managed_department is required for DEPARTMENT_HEAD"))?,
        ),
        _ => None,
    };

    let before: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;

    sqlx::query("UPDATE users SET role = ?, department = ?, managed_department = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(payload.role.as_str())
        .bind(&department)
        .bind(&managed_department)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await?;

    let after: User = fetch_user_by_id(&state.pool, id).await?.try_into()?;

    tracing::info!(
        actor_id = %principal.id,
        user_id = %id,
        from = %before.role,
        to = %after.role,
        "user role changed"
    );
    log_activity_with_context(
        &state.event_bus,
        "role_changed",
        Some(principal.id),
        &after,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(after))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
