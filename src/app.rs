use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AccessPolicy, DefaultAccessPolicy};
use crate::docs;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiter};
use crate::routes::{assignments, attachments, auth, departments, health, requests, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub policy: Arc<dyn AccessPolicy>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        let (event_bus, _) = init_event_bus();
        Self {
            pool,
            jwt: Arc::new(jwt),
            policy: Arc::new(DefaultAccessPolicy::new()),
            rate_limiter,
            event_bus,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let rate_limit = RateLimitConfig::from_env()?;
    tracing::debug!(
        max_requests = rate_limit.max_requests,
        window_secs = rate_limit.window.as_secs(),
        "rate limiter configured"
    );

    let state = AppState::new(pool, jwt_config, Arc::new(InMemoryRateLimiter::new(rate_limit)));
    Ok(create_app_with_state(state).await)
}

/// Builds the router around a prepared state and starts the activity listener.
pub async fn create_app_with_state(state: AppState) -> Router {
    tokio::spawn(start_activity_listener(state.event_bus.subscribe(), state.pool.clone()));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/role", put(users::update_role));

    let department_routes = Router::new().route(
        "/",
        get(departments::list_departments).post(departments::register_department),
    );

    let request_routes = Router::new()
        .route("/", get(requests::list_requests).post(requests::create_request))
        .route(
            "/:id",
            get(requests::get_request)
                .put(requests::update_request)
                .delete(requests::delete_request),
        )
        .route("/:id/assignments", post(assignments::create_assignments));

    let assignment_routes = Router::new()
        .route("/:id", get(assignments::get_assignment))
        .route(
            "/:id/attachments",
            get(attachments::list_attachments).post(attachments::upload_attachment),
        )
        .route("/:id/review", post(assignments::review_assignment));

    let attachment_routes = Router::new().route("/:id", get(attachments::download_attachment));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/departments", department_routes)
        .nest("/requests", request_routes)
        .nest("/assignments", assignment_routes)
        .nest("/attachments", attachment_routes)
        .with_state(state)
        .merge(docs::swagger_routes(docs::build_openapi(port)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
