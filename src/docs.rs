use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::users::list_users,
		routes::users::update_role,
		routes::departments::list_departments,
		routes::departments::register_department,
		routes::requests::create_request,
		routes::requests::list_requests,
		routes::requests::get_request,
		routes::requests::update_request,
		routes::requests::delete_request,
		routes::assignments::create_assignments,
		routes::assignments::get_assignment,
		routes::assignments::review_assignment,
		routes::attachments::upload_attachment,
		routes::attachments::list_attachments,
		routes::attachments::download_attachment
	),
	components(
		schemas(
			authz::Role,
			routes::health::HealthResponse,
			routes::auth::MessageResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::RoleUpdateRequest,
			models::department::DepartmentList,
			models::department::DepartmentRegisterRequest,
			models::department::DepartmentRegisterResponse,
			models::request::RequestStatus,
			models::request::DocumentRequest,
			models::request::DocumentRequestDetail,
			models::request::DocumentRequestCreateRequest,
			models::request::DocumentRequestUpdateRequest,
			models::assignment::AssignmentStatus,
			models::assignment::Assignment,
			models::assignment::AssignmentCreateRequest,
			models::assignment::AssignmentCreateResponse,
			models::assignment::ReviewDecision,
			models::assignment::ReviewRequest,
			models::attachment::Attachment,
			models::attachment::AttachmentUploadRequest
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Users", description = "User directory and role management"),
		(name = "Departments", description = "Department visibility"),
		(name = "Requests", description = "Document requests"),
		(name = "Assignments", description = "Per-employee request assignments and review"),
		(name = "Attachments", description = "Uploaded documents")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(
				HttpBuilder::new()
					.scheme(HttpAuthScheme::Bearer)
					.bearer_format("JWT")
					.build(),
			),
		);
	}
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	let server_url = format!("http://localhost:{port}");

	let servers = doc.servers.get_or_insert_with(Vec::new);
	if !servers.iter().any(|server| server.url == server_url) {
		servers.push(Server::new(server_url));
	}

	doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc = Arc::new(doc);
	let json_route = get(move || {
		let doc = Arc::clone(&doc);
		async move { Json((*doc).clone()) }
	});

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}
