use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use pandu_service::{
	SearchRequest, SearchResponse, ServiceError,
	golden::{AddRouteRequest, AddRouteResponse, RouteMatch, RouteRequest},
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/route", post(route))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/add_route", post(add_route))
		.route("/v1/admin/reload_routes", post(reload_routes))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn route(
	State(state): State<AppState>,
	Json(payload): Json<RouteRequest>,
) -> Result<Json<Option<RouteMatch>>, ApiError> {
	let response = state.service.route(payload).await?;

	Ok(Json(response))
}

async fn add_route(
	State(state): State<AppState>,
	Json(payload): Json<AddRouteRequest>,
) -> Result<Json<AddRouteResponse>, ApiError> {
	let response = state.service.add_route(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
	total_routes: usize,
}

async fn reload_routes(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
	let total_routes = state.service.reload_routes().await?;

	Ok(Json(ReloadResponse { total_routes }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidRequest { .. } =>
				(StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::ServiceUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
		};

		Self { status, error_code: error_code.to_string(), message: err.to_string() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
