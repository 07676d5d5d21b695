use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::state::AppState;
use triage_service::{Error as ServiceError, HealthReport, RagRequest, RagResponse};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/multiagent-rag", post(multiagent_rag))
		.route("/debug/routing", post(debug_routing))
		.route("/health", get(health))
		.with_state(state)
}

async fn multiagent_rag(
	State(state): State<AppState>,
	Json(payload): Json<RagRequest>,
) -> Result<Json<RagResponse>, ApiError> {
	let response = state.service.process_query(payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct DebugRoutingResponse {
	query: String,
	user_can_wait: bool,
	production_incident: bool,
	routing_decision: String,
	routing_reasoning: String,
	timestamp: String,
}

async fn debug_routing(
	State(state): State<AppState>,
	Json(payload): Json<RagRequest>,
) -> Result<Json<DebugRoutingResponse>, ApiError> {
	let plan = state.service.routing_decision(&payload).await?;

	Ok(Json(DebugRoutingResponse {
		query: payload.query,
		user_can_wait: payload.user_can_wait,
		production_incident: payload.production_incident,
		routing_decision: plan.strategy.as_str().to_string(),
		routing_reasoning: plan.reasoning,
		timestamp: now_rfc3339(),
	}))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
	service: &'static str,
	version: &'static str,
	timestamp: String,
	#[serde(flatten)]
	report: HealthReport,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		service: "triage-api",
		version: env!("CARGO_PKG_VERSION"),
		timestamp: now_rfc3339(),
		report: state.service.health().await,
	})
}

fn now_rfc3339() -> String {
	OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				Self { status: StatusCode::BAD_REQUEST, error_code: "invalid_request", message },
			ServiceError::StrategyFailed { .. }
			| ServiceError::Provider { .. }
			| ServiceError::Storage { .. }
			| ServiceError::Qdrant { .. } => Self {
				status: StatusCode::SERVICE_UNAVAILABLE,
				error_code: "retrieval_unavailable",
				message: err.to_string(),
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code.to_string(), message: self.message };

		(self.status, Json(body)).into_response()
	}
}
