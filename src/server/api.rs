use crate::agent::WorkflowAgent;
use crate::models::api::{ ErrorResponse, GenerateRequest, HealthResponse, CONVERSATION_ID_HEADER };
use std::convert::Infallible;
use std::sync::Arc;
use axum::{
    body::Body,
    extract::{ rejection::JsonRejection, State },
    http::{ header::CONTENT_TYPE, HeaderName, HeaderValue, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::StreamExt;
use tower_http::cors::{ Any, CorsLayer };
use log::{ error, info, warn };

pub const GENERATE_ROUTE: &str = "/api/generate-workflow-stream";

#[derive(Clone)]
struct AppState {
    agent: Arc<WorkflowAgent>,
}

pub fn build_router(agent: Arc<WorkflowAgent>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(CONVERSATION_ID_HEADER)]);

    Router::new()
        .route(GENERATE_ROUTE, post(generate_workflow_stream_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(AppState { agent })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

async fn generate_workflow_stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
        }
    };

    let prompt = match req.prompt.filter(|p| !p.is_empty()) {
        Some(prompt) => prompt,
        None => {
            return error_response(StatusCode::BAD_REQUEST, "Prompt is required");
        }
    };

    if let Some(id) = req.conversation_id.as_deref() {
        if HeaderValue::from_str(id).is_err() {
            return error_response(StatusCode::BAD_REQUEST, "Invalid conversation_id");
        }
    }

    let turn = match state.agent.start_turn(req.conversation_id.as_deref(), &prompt).await {
        Ok(turn) => turn,
        Err(e) => {
            error!("Failed to record prompt: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record prompt");
        }
    };
    info!(
        "Conversation {}: streaming reply over {} message(s)",
        turn.conversation_id,
        turn.messages.len()
    );

    let conversation_id = match HeaderValue::from_str(&turn.conversation_id) {
        Ok(value) => value,
        Err(e) => {
            error!("Conversation id '{}' is not a valid header: {}", turn.conversation_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid conversation id");
        }
    };

    let (body, _relay) = state.agent.stream_turn(turn).await;
    let body_stream = body.map(Ok::<String, Infallible>);

    let mut response = Response::new(Body::from_stream(body_stream));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(HeaderName::from_static(CONVERSATION_ID_HEADER), conversation_id);
    response
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let conversations = state.agent.history_store().len().await;
    Json(HealthResponse {
        status: "ok".into(),
        conversations,
    })
}
