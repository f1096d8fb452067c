//! HTTP API.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /email` | Send a welcome email synchronously |
//! | `GET /status` | Health check |
//! | `GET /swagger/doc.json` | OpenAPI document |

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use super::{task_span, BackendError};
use crate::processor::{ProcessingError, TaskProcessor};
use crate::task::TaskType;

#[derive(Clone)]
struct AppState {
    processor: Arc<TaskProcessor>,
    service: Arc<str>,
}

/// Build the API router.
pub fn create_router(processor: Arc<TaskProcessor>, service_name: &str) -> Router {
    let state = AppState {
        processor,
        service: Arc::from(service_name),
    };

    Router::new()
        .route("/email", post(send_email))
        .route("/status", get(status))
        .route("/swagger/doc.json", get(swagger_doc))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` until `shutdown` is cancelled.
///
/// In-flight requests get `grace` to finish; after that the server future is
/// dropped and remaining connections are closed.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), BackendError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, pid = std::process::id(), "HTTP server listening");
    }

    let signal = shutdown.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    tokio::pin!(server);

    let deadline = async {
        shutdown.cancelled().await;
        tracing::info!("signal caught, gracefully shutting down");
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = &mut server => result.map_err(BackendError::Io),
        _ = deadline => {
            tracing::warn!(grace_secs = grace.as_secs(), "shutdown grace period expired");
            Ok(())
        }
    }
}

/// Error body: `{"code": 400, "error": "Bad Request", "type": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    code: u16,
    error: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let error = status.canonical_reason().unwrap_or_default().to_string();
        let message = message.into();
        Self {
            status,
            code: status.as_u16(),
            kind: (!message.is_empty() && message != error).then_some(message),
            error,
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(e: ProcessingError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// POST /email - Body is a welcome email task.
async fn send_email(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<&'static str>, ApiError> {
    let task_type = TaskType::Welcome.as_str();
    state
        .processor
        .process(task_type, &body)
        .instrument(task_span("http", task_type))
        .await?;
    Ok(Json("Ok"))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    service: String,
    version: &'static str,
    provider: &'static str,
}

/// GET /status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        service: state.service.to_string(),
        version: crate::VERSION,
        provider: state.processor.provider_name(),
    })
}

/// GET /swagger/doc.json
async fn swagger_doc() -> Json<serde_json::Value> {
    Json(openapi_document())
}

fn openapi_document() -> serde_json::Value {
    let string = serde_json::json!({ "type": "string" });
    let error = serde_json::json!({
        "description": "Error",
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } }
    });

    serde_json::json!({
        "openapi": "3.0.3",
        "info": {
            "title": "courier",
            "description": "Email notification dispatcher",
            "version": crate::VERSION
        },
        "paths": {
            "/email": {
                "post": {
                    "operationId": "email",
                    "summary": "Email",
                    "description": "Process email request",
                    "tags": ["email"],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/WelcomeEmailBody" }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Ok",
                            "content": { "application/json": { "schema": string } }
                        },
                        "400": error,
                        "500": error
                    }
                }
            },
            "/status": {
                "get": {
                    "operationId": "status",
                    "summary": "Health check",
                    "responses": { "200": { "description": "Service is up" } }
                }
            }
        },
        "components": {
            "schemas": {
                "WelcomeEmailBody": {
                    "type": "object",
                    "required": ["from", "to", "subject", "params"],
                    "properties": {
                        "from": string,
                        "to": string,
                        "subject": string,
                        "params": {
                            "type": "object",
                            "required": ["name", "url"],
                            "properties": {
                                "name": { "type": "string", "maxLength": crate::task::MAX_NAME_LEN },
                                "url": { "type": "string", "format": "uri" }
                            }
                        }
                    }
                },
                "Error": {
                    "type": "object",
                    "properties": {
                        "code": { "type": "integer" },
                        "error": string,
                        "type": string
                    }
                }
            }
        }
    })
}
