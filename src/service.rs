//! HTTP boundary: request parsing, status mapping, and nothing else.
//!
//! Two routes:
//!
//! - `POST /chat` — JSON chat turn, answered by the [`AnsweringEngine`].
//! - `POST /uploadFile` — multipart document upload into object storage.
//!
//! All pipeline failures are logged here with their stage and diagnostic
//! detail, then mapped onto an HTTP status: validation problems are `400`,
//! unreadable documents `415`, upstream failures `502`, broken internal
//! invariants `500`. Client-caused errors echo a reason; server-side ones
//! return a deliberately generic body.

use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Multipart, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::backends::TokenUsage;
use crate::engine::{AnsweringEngine, ChatTurnOutcome, ChatTurnRequest, EngineError};
use crate::errors::ServiceError;
use crate::storage::{ObjectKey, ObjectStore};

/// Everything the handlers need, constructed once at startup and shared.
pub struct AppContext {
    pub engine: AnsweringEngine,
    pub objects: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub upload_prefix: String,
}

/// Builds the service router over a shared [`AppContext`].
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/uploadFile", post(upload_file))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

#[derive(Debug, Serialize)]
pub struct AnswerBody {
    pub answer: String,
    pub total_tokens_used: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub response: AnswerBody,
    pub session_id: String,
}

impl From<ChatTurnOutcome> for ChatResponseBody {
    fn from(outcome: ChatTurnOutcome) -> Self {
        let TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            total_cost,
        } = outcome.usage;
        Self {
            response: AnswerBody {
                answer: outcome.answer,
                total_tokens_used: total_tokens,
                prompt_tokens,
                completion_tokens,
                total_cost,
            },
            session_id: outcome.session_id,
        }
    }
}

async fn chat(
    State(context): State<Arc<AppContext>>,
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("invalid chat payload: {rejection}"),
    })?;
    let outcome = context.engine.chat(request).await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Serialize)]
pub struct UploadResponseBody {
    pub filename: String,
    pub file_path: String,
}

/// Stores the first file field of the multipart body and returns the URI
/// chat requests should pass as `data_source`.
async fn upload_file(
    State(context): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponseBody>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(filename) = field.file_name().map(ToString::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        let key = ObjectKey::new(&context.bucket, &context.upload_prefix, &filename);
        let file_path = context
            .objects
            .put(&key, &bytes)
            .await
            .map_err(|err| ApiError::from_service(ServiceError::from(err)))?;
        return Ok(Json(UploadResponseBody {
            filename,
            file_path,
        }));
    }
    Err(ApiError {
        status: StatusCode::BAD_REQUEST,
        message: "upload must include one file field".to_string(),
    })
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("invalid multipart upload: {err}"),
    }
}

/// An error ready to leave the service: a status plus the message the client
/// is allowed to see.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_service(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { reason } => Self {
                status: StatusCode::BAD_REQUEST,
                message: reason,
            },
            ServiceError::UnsupportedFormat { detail } => Self {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                message: detail,
            },
            // Upstream detail stays in the logs; clients get a uniform body.
            ServiceError::ExternalService { .. } => Self {
                status: StatusCode::BAD_GATEWAY,
                message: "chat request failed".to_string(),
            },
            ServiceError::EmbeddingDimensionMismatch { .. } => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "chat request failed".to_string(),
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        error!(stage = %err.stage, error = %err.source, "chat turn failed");
        Self::from_service(err.source)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400_with_reason() {
        let api = ApiError::from_service(ServiceError::validation("user_input must not be empty"));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "user_input must not be empty");
    }

    #[test]
    fn unsupported_format_maps_to_415_with_detail() {
        let api = ApiError::from_service(ServiceError::UnsupportedFormat {
            detail: "unsupported document type \"notes.txt\"".into(),
        });
        assert_eq!(api.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(api.message.contains("notes.txt"));
    }

    #[test]
    fn upstream_and_internal_failures_stay_generic() {
        let api = ApiError::from_service(ServiceError::external("model provider", "timed out"));
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.message, "chat request failed");

        let api = ApiError::from_service(ServiceError::EmbeddingDimensionMismatch {
            expected: 1536,
            found: 768,
        });
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("1536"));
    }

    #[test]
    fn chat_response_body_carries_usage_fields() {
        let outcome = ChatTurnOutcome {
            session_id: "abc".into(),
            answer: "Thirty days.".into(),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
                total_cost: 0.0042,
            },
        };
        let body: ChatResponseBody = outcome.into();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["response"]["answer"], "Thirty days.");
        assert_eq!(json["response"]["total_tokens_used"], 120);
        assert_eq!(json["response"]["prompt_tokens"], 100);
    }
}
