//! HTTP request handlers

use super::types::{
    ConversationListResponse, ConversationQuery, ConversationResponse,
    ConversationWithMessagesResponse, CreateScenarioRequest, DeleteResponse, ErrorResponse,
    ListQuery, MessageRequest, PollQuery, ScenarioModelUpdateResponse, ScenarioModelsResponse,
    ScenarioResponse, SubmitRequest, SubmitResponse, UpdateScenarioRequest,
};
use super::{AppState, PRINCIPAL_HEADER};
use crate::db::{DbError, Principal};
use crate::error::{ChatError, UnscheduledReply};
use crate::poll::DEFAULT_POLL_TIMEOUT;
use crate::service::SubmitTarget;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::time::Duration;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversation queries
        .route("/api/conversations", get(list_conversations))
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        // Submission
        .route("/api/conversations/messages", post(submit_message))
        .route("/api/conversations/:id/messages", post(submit_to_conversation))
        // Reply discovery
        .route("/api/conversations/:id/poll", get(poll_reply))
        // Lifecycle
        .route("/api/conversations/:id/close", post(close_conversation))
        // Scenarios
        .route("/api/scenarios", post(create_scenario))
        .route("/api/scenarios/:id", put(update_scenario))
        .route("/api/scenarios/:id/models", get(scenario_models))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Caller identity
// ============================================================

/// The principal named by the `x-principal-id` header
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {PRINCIPAL_HEADER} header")))?;

        match state.db.get_principal(id) {
            Ok(principal) => Ok(Self(principal)),
            Err(DbError::PrincipalNotFound(_)) => {
                Err(AppError::Unauthorized(format!("unknown principal {id}")))
            }
            Err(e) => Err(AppError::Internal(e.to_string())),
        }
    }
}

// ============================================================
// Conversation queries
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let filter = query.filter()?;
    let page = query.page()?;

    let page = state.service.list(&principal, &filter, page).await?;
    Ok(Json(ConversationListResponse {
        conversations: page.conversations,
        pagination: page.pagination,
    }))
}

async fn get_conversation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<ConversationWithMessagesResponse>, AppError> {
    let window = query.window()?;
    let detail = state.service.get(&principal, &id, window).await?;
    let (messages, message_pagination) = detail.messages.unzip();
    Ok(Json(ConversationWithMessagesResponse {
        conversation: detail.conversation,
        messages,
        message_pagination,
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted_messages = state.service.delete(&principal, &id).await?;
    Ok(Json(DeleteResponse { deleted_messages }))
}

// ============================================================
// Submission
// ============================================================

async fn submit_message(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let target = match (req.conversation_id, req.scenario_id) {
        (Some(conversation_id), _) => SubmitTarget::Conversation(conversation_id),
        (None, Some(scenario_id)) => SubmitTarget::Scenario(scenario_id),
        (None, None) => {
            return Err(AppError::BadRequest(
                "either conversation_id or scenario_id is required".to_string(),
            ))
        }
    };
    submit(&state, &principal, target, &req.content, req.llm_model_id.as_deref()).await
}

async fn submit_to_conversation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    submit(
        &state,
        &principal,
        SubmitTarget::Conversation(id),
        &req.content,
        req.llm_model_id.as_deref(),
    )
    .await
}

async fn submit(
    state: &AppState,
    principal: &Principal,
    target: SubmitTarget,
    content: &str,
    llm_model_id: Option<&str>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let submission = state
        .service
        .submit(principal, target, content, llm_model_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            conversation_id: submission.conversation.id,
            message: submission.message,
        }),
    ))
}

// ============================================================
// Reply discovery
// ============================================================

async fn poll_reply(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Response, AppError> {
    let timeout = query
        .timeout
        .map_or(DEFAULT_POLL_TIMEOUT, Duration::from_secs);
    let cancel = state.shutdown.child_token();

    match state.service.poll(&principal, &id, timeout, &cancel).await? {
        Some(message) => Ok(Json(message).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

// ============================================================
// Lifecycle
// ============================================================

async fn close_conversation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state.service.close(&principal, &id).await?;
    Ok(Json(ConversationResponse { conversation }))
}

// ============================================================
// Scenarios
// ============================================================

async fn create_scenario(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<CreateScenarioRequest>,
) -> Result<(StatusCode, Json<ScenarioResponse>), AppError> {
    let scenario = state
        .service
        .create_scenario(&principal, req.id.as_deref(), &req.name, &req.config)
        .await?;
    Ok((StatusCode::CREATED, Json(ScenarioResponse { scenario })))
}

async fn update_scenario(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Json(req): Json<UpdateScenarioRequest>,
) -> Result<Json<ScenarioModelUpdateResponse>, AppError> {
    let (scenario, updated_model) = state
        .service
        .set_scenario_model(&principal, &id, &req.model_id)
        .await?;
    Ok(Json(ScenarioModelUpdateResponse {
        scenario_id: scenario.id,
        scenario_name: scenario.name,
        updated_model,
    }))
}

// Any known principal may list a scenario's models
async fn scenario_models(
    State(state): State<AppState>,
    CurrentPrincipal(_): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<ScenarioModelsResponse>, AppError> {
    let (scenario, models) = state.service.scenario_models(&id)?;
    Ok(Json(ScenarioModelsResponse {
        scenario_id: scenario.id,
        scenario_name: scenario.name,
        models,
    }))
}

async fn get_version() -> &'static str {
    concat!("chat_relay ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Submission committed, reply not scheduled
    ServiceUnavailable {
        message: String,
        reply: UnscheduledReply,
    },
    Busy(String),
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::Validation(_) => AppError::BadRequest(message),
            ChatError::Forbidden(_) => AppError::Forbidden(message),
            ChatError::StateConflict(_) => AppError::Conflict(message),
            ChatError::NotFound(_) => AppError::NotFound(message),
            ChatError::ServiceUnavailable(reply) => AppError::ServiceUnavailable { message, reply },
            ChatError::TransientBusy(_) => AppError::Busy(message),
            ChatError::Internal(_) => {
                tracing::error!(error = %message, "Internal error");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable { message, reply } => {
                let body = ErrorResponse {
                    conversation_id: Some(reply.conversation_id),
                    message_id: Some(reply.message_id),
                    ..ErrorResponse::new(message)
                };
                return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            }
            AppError::Busy(msg) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, "1")],
                    Json(ErrorResponse::new(msg)),
                )
                    .into_response();
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
