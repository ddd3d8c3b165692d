//! HTTP surface over [`Controller`]. Thin handlers: deserialize, call the
//! controller, map its error taxonomy onto status codes.

use super::{CommandDraft, Controller, SendPayload};
use crate::engine::ConnectOutcome;
use crate::error::{ControlError, SessionError};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

pub fn router(controller: Controller) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/sessions", post(create_session))
        .route(
            "/sessions/{id}",
            patch(update_session).delete(delete_session),
        )
        .route("/sessions/{id}/connect", post(connect_session))
        .route("/sessions/{id}/disconnect", post(disconnect_session))
        .route("/sessions/{id}/send", post(send))
        .route("/commands", post(add_command))
        .route(
            "/commands/{key}",
            patch(update_command).delete(delete_command),
        )
        .route("/groups/{id}", patch(update_group))
        .route("/test-api", post(test_api))
        .with_state(controller)
}

pub async fn serve(controller: Controller, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "control api listening");
    axum::serve(listener, router(controller))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

struct ApiError(ControlError);

impl From<ControlError> for ApiError {
    fn from(error: ControlError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::CommandNotFound(_)
            | ControlError::GroupNotFound(_)
            | ControlError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ControlError::Session(_) => StatusCode::CONFLICT,
            ControlError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ControlError::Link(_) | ControlError::Dispatch(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn status(State(controller): State<Controller>) -> ApiResult<Response> {
    Ok(Json(controller.status().await?).into_response())
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
}

async fn create_session(
    State(controller): State<Controller>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Response> {
    let record = controller.create_session(&request.name)?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSessionRequest {
    name: Option<String>,
    enabled: Option<bool>,
    commands_enabled: Option<bool>,
}

async fn update_session(
    State(controller): State<Controller>,
    Path(id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<StatusCode> {
    if let Some(name) = &request.name {
        controller.rename_session(&id, name)?;
    }
    if let Some(enabled) = request.enabled {
        controller.set_session_enabled(&id, enabled)?;
    }
    if let Some(enabled) = request.commands_enabled {
        controller.set_session_commands_enabled(&id, enabled)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_session(
    State(controller): State<Controller>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    controller.delete_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn connect_session(
    State(controller): State<Controller>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let outcome = match controller.connect_session(&id).await? {
        ConnectOutcome::Started => "started",
        ConnectOutcome::AlreadyActive => "alreadyActive",
    };
    Ok(Json(json!({ "outcome": outcome })).into_response())
}

async fn disconnect_session(
    State(controller): State<Controller>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    controller.disconnect_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AddCommandRequest {
    key: String,
    #[serde(flatten)]
    draft: CommandDraft,
}

async fn add_command(
    State(controller): State<Controller>,
    Json(request): Json<AddCommandRequest>,
) -> ApiResult<StatusCode> {
    controller.add_command(&request.key, request.draft)?;
    Ok(StatusCode::CREATED)
}

async fn update_command(
    State(controller): State<Controller>,
    Path(key): Path<String>,
    Json(draft): Json<CommandDraft>,
) -> ApiResult<StatusCode> {
    controller.update_command(&key, draft)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_command(
    State(controller): State<Controller>,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    controller.delete_command(&key)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct UpdateGroupRequest {
    enabled: bool,
}

async fn update_group(
    State(controller): State<Controller>,
    Path(id): Path<String>,
    Json(request): Json<UpdateGroupRequest>,
) -> ApiResult<StatusCode> {
    controller.set_group_enabled(&id, request.enabled)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SendRequest {
    recipient: String,
    #[serde(flatten)]
    payload: SendPayload,
}

async fn send(
    State(controller): State<Controller>,
    Path(id): Path<String>,
    Json(request): Json<SendRequest>,
) -> ApiResult<StatusCode> {
    controller.send(&id, &request.recipient, request.payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestApiRequest {
    api_url: String,
    #[serde(default)]
    api_response_path: String,
}

async fn test_api(
    State(controller): State<Controller>,
    Json(request): Json<TestApiRequest>,
) -> ApiResult<Response> {
    let value = controller
        .test_api(&request.api_url, &request.api_response_path)
        .await?;
    Ok(Json(json!({ "value": value })).into_response())
}
