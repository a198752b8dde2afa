//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::coordinator::tracker::DeploymentRecord;
use crate::coordinator::{Health, Submission, SubmissionStatus};
use crate::errors::DeployError;
use crate::github::push::{request_for_push, PushEvent, RepoDeployConfig};
use crate::models::deployment::{DeploymentId, DeploymentOutcome, DeploymentRequest};
use crate::server::state::ServerState;

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<Health> {
    Json(state.coordinator.health())
}

/// Deployment accepted but waiting for a free build slot
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub id: DeploymentId,
    #[serde(flatten)]
    pub status: SubmissionStatus,
}

/// Deployment published
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedResponse {
    pub id: DeploymentId,
    pub manifest_id: String,
    pub url: String,
}

/// Deploy handler
///
/// Responds once the deployment has published or failed. Requests that have
/// to wait for a slot get `202 Accepted` right away and can be polled at
/// `/deployments/{id}`.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DeploymentRequest>,
) -> Response {
    info!("Deploy request for {} ({})", request.repository, request.branch);

    let submission = match state.coordinator.submit(request).await {
        Ok(submission) => submission,
        Err(e) => return error_response(e),
    };
    respond_to_submission(&state, submission).await
}

async fn respond_to_submission(state: &ServerState, submission: Submission) -> Response {
    let Submission { id, status, result } = submission;

    if let SubmissionStatus::Queued { .. } = status {
        return (StatusCode::ACCEPTED, Json(QueuedResponse { id, status })).into_response();
    }

    match result.wait().await {
        DeploymentOutcome::Published { id: manifest_id } => Json(PublishedResponse {
            id,
            url: state.site_url(&manifest_id),
            manifest_id,
        })
        .into_response(),
        DeploymentOutcome::Failed { message } => {
            (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
    }
}

fn error_response(err: DeployError) -> Response {
    match err {
        DeployError::Validation(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        DeployError::Queue(_) => {
            error!("Failed to queue deployment: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
        }
        other => {
            error!("Deployment rejected: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}

/// Log handler. Unknown projects answer 200 with a fixed message.
pub async fn log_handler(
    State(state): State<Arc<ServerState>>,
    Path(folder): Path<String>,
) -> String {
    state.coordinator.get_log(&folder).await.into_text()
}

/// Deployment status handler
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentRecord>, StatusCode> {
    let id: DeploymentId = id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    state
        .coordinator
        .status(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Push notification relayed by the GitHub App, together with the
/// repository's stored deployment config
#[derive(Debug, Deserialize)]
pub struct PushNotification {
    pub event: PushEvent,
    pub config: RepoDeployConfig,
}

/// Push handler. Matching pushes are submitted without waiting for the result.
pub async fn push_handler(
    State(state): State<Arc<ServerState>>,
    Json(notification): Json<PushNotification>,
) -> Response {
    let Some(request) = request_for_push(&notification.event, &notification.config, state.trigger)
    else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match state.coordinator.submit(request).await {
        Ok(submission) => {
            info!(
                "Deployment {} triggered by push to {}",
                submission.id, notification.event.git_ref
            );
            (
                StatusCode::ACCEPTED,
                Json(QueuedResponse {
                    id: submission.id,
                    status: submission.status,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}
