use crate::{auth::auth, models::{DomainEventRequest, DomainEventResponse, ErrorResponse}, AppState};
use axum::{extract::{rejection::JsonRejection, Extension, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{info, warn};

/// Relay a domain event raised by another service to the connected clients
pub async fn publish_event(
    State(state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
    body: Result<Json<DomainEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DomainEventResponse>), (StatusCode, Json<ErrorResponse>)> {

    let caller = auth::ensure_any_service(&prpls)?;

    let Json(request) = body.map_err(|e| {
        warn!("Rejected domain event from {}: {}", caller, e.body_text());
        let status = StatusCode::BAD_REQUEST;
        (status, Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: e.body_text(),
        }))
    })?;

    info!("Domain event {} from {}", request.event.event_name(), caller);
    let fan_out = state
        .bridge
        .publish_domain_event(request.event, request.target, request.payload)
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(DomainEventResponse {
            delivered_locally: fan_out.delivered_locally,
            published: fan_out.published,
        }),
    ))
}
