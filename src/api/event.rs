//! Event dispatch endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::vtn::VtnService;

#[derive(Debug, Deserialize)]
pub struct SendEventRequest {
    pub ven_id: String,
    #[serde(default = "default_signal_level")]
    pub signal_level: i32,
}

const fn default_signal_level() -> i32 {
    1
}

#[derive(Serialize)]
pub struct SendEventResponse {
    pub status: &'static str,
    pub event_id: String,
}

/// Queue a level event for one connected device
async fn send_event(
    State(service): State<Arc<VtnService>>,
    Json(req): Json<SendEventRequest>,
) -> Result<Json<SendEventResponse>, ApiError> {
    let event_id = service.send_event(&req.ven_id, req.signal_level).await?;
    Ok(Json(SendEventResponse {
        status: "event sent",
        event_id,
    }))
}

/// Build event router
pub fn router(service: Arc<VtnService>) -> Router {
    Router::new()
        .route("/send-event", post(send_event))
        .with_state(service)
}
