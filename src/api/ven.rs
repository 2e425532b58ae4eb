//! Device listing and connection endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post},
};
use serde::Serialize;

use super::error::ApiError;
use crate::ven::VenSummary;
use crate::vtn::VtnService;

#[derive(Serialize)]
pub struct ConnectResponse {
    pub status: &'static str,
    /// Devices started by this request
    pub started: Vec<String>,
}

/// Every known device
async fn registered(
    State(service): State<Arc<VtnService>>,
) -> Result<Json<Vec<VenSummary>>, ApiError> {
    let snapshot = service.ven_props_list().await?;
    Ok(Json(snapshot.to_vec()))
}

/// Devices with a running agent
async fn connected(
    State(service): State<Arc<VtnService>>,
) -> Result<Json<Vec<VenSummary>>, ApiError> {
    Ok(Json(service.ven_connected().await?))
}

/// Start agents for every device not yet connected
async fn connect(
    State(service): State<Arc<VtnService>>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let started = service.ven_connect().await?;
    Ok(Json(ConnectResponse {
        status: "ven connection started",
        started,
    }))
}

async fn create(State(service): State<Arc<VtnService>>) -> Result<Json<()>, ApiError> {
    service.ven_props_list().await?;
    Err(ApiError::NotImplemented("VEN creation"))
}

async fn remove(State(service): State<Arc<VtnService>>) -> Result<Json<()>, ApiError> {
    service.ven_props_list().await?;
    Err(ApiError::NotImplemented("VEN deletion"))
}

/// Build device router
pub fn router(service: Arc<VtnService>) -> Router {
    Router::new()
        .route("/registered", get(registered))
        .route("/connected", get(connected))
        .route("/connect", get(connect).post(connect))
        .route("/create", post(create))
        .route("/delete", delete(remove))
        .with_state(service)
}
