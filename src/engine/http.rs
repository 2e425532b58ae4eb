//! HTTP binding of the protocol engine
//!
//! The server side exposes a [`VtnHandle`] as JSON-over-HTTP routes under the
//! VTN base path; [`HttpTransport`] is the matching client.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::server::VtnHandle;
use super::transport::Transport;
use super::types::{
    Event, EventResponse, PollRequest, RegisterRequest, Registration, ReportGrant, ReportOffer,
    ReportUpdate,
};
use crate::{Error, Result};

/// Path of the registration route
pub const REGISTER_PATH: &str = "EiRegisterParty";
/// Path of the report registration route
pub const REGISTER_REPORT_PATH: &str = "EiReport/register";
/// Path of the report update route
pub const UPDATE_REPORT_PATH: &str = "EiReport/update";
/// Path of the poll route
pub const POLL_PATH: &str = "OadrPoll";
/// Path of the event response route
pub const EVENT_RESPONSE_PATH: &str = "EiEvent/response";

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Engine error rendered as a protocol response
struct ProtocolError(Error);

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::RegistrationRejected(_) => StatusCode::FORBIDDEN,
            Error::UnknownDevice(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ProtocolError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

type ProtocolResult<T> = std::result::Result<Json<T>, ProtocolError>;

/// Build the protocol routes served on the VTN base path
pub fn router(handle: VtnHandle) -> Router {
    Router::new()
        .route(&format!("/{REGISTER_PATH}"), post(register))
        .route(&format!("/{REGISTER_REPORT_PATH}"), post(register_report))
        .route(&format!("/{UPDATE_REPORT_PATH}"), post(update_report))
        .route(&format!("/{POLL_PATH}"), post(poll))
        .route(&format!("/{EVENT_RESPONSE_PATH}"), post(respond))
        .with_state(handle)
}

async fn register(
    State(handle): State<VtnHandle>,
    Json(req): Json<RegisterRequest>,
) -> ProtocolResult<Registration> {
    Ok(Json(handle.register(req).await?))
}

async fn register_report(
    State(handle): State<VtnHandle>,
    Json(offer): Json<ReportOffer>,
) -> ProtocolResult<ReportGrant> {
    let sampling_interval = handle.register_report(offer).await?;
    Ok(Json(ReportGrant { sampling_interval }))
}

async fn update_report(
    State(handle): State<VtnHandle>,
    Json(update): Json<ReportUpdate>,
) -> ProtocolResult<serde_json::Value> {
    handle.update_report(update).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn poll(
    State(handle): State<VtnHandle>,
    Json(req): Json<PollRequest>,
) -> ProtocolResult<Vec<Event>> {
    Ok(Json(handle.poll(&req.ven_id).await?))
}

async fn respond(
    State(handle): State<VtnHandle>,
    Json(response): Json<EventResponse>,
) -> ProtocolResult<serde_json::Value> {
    handle.respond(response).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Protocol client speaking to a remote VTN
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a client for the VTN at `vtn_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client cannot be built
    pub fn new(vtn_url: &str, timeout: Duration) -> Result<Self> {
        let url = url::Url::parse(vtn_url)
            .map_err(|e| Error::Config(format!("invalid VTN url '{vtn_url}': {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: url.as_str().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            tracing::debug!(error = %e, url = %url, "VTN request failed");
            e
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(decode_error(body.error)),
            Err(_) => Err(Error::Engine(format!("VTN returned {status}: {text}"))),
        }
    }
}

fn decode_error(detail: ErrorDetail) -> Error {
    match detail.code.as_str() {
        "registration_rejected" => Error::RegistrationRejected(detail.message),
        "unknown_device" => Error::UnknownDevice(detail.message),
        _ => Error::Engine(detail.message),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn register(&self, request: RegisterRequest) -> Result<Registration> {
        self.post(REGISTER_PATH, &request).await
    }

    async fn register_report(&self, offer: ReportOffer) -> Result<Duration> {
        let grant: ReportGrant = self.post(REGISTER_REPORT_PATH, &offer).await?;
        Ok(grant.sampling_interval)
    }

    async fn update_report(&self, update: ReportUpdate) -> Result<()> {
        let _: serde_json::Value = self.post(UPDATE_REPORT_PATH, &update).await?;
        Ok(())
    }

    async fn poll(&self, ven_id: &str) -> Result<Vec<Event>> {
        let req = PollRequest {
            ven_id: ven_id.to_string(),
        };
        self.post(POLL_PATH, &req).await
    }

    async fn respond(&self, response: EventResponse) -> Result<()> {
        let _: serde_json::Value = self.post(EVENT_RESPONSE_PATH, &response).await?;
        Ok(())
    }
}
