//! Liveness endpoint
//!
//! `/health` and `/healthz` answer 200 whenever the process is serving. The
//! body reports the storage backend and, when MongoDB is configured, whether
//! a ping succeeds.

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::response::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// `online`, or `degraded` when the database does not answer
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: u64,
    pub storage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_connected: Option<bool>,
    pub dev_mode: bool,
    pub transition_policy: &'static str,
    pub timestamp: String,
}

pub async fn health_check(state: &AppState) -> Response<BoxBody> {
    let database_connected = match &state.mongo {
        Some(mongo) => Some(mongo.ping().await),
        None => None,
    };

    let body = HealthResponse {
        healthy: true,
        status: if database_connected == Some(false) {
            "degraded"
        } else {
            "online"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        storage: state.requests.backend(),
        database_connected,
        dev_mode: state.args.dev_mode,
        transition_policy: state.requests.policy().as_str(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    json_response(StatusCode::OK, &body)
}
