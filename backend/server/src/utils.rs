use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Request, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::debug;

use crate::{
    error::AppError,
    note::{NoteDraft, NotePayload},
};

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Identifier used for rate limiting. With `trust_proxy` the left-most
/// `X-Forwarded-For` entry is used, otherwise the socket peer.
pub fn client_ip(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub fn draft_from_body(
    body: Result<Json<NotePayload>, JsonRejection>,
) -> Result<NoteDraft, AppError> {
    let Json(payload) = body.map_err(|e| {
        debug!("Rejected note payload: {e}");
        match e.status() {
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
            _ => AppError::MalformedPayload,
        }
    })?;

    NoteDraft::try_from(payload)
}
