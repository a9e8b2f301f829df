use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use tally_core::errors::{ErrorKind, TallyError};

#[derive(Debug)]
pub struct TallyAxumError(pub anyhow::Error);

impl From<anyhow::Error> for TallyAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<TallyError> for TallyAxumError {
    fn from(e: TallyError) -> Self {
        Self(e.into_anyhow())
    }
}

fn respond(err: TallyError) -> Response {
    let safe = err.sanitize_for_client();
    let status =
        StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(safe.to_json())).into_response()
}

impl IntoResponse for TallyAxumError {
    fn into_response(self) -> Response {
        // If it's a TallyError (even wrapped by anyhow contexts), preserve
        // the structured fields.
        if let Some(tally) = self.0.chain().find_map(|e| e.downcast_ref::<TallyError>()) {
            return match tally.kind {
                // Denied reads render as not-found so the existence of an
                // organization is never leaked to unauthorized callers.
                ErrorKind::Access => {
                    respond(TallyError::not_found("Organization not found"))
                }
                // Misconfigured tenants are an operator problem; alert in
                // the logs, return an opaque 500.
                ErrorKind::Config => {
                    error!(%tally, "tenant misconfiguration");
                    respond(TallyError::general("Organization is not set up correctly"))
                }
                _ => respond(tally.sanitize_for_client()),
            };
        }

        // Fallback: wrap any non-TallyError as General.
        respond(TallyError::general(self.0.to_string()))
    }
}
