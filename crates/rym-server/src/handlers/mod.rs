//! REST and upgrade handlers, one module per resource.

pub mod account;
pub mod admin;
pub mod catalog;
pub mod credits;
pub mod votes;
pub mod ws;

use axum::Json;
use axum::extract::rejection::JsonRejection;

use crate::errors::ApiError;

/// Unwrap a JSON body, reporting any parse failure as a plain 400.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|_| ApiError::BadRequest("Invalid request body".into()))
}
