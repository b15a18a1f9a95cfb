use std::convert::Infallible;

use serde_json::{json, Value};
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidHeader, InvalidQuery, LengthRequired, MethodNotAllowed, MissingHeader,
        PayloadTooLarge, UnsupportedMediaType,
    },
    reply::Response,
    Rejection, Reply,
};

use crate::error::{Error, ErrorKind};

fn detail(status: StatusCode, message: &str) -> (StatusCode, Value) {
    (status, json!({ "detail": message }))
}

/// Maps a rejection to its status and JSON body.
fn describe(err: &Rejection) -> (StatusCode, Value) {
    if let Some(e) = err.find::<Error>() {
        return (e.status(), e.body());
    }

    if let Some(e) = err.find::<BodyDeserializeError>() {
        log::debug!("Rejected request body: {e}");
        return (
            StatusCode::BAD_REQUEST,
            json!({ "non_field_errors": [format!("Invalid JSON: {e}")] }),
        );
    }
    if let Some(e) = err.find::<InvalidQuery>() {
        return detail(StatusCode::BAD_REQUEST, &e.to_string());
    }
    if err.find::<PayloadTooLarge>().is_some() {
        return detail(StatusCode::PAYLOAD_TOO_LARGE, "Request body is too large.");
    }
    if err.find::<LengthRequired>().is_some() {
        return detail(StatusCode::LENGTH_REQUIRED, "Content-Length header is required.");
    }
    if err.find::<UnsupportedMediaType>().is_some() {
        return detail(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Request body must be application/json.",
        );
    }
    if let Some(e) = err.find::<MissingHeader>() {
        return detail(StatusCode::BAD_REQUEST, &e.to_string());
    }
    if let Some(e) = err.find::<InvalidHeader>() {
        return detail(StatusCode::BAD_REQUEST, &e.to_string());
    }
    if err.find::<MethodNotAllowed>().is_some() {
        return detail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.");
    }
    if err.is_not_found() {
        let error = ErrorKind::NotFound.default();
        return (error.status(), error.body());
    }

    log::error!("Unhandled rejection: {err:?}");
    let error = ErrorKind::Internal.default();
    (error.status(), error.body())
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, body) = describe(&err);

    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
