use std::error::Error as StdError;

use axum::{
    Extension, Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use metrics::counter;
use serde::Serialize;
use serde_json::Value;

use crate::{
    application::{
        contact::{RelayError, SUBMISSIONS_METRIC},
        error::{ErrorReport, HttpError},
    },
    domain::{
        error::{FieldError, ValidationErrors},
        submission::{RawSubmission, Submission},
    },
};

use super::HttpState;

const SENT_BODY: &str = "Email sent successfully";
const FAILED_BODY: &str = "Error sending email";
const TOO_LARGE_BODY: &str = "Payload Too Large";

#[derive(Debug, Serialize)]
struct FieldErrorsBody {
    errors: Vec<FieldError>,
}

#[derive(Debug, Serialize)]
struct BodyErrorsBody {
    errors: [BodyError; 1],
}

#[derive(Debug, Serialize)]
struct BodyError {
    #[serde(rename = "type")]
    kind: &'static str,
    msg: &'static str,
    location: &'static str,
}

/// Read and decode the request body ahead of rate limiting, so bodies that
/// are too large or not valid JSON are answered without taking a slot.
pub(super) async fn decode_submission(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) if exceeds_limit(&err) => return too_large_response(state.max_body_bytes),
        Err(err) => return malformed_body_response(format!("failed to read body: {err}")),
    };

    let raw = match read_submission(&parts.headers, &bytes) {
        Ok(raw) => raw,
        Err(detail) => return malformed_body_response(detail),
    };

    let mut request = Request::from_parts(parts, Body::empty());
    request.extensions_mut().insert(raw);
    next.run(request).await
}

pub(super) async fn send_email(
    State(state): State<HttpState>,
    Extension(raw): Extension<RawSubmission>,
) -> Response {
    let submission = match Submission::parse(raw) {
        Ok(submission) => submission,
        Err(errors) => {
            counter!(SUBMISSIONS_METRIC, "outcome" => "invalid").increment(1);
            return validation_response(errors);
        }
    };

    match state.contact.relay(submission).await {
        Ok(()) => (StatusCode::OK, SENT_BODY).into_response(),
        Err(err) => relay_error_response(&err),
    }
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(inner) = current {
        if inner.is::<LengthLimitError>() {
            return true;
        }
        current = inner.source();
    }
    false
}

/// Decode the body the way a JSON body parser would: JSON media types are
/// parsed (empty means `{}`), anything else yields an empty submission.
fn read_submission(headers: &HeaderMap, body: &[u8]) -> Result<RawSubmission, String> {
    if !is_json_content_type(headers) || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RawSubmission::default());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => {
            serde_json::from_value(value).map_err(|err| err.to_string())
        }
        Ok(_) => Err("top-level JSON value must be an object".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn validation_response(errors: ValidationErrors) -> Response {
    let report = ErrorReport::from_error(
        "infra::http::contact::validation",
        StatusCode::BAD_REQUEST,
        &errors,
    );
    let body = FieldErrorsBody {
        errors: errors.into_errors(),
    };
    let mut response = (StatusCode::BAD_REQUEST, Json(body)).into_response();
    report.attach(&mut response);
    response
}

fn malformed_body_response(detail: String) -> Response {
    let body = BodyErrorsBody {
        errors: [BodyError {
            kind: "body",
            msg: "Malformed JSON body",
            location: "body",
        }],
    };
    let mut response = (StatusCode::BAD_REQUEST, Json(body)).into_response();
    ErrorReport::from_message(
        "infra::http::contact::body",
        StatusCode::BAD_REQUEST,
        detail,
    )
    .attach(&mut response);
    response
}

fn too_large_response(limit: usize) -> Response {
    HttpError::new(
        "infra::http::contact::body",
        StatusCode::PAYLOAD_TOO_LARGE,
        TOO_LARGE_BODY,
        format!("request body exceeds {limit} bytes"),
    )
    .into_response()
}

fn relay_error_response(err: &RelayError) -> Response {
    HttpError::from_error(
        "infra::http::contact::relay",
        StatusCode::INTERNAL_SERVER_ERROR,
        FAILED_BODY,
        err,
    )
    .into_response()
}
