//! Response and body helpers shared by the route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::types::KrishiError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Limit for plain JSON bodies
pub const MAX_JSON_BODY: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn with_cors(mut response: Response<BoxBody>) -> Response<BoxBody> {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    with_cors(response)
}

/// Map an error to its JSON response. Server-side failures are logged here
/// and answered with a generic message.
pub fn error_response(err: KrishiError) -> Response<BoxBody> {
    if err.is_server_error() {
        error!("Request failed: {}", err);
    }
    let code = err.code().to_string();
    let (status, message) = err.into_status_code_and_body();
    json_response(
        status,
        &ErrorResponse {
            error: message,
            code: Some(code),
        },
    )
}

/// Collapse a handler result into a response
pub fn respond(result: Result<Response<BoxBody>, KrishiError>) -> Response<BoxBody> {
    result.unwrap_or_else(error_response)
}

pub fn preflight_response() -> Response<BoxBody> {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    with_cors(response)
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
        }),
    )
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: None,
        },
    )
}

pub fn header_str<'a, B>(req: &'a Request<B>, name: header::HeaderName) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Owned `Authorization` value, safe to hold across the account lookup
pub fn auth_header<B>(req: &Request<B>) -> Option<String> {
    header_str(req, header::AUTHORIZATION).map(str::to_string)
}

/// Buffer a body, failing once it grows past `limit` bytes
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(KrishiError::BadRequest(format!(
            "Request body too large (limit {limit} bytes)"
        ))),
        Err(e) => Err(KrishiError::BadRequest(format!("Failed to read body: {e}"))),
    }
}

pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T, KrishiError>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let bytes = read_body(req.into_body(), MAX_JSON_BODY).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| KrishiError::BadRequest(format!("Invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response<BoxBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_client_error_keeps_message() {
        let response = error_response(KrishiError::Validation("Comment text is required".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("Comment text is required"));
    }

    #[tokio::test]
    async fn test_server_error_is_generic() {
        let response =
            error_response(KrishiError::Database("connection refused at 10.0.0.5".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Full::new(Bytes::from(vec![b'x'; 32]));
        let err = read_body(body, 16).await.unwrap_err();
        assert!(matches!(err, KrishiError::BadRequest(_)));

        let ok = read_body(Full::new(Bytes::from_static(b"{}")), 16).await.unwrap();
        assert_eq!(&ok[..], b"{}");
    }

    #[test]
    fn test_cors_headers_present() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
