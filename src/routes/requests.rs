//! Support request routes
//!
//! Every handler resolves the caller's [`Actor`] from the bearer token first
//! and hands it to [`RequestService`](crate::requests::RequestService), which
//! enforces role and scope.

use bytes::Bytes;
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::response::{
    auth_header, header_str, json_response, parse_json_body, read_body, respond, BoxBody,
    BoxError,
};
use crate::auth::Actor;
use crate::requests::{NewRequest, RequestFilter, SupportRequest};
use crate::server::AppState;
use crate::types::KrishiError;
use crate::uploads::{is_multipart, parse_multipart, MultipartForm, PendingFile};

/// Form fields accepted by `POST /requests`
const REQUEST_FIELDS: [&str; 5] = [
    "title",
    "description",
    "category",
    "priority",
    "farmerRef",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestList {
    requests: Vec<SupportRequest>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusChangeResponse {
    request: SupportRequest,
    previous_status: String,
    reopened: bool,
}

async fn actor_for(state: &AppState, auth: Option<String>) -> Result<Actor, KrishiError> {
    state.accounts.authenticate(auth.as_deref()).await
}

/// `GET /requests`
pub async fn list<B>(state: &AppState, req: Request<B>) -> Response<BoxBody> {
    respond(list_inner(state, req).await)
}

async fn list_inner<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError> {
    let actor = actor_for(state, auth_header(&req)).await?;
    let criteria = RequestFilter::from_query_string(req.uri().query())?;

    let requests = state.requests.list(&actor, &criteria).await?;
    let total = requests.len();
    Ok(json_response(StatusCode::OK, &RequestList { requests, total }))
}

/// `POST /requests`, JSON or multipart with attachment files
pub async fn create<B>(state: &AppState, req: Request<B>) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(create_inner(state, req).await)
}

async fn create_inner<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let actor = actor_for(state, auth_header(&req)).await?;

    let (input, files) = match multipart_content_type(&req) {
        Some(content_type) => {
            let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;
            let form = parse_multipart(&content_type, body).await?;
            new_request_from_form(form)?
        }
        None => {
            let body: serde_json::Value = parse_json_body(req).await?;
            (new_request_from_value(body)?, Vec::new())
        }
    };

    let created = state.requests.create(&actor, input, files).await?;
    Ok(json_response(StatusCode::CREATED, &created))
}

/// `GET /requests/{id}`
pub async fn get<B>(state: &AppState, req: Request<B>, id: &str) -> Response<BoxBody> {
    respond(get_inner(state, req, id).await)
}

async fn get_inner<B>(
    state: &AppState,
    req: Request<B>,
    id: &str,
) -> Result<Response<BoxBody>, KrishiError> {
    let actor = actor_for(state, auth_header(&req)).await?;
    let found = state.requests.get(&actor, id).await?;
    Ok(json_response(StatusCode::OK, &found))
}

/// `POST /requests/{id}/comment`
pub async fn comment<B>(state: &AppState, req: Request<B>, id: &str) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(comment_inner(state, req, id).await)
}

async fn comment_inner<B>(
    state: &AppState,
    req: Request<B>,
    id: &str,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let actor = actor_for(state, auth_header(&req)).await?;
    let body: CommentBody = parse_json_body(req).await?;

    let updated = state.requests.comment(&actor, id, &body.text).await?;
    Ok(json_response(StatusCode::OK, &updated))
}

/// `PUT /requests/{id}/status`
pub async fn update_status<B>(state: &AppState, req: Request<B>, id: &str) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(update_status_inner(state, req, id).await)
}

async fn update_status_inner<B>(
    state: &AppState,
    req: Request<B>,
    id: &str,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let actor = actor_for(state, auth_header(&req)).await?;
    let body: StatusBody = parse_json_body(req).await?;

    let status = body.status.as_deref();
    let reason = body.status_reason.as_deref();
    let (request, outcome) = state.requests.transition(&actor, id, status, reason).await?;

    Ok(json_response(
        StatusCode::OK,
        &StatusChangeResponse {
            request,
            previous_status: outcome.previous.to_string(),
            reopened: outcome.reopened,
        },
    ))
}

/// `POST /requests/{id}/attachments`
pub async fn attach<B>(state: &AppState, req: Request<B>, id: &str) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(attach_inner(state, req, id).await)
}

async fn attach_inner<B>(
    state: &AppState,
    req: Request<B>,
    id: &str,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let actor = actor_for(state, auth_header(&req)).await?;
    let content_type = multipart_content_type(&req).ok_or_else(|| {
        KrishiError::BadRequest("Attachments must be sent as multipart/form-data".into())
    })?;

    let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;
    let form = parse_multipart(&content_type, body).await?;

    let updated = state.requests.attach(&actor, id, form.files).await?;
    Ok(json_response(StatusCode::OK, &updated))
}

fn multipart_content_type<B>(req: &Request<B>) -> Option<String> {
    let content_type = header_str(req, CONTENT_TYPE);
    is_multipart(content_type)
        .then(|| content_type.map(str::to_string))
        .flatten()
}

/// Decode request fields. Well-formed input with missing or unknown values
/// is a validation error for JSON and multipart bodies alike.
fn new_request_from_value(value: serde_json::Value) -> Result<NewRequest, KrishiError> {
    serde_json::from_value(value)
        .map_err(|e| KrishiError::Validation(format!("Invalid request: {e}")))
}

fn new_request_from_form(
    form: MultipartForm,
) -> Result<(NewRequest, Vec<PendingFile>), KrishiError> {
    let mut fields = serde_json::Map::new();
    for name in REQUEST_FIELDS {
        if let Some(value) = form.field(name).map(str::trim).filter(|v| !v.is_empty()) {
            let value = serde_json::Value::String(value.to_string());
            fields.insert(name.to_string(), value);
        }
    }

    let input = new_request_from_value(serde_json::Value::Object(fields))?;
    Ok((input, form.files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{Priority, RequestCategory};
    use std::collections::HashMap;

    fn form(pairs: &[(&str, &str)]) -> MultipartForm {
        MultipartForm {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_form_fields_map_to_new_request() {
        let (input, files) = new_request_from_form(form(&[
            ("title", "Pump broken"),
            ("description", "No water since Monday"),
            ("category", "irrigation-issue"),
            ("priority", "high"),
            ("farmerRef", ""),
        ]))
        .unwrap();

        assert_eq!(input.title, "Pump broken");
        assert_eq!(input.category, RequestCategory::IrrigationIssue);
        assert_eq!(input.priority, Some(Priority::High));
        assert_eq!(input.farmer_ref, None);
        assert!(files.is_empty());
    }

    #[test]
    fn test_form_without_category_is_validation_error() {
        let err = new_request_from_form(form(&[("title", "t"), ("description", "d")])).unwrap_err();
        assert!(matches!(err, KrishiError::Validation(_)));
    }

    #[test]
    fn test_json_missing_or_unknown_fields_are_validation_errors() {
        let missing_title = serde_json::json!({ "description": "d", "category": "other" });
        assert!(matches!(
            new_request_from_value(missing_title),
            Err(KrishiError::Validation(_))
        ));

        let bad_category = serde_json::json!({
            "title": "t",
            "description": "d",
            "category": "weather"
        });
        assert!(matches!(
            new_request_from_value(bad_category),
            Err(KrishiError::Validation(_))
        ));
    }
}
