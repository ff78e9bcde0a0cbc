//! Authentication routes
//!
//! - `POST /auth/register`: create an account (staff roles need an admin token)
//! - `POST /auth/login`: exchange credentials for a JWT and dashboard redirect
//! - `POST /auth/logout`: stateless, the client drops its token
//! - `POST /auth/refresh`: re-issue a token for a still-valid session
//! - `GET /auth/me`: the account behind the presented token

use bytes::Bytes;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;

use super::response::{
    auth_header, json_response, method_not_allowed, not_found_response, parse_json_body, respond,
    BoxBody, BoxError, SuccessResponse,
};
use crate::auth::{AccountView, Actor, RegisterInput};
use crate::server::AppState;
use crate::types::KrishiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    identifier: String,
    password: String,
}

/// Dispatch `/auth/*`
pub async fn handle_auth_request<B>(state: &AppState, req: Request<B>) -> Response<BoxBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let path = req.uri().path().trim_end_matches('/').to_string();

    match (req.method().clone(), path.as_str()) {
        (Method::POST, "/auth/register") => respond(handle_register(state, req).await),
        (Method::POST, "/auth/login") => respond(handle_login(state, req).await),
        (Method::POST, "/auth/logout") => handle_logout(),
        (Method::POST, "/auth/refresh") => respond(handle_refresh(state, req).await),
        (Method::GET, "/auth/me") => respond(handle_me(state, req).await),
        (
            _,
            "/auth/register" | "/auth/login" | "/auth/logout" | "/auth/refresh" | "/auth/me",
        ) => method_not_allowed(),
        _ => not_found_response(&path),
    }
}

async fn handle_register<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    // A bearer token is optional here; when present it must be valid
    let caller: Option<Actor> = match auth_header(&req) {
        Some(header) => Some(state.accounts.authenticate(Some(&header)).await?),
        None => None,
    };

    let input: RegisterInput = parse_json_body(req).await?;
    let user = state.accounts.register(caller.as_ref(), input).await?;
    let grant = state.accounts.issue(&user)?;

    Ok(json_response(StatusCode::CREATED, &grant))
}

async fn handle_login<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let body: LoginRequest = parse_json_body(req).await?;

    match state.accounts.login(&body.identifier, &body.password).await {
        Ok(user) => {
            state
                .audit
                .log_login(&user.identifier, Some(&user.user_id), true)
                .await;
            let grant = state.accounts.issue(&user)?;
            Ok(json_response(StatusCode::OK, &grant))
        }
        Err(e) => {
            state.audit.log_login(body.identifier.trim(), None, false).await;
            Err(e)
        }
    }
}

fn handle_logout() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Logged out".into(),
        },
    )
}

async fn handle_refresh<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError> {
    let auth = auth_header(&req);
    let (_, user) = state.accounts.resolve(auth.as_deref()).await?;

    let grant = state.accounts.issue(&user)?;
    Ok(json_response(StatusCode::OK, &grant))
}

async fn handle_me<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError> {
    let auth = auth_header(&req);
    let (_, user) = state.accounts.resolve(auth.as_deref()).await?;

    Ok(json_response(StatusCode::OK, &AccountView::from(&user)))
}
