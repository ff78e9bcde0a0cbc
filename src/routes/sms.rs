//! `POST /send-sms`: staff send a free-form text to a farmer's phone

use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use tracing::info;

use super::response::{
    auth_header, json_response, parse_json_body, respond, BoxBody, BoxError, SuccessResponse,
};
use crate::auth::Operation;
use crate::notify::SmsMessage;
use crate::server::AppState;
use crate::types::KrishiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendSmsBody {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    message: String,
}

pub async fn send_sms<B>(state: &AppState, req: Request<B>) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(send_sms_inner(state, req).await)
}

async fn send_sms_inner<B>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<BoxBody>, KrishiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let auth = auth_header(&req);
    let actor = state.accounts.authenticate(auth.as_deref()).await?;
    actor.require(Operation::SendSms)?;

    let body: SendSmsBody = parse_json_body(req).await?;
    let sms = SmsMessage::new(&body.phone, &body.message)?;

    // Unlike status notifications, a direct send reports gateway failures
    let result = state.notifier.send(&sms).await;
    state.audit.log_sms(Some(&actor), None, result.is_ok()).await;
    result?;

    info!(actor = %actor.id, notifier = state.notifier.name(), "SMS sent");
    Ok(json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: format!("SMS sent to {}", sms.phone),
        },
    ))
}
