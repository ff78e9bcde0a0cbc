//! Farmer profile routes

use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

use super::response::{auth_header, json_response, parse_json_body, respond, BoxBody, BoxError};
use crate::farmers::{FarmerProfile, FarmerQuery, FarmerUpdate, NewFarmer};
use crate::server::AppState;
use crate::types::KrishiError;

#[derive(Debug, Serialize)]
struct FarmerList {
    farmers: Vec<FarmerProfile>,
    total: usize,
}

pub async fn list<B>(state: &AppState, req: Request<B>) -> Response<BoxBody> {
    respond(
        async {
            let auth = auth_header(&req);
            let actor = state.accounts.authenticate(auth.as_deref()).await?;
            let query = FarmerQuery::from_query_string(req.uri().query())?;
            let farmers = state.farmers.list(&actor, query).await?;
            let total = farmers.len();
            Ok::<_, KrishiError>(json_response(StatusCode::OK, &FarmerList { farmers, total }))
        }
        .await,
    )
}

pub async fn create<B>(state: &AppState, req: Request<B>) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(
        async {
            let auth = auth_header(&req);
            let actor = state.accounts.authenticate(auth.as_deref()).await?;
            let input: NewFarmer = parse_json_body(req).await?;
            let farmer = state.farmers.create(&actor, input).await?;
            Ok::<_, KrishiError>(json_response(StatusCode::CREATED, &farmer))
        }
        .await,
    )
}

pub async fn get<B>(state: &AppState, req: Request<B>, id: &str) -> Response<BoxBody> {
    respond(
        async {
            let auth = auth_header(&req);
            let actor = state.accounts.authenticate(auth.as_deref()).await?;
            let farmer = state.farmers.get(&actor, id).await?;
            Ok::<_, KrishiError>(json_response(StatusCode::OK, &farmer))
        }
        .await,
    )
}

pub async fn update<B>(state: &AppState, req: Request<B>, id: &str) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    respond(
        async {
            let auth = auth_header(&req);
            let actor = state.accounts.authenticate(auth.as_deref()).await?;
            let update: FarmerUpdate = parse_json_body(req).await?;
            let farmer = state.farmers.update(&actor, id, update).await?;
            Ok::<_, KrishiError>(json_response(StatusCode::OK, &farmer))
        }
        .await,
    )
}
