//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection, and a hand-written
//! `(method, path)` router.

use bytes::Bytes;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{AccountService, JwtValidator, MemoryUserStore, MongoUserStore, UserStore};
use crate::config::Args;
use crate::db::MongoClient;
use crate::farmers::{FarmerService, FarmerStore, MemoryFarmerStore, MongoFarmerStore};
use crate::logging::AuditLogger;
use crate::notify::{LogNotifier, Notifier, SmsWebhookNotifier};
use crate::requests::{MemoryRequestStore, MongoRequestStore, RequestService, RequestStore};
use crate::routes::{self, response::BoxError, BoxBody};
use crate::types::KrishiError;
use crate::uploads::UploadStore;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// `None` when running on in-memory storage
    pub mongo: Option<MongoClient>,
    pub accounts: AccountService,
    pub farmers: FarmerService,
    pub requests: RequestService,
    pub notifier: Arc<dyn Notifier>,
    pub audit: AuditLogger,
    pub started_at: Instant,
}

impl AppState {
    /// Wire services over MongoDB, or over in-memory stores when `mongo` is `None`
    pub async fn build(args: Args, mongo: Option<MongoClient>) -> Result<Self, KrishiError> {
        let (users, farmer_store, request_store): (
            Arc<dyn UserStore>,
            Arc<dyn FarmerStore>,
            Arc<dyn RequestStore>,
        ) = match &mongo {
            Some(client) => (
                Arc::new(MongoUserStore::new(client).await?),
                Arc::new(MongoFarmerStore::new(client).await?),
                Arc::new(MongoRequestStore::new(client).await?),
            ),
            None => (
                Arc::new(MemoryUserStore::new()),
                Arc::new(MemoryFarmerStore::new()),
                Arc::new(MemoryRequestStore::new()),
            ),
        };

        let notifier: Arc<dyn Notifier> = match &args.sms_webhook_url {
            Some(url) => Arc::new(SmsWebhookNotifier::new(
                url.clone(),
                args.sms_webhook_token.clone(),
                Duration::from_millis(args.request_timeout_ms),
            )?),
            None => Arc::new(LogNotifier),
        };

        let audit = AuditLogger::new();
        if let Some(path) = &args.audit_log {
            audit.init_file(path).await?;
        }

        let jwt = Arc::new(args.jwt_validator()?);
        Ok(Self::assemble(
            args,
            mongo,
            jwt,
            users,
            farmer_store,
            request_store,
            notifier,
            audit,
        ))
    }

    /// Fully in-memory state with a log-only notifier
    pub fn in_memory(args: Args) -> Result<Self, KrishiError> {
        let jwt = Arc::new(args.jwt_validator()?);
        Ok(Self::assemble(
            args,
            None,
            jwt,
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryFarmerStore::new()),
            Arc::new(MemoryRequestStore::new()),
            Arc::new(LogNotifier),
            AuditLogger::new(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        args: Args,
        mongo: Option<MongoClient>,
        jwt: Arc<JwtValidator>,
        users: Arc<dyn UserStore>,
        farmer_store: Arc<dyn FarmerStore>,
        request_store: Arc<dyn RequestStore>,
        notifier: Arc<dyn Notifier>,
        audit: AuditLogger,
    ) -> Self {
        let farmers = FarmerService::new(farmer_store);
        let requests = RequestService::new(
            request_store,
            farmers.clone(),
            notifier.clone(),
            UploadStore::new(args.upload_dir.clone()),
            audit.clone(),
            args.transition_policy(),
        );

        Self {
            accounts: AccountService::new(users, jwt),
            farmers,
            requests,
            notifier,
            audit,
            mongo,
            args,
            started_at: Instant::now(),
        }
    }
}

/// Accept connections until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), KrishiError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Krishi Desk listening on {}", state.args.listen);
    if state.mongo.is_none() {
        warn!("Using in-memory storage - data is lost on restart");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, hyper::Error>(handle_request(state, addr, req).await) }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Log and dispatch one request
async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> Response<BoxBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = route(state, req).await;

    info!(
        "[{}] {} {} -> {} ({} ms)",
        addr,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Route a request to its handler
pub async fn route<B>(state: Arc<AppState>, req: Request<B>) -> Response<BoxBody>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        return routes::preflight_response();
    }

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    debug!(?segments, "Routing {}", method);

    match (method, segments.as_slice()) {
        (Method::GET, ["health"] | ["healthz"]) => routes::health_check(&state).await,

        (_, ["auth", ..]) => routes::handle_auth_request(&state, req).await,

        (Method::GET, ["requests"]) => routes::requests::list(&state, req).await,
        (Method::POST, ["requests"]) => routes::requests::create(&state, req).await,
        (Method::GET, ["requests", id]) => routes::requests::get(&state, req, id).await,
        (Method::POST, ["requests", id, "comment" | "comments"]) => {
            routes::requests::comment(&state, req, id).await
        }
        (Method::PUT | Method::PATCH, ["requests", id, "status"]) => {
            routes::requests::update_status(&state, req, id).await
        }
        (Method::POST, ["requests", id, "attachments"]) => {
            routes::requests::attach(&state, req, id).await
        }
        (
            _,
            ["requests"]
            | ["requests", _]
            | ["requests", _, "comment" | "comments" | "status" | "attachments"],
        ) => routes::method_not_allowed(),

        (Method::GET, ["farmers"]) => routes::farmers::list(&state, req).await,
        (Method::POST, ["farmers"]) => routes::farmers::create(&state, req).await,
        (Method::GET, ["farmers", id]) => routes::farmers::get(&state, req, id).await,
        (Method::PUT | Method::PATCH, ["farmers", id]) => {
            routes::farmers::update(&state, req, id).await
        }
        (_, ["farmers"] | ["farmers", _]) => routes::method_not_allowed(),

        (Method::POST, ["send-sms"]) => routes::send_sms(&state, req).await,
        (_, ["health"] | ["healthz"] | ["send-sms"]) => routes::method_not_allowed(),

        _ => routes::not_found_response(&path),
    }
}
