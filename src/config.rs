//! Configuration for Krishi Desk
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::JwtValidator;
use crate::requests::TransitionPolicy;
use crate::types::KrishiError;

/// Krishi Desk - support requests for farmer field services
#[derive(Parser, Debug, Clone)]
#[command(name = "krishi-desk")]
#[command(about = "REST backend for farmer support requests, comments and status tracking")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory storage fallback, dev JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "krishi")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Append lifecycle audit events (JSONL) to this file
    #[arg(long, env = "AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Directory where request attachments are written
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Maximum size of a request body carrying attachments, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Reject status changes that leave resolved/rejected
    #[arg(long, env = "STRICT_TRANSITIONS", default_value = "false")]
    pub strict_transitions: bool,

    /// SMS gateway webhook URL; notifications are only logged when unset
    #[arg(long, env = "SMS_WEBHOOK_URL")]
    pub sms_webhook_url: Option<String>,

    /// Bearer token sent to the SMS gateway
    #[arg(long, env = "SMS_WEBHOOK_TOKEN")]
    pub sms_webhook_token: Option<String>,

    /// Identifier of an admin account to create at startup if missing
    #[arg(long, env = "ADMIN_IDENTIFIER")]
    pub admin_identifier: Option<String>,

    /// Password for the bootstrap admin account
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Timeout for outbound notification calls in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,
}

impl Args {
    /// Build the JWT validator for this configuration (dev secret in dev mode)
    pub fn jwt_validator(&self) -> Result<JwtValidator, KrishiError> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => JwtValidator::new(secret.clone(), self.jwt_expiry_seconds),
            (None, true) => Ok(JwtValidator::new_dev()),
            (None, false) => Err(KrishiError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Transition policy selected by `--strict-transitions`
    pub fn transition_policy(&self) -> TransitionPolicy {
        if self.strict_transitions {
            TransitionPolicy::Strict
        } else {
            TransitionPolicy::Permissive
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("MAX_UPLOAD_BYTES must be greater than zero".to_string());
        }

        if self.admin_identifier.is_some() != self.admin_password.is_some() {
            return Err("ADMIN_IDENTIFIER and ADMIN_PASSWORD must be set together".to_string());
        }

        if let Some(ref url) = self.sms_webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("SMS_WEBHOOK_URL must be an http(s) URL".to_string());
            }
        }

        Ok(())
    }
}
