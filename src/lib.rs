//! Krishi Desk - support requests for farmer field services
//!
//! Farmers file support requests (irrigation, crop disease, credit, ...),
//! field executives and admins triage them, comment, and move them through
//! `pending → in-progress → resolved | rejected`. Farmers are notified by SMS
//! when their request changes status.
//!
//! ## Modules
//!
//! - **requests**: request records, status lifecycle, dashboard filtering, storage
//! - **farmers**: farmer profiles with normalized land size, income and crop
//! - **auth**: JWT sessions, Argon2 passwords, roles and accounts
//! - **notify**: SMS notifier (log-only or HTTP webhook)
//! - **uploads**: multipart attachments written to disk
//! - **server** / **routes**: hyper HTTP server and REST handlers

pub mod auth;
pub mod config;
pub mod db;
pub mod farmers;
pub mod logging;
pub mod notify;
pub mod requests;
pub mod routes;
pub mod server;
pub mod types;
pub mod uploads;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{KrishiError, Result};
