//! HTTP routes for Krishi Desk

pub mod auth_routes;
pub mod farmers;
pub mod health;
pub mod requests;
pub mod response;
pub mod sms;

pub use auth_routes::handle_auth_request;
pub use health::health_check;
pub use response::{
    error_response, json_response, method_not_allowed, not_found_response, preflight_response,
    respond, BoxBody, ErrorResponse, SuccessResponse,
};
pub use sms::send_sms;
