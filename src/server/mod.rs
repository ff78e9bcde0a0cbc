//! HTTP server for Krishi Desk

pub mod http;

pub use http::{route, run, AppState};
