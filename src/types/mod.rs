//! Shared types for Krishi Desk

mod error;

pub use error::{KrishiError, Result};
