//! Database schemas for Krishi Desk
//!
//! MongoDB document structures. Domain types live in `requests` and
//! `farmers`; the documents here convert to and from them.

mod farmer;
mod metadata;
mod request;
mod user;

pub use farmer::{FarmerDoc, FARMER_COLLECTION};
pub use metadata::Metadata;
pub use request::{AttachmentDoc, CommentDoc, RequestDoc, REQUEST_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
