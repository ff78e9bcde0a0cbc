//! Support requests: records, lifecycle, filtering and storage

mod filter;
mod lifecycle;
mod model;
mod mongo_store;
mod service;
mod store;

pub use filter::{filter_requests, DashboardTab, RequestFilter};
pub use lifecycle::{
    add_comment, apply_transition, parse_status, TransitionOutcome, TransitionPolicy,
};
pub use model::{
    Attachment, Comment, NewRequest, Priority, RequestCategory, RequestStatus, SupportRequest,
};
pub use mongo_store::MongoRequestStore;
pub use service::{RequestService, MAX_WRITE_ATTEMPTS};
pub use store::{MemoryRequestStore, RequestScope, RequestStore};
