//! Database layer for Krishi Desk
//!
//! MongoDB storage for user accounts, farmer profiles and support requests.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use schemas::{FarmerDoc, Metadata, RequestDoc, UserDoc};
