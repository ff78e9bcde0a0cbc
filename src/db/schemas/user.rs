//! User account document schema
//!
//! Login credentials plus the role and region that end up in issued tokens.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Stable id used as token subject and as `farmerRef` on requests
    pub user_id: String,

    /// Phone number or email, unique
    pub identifier: String,

    /// Argon2 PHC string
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,

    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Increment to invalidate all outstanding tokens
    #[serde(default)]
    pub token_version: i32,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    pub fn new(
        identifier: String,
        password_hash: String,
        role: Role,
        display_name: String,
        region: Option<String>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id: Uuid::new_v4().to_string(),
            identifier,
            password_hash,
            role,
            display_name,
            region,
            token_version: 1,
            is_active: true,
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_is_active() {
        let user = UserDoc::new(
            "9876543210".into(),
            "$argon2id$stub".into(),
            Role::Farmer,
            "Ramesh".into(),
            None,
        );
        assert!(user.is_active);
        assert_eq!(user.token_version, 1);
        assert!(Uuid::parse_str(&user.user_id).is_ok());
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let doc = doc! {
            "user_id": "u-1",
            "identifier": "exec@example.org",
            "password_hash": "x",
            "display_name": "Meena",
        };
        let user: UserDoc = bson::from_document(doc).unwrap();
        assert_eq!(user.role, Role::Farmer);
        assert!(user.is_active);
        assert_eq!(user.region, None);
    }
}
