//! Support request document schema
//!
//! Comments and attachments are embedded so that a status change and its
//! audit comment land in a single document write. `revision` is the
//! compare-and-swap guard for that write.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::requests::{
    Attachment, Comment, Priority, RequestCategory, RequestStatus, SupportRequest,
};

/// Collection name for support requests
pub const REQUEST_COLLECTION: &str = "requests";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AttachmentDoc {
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub uploaded_at: DateTime,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommentDoc {
    pub text: String,
    pub posted_by_role: Role,
    pub author_ref: String,
    pub user_name: String,
    pub created_at: DateTime,
}

/// Request document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RequestDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub request_id: String,
    pub title: String,
    pub description: String,
    pub category: RequestCategory,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: RequestStatus,
    pub farmer_ref: String,

    #[serde(default)]
    pub attachments: Vec<AttachmentDoc>,

    #[serde(default)]
    pub comments: Vec<CommentDoc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_date: Option<DateTime>,

    #[serde(default)]
    pub revision: i64,
}

impl From<&Attachment> for AttachmentDoc {
    fn from(a: &Attachment) -> Self {
        Self {
            file_name: a.file_name.clone(),
            file_path: a.file_path.clone(),
            file_type: a.file_type.clone(),
            uploaded_at: DateTime::from_chrono(a.uploaded_at),
        }
    }
}

impl From<AttachmentDoc> for Attachment {
    fn from(a: AttachmentDoc) -> Self {
        Self {
            file_name: a.file_name,
            file_path: a.file_path,
            file_type: a.file_type,
            uploaded_at: a.uploaded_at.to_chrono(),
        }
    }
}

impl From<&Comment> for CommentDoc {
    fn from(c: &Comment) -> Self {
        Self {
            text: c.text.clone(),
            posted_by_role: c.posted_by_role,
            author_ref: c.author_ref.clone(),
            user_name: c.user_name.clone(),
            created_at: DateTime::from_chrono(c.created_at),
        }
    }
}

impl From<CommentDoc> for Comment {
    fn from(c: CommentDoc) -> Self {
        Self {
            text: c.text,
            posted_by_role: c.posted_by_role,
            author_ref: c.author_ref,
            user_name: c.user_name,
            created_at: c.created_at.to_chrono(),
        }
    }
}

impl From<&SupportRequest> for RequestDoc {
    fn from(req: &SupportRequest) -> Self {
        Self {
            _id: None,
            metadata: Metadata::from_chrono(req.created_at, req.updated_at),
            request_id: req.id.clone(),
            title: req.title.clone(),
            description: req.description.clone(),
            category: req.category,
            priority: req.priority,
            status: req.status,
            farmer_ref: req.farmer_ref.clone(),
            attachments: req.attachments.iter().map(AttachmentDoc::from).collect(),
            comments: req.comments.iter().map(CommentDoc::from).collect(),
            resolved_date: req.resolved_date.map(DateTime::from_chrono),
            revision: req.revision as i64,
        }
    }
}

impl From<RequestDoc> for SupportRequest {
    fn from(doc: RequestDoc) -> Self {
        Self {
            id: doc.request_id,
            title: doc.title,
            description: doc.description,
            category: doc.category,
            priority: doc.priority,
            status: doc.status,
            farmer_ref: doc.farmer_ref,
            attachments: doc.attachments.into_iter().map(Attachment::from).collect(),
            comments: doc.comments.into_iter().map(Comment::from).collect(),
            created_at: doc.metadata.created_at_chrono(),
            updated_at: doc.metadata.updated_at_chrono(),
            resolved_date: doc.resolved_date.map(|d| d.to_chrono()),
            revision: doc.revision.max(0) as u64,
        }
    }
}

impl IntoIndexes for RequestDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "request_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("request_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "farmer_ref": 1 },
                Some(
                    IndexOptions::builder()
                        .name("farmer_ref_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("status_created_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for RequestDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Actor;
    use crate::requests::NewRequest;
    use chrono::{TimeZone, Utc};

    fn sample() -> SupportRequest {
        let created = Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap();
        let mut req = SupportRequest::create(
            NewRequest {
                title: "Pump broken".into(),
                description: "No water since Monday".into(),
                category: RequestCategory::IrrigationIssue,
                priority: Some(Priority::High),
                farmer_ref: None,
            },
            "farmer-7".into(),
            vec![],
            created,
        )
        .unwrap();
        let exec = Actor::new("exec-1", Role::Executive, "Meena");
        req.comments.push(Comment::by(&exec, "Visiting tomorrow", created));
        req.status = RequestStatus::Resolved;
        req.resolved_date = Some(created);
        req.revision = 4;
        req
    }

    #[test]
    fn test_document_keeps_domain_fields() {
        let req = sample();
        let back = SupportRequest::from(RequestDoc::from(&req));
        assert_eq!(back, req);
    }

    #[test]
    fn test_status_stored_as_wire_string() {
        let doc = bson::to_document(&RequestDoc::from(&sample())).unwrap();
        assert_eq!(doc.get_str("status").unwrap(), "resolved");
        assert_eq!(doc.get_str("category").unwrap(), "irrigation-issue");
        assert_eq!(doc.get_i64("revision").unwrap(), 4);
    }
}
