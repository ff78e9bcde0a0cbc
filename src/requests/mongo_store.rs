//! MongoDB-backed request store

use bson::{doc, Document};

use super::model::SupportRequest;
use super::store::{RequestScope, RequestStore};
use crate::db::schemas::{RequestDoc, REQUEST_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::KrishiError;

pub struct MongoRequestStore {
    collection: MongoCollection<RequestDoc>,
}

impl MongoRequestStore {
    /// Open the collection and ensure its indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self, KrishiError> {
        Ok(Self {
            collection: mongo.collection::<RequestDoc>(REQUEST_COLLECTION).await?,
        })
    }
}

fn scope_filter(scope: &RequestScope) -> Document {
    match scope {
        RequestScope::All => doc! {},
        RequestScope::Farmers(refs) => doc! { "farmer_ref": { "$in": refs.clone() } },
    }
}

#[async_trait::async_trait]
impl RequestStore for MongoRequestStore {
    async fn insert(&self, req: &SupportRequest) -> Result<(), KrishiError> {
        self.collection.insert_one(RequestDoc::from(req)).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SupportRequest>, KrishiError> {
        Ok(self
            .collection
            .find_one(doc! { "request_id": id })
            .await?
            .map(SupportRequest::from))
    }

    async fn list(&self, scope: &RequestScope) -> Result<Vec<SupportRequest>, KrishiError> {
        let docs = self
            .collection
            .find_many(scope_filter(scope), doc! { "metadata.created_at": -1 })
            .await?;
        Ok(docs.into_iter().map(SupportRequest::from).collect())
    }

    async fn save(&self, mut req: SupportRequest) -> Result<SupportRequest, KrishiError> {
        let expected = req.revision as i64;
        req.revision += 1;

        let filter = doc! { "request_id": req.id.as_str(), "revision": expected };
        let result = self
            .collection
            .replace_one(filter, &RequestDoc::from(&req))
            .await?;

        if result.matched_count == 1 {
            return Ok(req);
        }

        // Zero matches: either the request is gone or the revision moved on
        let exists = self.collection.count(doc! { "request_id": req.id.as_str() }).await? > 0;
        if exists {
            Err(KrishiError::Conflict(format!(
                "Request {} was modified concurrently",
                req.id
            )))
        } else {
            Err(KrishiError::NotFound(format!("Request {} not found", req.id)))
        }
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_filter() {
        assert_eq!(scope_filter(&RequestScope::All), doc! {});
        assert_eq!(
            scope_filter(&RequestScope::Farmers(vec!["f-1".into(), "f-2".into()])),
            doc! { "farmer_ref": { "$in": ["f-1", "f-2"] } }
        );
    }
}
