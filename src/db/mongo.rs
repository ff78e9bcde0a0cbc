//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures::StreamExt;
use mongodb::{options::IndexOptions, results::UpdateResult, Client, Collection, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::KrishiError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping the database
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, KrishiError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| KrishiError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| KrishiError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, creating its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, KrishiError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Round-trip a ping, used by the health endpoint
    pub async fn ping(&self) -> bool {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, KrishiError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), KrishiError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| KrishiError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document. Timestamps already set by the caller are kept.
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, KrishiError> {
        let now = DateTime::now();
        let metadata = item.mut_metadata();
        metadata.created_at.get_or_insert(now);
        metadata.updated_at.get_or_insert(now);

        let result = self.inner.insert_one(item).await.map_err(map_write_error)?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| KrishiError::Database("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, KrishiError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| KrishiError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter, sorted
    pub async fn find_many(&self, filter: Document, sort: Document) -> Result<Vec<T>, KrishiError> {
        let cursor = self
            .inner
            .find(filter)
            .sort(sort)
            .await
            .map_err(|e| KrishiError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Replace the document matching `filter`.
    ///
    /// Callers put the expected revision in the filter; a zero match count
    /// means another writer got there first.
    pub async fn replace_one(
        &self,
        filter: Document,
        item: &T,
    ) -> Result<UpdateResult, KrishiError> {
        self.inner
            .replace_one(filter, item)
            .await
            .map_err(map_write_error)
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64, KrishiError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| KrishiError::Database(format!("Count failed: {}", e)))
    }
}

/// Duplicate-key writes are conflicts, everything else is a database failure
fn map_write_error(e: mongodb::error::Error) -> KrishiError {
    let message = e.to_string();
    if message.contains("E11000") || message.contains("duplicate key") {
        KrishiError::Conflict("Document already exists".into())
    } else {
        KrishiError::Database(format!("Write failed: {}", message))
    }
}
