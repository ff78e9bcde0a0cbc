//! Request persistence
//!
//! Writes are compare-and-swap on `revision`: a save succeeds only if the
//! stored revision still equals the one the caller loaded, and bumps it by one.

use dashmap::DashMap;

use super::model::SupportRequest;
use crate::types::KrishiError;

/// Which requests a listing may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestScope {
    All,
    /// Requests whose `farmerRef` is one of these
    Farmers(Vec<String>),
}

impl RequestScope {
    pub fn farmer(farmer_ref: impl Into<String>) -> Self {
        RequestScope::Farmers(vec![farmer_ref.into()])
    }

    pub fn contains(&self, req: &SupportRequest) -> bool {
        match self {
            RequestScope::All => true,
            RequestScope::Farmers(refs) => refs.iter().any(|r| *r == req.farmer_ref),
        }
    }
}

/// Storage backend for requests - in-memory for dev, MongoDB for prod
#[async_trait::async_trait]
pub trait RequestStore: Send + Sync {
    /// Store a new request. Fails with `Conflict` if the id exists.
    async fn insert(&self, req: &SupportRequest) -> Result<(), KrishiError>;

    async fn get(&self, id: &str) -> Result<Option<SupportRequest>, KrishiError>;

    /// Requests in scope, newest first
    async fn list(&self, scope: &RequestScope) -> Result<Vec<SupportRequest>, KrishiError>;

    /// Replace the stored request if its revision is still `req.revision`.
    ///
    /// Returns the saved request with the bumped revision, or `Conflict` when
    /// another writer saved first.
    async fn save(&self, req: SupportRequest) -> Result<SupportRequest, KrishiError>;

    /// Backend name for health output
    fn backend(&self) -> &'static str;
}

/// In-memory request store
#[derive(Default)]
pub struct MemoryRequestStore {
    requests: DashMap<String, SupportRequest>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[async_trait::async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, req: &SupportRequest) -> Result<(), KrishiError> {
        use dashmap::mapref::entry::Entry;

        match self.requests.entry(req.id.clone()) {
            Entry::Occupied(_) => Err(KrishiError::Conflict(format!(
                "Request {} already exists",
                req.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(req.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<SupportRequest>, KrishiError> {
        Ok(self.requests.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self, scope: &RequestScope) -> Result<Vec<SupportRequest>, KrishiError> {
        let mut out: Vec<SupportRequest> = self
            .requests
            .iter()
            .filter(|r| scope.contains(r.value()))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn save(&self, mut req: SupportRequest) -> Result<SupportRequest, KrishiError> {
        // get_mut holds the shard lock for the compare and the write
        let mut stored = self
            .requests
            .get_mut(&req.id)
            .ok_or_else(|| KrishiError::NotFound(format!("Request {} not found", req.id)))?;

        if stored.revision != req.revision {
            return Err(KrishiError::Conflict(format!(
                "Request {} was modified concurrently",
                req.id
            )));
        }

        req.revision += 1;
        *stored = req.clone();
        Ok(req)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::model::{NewRequest, RequestCategory};
    use chrono::{Duration, Utc};

    fn make(title: &str, farmer: &str, offset_min: i64) -> SupportRequest {
        SupportRequest::create(
            NewRequest {
                title: title.into(),
                description: "details".into(),
                category: RequestCategory::Other,
                priority: None,
                farmer_ref: None,
            },
            farmer.into(),
            vec![],
            Utc::now() + Duration::minutes(offset_min),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_list_scoped() {
        let store = MemoryRequestStore::new();
        store.insert(&make("old", "f-1", 0)).await.unwrap();
        store.insert(&make("new", "f-1", 5)).await.unwrap();
        store.insert(&make("other", "f-2", 1)).await.unwrap();

        let mine = store.list(&RequestScope::farmer("f-1")).await.unwrap();
        let titles: Vec<_> = mine.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);

        assert_eq!(store.list(&RequestScope::All).await.unwrap().len(), 3);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryRequestStore::new();
        let req = make("a", "f-1", 0);
        store.insert(&req).await.unwrap();
        assert!(matches!(store.insert(&req).await, Err(KrishiError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let store = MemoryRequestStore::new();
        let req = make("a", "f-1", 0);
        store.insert(&req).await.unwrap();

        let first = req.clone();
        let stale = req.clone();

        let saved = store.save(first).await.unwrap();
        assert_eq!(saved.revision, 1);

        assert!(matches!(store.save(stale).await, Err(KrishiError::Conflict(_))));
        assert_eq!(store.get(&req.id).await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_save_unknown_is_not_found() {
        let store = MemoryRequestStore::new();
        assert!(matches!(
            store.save(make("ghost", "f-1", 0)).await,
            Err(KrishiError::NotFound(_))
        ));
    }
}
