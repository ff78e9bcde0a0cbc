//! Farmer profile persistence

use bson::{doc, Document};
use dashmap::DashMap;

use super::model::FarmerProfile;
use crate::db::schemas::{FarmerDoc, FARMER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::KrishiError;

/// Listing criteria for farmers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FarmerQuery {
    pub search: Option<String>,
    pub region: Option<String>,
}

impl FarmerQuery {
    /// Parse `search` and `region`; malformed percent-encoding is rejected
    pub fn from_query_string(query: Option<&str>) -> Result<Self, KrishiError> {
        let mut params = Self::default();
        if let Some(q) = query {
            for pair in q.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    let value = value.replace('+', " ");
                    let value = urlencoding::decode(&value).map_err(|_| {
                        KrishiError::BadRequest(format!(
                            "Invalid encoding in query parameter '{key}'"
                        ))
                    })?;
                    let value = value.trim();
                    if value.is_empty() {
                        continue;
                    }
                    match key {
                        "search" | "q" => params.search = Some(value.to_string()),
                        "region" => params.region = Some(value.to_string()),
                        _ => {}
                    }
                }
            }
        }
        Ok(params)
    }

    pub fn matches(&self, farmer: &FarmerProfile) -> bool {
        let region_ok = self.region.as_deref().map_or(true, |r| farmer.in_region(r));
        let search_ok = self
            .search
            .as_deref()
            .map_or(true, |s| farmer.matches_search(&s.to_lowercase()));
        region_ok && search_ok
    }
}

#[async_trait::async_trait]
pub trait FarmerStore: Send + Sync {
    async fn insert(&self, farmer: &FarmerProfile) -> Result<(), KrishiError>;

    async fn get(&self, id: &str) -> Result<Option<FarmerProfile>, KrishiError>;

    /// Profile linked to a login account
    async fn get_by_user(&self, user_ref: &str) -> Result<Option<FarmerProfile>, KrishiError>;

    /// Matching profiles ordered by name
    async fn list(&self, query: &FarmerQuery) -> Result<Vec<FarmerProfile>, KrishiError>;

    /// Overwrite an existing profile
    async fn update(&self, farmer: &FarmerProfile) -> Result<(), KrishiError>;
}

/// In-memory farmer store
#[derive(Default)]
pub struct MemoryFarmerStore {
    farmers: DashMap<String, FarmerProfile>,
}

impl MemoryFarmerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_ref_taken(&self, user_ref: &str, except_id: &str) -> bool {
        self.farmers
            .iter()
            .any(|f| f.id != except_id && f.user_ref.as_deref() == Some(user_ref))
    }
}

fn sort_by_name(list: &mut [FarmerProfile]) {
    list.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait::async_trait]
impl FarmerStore for MemoryFarmerStore {
    async fn insert(&self, farmer: &FarmerProfile) -> Result<(), KrishiError> {
        if let Some(user_ref) = farmer.user_ref.as_deref() {
            if self.user_ref_taken(user_ref, &farmer.id) {
                return Err(KrishiError::Conflict(format!(
                    "Account {user_ref} already has a farmer profile"
                )));
            }
        }
        if self.farmers.contains_key(&farmer.id) {
            return Err(KrishiError::Conflict(format!("Farmer {} already exists", farmer.id)));
        }
        self.farmers.insert(farmer.id.clone(), farmer.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<FarmerProfile>, KrishiError> {
        Ok(self.farmers.get(id).map(|f| f.value().clone()))
    }

    async fn get_by_user(&self, user_ref: &str) -> Result<Option<FarmerProfile>, KrishiError> {
        Ok(self
            .farmers
            .iter()
            .find(|f| f.user_ref.as_deref() == Some(user_ref))
            .map(|f| f.value().clone()))
    }

    async fn list(&self, query: &FarmerQuery) -> Result<Vec<FarmerProfile>, KrishiError> {
        let mut out: Vec<FarmerProfile> = self
            .farmers
            .iter()
            .filter(|f| query.matches(f.value()))
            .map(|f| f.value().clone())
            .collect();
        sort_by_name(&mut out);
        Ok(out)
    }

    async fn update(&self, farmer: &FarmerProfile) -> Result<(), KrishiError> {
        if let Some(user_ref) = farmer.user_ref.as_deref() {
            if self.user_ref_taken(user_ref, &farmer.id) {
                return Err(KrishiError::Conflict(format!(
                    "Account {user_ref} already has a farmer profile"
                )));
            }
        }
        match self.farmers.get_mut(&farmer.id) {
            Some(mut slot) => {
                *slot = farmer.clone();
                Ok(())
            }
            None => Err(KrishiError::NotFound(format!("Farmer {} not found", farmer.id))),
        }
    }
}

/// MongoDB-backed farmer store
pub struct MongoFarmerStore {
    collection: MongoCollection<FarmerDoc>,
}

impl MongoFarmerStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self, KrishiError> {
        Ok(Self {
            collection: mongo.collection::<FarmerDoc>(FARMER_COLLECTION).await?,
        })
    }
}

fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn query_filter(query: &FarmerQuery) -> Document {
    let mut filter = doc! {};
    if let Some(region) = &query.region {
        filter.insert(
            "region",
            doc! { "$regex": format!("^{}$", escape_regex(region)), "$options": "i" },
        );
    }
    if let Some(search) = &query.search {
        let pattern = escape_regex(search);
        filter.insert(
            "$or",
            vec![
                doc! { "name": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "village": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "phone": { "$regex": pattern.as_str() } },
            ],
        );
    }
    filter
}

#[async_trait::async_trait]
impl FarmerStore for MongoFarmerStore {
    async fn insert(&self, farmer: &FarmerProfile) -> Result<(), KrishiError> {
        self.collection.insert_one(FarmerDoc::from(farmer)).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<FarmerProfile>, KrishiError> {
        Ok(self
            .collection
            .find_one(doc! { "farmer_id": id })
            .await?
            .map(FarmerProfile::from))
    }

    async fn get_by_user(&self, user_ref: &str) -> Result<Option<FarmerProfile>, KrishiError> {
        Ok(self
            .collection
            .find_one(doc! { "user_ref": user_ref })
            .await?
            .map(FarmerProfile::from))
    }

    async fn list(&self, query: &FarmerQuery) -> Result<Vec<FarmerProfile>, KrishiError> {
        let mut out: Vec<FarmerProfile> = self
            .collection
            .find_many(query_filter(query), doc! { "name": 1 })
            .await?
            .into_iter()
            .map(FarmerProfile::from)
            .collect();
        sort_by_name(&mut out);
        Ok(out)
    }

    async fn update(&self, farmer: &FarmerProfile) -> Result<(), KrishiError> {
        let filter = doc! { "farmer_id": farmer.id.as_str() };
        let result = self
            .collection
            .replace_one(filter, &FarmerDoc::from(farmer))
            .await?;
        if result.matched_count == 0 {
            return Err(KrishiError::NotFound(format!("Farmer {} not found", farmer.id)));
        }
        Ok(())
    }
}
