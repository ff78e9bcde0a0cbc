//! Farmer profile operations with role checks

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::info;

use super::model::{FarmerProfile, FarmerUpdate, NewFarmer};
use super::store::{FarmerQuery, FarmerStore};
use crate::auth::{Actor, Operation, Role};
use crate::types::KrishiError;

#[derive(Clone)]
pub struct FarmerService {
    store: Arc<dyn FarmerStore>,
}

impl FarmerService {
    pub fn new(store: Arc<dyn FarmerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FarmerStore> {
        &self.store
    }

    /// Profiles created by a regional executive default to that region
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewFarmer,
    ) -> Result<FarmerProfile, KrishiError> {
        actor.require(Operation::ManageFarmers)?;

        let mut farmer = FarmerProfile::create(input, Utc::now().trunc_subsecs(3))?;
        if actor.role == Role::Executive && farmer.region.is_none() {
            farmer.region = actor.region.clone();
        }

        self.store.insert(&farmer).await?;
        info!(farmer_id = %farmer.id, actor = %actor.id, "Farmer profile created");
        Ok(farmer)
    }

    /// Staff listing; a regional executive only sees their region
    pub async fn list(
        &self,
        actor: &Actor,
        mut query: FarmerQuery,
    ) -> Result<Vec<FarmerProfile>, KrishiError> {
        actor.require(Operation::ManageFarmers)?;
        if actor.role == Role::Executive {
            if let Some(region) = &actor.region {
                query.region = Some(region.clone());
            }
        }
        self.store.list(&query).await
    }

    pub async fn get(&self, actor: &Actor, id: &str) -> Result<FarmerProfile, KrishiError> {
        let farmer = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| KrishiError::NotFound(format!("Farmer {id} not found")))?;
        ensure_visible(actor, &farmer)?;
        Ok(farmer)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &str,
        update: FarmerUpdate,
    ) -> Result<FarmerProfile, KrishiError> {
        actor.require(Operation::ManageFarmers)?;

        let mut farmer = self.get(actor, id).await?;
        farmer.apply_update(update, Utc::now().trunc_subsecs(3))?;
        self.store.update(&farmer).await?;
        info!(farmer_id = %farmer.id, actor = %actor.id, "Farmer profile updated");
        Ok(farmer)
    }

    /// `farmerRef`s of every linked farmer in `region`
    pub async fn user_refs_in_region(&self, region: &str) -> Result<Vec<String>, KrishiError> {
        let query = FarmerQuery {
            search: None,
            region: Some(region.to_string()),
        };
        Ok(self
            .store
            .list(&query)
            .await?
            .into_iter()
            .filter_map(|f| f.user_ref)
            .collect())
    }
}

fn ensure_visible(actor: &Actor, farmer: &FarmerProfile) -> Result<(), KrishiError> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Executive => match &actor.region {
            Some(region) => farmer.in_region(region),
            None => true,
        },
        Role::Farmer => farmer.user_ref.as_deref() == Some(actor.id.as_str()),
    };
    if allowed {
        Ok(())
    } else {
        Err(KrishiError::Forbidden("Farmer profile is outside your scope".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farmers::MemoryFarmerStore;
    use serde_json::json;

    fn service() -> FarmerService {
        FarmerService::new(Arc::new(MemoryFarmerStore::new()))
    }

    fn new_farmer(name: &str, region: Option<&str>, user_ref: Option<&str>) -> NewFarmer {
        serde_json::from_value(json!({
            "name": name,
            "phone": "9000000003",
            "village": "Malegaon",
            "region": region,
            "userRef": user_ref,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_farmer_cannot_create() {
        let svc = service();
        let farmer = Actor::new("f-1", Role::Farmer, "Ramesh");
        let err = svc.create(&farmer, new_farmer("X", None, None)).await.unwrap_err();
        assert!(matches!(err, KrishiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_executive_region_applied_and_scoped() {
        let svc = service();
        let pune = Actor::new("e-1", Role::Executive, "Meena").with_region("Pune");
        let nashik = Actor::new("e-2", Role::Executive, "Ravi").with_region("Nashik");

        let created = svc.create(&pune, new_farmer("Sunil", None, Some("f-9"))).await.unwrap();
        assert_eq!(created.region.as_deref(), Some("Pune"));

        assert_eq!(svc.list(&pune, FarmerQuery::default()).await.unwrap().len(), 1);
        assert!(svc.list(&nashik, FarmerQuery::default()).await.unwrap().is_empty());
        assert!(matches!(
            svc.get(&nashik, &created.id).await,
            Err(KrishiError::Forbidden(_))
        ));

        assert_eq!(svc.user_refs_in_region("pune").await.unwrap(), vec!["f-9".to_string()]);
    }

    #[tokio::test]
    async fn test_farmer_reads_own_profile_only() {
        let svc = service();
        let admin = Actor::new("a-1", Role::Admin, "Admin");
        let own = svc.create(&admin, new_farmer("Own", None, Some("f-1"))).await.unwrap();
        let other = svc.create(&admin, new_farmer("Other", None, Some("f-2"))).await.unwrap();

        let me = Actor::new("f-1", Role::Farmer, "Own");
        assert!(svc.get(&me, &own.id).await.is_ok());
        assert!(matches!(svc.get(&me, &other.id).await, Err(KrishiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_update_normalizes_measures() {
        let svc = service();
        let admin = Actor::new("a-1", Role::Admin, "Admin");
        let created = svc.create(&admin, new_farmer("Kamla", None, None)).await.unwrap();

        let update: FarmerUpdate =
            serde_json::from_value(json!({ "landSize": "3 hectares" })).unwrap();
        let updated = svc.update(&admin, &created.id, update).await.unwrap();
        let land = updated.land_size.unwrap();
        assert_eq!(land.value, 3.0);
        assert_eq!(land.unit, "hectares");
    }
}
