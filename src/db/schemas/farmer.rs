//! Farmer profile document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::farmers::{Crop, FarmerProfile, Measure};

/// Collection name for farmer profiles
pub const FARMER_COLLECTION: &str = "farmers";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FarmerDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub farmer_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<String>,

    pub name: String,
    pub phone: String,

    #[serde(default)]
    pub village: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_size: Option<Measure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_income: Option<Measure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
}

impl From<&FarmerProfile> for FarmerDoc {
    fn from(f: &FarmerProfile) -> Self {
        Self {
            _id: None,
            metadata: Metadata::from_chrono(f.created_at, f.updated_at),
            farmer_id: f.id.clone(),
            user_ref: f.user_ref.clone(),
            name: f.name.clone(),
            phone: f.phone.clone(),
            village: f.village.clone(),
            region: f.region.clone(),
            land_size: f.land_size.clone(),
            annual_income: f.annual_income.clone(),
            crop: f.crop.clone(),
        }
    }
}

impl From<FarmerDoc> for FarmerProfile {
    fn from(doc: FarmerDoc) -> Self {
        Self {
            created_at: doc.metadata.created_at_chrono(),
            updated_at: doc.metadata.updated_at_chrono(),
            id: doc.farmer_id,
            user_ref: doc.user_ref,
            name: doc.name,
            phone: doc.phone,
            village: doc.village,
            region: doc.region,
            land_size: doc.land_size,
            annual_income: doc.annual_income,
            crop: doc.crop,
        }
    }
}

impl IntoIndexes for FarmerDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "farmer_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("farmer_id_unique".to_string())
                        .build(),
                ),
            ),
            // Sparse: most profiles are created before the farmer has a login
            (
                doc! { "user_ref": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .sparse(true)
                        .name("user_ref_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "region": 1 },
                Some(
                    IndexOptions::builder()
                        .name("region_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for FarmerDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
