//! Farmer profiles managed by field staff

mod model;
mod service;
mod store;

pub use model::{
    Crop, CropInput, FarmerProfile, FarmerUpdate, Measure, MeasureInput, NewFarmer,
    DEFAULT_INCOME_UNIT, DEFAULT_LAND_UNIT,
};
pub use service::FarmerService;
pub use store::{FarmerQuery, FarmerStore, MemoryFarmerStore, MongoFarmerStore};
