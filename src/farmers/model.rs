//! Farmer profiles and measure normalization
//!
//! Land size, income and crop arrive from older clients in several shapes
//! (`"5 acres"`, `5`, `{"value": 5, "unit": "acres"}`). [`MeasureInput`] and
//! [`CropInput`] accept all of them; everything stored or returned uses the
//! tagged `{value, unit}` form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::KrishiError;

pub const DEFAULT_LAND_UNIT: &str = "acres";
pub const DEFAULT_INCOME_UNIT: &str = "INR";

/// A quantity with its unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub value: f64,
    pub unit: String,
}

/// Crop name, optionally with a variety or season label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Any accepted input shape for a measure
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MeasureInput {
    Tagged {
        value: f64,
        #[serde(default)]
        unit: Option<String>,
    },
    Number(f64),
    Text(String),
}

impl MeasureInput {
    /// Normalize into a [`Measure`], filling in `default_unit` when absent
    pub fn normalize(self, default_unit: &str) -> Result<Measure, KrishiError> {
        let (value, unit) = match self {
            MeasureInput::Tagged { value, unit } => (value, unit),
            MeasureInput::Number(value) => (value, None),
            MeasureInput::Text(text) => parse_measure_text(&text)?,
        };

        if !value.is_finite() || value < 0.0 {
            return Err(KrishiError::Validation(format!(
                "Measure must be a non-negative number, got {value}"
            )));
        }

        let unit = unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| default_unit.to_string());

        Ok(Measure { value, unit })
    }
}

/// Split `"5.5 acres"` / `"₹ 40,000"` / `"12"` into number and unit
fn parse_measure_text(text: &str) -> Result<(f64, Option<String>), KrishiError> {
    let trimmed = text.trim();
    let start = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| KrishiError::Validation(format!("No number in measure '{trimmed}'")))?;

    let prefix = trimmed[..start].trim();
    let rest = &trimmed[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());

    let number: String = rest[..end].chars().filter(|c| *c != ',').collect();
    let value = number
        .parse::<f64>()
        .map_err(|_| KrishiError::Validation(format!("Invalid number in measure '{trimmed}'")))?;

    let suffix = rest[end..].trim();
    let unit = match (prefix.is_empty(), suffix.is_empty()) {
        (_, false) => Some(suffix.to_string()),
        (false, true) => Some(prefix.to_string()),
        (true, true) => None,
    };

    Ok((value, unit))
}

/// Any accepted input shape for a crop
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CropInput {
    Tagged {
        value: String,
        #[serde(default)]
        unit: Option<String>,
    },
    Text(String),
}

impl CropInput {
    pub fn normalize(self) -> Result<Crop, KrishiError> {
        let (value, unit) = match self {
            CropInput::Tagged { value, unit } => (value, unit),
            CropInput::Text(value) => (value, None),
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(KrishiError::Validation("Crop name is empty".into()));
        }
        Ok(Crop {
            value,
            unit: unit.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
        })
    }
}

/// A farmer managed by field staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerProfile {
    pub id: String,
    /// Login account of the farmer, matches `farmerRef` on requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ref: Option<String>,
    pub name: String,
    pub phone: String,
    pub village: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_size: Option<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_income: Option<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFarmer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub village: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub user_ref: Option<String>,
    #[serde(default)]
    pub land_size: Option<MeasureInput>,
    #[serde(default)]
    pub annual_income: Option<MeasureInput>,
    #[serde(default)]
    pub crop: Option<CropInput>,
}

/// Partial update, absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub village: Option<String>,
    pub region: Option<String>,
    pub user_ref: Option<String>,
    pub land_size: Option<MeasureInput>,
    pub annual_income: Option<MeasureInput>,
    pub crop: Option<CropInput>,
}

fn required(field: &str, value: &str) -> Result<String, KrishiError> {
    let value = value.trim();
    if value.is_empty() {
        Err(KrishiError::Validation(format!("{field} is required")))
    } else {
        Ok(value.to_string())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl FarmerProfile {
    pub fn create(input: NewFarmer, now: DateTime<Utc>) -> Result<Self, KrishiError> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_ref: non_blank(input.user_ref),
            name: required("Name", &input.name)?,
            phone: required("Phone", &input.phone)?,
            village: input.village.trim().to_string(),
            region: non_blank(input.region),
            land_size: input
                .land_size
                .map(|m| m.normalize(DEFAULT_LAND_UNIT))
                .transpose()?,
            annual_income: input
                .annual_income
                .map(|m| m.normalize(DEFAULT_INCOME_UNIT))
                .transpose()?,
            crop: input.crop.map(CropInput::normalize).transpose()?,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update. Nothing changes if any field is invalid.
    pub fn apply_update(
        &mut self,
        update: FarmerUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), KrishiError> {
        let name = update.name.as_deref().map(|n| required("Name", n)).transpose()?;
        let phone = update.phone.as_deref().map(|p| required("Phone", p)).transpose()?;
        let land_size = update
            .land_size
            .map(|m| m.normalize(DEFAULT_LAND_UNIT))
            .transpose()?;
        let annual_income = update
            .annual_income
            .map(|m| m.normalize(DEFAULT_INCOME_UNIT))
            .transpose()?;
        let crop = update.crop.map(CropInput::normalize).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(phone) = phone {
            self.phone = phone;
        }
        if let Some(village) = update.village {
            self.village = village.trim().to_string();
        }
        if update.region.is_some() {
            self.region = non_blank(update.region);
        }
        if update.user_ref.is_some() {
            self.user_ref = non_blank(update.user_ref);
        }
        if land_size.is_some() {
            self.land_size = land_size;
        }
        if annual_income.is_some() {
            self.annual_income = annual_income;
        }
        if crop.is_some() {
            self.crop = crop;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Case-insensitive match on name, village or phone
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        self.name.to_lowercase().contains(needle_lower)
            || self.village.to_lowercase().contains(needle_lower)
            || self.phone.contains(needle_lower)
    }

    pub fn in_region(&self, region: &str) -> bool {
        self.region
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn measure(v: serde_json::Value, unit: &str) -> Measure {
        serde_json::from_value::<MeasureInput>(v)
            .unwrap()
            .normalize(unit)
            .unwrap()
    }

    #[test]
    fn test_measure_shapes_normalize() {
        let expected = Measure {
            value: 5.0,
            unit: "acres".into(),
        };
        assert_eq!(measure(json!("5 acres"), DEFAULT_LAND_UNIT), expected);
        assert_eq!(measure(json!(5), DEFAULT_LAND_UNIT), expected);
        assert_eq!(measure(json!({"value": 5, "unit": "acres"}), DEFAULT_LAND_UNIT), expected);
        assert_eq!(measure(json!({"value": 5}), DEFAULT_LAND_UNIT), expected);
    }

    #[test]
    fn test_measure_text_with_prefix_and_grouping() {
        assert_eq!(
            measure(json!("₹ 1,20,000"), DEFAULT_INCOME_UNIT),
            Measure {
                value: 120000.0,
                unit: "₹".into()
            }
        );
        assert_eq!(
            measure(json!("2.5 hectares"), DEFAULT_LAND_UNIT),
            Measure {
                value: 2.5,
                unit: "hectares".into()
            }
        );
    }

    #[test]
    fn test_measure_rejects_garbage() {
        let input: MeasureInput = serde_json::from_value(json!("a few")).unwrap();
        assert!(input.normalize(DEFAULT_LAND_UNIT).is_err());
        let negative: MeasureInput = serde_json::from_value(json!(-3)).unwrap();
        assert!(negative.normalize(DEFAULT_LAND_UNIT).is_err());
    }

    #[test]
    fn test_crop_shapes() {
        let plain: CropInput = serde_json::from_value(json!("Paddy")).unwrap();
        assert_eq!(
            plain.normalize().unwrap(),
            Crop {
                value: "Paddy".into(),
                unit: None
            }
        );
        let tagged: CropInput =
            serde_json::from_value(json!({"value": "Wheat", "unit": "rabi"})).unwrap();
        assert_eq!(tagged.normalize().unwrap().unit.as_deref(), Some("rabi"));
    }

    #[test]
    fn test_create_and_update() {
        let input: NewFarmer = serde_json::from_value(json!({
            "name": " Ramesh Patil ",
            "phone": "9876543210",
            "village": "Shirur",
            "region": "Pune",
            "landSize": "4 acres",
            "crop": "Sugarcane"
        }))
        .unwrap();
        let now = Utc::now();
        let mut farmer = FarmerProfile::create(input, now).unwrap();
        assert_eq!(farmer.name, "Ramesh Patil");
        assert!(farmer.in_region("pune"));
        assert!(farmer.matches_search("shir"));

        let bad = FarmerUpdate {
            name: Some("  ".into()),
            village: Some("Baramati".into()),
            ..Default::default()
        };
        assert!(farmer.apply_update(bad, now).is_err());
        assert_eq!(farmer.village, "Shirur");

        let good = FarmerUpdate {
            annual_income: Some(MeasureInput::Number(90000.0)),
            ..Default::default()
        };
        farmer.apply_update(good, now).unwrap();
        assert_eq!(farmer.annual_income.unwrap().unit, "INR");
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let input: NewFarmer = serde_json::from_value(json!({
            "name": "Sunita",
            "phone": "9000000001",
            "landSize": 2
        }))
        .unwrap();
        let farmer = FarmerProfile::create(input, Utc::now()).unwrap();
        let value = serde_json::to_value(&farmer).unwrap();
        assert_eq!(value["landSize"], json!({"value": 2.0, "unit": "acres"}));
    }
}
