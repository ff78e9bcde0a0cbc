//! Common metadata for all documents
//!
//! Creation and last-update timestamps, stored as a `metadata` sub-document.

use bson::DateTime;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Metadata {
    /// Create new metadata with current timestamp
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Metadata carrying explicit domain timestamps
    pub fn from_chrono(
        created_at: chrono::DateTime<Utc>,
        updated_at: chrono::DateTime<Utc>,
    ) -> Self {
        Self {
            created_at: Some(DateTime::from_chrono(created_at)),
            updated_at: Some(DateTime::from_chrono(updated_at)),
        }
    }

    pub fn created_at_chrono(&self) -> chrono::DateTime<Utc> {
        self.created_at.map(|d| d.to_chrono()).unwrap_or_else(Utc::now)
    }

    /// Falls back to `created_at` for documents never updated
    pub fn updated_at_chrono(&self) -> chrono::DateTime<Utc> {
        self.updated_at
            .or(self.created_at)
            .map(|d| d.to_chrono())
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chrono_round_trip_keeps_millis() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap();
        let meta = Metadata::from_chrono(created, updated);
        assert_eq!(meta.created_at_chrono(), created);
        assert_eq!(meta.updated_at_chrono(), updated);
    }

    #[test]
    fn test_updated_falls_back_to_created() {
        let created = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let meta = Metadata {
            created_at: Some(DateTime::from_chrono(created)),
            updated_at: None,
        };
        assert_eq!(meta.updated_at_chrono(), created);
    }
}
