//! Support request records
//!
//! A request is created by a farmer, then mutated only through the comment
//! ledger and the status transition handler in [`super::lifecycle`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::types::KrishiError;

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in-progress",
            RequestStatus::Resolved => "resolved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Resolved and rejected end the working life of a request
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Resolved | RequestStatus::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = KrishiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "in-progress" | "in_progress" | "inprogress" => Ok(RequestStatus::InProgress),
            "resolved" => Ok(RequestStatus::Resolved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(KrishiError::Validation(format!("Unknown status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = KrishiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(KrishiError::Validation(format!("Unknown priority: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestCategory {
    IrrigationIssue,
    FinancialAssistance,
    CropDisease,
    TrainingRequest,
    MarketAccess,
    TechnicalSupport,
    EquipmentProblem,
    Other,
}

impl RequestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCategory::IrrigationIssue => "irrigation-issue",
            RequestCategory::FinancialAssistance => "financial-assistance",
            RequestCategory::CropDisease => "crop-disease",
            RequestCategory::TrainingRequest => "training-request",
            RequestCategory::MarketAccess => "market-access",
            RequestCategory::TechnicalSupport => "technical-support",
            RequestCategory::EquipmentProblem => "equipment-problem",
            RequestCategory::Other => "other",
        }
    }
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestCategory {
    type Err = KrishiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "irrigation-issue" => Ok(RequestCategory::IrrigationIssue),
            "financial-assistance" => Ok(RequestCategory::FinancialAssistance),
            "crop-disease" => Ok(RequestCategory::CropDisease),
            "training-request" => Ok(RequestCategory::TrainingRequest),
            "market-access" => Ok(RequestCategory::MarketAccess),
            "technical-support" => Ok(RequestCategory::TechnicalSupport),
            "equipment-problem" => Ok(RequestCategory::EquipmentProblem),
            "other" => Ok(RequestCategory::Other),
            other => Err(KrishiError::Validation(format!("Unknown category: {other}"))),
        }
    }
}

/// File uploaded with a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub file_path: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Entry in the comment ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub text: String,
    pub posted_by_role: Role,
    pub author_ref: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn by(actor: &Actor, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            posted_by_role: actor.role,
            author_ref: actor.id.clone(),
            user_name: actor.display_name.clone(),
            created_at: now,
        }
    }
}

/// A farmer-submitted support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: RequestCategory,
    pub priority: Priority,
    pub status: RequestStatus,
    pub farmer_ref: String,
    pub attachments: Vec<Attachment>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_date: Option<DateTime<Utc>>,
    /// Write counter for compare-and-swap saves
    pub revision: u64,
}

/// Fields a farmer supplies when filing a request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub category: RequestCategory,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Staff filing on behalf of a farmer name the farmer's user id here
    #[serde(default)]
    pub farmer_ref: Option<String>,
}

impl NewRequest {
    /// Check required free-text fields
    pub fn validate(&self) -> Result<(), KrishiError> {
        if self.title.trim().is_empty() {
            return Err(KrishiError::Validation("Title is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(KrishiError::Validation("Description is required".into()));
        }
        Ok(())
    }
}

impl SupportRequest {
    /// Build a fresh `pending` request owned by `farmer_ref`
    pub fn create(
        input: NewRequest,
        farmer_ref: String,
        attachments: Vec<Attachment>,
        now: DateTime<Utc>,
    ) -> Result<Self, KrishiError> {
        input.validate()?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            category: input.category,
            priority: input.priority.unwrap_or_default(),
            status: RequestStatus::Pending,
            farmer_ref,
            attachments,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
            resolved_date: None,
            revision: 0,
        })
    }
}
