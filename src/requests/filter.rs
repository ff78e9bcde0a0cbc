//! Request list filtering for the staff dashboard

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::model::{Priority, RequestCategory, RequestStatus, SupportRequest};
use crate::farmers::FarmerProfile;
use crate::types::KrishiError;

/// Dashboard tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DashboardTab {
    #[default]
    All,
    Pending,
    InProgress,
    Resolved,
    Rejected,
    /// Priority `urgent`, whatever the status
    Urgent,
}

impl DashboardTab {
    pub fn matches(&self, req: &SupportRequest) -> bool {
        match self {
            DashboardTab::All => true,
            DashboardTab::Pending => req.status == RequestStatus::Pending,
            DashboardTab::InProgress => req.status == RequestStatus::InProgress,
            DashboardTab::Resolved => req.status == RequestStatus::Resolved,
            DashboardTab::Rejected => req.status == RequestStatus::Rejected,
            DashboardTab::Urgent => req.priority == Priority::Urgent,
        }
    }
}

impl fmt::Display for DashboardTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DashboardTab::All => "all",
            DashboardTab::Pending => "pending",
            DashboardTab::InProgress => "in-progress",
            DashboardTab::Resolved => "resolved",
            DashboardTab::Rejected => "rejected",
            DashboardTab::Urgent => "urgent",
        })
    }
}

impl FromStr for DashboardTab {
    type Err = KrishiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(DashboardTab::All),
            "urgent" => Ok(DashboardTab::Urgent),
            other => match other.parse::<RequestStatus>()? {
                RequestStatus::Pending => Ok(DashboardTab::Pending),
                RequestStatus::InProgress => Ok(DashboardTab::InProgress),
                RequestStatus::Resolved => Ok(DashboardTab::Resolved),
                RequestStatus::Rejected => Ok(DashboardTab::Rejected),
            },
        }
    }
}

/// Criteria from the list query string. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    pub search: Option<String>,
    pub status: Option<RequestStatus>,
    pub priority: Option<Priority>,
    pub category: Option<RequestCategory>,
    pub tab: DashboardTab,
}

impl RequestFilter {
    /// Parse `search, status, priority, category, tab` from a raw query string.
    ///
    /// Empty values and `all` are treated as absent; unknown enum values and
    /// malformed percent-encoding are rejected.
    pub fn from_query_string(query: Option<&str>) -> Result<Self, KrishiError> {
        let mut filter = Self::default();

        let Some(q) = query else {
            return Ok(filter);
        };

        for pair in q.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.replace('+', " ");
            let value = urlencoding::decode(&value).map_err(|_| {
                KrishiError::BadRequest(format!("Invalid encoding in query parameter '{key}'"))
            })?;
            let value = value.trim();
            if value.is_empty() || value.eq_ignore_ascii_case("all") {
                continue;
            }

            match key {
                "search" | "q" => filter.search = Some(value.to_string()),
                "status" => filter.status = Some(value.parse()?),
                "priority" => filter.priority = Some(value.parse()?),
                "category" => filter.category = Some(value.parse()?),
                "tab" => filter.tab = value.parse()?,
                _ => {}
            }
        }

        Ok(filter)
    }

    /// Whether `req` satisfies every criterion
    pub fn matches(&self, req: &SupportRequest, farmer: Option<&FarmerProfile>) -> bool {
        self.matches_fields(req)
            && self
                .search
                .as_ref()
                .map_or(true, |needle| search_hit(&needle.to_lowercase(), req, farmer))
    }

    fn matches_fields(&self, req: &SupportRequest) -> bool {
        self.status.map_or(true, |s| s == req.status)
            && self.priority.map_or(true, |p| p == req.priority)
            && self.category.map_or(true, |c| c == req.category)
            && self.tab.matches(req)
    }
}

fn search_hit(needle: &str, req: &SupportRequest, farmer: Option<&FarmerProfile>) -> bool {
    req.title.to_lowercase().contains(needle)
        || req.description.to_lowercase().contains(needle)
        || farmer.is_some_and(|f| {
            f.name.to_lowercase().contains(needle) || f.village.to_lowercase().contains(needle)
        })
}

/// Lazily select requests matching `criteria`.
///
/// `farmers` is keyed by `farmerRef` and supplies name and village for the
/// text search. Calling again with the same inputs yields the same sequence.
pub fn filter_requests<'a>(
    all: &'a [SupportRequest],
    criteria: &'a RequestFilter,
    farmers: &'a HashMap<String, FarmerProfile>,
) -> impl Iterator<Item = &'a SupportRequest> + 'a {
    let needle = criteria.search.as_ref().map(|s| s.to_lowercase());

    all.iter().filter(move |req| {
        criteria.matches_fields(req)
            && needle
                .as_deref()
                .map_or(true, |n| search_hit(n, req, farmers.get(&req.farmer_ref)))
    })
}
