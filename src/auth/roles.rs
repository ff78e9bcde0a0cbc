//! Roles and the operations each one may perform
//!
//! Roles are ordered: an admin can do everything an executive can, and an
//! executive everything a farmer can, except where an operation is tied to
//! request ownership (see `requests::service`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::KrishiError;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
#[derive(Default)]
pub enum Role {
    /// Submits requests, comments on own requests
    #[default]
    Farmer = 0,
    /// Field staff - manages farmers and requests for a region
    Executive = 1,
    /// Full access, including staff account creation
    Admin = 2,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Executive => "executive",
            Role::Admin => "admin",
        }
    }

    /// Executive or admin
    pub fn is_staff(&self) -> bool {
        *self >= Role::Executive
    }

    /// Dashboard the client should land on after login
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Farmer => "/farmer/dashboard",
            Role::Executive => "/executive/dashboard",
            Role::Admin => "/admin/dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = KrishiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "executive" => Ok(Role::Executive),
            "admin" => Ok(Role::Admin),
            other => Err(KrishiError::Validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Operations gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SubmitRequest,
    CommentOnRequest,
    ChangeRequestStatus,
    ManageFarmers,
    SendSms,
    CreateStaffAccount,
}

/// Minimum role required for an operation
pub fn required_role(op: Operation) -> Role {
    match op {
        Operation::SubmitRequest | Operation::CommentOnRequest => Role::Farmer,
        Operation::ChangeRequestStatus | Operation::ManageFarmers | Operation::SendSms => {
            Role::Executive
        }
        Operation::CreateStaffAccount => Role::Admin,
    }
}

/// Check if an operation is allowed for the given role
pub fn is_operation_allowed(op: Operation, role: Role) -> bool {
    role >= required_role(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_farmer_operations() {
        assert!(is_operation_allowed(Operation::SubmitRequest, Role::Farmer));
        assert!(is_operation_allowed(Operation::CommentOnRequest, Role::Farmer));
        assert!(!is_operation_allowed(Operation::ChangeRequestStatus, Role::Farmer));
        assert!(!is_operation_allowed(Operation::SendSms, Role::Farmer));
    }

    #[test]
    fn test_staff_operations() {
        assert!(is_operation_allowed(Operation::ChangeRequestStatus, Role::Executive));
        assert!(is_operation_allowed(Operation::ChangeRequestStatus, Role::Admin));
        assert!(!is_operation_allowed(Operation::CreateStaffAccount, Role::Executive));
        assert!(is_operation_allowed(Operation::CreateStaffAccount, Role::Admin));
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Executive);
        assert!(Role::Executive > Role::Farmer);
        assert!(Role::Executive.is_staff());
        assert!(!Role::Farmer.is_staff());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Executive".parse::<Role>().unwrap(), Role::Executive);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!("superuser".parse::<Role>().is_err());
        assert_eq!(
            serde_json::to_string(&Role::Farmer).unwrap(),
            "\"farmer\""
        );
    }

    #[test]
    fn test_dashboard_redirects() {
        assert_eq!(Role::Admin.dashboard_path(), "/admin/dashboard");
        assert_eq!(Role::Executive.dashboard_path(), "/executive/dashboard");
        assert_eq!(Role::Farmer.dashboard_path(), "/farmer/dashboard");
    }
}
