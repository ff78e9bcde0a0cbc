//! Per-request caller identity
//!
//! An [`Actor`] is built from verified JWT claims for every HTTP request and
//! passed explicitly into the services. Nothing about the caller is kept in
//! global state.

use serde::Serialize;

use crate::auth::{
    extract_token_from_header, is_operation_allowed, Claims, JwtValidator, Operation, Role,
};
use crate::types::KrishiError;

/// The verified caller of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            display_name: display_name.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Fail with `Forbidden` unless the actor's role allows `op`
    pub fn require(&self, op: Operation) -> Result<(), KrishiError> {
        if is_operation_allowed(op, self.role) {
            Ok(())
        } else {
            Err(KrishiError::Forbidden(format!(
                "Role '{}' is not allowed to perform {:?}",
                self.role, op
            )))
        }
    }
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
            display_name: claims.display_name,
            region: claims.region,
        }
    }
}

/// Verified claims from an `Authorization` header value.
///
/// Only checks the signature and expiry; `AccountService::authenticate`
/// also checks the account behind the token.
pub fn verify_header(
    jwt: &JwtValidator,
    auth_header: Option<&str>,
) -> Result<Claims, KrishiError> {
    let token = extract_token_from_header(auth_header)
        .ok_or_else(|| KrishiError::Unauthorized("No token provided".into()))?;

    jwt.verify_token(token).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenInput;

    #[test]
    fn test_verified_claims_become_actor() {
        let jwt = JwtValidator::new_dev();
        let token = jwt
            .generate_token(TokenInput {
                user_id: "u-1".into(),
                identifier: "exec@example.org".into(),
                display_name: "Meena".into(),
                role: Role::Executive,
                region: None,
                version: 1,
            })
            .unwrap();

        let header = format!("Bearer {token}");
        let claims = verify_header(&jwt, Some(&header)).unwrap();
        assert_eq!(claims.version, 1);
        assert_eq!(Actor::from(claims), Actor::new("u-1", Role::Executive, "Meena"));
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let jwt = JwtValidator::new_dev();
        assert!(matches!(
            verify_header(&jwt, None),
            Err(KrishiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_require_rejects_farmer_status_change() {
        let farmer = Actor::new("f-1", Role::Farmer, "Sunita");
        assert!(farmer.require(Operation::CommentOnRequest).is_ok());
        assert!(matches!(
            farmer.require(Operation::ChangeRequestStatus),
            Err(KrishiError::Forbidden(_))
        ));
    }
}
