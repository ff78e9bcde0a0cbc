//! User accounts: registration, login and token issuance

use bson::doc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    check_password_strength, hash_password, verify_header, verify_password, Actor, JwtValidator,
    Operation, Role, TokenInput,
};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::KrishiError;

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the identifier is taken
    async fn insert(&self, user: &UserDoc) -> Result<(), KrishiError>;

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserDoc>, KrishiError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserDoc>, KrishiError>;
}

/// In-memory user store keyed by lowercased identifier
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, UserDoc>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &UserDoc) -> Result<(), KrishiError> {
        use dashmap::mapref::entry::Entry;

        match self.users.entry(user.identifier.to_lowercase()) {
            Entry::Occupied(_) => Err(KrishiError::Conflict(
                "An account with this identifier already exists".into(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserDoc>, KrishiError> {
        Ok(self
            .users
            .get(&identifier.to_lowercase())
            .map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserDoc>, KrishiError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .map(|u| u.value().clone()))
    }
}

pub struct MongoUserStore {
    collection: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self, KrishiError> {
        Ok(Self {
            collection: mongo.collection::<UserDoc>(USER_COLLECTION).await?,
        })
    }
}

#[async_trait::async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, user: &UserDoc) -> Result<(), KrishiError> {
        self.collection
            .insert_one(user.clone())
            .await
            .map_err(|e| match e {
                KrishiError::Conflict(_) => KrishiError::Conflict(
                    "An account with this identifier already exists".into(),
                ),
                other => other,
            })?;
        Ok(())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserDoc>, KrishiError> {
        self.collection
            .find_one(doc! { "identifier": identifier.to_lowercase() })
            .await
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserDoc>, KrishiError> {
        self.collection.find_one(doc! { "user_id": user_id }).await
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub identifier: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub identifier: String,
    pub display_name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl From<&UserDoc> for AccountView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.user_id.clone(),
            identifier: user.identifier.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            region: user.region.clone(),
        }
    }
}

/// Token plus where the client should go next
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub token: String,
    pub expires_at: u64,
    pub redirect_to: &'static str,
    pub user: AccountView,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    jwt: Arc<JwtValidator>,
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, jwt: Arc<JwtValidator>) -> Self {
        Self { store, jwt }
    }

    pub fn jwt(&self) -> &JwtValidator {
        &self.jwt
    }

    /// Create an account.
    ///
    /// Anyone may register a farmer account; executive and admin accounts
    /// need an admin caller.
    pub async fn register(
        &self,
        caller: Option<&Actor>,
        input: RegisterInput,
    ) -> Result<UserDoc, KrishiError> {
        let identifier = input.identifier.trim().to_lowercase();
        if identifier.is_empty() {
            return Err(KrishiError::Validation("Identifier is required".into()));
        }
        let display_name = input.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(KrishiError::Validation("Display name is required".into()));
        }
        check_password_strength(&input.password)?;

        let role = input.role.unwrap_or_default();
        if role.is_staff() {
            match caller {
                Some(admin) => admin.require(Operation::CreateStaffAccount)?,
                None => {
                    return Err(KrishiError::Unauthorized(
                        "Creating staff accounts requires an admin token".into(),
                    ))
                }
            }
        }

        let region = input
            .region
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let user = UserDoc::new(
            identifier,
            hash_password(&input.password)?,
            role,
            display_name,
            region,
        );
        self.store.insert(&user).await?;

        info!(user_id = %user.user_id, role = %user.role, "Registered account");
        Ok(user)
    }

    /// Create the first admin account unless one with this identifier exists
    pub async fn bootstrap_admin(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<UserDoc, KrishiError> {
        let identifier = identifier.trim().to_lowercase();
        if let Some(existing) = self.store.find_by_identifier(&identifier).await? {
            if existing.role != Role::Admin {
                return Err(KrishiError::Config(format!(
                    "Bootstrap admin '{identifier}' exists with role {}",
                    existing.role
                )));
            }
            return Ok(existing);
        }

        check_password_strength(password)?;
        let user = UserDoc::new(
            identifier,
            hash_password(password)?,
            Role::Admin,
            "Administrator".to_string(),
            None,
        );
        self.store.insert(&user).await?;
        info!(user_id = %user.user_id, "Bootstrap admin account created");
        Ok(user)
    }

    /// Check credentials. Unknown identifier and wrong password look the same.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<UserDoc, KrishiError> {
        let invalid = || KrishiError::Unauthorized("Invalid credentials".into());

        let user = match self.store.find_by_identifier(identifier.trim()).await? {
            Some(user) if user.is_active => user,
            _ => {
                warn!("Login failed - unknown or inactive account: {}", identifier.trim());
                return Err(invalid());
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!("Login failed - invalid password: {}", user.identifier);
            return Err(invalid());
        }

        Ok(user)
    }

    /// Actor for an `Authorization` header whose account is still active and
    /// whose token version is current
    pub async fn authenticate(&self, auth_header: Option<&str>) -> Result<Actor, KrishiError> {
        self.resolve(auth_header).await.map(|(actor, _)| actor)
    }

    /// Verified actor together with its live account
    pub async fn resolve(
        &self,
        auth_header: Option<&str>,
    ) -> Result<(Actor, UserDoc), KrishiError> {
        let claims = verify_header(&self.jwt, auth_header)?;
        let version = claims.version;
        let actor = Actor::from(claims);
        let user = self.current(&actor, version).await?;
        Ok((actor, user))
    }

    /// Active account behind a verified actor, rejecting revoked tokens
    pub async fn current(
        &self,
        actor: &Actor,
        token_version: u32,
    ) -> Result<UserDoc, KrishiError> {
        let user = self
            .store
            .find_by_id(&actor.id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| KrishiError::Unauthorized("Account not found or inactive".into()))?;

        if token_version_of(&user) != token_version {
            return Err(KrishiError::Unauthorized("Token has been revoked".into()));
        }
        Ok(user)
    }

    pub fn issue(&self, user: &UserDoc) -> Result<AuthGrant, KrishiError> {
        let token = self.jwt.generate_token(TokenInput {
            user_id: user.user_id.clone(),
            identifier: user.identifier.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            region: user.region.clone(),
            version: token_version_of(user),
        })?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(AuthGrant {
            token,
            expires_at: now + self.jwt.expiry_seconds(),
            redirect_to: user.role.dashboard_path(),
            user: AccountView::from(user),
        })
    }
}

fn token_version_of(user: &UserDoc) -> u32 {
    user.token_version.max(0) as u32
}
