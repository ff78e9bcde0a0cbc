//! Request operations for an authenticated actor
//!
//! Every mutation is load, apply, compare-and-swap save. A lost race reloads
//! the request and applies the change again, a bounded number of times.

use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::filter::{filter_requests, RequestFilter};
use super::lifecycle::{
    add_comment, apply_transition, parse_status, TransitionOutcome, TransitionPolicy,
};
use super::model::{NewRequest, SupportRequest};
use super::store::{RequestScope, RequestStore};
use crate::auth::{Actor, Operation, Role};
use crate::farmers::{FarmerProfile, FarmerQuery, FarmerService};
use crate::logging::AuditLogger;
use crate::notify::{Notifier, SmsMessage};
use crate::types::KrishiError;
use crate::uploads::{PendingFile, UploadStore};

/// Attempts per mutation before giving up with `Conflict`
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Current time at the millisecond precision BSON dates keep, so a response
/// carries the same timestamps a later read returns.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn RequestStore>,
    farmers: FarmerService,
    notifier: Arc<dyn Notifier>,
    uploads: UploadStore,
    audit: AuditLogger,
    policy: TransitionPolicy,
}

impl RequestService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        farmers: FarmerService,
        notifier: Arc<dyn Notifier>,
        uploads: UploadStore,
        audit: AuditLogger,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            store,
            farmers,
            notifier,
            uploads,
            audit,
            policy,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// File a new request.
    ///
    /// Farmers file for themselves; an admin files on behalf of the farmer
    /// named in `farmerRef`.
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewRequest,
        files: Vec<PendingFile>,
    ) -> Result<SupportRequest, KrishiError> {
        actor.require(Operation::SubmitRequest)?;

        let farmer_ref = match actor.role {
            Role::Farmer => match input.farmer_ref.as_deref() {
                Some(other) if other != actor.id => {
                    return Err(KrishiError::Forbidden(
                        "Farmers can only file requests for themselves".into(),
                    ))
                }
                _ => actor.id.clone(),
            },
            Role::Admin => input
                .farmer_ref
                .clone()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    KrishiError::Validation("farmerRef is required when filing for a farmer".into())
                })?,
            Role::Executive => {
                return Err(KrishiError::Forbidden(
                    "Executives manage requests but do not file them".into(),
                ))
            }
        };

        let now = now_millis();
        let mut req = SupportRequest::create(input, farmer_ref, Vec::new(), now)?;
        req.attachments = self.uploads.save_all(&req.id, &files, now).await?;

        if let Err(e) = self.store.insert(&req).await {
            self.uploads.discard(&req.id).await;
            return Err(e);
        }

        info!(
            request_id = %req.id,
            farmer = %req.farmer_ref,
            category = %req.category,
            "Request created"
        );
        self.audit.log_request_created(actor, &req.id).await;
        Ok(req)
    }

    /// Requests visible to `actor` that match `criteria`, newest first
    pub async fn list(
        &self,
        actor: &Actor,
        criteria: &RequestFilter,
    ) -> Result<Vec<SupportRequest>, KrishiError> {
        let scope = self.scope_for(actor).await?;
        let all = self.store.list(&scope).await?;
        let farmers = self.farmer_index(actor, criteria).await?;

        Ok(filter_requests(&all, criteria, &farmers).cloned().collect())
    }

    pub async fn get(&self, actor: &Actor, id: &str) -> Result<SupportRequest, KrishiError> {
        self.load_visible(actor, id).await
    }

    pub async fn comment(
        &self,
        actor: &Actor,
        id: &str,
        text: &str,
    ) -> Result<SupportRequest, KrishiError> {
        actor.require(Operation::CommentOnRequest)?;

        let (saved, ()) = self
            .mutate(actor, id, |req| add_comment(req, text, actor, now_millis()))
            .await?;

        self.audit.log_comment(actor, id).await;
        Ok(saved)
    }

    /// Apply a status change; notifies the farmer when the status moved
    pub async fn transition(
        &self,
        actor: &Actor,
        id: &str,
        status: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(SupportRequest, TransitionOutcome), KrishiError> {
        let new_status = parse_status(status)?;
        actor.require(Operation::ChangeRequestStatus)?;

        let policy = self.policy;
        let (saved, outcome) = self
            .mutate(actor, id, |req| {
                apply_transition(req, new_status, reason, actor, policy, now_millis())
            })
            .await?;

        if outcome.reopened {
            warn!(
                request_id = %id,
                from = %outcome.previous,
                to = %outcome.current,
                actor = %actor.id,
                "Request reopened"
            );
        } else {
            info!(
                request_id = %id,
                from = %outcome.previous,
                to = %outcome.current,
                "Status changed"
            );
        }
        self.audit.log_transition(actor, id, &outcome).await;

        if outcome.status_changed() {
            self.notify_farmer(&saved, reason).await;
        }

        Ok((saved, outcome))
    }

    /// Add files to an existing request (owner farmer or staff)
    pub async fn attach(
        &self,
        actor: &Actor,
        id: &str,
        files: Vec<PendingFile>,
    ) -> Result<SupportRequest, KrishiError> {
        if files.is_empty() {
            return Err(KrishiError::Validation("No files uploaded".into()));
        }

        // Visibility check before anything touches the disk
        let current = self.load_visible(actor, id).await?;
        let count = files.len();
        let attachments = self.uploads.save_all(&current.id, &files, now_millis()).await?;

        let result = self
            .mutate(actor, id, |req| {
                req.attachments.extend(attachments.iter().cloned());
                req.updated_at = now_millis();
                Ok(())
            })
            .await;
        let (saved, ()) = match result {
            Ok(saved) => saved,
            Err(e) => {
                self.uploads.remove(&attachments).await;
                return Err(e);
            }
        };

        self.audit.log_attachments(actor, id, count).await;
        Ok(saved)
    }

    async fn mutate<T, F>(
        &self,
        actor: &Actor,
        id: &str,
        mut apply: F,
    ) -> Result<(SupportRequest, T), KrishiError>
    where
        F: FnMut(&mut SupportRequest) -> Result<T, KrishiError> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut req = self.load_visible(actor, id).await?;
            let out = apply(&mut req)?;

            match self.store.save(req).await {
                Ok(saved) => return Ok((saved, out)),
                Err(KrishiError::Conflict(msg)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(request_id = %id, attempt, "Write conflict, retrying: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }

        Err(KrishiError::Conflict(format!(
            "Request {id} is being modified by someone else, try again"
        )))
    }

    async fn load_visible(&self, actor: &Actor, id: &str) -> Result<SupportRequest, KrishiError> {
        let req = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| KrishiError::NotFound(format!("Request {id} not found")))?;

        if self.scope_for(actor).await?.contains(&req) {
            Ok(req)
        } else {
            Err(KrishiError::Forbidden("Request is outside your scope".into()))
        }
    }

    /// Farmers see their own requests; a regional executive sees requests of
    /// farmers in the region; everyone else sees everything.
    async fn scope_for(&self, actor: &Actor) -> Result<RequestScope, KrishiError> {
        match (actor.role, &actor.region) {
            (Role::Farmer, _) => Ok(RequestScope::farmer(actor.id.clone())),
            (Role::Executive, Some(region)) => Ok(RequestScope::Farmers(
                self.farmers.user_refs_in_region(region).await?,
            )),
            _ => Ok(RequestScope::All),
        }
    }

    /// Farmer profiles keyed by `farmerRef`, loaded only when searching
    async fn farmer_index(
        &self,
        actor: &Actor,
        criteria: &RequestFilter,
    ) -> Result<HashMap<String, FarmerProfile>, KrishiError> {
        if criteria.search.is_none() {
            return Ok(HashMap::new());
        }

        let profiles: Vec<FarmerProfile> = match actor.role {
            Role::Farmer => self
                .farmers
                .store()
                .get_by_user(&actor.id)
                .await?
                .into_iter()
                .collect(),
            _ => {
                let query = FarmerQuery {
                    search: None,
                    region: actor.region.clone().filter(|_| actor.role == Role::Executive),
                };
                self.farmers.store().list(&query).await?
            }
        };

        Ok(profiles
            .into_iter()
            .filter_map(|f| f.user_ref.clone().map(|r| (r, f)))
            .collect())
    }

    async fn notify_farmer(&self, req: &SupportRequest, reason: Option<&str>) {
        let profile = match self.farmers.store().get_by_user(&req.farmer_ref).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(request_id = %req.id, "No farmer profile, skipping SMS");
                return;
            }
            Err(e) => {
                warn!(request_id = %req.id, "Farmer lookup for SMS failed: {}", e);
                return;
            }
        };

        let sms = match SmsMessage::status_update(&profile.phone, req, req.status, reason) {
            Ok(sms) => sms,
            Err(e) => {
                warn!(request_id = %req.id, "Not sending SMS: {}", e);
                return;
            }
        };

        let notifier = self.notifier.clone();
        let audit = self.audit.clone();
        let request_id = req.id.clone();
        tokio::spawn(async move {
            let delivered = match notifier.send(&sms).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        notifier = notifier.name(),
                        "SMS dispatch failed: {}",
                        e
                    );
                    false
                }
            };
            audit.log_sms(None, Some(&request_id), delivered).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farmers::MemoryFarmerStore;
    use crate::notify::LogNotifier;
    use crate::requests::{MemoryRequestStore, RequestCategory, RequestStatus};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store whose next `conflicts` saves lose the revision race
    struct ConflictingStore {
        inner: MemoryRequestStore,
        conflicts: AtomicUsize,
        saves: AtomicUsize,
    }

    impl ConflictingStore {
        fn new(conflicts: usize) -> Self {
            Self {
                inner: MemoryRequestStore::new(),
                conflicts: AtomicUsize::new(conflicts),
                saves: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl RequestStore for ConflictingStore {
        async fn insert(&self, req: &SupportRequest) -> Result<(), KrishiError> {
            self.inner.insert(req).await
        }

        async fn get(&self, id: &str) -> Result<Option<SupportRequest>, KrishiError> {
            self.inner.get(id).await
        }

        async fn list(&self, scope: &RequestScope) -> Result<Vec<SupportRequest>, KrishiError> {
            self.inner.list(scope).await
        }

        async fn save(&self, req: SupportRequest) -> Result<SupportRequest, KrishiError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let lost = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost {
                return Err(KrishiError::Conflict(format!(
                    "Request {} was modified concurrently",
                    req.id
                )));
            }
            self.inner.save(req).await
        }

        fn backend(&self) -> &'static str {
            "memory"
        }
    }

    fn service_with(store: Arc<dyn RequestStore>, uploads: UploadStore) -> RequestService {
        RequestService::new(
            store,
            FarmerService::new(Arc::new(MemoryFarmerStore::new())),
            Arc::new(LogNotifier),
            uploads,
            AuditLogger::new(),
            TransitionPolicy::Permissive,
        )
    }

    fn service() -> (RequestService, FarmerService) {
        let farmers = FarmerService::new(Arc::new(MemoryFarmerStore::new()));
        let svc = RequestService::new(
            Arc::new(MemoryRequestStore::new()),
            farmers.clone(),
            Arc::new(LogNotifier),
            UploadStore::new(std::env::temp_dir().join("krishi-desk-unit")),
            AuditLogger::new(),
            TransitionPolicy::Permissive,
        );
        (svc, farmers)
    }

    fn pump() -> NewRequest {
        NewRequest {
            title: "Pump broken".into(),
            description: "Borewell pump does not start".into(),
            category: RequestCategory::IrrigationIssue,
            priority: None,
            farmer_ref: None,
        }
    }

    #[tokio::test]
    async fn test_farmer_scope() {
        let (svc, _) = service();
        let alice = Actor::new("f-1", Role::Farmer, "Alice");
        let bob = Actor::new("f-2", Role::Farmer, "Bob");

        let req = svc.create(&alice, pump(), vec![]).await.unwrap();
        assert_eq!(req.farmer_ref, "f-1");

        assert!(svc.get(&alice, &req.id).await.is_ok());
        assert!(matches!(svc.get(&bob, &req.id).await, Err(KrishiError::Forbidden(_))));
        assert!(svc.list(&bob, &RequestFilter::default()).await.unwrap().is_empty());
        assert!(matches!(
            svc.get(&alice, "missing").await,
            Err(KrishiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_executive_cannot_file() {
        let (svc, _) = service();
        let exec = Actor::new("e-1", Role::Executive, "Meena");
        assert!(matches!(
            svc.create(&exec, pump(), vec![]).await,
            Err(KrishiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_files_on_behalf() {
        let (svc, _) = service();
        let admin = Actor::new("a-1", Role::Admin, "Admin");

        assert!(matches!(
            svc.create(&admin, pump(), vec![]).await,
            Err(KrishiError::Validation(_))
        ));

        let mut input = pump();
        input.farmer_ref = Some("f-7".into());
        let req = svc.create(&admin, input, vec![]).await.unwrap();
        assert_eq!(req.farmer_ref, "f-7");
    }

    #[tokio::test]
    async fn test_transition_and_revision() {
        let (svc, _) = service();
        let farmer = Actor::new("f-1", Role::Farmer, "Alice");
        let exec = Actor::new("e-1", Role::Executive, "Meena");
        let req = svc.create(&farmer, pump(), vec![]).await.unwrap();

        let (saved, outcome) = svc
            .transition(&exec, &req.id, Some("resolved"), Some("Fixed pump"))
            .await
            .unwrap();
        assert_eq!(saved.status, RequestStatus::Resolved);
        assert_eq!(saved.revision, 1);
        assert!(outcome.comment_added);

        assert!(matches!(
            svc.transition(&farmer, &req.id, Some("pending"), None).await,
            Err(KrishiError::Forbidden(_))
        ));
        assert!(matches!(
            svc.transition(&exec, &req.id, None, None).await,
            Err(KrishiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_regional_executive_scope() {
        let (svc, farmers) = service();
        let admin = Actor::new("a-1", Role::Admin, "Admin");
        let pune_exec = Actor::new("e-1", Role::Executive, "Meena").with_region("Pune");

        let profile = serde_json::from_value(serde_json::json!({
            "name": "Alice", "phone": "9000000001", "village": "Shirur",
            "region": "Pune", "userRef": "f-1"
        }))
        .unwrap();
        farmers.create(&admin, profile).await.unwrap();

        let alice = Actor::new("f-1", Role::Farmer, "Alice");
        let carol = Actor::new("f-3", Role::Farmer, "Carol");
        let in_region = svc.create(&alice, pump(), vec![]).await.unwrap();
        let outside = svc.create(&carol, pump(), vec![]).await.unwrap();

        let visible = svc.list(&pune_exec, &RequestFilter::default()).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, in_region.id);
        assert!(matches!(
            svc.get(&pune_exec, &outside.id).await,
            Err(KrishiError::Forbidden(_))
        ));

        let by_village = RequestFilter {
            search: Some("shirur".into()),
            ..Default::default()
        };
        assert_eq!(svc.list(&admin, &by_village).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_save_is_retried_on_reloaded_copy() {
        let store = Arc::new(ConflictingStore::new(1));
        let svc = service_with(store.clone(), UploadStore::new(std::env::temp_dir()));
        let farmer = Actor::new("f-1", Role::Farmer, "Alice");
        let req = svc.create(&farmer, pump(), vec![]).await.unwrap();

        let saved = svc.comment(&farmer, &req.id, "Any update?").await.unwrap();
        assert_eq!(saved.comments.len(), 1);
        assert_eq!(saved.revision, 1);
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);

        let stored = store.get(&req.id).await.unwrap().unwrap();
        assert_eq!(stored.comments.len(), 1);
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn test_repeated_conflicts_give_up_without_writing() {
        let store = Arc::new(ConflictingStore::new(MAX_WRITE_ATTEMPTS));
        let svc = service_with(store.clone(), UploadStore::new(std::env::temp_dir()));
        let farmer = Actor::new("f-1", Role::Farmer, "Alice");
        let req = svc.create(&farmer, pump(), vec![]).await.unwrap();

        let err = svc.comment(&farmer, &req.id, "Any update?").await.unwrap_err();
        assert!(matches!(err, KrishiError::Conflict(_)));
        assert_eq!(store.saves.load(Ordering::SeqCst), MAX_WRITE_ATTEMPTS);

        let stored = store.get(&req.id).await.unwrap().unwrap();
        assert!(stored.comments.is_empty());
        assert_eq!(stored.revision, 0);
    }

    #[tokio::test]
    async fn test_failed_attach_removes_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConflictingStore::new(MAX_WRITE_ATTEMPTS));
        let svc = service_with(store.clone(), UploadStore::new(dir.path()));
        let farmer = Actor::new("f-1", Role::Farmer, "Alice");
        let req = svc.create(&farmer, pump(), vec![]).await.unwrap();

        let files = vec![PendingFile {
            file_name: "leaf.png".into(),
            content_type: "image/png".into(),
            data: Bytes::from_static(b"PNG"),
        }];
        let err = svc.attach(&farmer, &req.id, files).await.unwrap_err();
        assert!(matches!(err, KrishiError::Conflict(_)));

        let leftover = std::fs::read_dir(dir.path().join(&req.id)).unwrap().count();
        assert_eq!(leftover, 0);
        assert!(store.get(&req.id).await.unwrap().unwrap().attachments.is_empty());
    }

    #[tokio::test]
    async fn test_timestamps_keep_millisecond_precision() {
        let (svc, _) = service();
        let farmer = Actor::new("f-1", Role::Farmer, "Alice");
        let exec = Actor::new("e-1", Role::Executive, "Meena");
        let req = svc.create(&farmer, pump(), vec![]).await.unwrap();
        assert_eq!(req.created_at.timestamp_subsec_nanos() % 1_000_000, 0);

        let (saved, _) = svc
            .transition(&exec, &req.id, Some("resolved"), None)
            .await
            .unwrap();
        let resolved = saved.resolved_date.unwrap();
        assert_eq!(resolved.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(saved.updated_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
