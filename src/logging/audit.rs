//! Lifecycle audit log
//!
//! Every request mutation, login and SMS dispatch is written as one JSON
//! line to the audit file (when configured) and mirrored to the `audit`
//! tracing target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::auth::{Actor, Role};
use crate::requests::{RequestStatus, TransitionOutcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RequestCreated,
    CommentAdded,
    StatusChanged,
    /// Status moved out of resolved/rejected
    RequestReopened,
    AttachmentAdded,
    SmsDispatched,
    LoginSucceeded,
    LoginFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<RequestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_status: Option<RequestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            actor_id: None,
            actor_role: None,
            request_id: None,
            from_status: None,
            to_status: None,
            metadata: None,
        }
    }

    pub fn with_actor(mut self, actor: &Actor) -> Self {
        self.actor_id = Some(actor.id.clone());
        self.actor_role = Some(actor.role);
        self
    }

    pub fn with_request(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_transition(mut self, from: RequestStatus, to: RequestStatus) -> Self {
        self.from_status = Some(from);
        self.to_status = Some(to);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Audit logger writing JSONL
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
}

#[derive(Default)]
struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    /// Logger that only emits to tracing until [`init_file`](Self::init_file)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append events to `path`, creating it if needed
    pub async fn init_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.to_path_buf());

        info!("Audit logging to {}", path.display());
        Ok(())
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }

    pub async fn log(&self, event: AuditEvent) {
        let line = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        if event.event_type == AuditEventType::RequestReopened {
            warn!(target: "audit", "{}", line);
        } else {
            info!(target: "audit", "{}", line);
        }

        let mut inner = self.inner.lock().await;
        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", line) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }

    pub async fn log_request_created(&self, actor: &Actor, request_id: &str) {
        self.log(
            AuditEvent::new(AuditEventType::RequestCreated)
                .with_actor(actor)
                .with_request(request_id),
        )
        .await;
    }

    pub async fn log_comment(&self, actor: &Actor, request_id: &str) {
        self.log(
            AuditEvent::new(AuditEventType::CommentAdded)
                .with_actor(actor)
                .with_request(request_id),
        )
        .await;
    }

    /// Status change; reopens get their own event type
    pub async fn log_transition(
        &self,
        actor: &Actor,
        request_id: &str,
        outcome: &TransitionOutcome,
    ) {
        let event_type = if outcome.reopened {
            AuditEventType::RequestReopened
        } else {
            AuditEventType::StatusChanged
        };
        self.log(
            AuditEvent::new(event_type)
                .with_actor(actor)
                .with_request(request_id)
                .with_transition(outcome.previous, outcome.current)
                .with_metadata(serde_json::json!({ "commentAdded": outcome.comment_added })),
        )
        .await;
    }

    pub async fn log_attachments(&self, actor: &Actor, request_id: &str, count: usize) {
        self.log(
            AuditEvent::new(AuditEventType::AttachmentAdded)
                .with_actor(actor)
                .with_request(request_id)
                .with_metadata(serde_json::json!({ "count": count })),
        )
        .await;
    }

    pub async fn log_sms(&self, actor: Option<&Actor>, request_id: Option<&str>, delivered: bool) {
        let mut event = AuditEvent::new(AuditEventType::SmsDispatched)
            .with_metadata(serde_json::json!({ "delivered": delivered }));
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        if let Some(id) = request_id {
            event = event.with_request(id);
        }
        self.log(event).await;
    }

    pub async fn log_login(&self, identifier: &str, user_id: Option<&str>, success: bool) {
        let event_type = if success {
            AuditEventType::LoginSucceeded
        } else {
            AuditEventType::LoginFailed
        };
        let mut event = AuditEvent::new(event_type)
            .with_metadata(serde_json::json!({ "identifier": identifier }));
        event.actor_id = user_id.map(String::from);
        self.log(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec() -> Actor {
        Actor::new("exec-1", Role::Executive, "Meena")
    }

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(AuditEventType::StatusChanged)
            .with_actor(&exec())
            .with_request("req-1")
            .with_transition(RequestStatus::Pending, RequestStatus::InProgress);

        let line = event.to_jsonl().unwrap();
        assert!(line.contains("status_changed"));
        assert!(line.contains("\"from_status\":\"pending\""));
        assert!(line.contains("\"to_status\":\"in-progress\""));
        assert!(line.contains("\"actor_role\":\"executive\""));
    }

    #[tokio::test]
    async fn test_reopen_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("events.jsonl");
        let logger = AuditLogger::new();
        logger.init_file(&path).await.unwrap();

        let outcome = TransitionOutcome {
            previous: RequestStatus::Resolved,
            current: RequestStatus::InProgress,
            reopened: true,
            comment_added: false,
        };
        logger.log_transition(&exec(), "req-9", &outcome).await;
        logger.log_comment(&exec(), "req-9").await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<AuditEvent> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event_type, AuditEventType::RequestReopened);
        assert_eq!(lines[1].event_type, AuditEventType::CommentAdded);
        assert_eq!(logger.path().await, Some(path));
    }

    #[tokio::test]
    async fn test_without_file_is_noop() {
        let logger = AuditLogger::new();
        logger.log_login("9876543210", None, false).await;
        assert_eq!(logger.path().await, None);
    }
}
