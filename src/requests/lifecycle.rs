//! Status transitions and the comment ledger
//!
//! Both operations mutate a [`SupportRequest`] in memory and leave the write
//! to the caller, so the status change and its audit comment are persisted
//! together. On error the request is left exactly as it was.

use chrono::{DateTime, Utc};

use super::model::{Comment, RequestStatus, SupportRequest};
use crate::auth::{Actor, Operation};
use crate::types::KrishiError;

/// How moves out of `resolved` / `rejected` are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Every move is allowed; leaving a terminal state is reported as a reopen
    #[default]
    Permissive,
    /// Terminal states can only be re-applied, never left
    Strict,
}

impl TransitionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Permissive => "permissive",
            TransitionPolicy::Strict => "strict",
        }
    }

    /// Allowed-transition table
    pub fn allows(&self, from: RequestStatus, to: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, from, to) {
            (TransitionPolicy::Permissive, _, _) => true,
            (TransitionPolicy::Strict, Pending | InProgress, _) => true,
            (TransitionPolicy::Strict, from, to) => from == to,
        }
    }
}

/// What a successful transition did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub previous: RequestStatus,
    pub current: RequestStatus,
    /// Left a terminal state for a different one
    pub reopened: bool,
    pub comment_added: bool,
}

impl TransitionOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Parse a client-supplied status; absent or unknown is a validation error
pub fn parse_status(raw: Option<&str>) -> Result<RequestStatus, KrishiError> {
    match raw.map(str::trim) {
        None | Some("") => Err(KrishiError::Validation("Status is required".into())),
        Some(s) => s.parse(),
    }
}

/// Move `req` to `new_status`.
///
/// Re-applying the current status is allowed and refreshes `updated_at`.
/// `resolved_date` is stamped on the first terminal transition only.
pub fn apply_transition(
    req: &mut SupportRequest,
    new_status: RequestStatus,
    reason: Option<&str>,
    actor: &Actor,
    policy: TransitionPolicy,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, KrishiError> {
    actor.require(Operation::ChangeRequestStatus)?;

    let previous = req.status;
    if !policy.allows(previous, new_status) {
        return Err(KrishiError::Validation(format!(
            "Request is {previous} and cannot move to {new_status}"
        )));
    }

    req.status = new_status;
    req.updated_at = now;
    if new_status.is_terminal() && req.resolved_date.is_none() {
        req.resolved_date = Some(now);
    }

    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if let Some(reason) = reason {
        req.comments.push(Comment::by(
            actor,
            format!("Status updated to {new_status}: {reason}"),
            now,
        ));
    }

    Ok(TransitionOutcome {
        previous,
        current: new_status,
        reopened: previous.is_terminal() && previous != new_status,
        comment_added: reason.is_some(),
    })
}

/// Append a comment. Blank text is rejected without touching `req`.
pub fn add_comment(
    req: &mut SupportRequest,
    text: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), KrishiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(KrishiError::Validation("Comment text is required".into()));
    }

    req.comments.push(Comment::by(actor, text, now));
    req.updated_at = now;
    Ok(())
}
