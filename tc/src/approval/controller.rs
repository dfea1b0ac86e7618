//! ApprovalController - session approval state machine

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ApprovalMode, ApprovalSurface, ConfirmationKind, ConfirmationOutcome, ConfirmationRequest};

/// Gates risky tool calls behind human confirmation
///
/// Holds the session's [`ApprovalMode`] and a scoped allow-list. The mode
/// only ever moves up; requests reach the surface one at a time.
pub struct ApprovalController {
    mode: AtomicU8,
    allowlist: Mutex<HashSet<(ConfirmationKind, String)>>,
    surface: Arc<dyn ApprovalSurface>,
    /// Serializes surfacing so the human sees one request at a time
    surfacing: Mutex<()>,
}

impl ApprovalController {
    pub fn new(mode: ApprovalMode, surface: Arc<dyn ApprovalSurface>) -> Self {
        debug!(%mode, "ApprovalController::new: called");
        Self {
            mode: AtomicU8::new(mode as u8),
            allowlist: Mutex::new(HashSet::new()),
            surface,
            surfacing: Mutex::new(()),
        }
    }

    /// Current mode
    pub fn mode(&self) -> ApprovalMode {
        ApprovalMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Raise the mode; requests to lower it are ignored
    ///
    /// Returns true when the mode actually changed.
    pub fn escalate(&self, mode: ApprovalMode) -> bool {
        debug!(%mode, "ApprovalController::escalate: called");
        let previous = ApprovalMode::from_u8(self.mode.fetch_max(mode as u8, Ordering::SeqCst));
        if mode < previous {
            warn!(current = %previous, requested = %mode, "Ignoring attempt to lower approval mode");
            false
        } else if mode > previous {
            info!(from = %previous, to = %mode, "Approval mode escalated");
            true
        } else {
            false
        }
    }

    /// Whether `request` would run without asking right now
    pub async fn is_exempt(&self, request: &ConfirmationRequest) -> bool {
        if self.mode().exempts(request.kind) {
            return true;
        }
        match &request.scope {
            Some(scope) => self.allowlist.lock().await.contains(&(request.kind, scope.clone())),
            None => false,
        }
    }

    /// Scopes allowed for the rest of the session
    pub async fn allowed_scopes(&self) -> Vec<(ConfirmationKind, String)> {
        let mut scopes: Vec<_> = self.allowlist.lock().await.iter().cloned().collect();
        scopes.sort_by(|a, b| a.1.cmp(&b.1));
        scopes
    }

    /// Ask for confirmation unless the mode or allow-list exempts the request
    pub async fn request_confirmation(&self, request: ConfirmationRequest) -> ConfirmationOutcome {
        debug!(tool = %request.tool_name, kind = %request.kind, scope = ?request.scope, "ApprovalController::request_confirmation: called");
        if self.is_exempt(&request).await {
            debug!("ApprovalController::request_confirmation: exempt, proceeding");
            return ConfirmationOutcome::ProceedOnce;
        }

        let _turn = self.surfacing.lock().await;

        // An earlier request may have granted "always" while this one waited
        if self.is_exempt(&request).await {
            debug!("ApprovalController::request_confirmation: exempt after waiting, proceeding");
            return ConfirmationOutcome::ProceedOnce;
        }

        let kind = request.kind;
        let scope = request.scope.clone();
        let outcome = self.surface.confirm(request).await;
        debug!(?outcome, "ApprovalController::request_confirmation: surface answered");

        if outcome == ConfirmationOutcome::ProceedAlways {
            self.apply_always(kind, scope).await;
        }
        outcome
    }

    async fn apply_always(&self, kind: ConfirmationKind, scope: Option<String>) {
        debug!(%kind, ?scope, "ApprovalController::apply_always: called");
        match scope {
            Some(scope) if kind != ConfirmationKind::Edit => {
                info!(%kind, %scope, "Always allowing scope for this session");
                self.allowlist.lock().await.insert((kind, scope));
            }
            _ => {
                self.escalate(kind.implied_mode());
            }
        }
    }
}

impl std::fmt::Debug for ApprovalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalController").field("mode", &self.mode()).finish()
    }
}
