//! Approval surfaces - whoever answers confirmation requests

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{ConfirmationOutcome, ConfirmationRequest};

/// Front end that shows a request to the human and returns their decision
///
/// The core only defines this callback; rendering is up to the implementor.
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    async fn confirm(&self, request: ConfirmationRequest) -> ConfirmationOutcome;
}

/// A request waiting for an answer on a [`ChannelApprovalSurface`]
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    reply: oneshot::Sender<ConfirmationOutcome>,
}

impl PendingConfirmation {
    /// Answer the request; dropping it unanswered counts as `Cancel`
    pub fn respond(self, outcome: ConfirmationOutcome) {
        debug!(tool = %self.request.tool_name, ?outcome, "PendingConfirmation::respond: called");
        if self.reply.send(outcome).is_err() {
            debug!("PendingConfirmation::respond: requester went away");
        }
    }
}

/// Approval surface backed by a channel, for front ends running elsewhere
#[derive(Debug, Clone)]
pub struct ChannelApprovalSurface {
    tx: mpsc::Sender<PendingConfirmation>,
}

impl ChannelApprovalSurface {
    /// Create the surface and the receiver the front end reads requests from
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingConfirmation>) {
        debug!(buffer, "ChannelApprovalSurface::new: called");
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ApprovalSurface for ChannelApprovalSurface {
    async fn confirm(&self, request: ConfirmationRequest) -> ConfirmationOutcome {
        debug!(tool = %request.tool_name, kind = %request.kind, "ChannelApprovalSurface::confirm: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        let pending = PendingConfirmation {
            request,
            reply: reply_tx,
        };
        if self.tx.send(pending).await.is_err() {
            warn!("Approval front end is gone, cancelling request");
            return ConfirmationOutcome::Cancel;
        }

        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("ChannelApprovalSurface::confirm: reply dropped, treating as cancel");
                ConfirmationOutcome::Cancel
            }
        }
    }
}
