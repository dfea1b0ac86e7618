//! ToolExecutor - drives one tool call from lookup to result

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ToolCall, ToolContext, ToolError, ToolRegistry, ToolResult};
use crate::approval::{ApprovalController, ConfirmationOutcome};
use crate::checkpoint::{CheckpointError, CheckpointRecord, CheckpointService, checkpoint_tag};

/// Suffixed tags tried when calls land on the same timestamp
const TAG_ATTEMPTS: usize = 8;

/// How a single call ended
#[derive(Debug)]
pub enum CallOutcome {
    /// `execute` ran; the result may still report a tool-level failure
    Completed {
        result: ToolResult,
        /// Tag of the snapshot taken before execution
        checkpoint: Option<String>,
    },
    /// Unknown tool or invalid arguments; nothing ran
    Rejected(ToolError),
    /// The human cancelled at confirmation
    Declined { tool: String },
    /// A required snapshot failed, so the call did not run
    Aborted(ToolError),
}

impl CallOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Result suitable for feeding back to the model
    pub fn into_result(self) -> ToolResult {
        match self {
            Self::Completed { result, .. } => result,
            Self::Rejected(e) | Self::Aborted(e) => ToolResult::error(e.to_string()),
            Self::Declined { tool } => ToolResult::error(ToolError::ConfirmationDeclined { tool }.to_string()),
        }
    }
}

/// Runs calls through validate, confirm, snapshot and execute
pub struct ToolExecutor {
    approval: Arc<ApprovalController>,
    checkpoints: Option<Arc<CheckpointService>>,
    fail_closed: bool,
    ctx: ToolContext,
}

impl ToolExecutor {
    pub fn new(approval: Arc<ApprovalController>, ctx: ToolContext) -> Self {
        debug!(project_root = ?ctx.project_root, "ToolExecutor::new: called");
        Self {
            approval,
            checkpoints: None,
            fail_closed: true,
            ctx,
        }
    }

    /// Snapshot the workspace before every mutating call
    pub fn with_checkpoints(mut self, service: Arc<CheckpointService>, fail_closed: bool) -> Self {
        self.checkpoints = Some(service);
        self.fail_closed = fail_closed;
        self
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    pub fn approval(&self) -> &Arc<ApprovalController> {
        &self.approval
    }

    pub fn checkpoints(&self) -> Option<&Arc<CheckpointService>> {
        self.checkpoints.as_ref()
    }

    /// Run `call` against `registry`
    ///
    /// `conversation` is stored with the snapshot so a restore can hand it
    /// back. `execute` is never reached for args that failed validation.
    pub async fn run(
        &self,
        registry: &ToolRegistry,
        call: &ToolCall,
        conversation: &Value,
        cancel: CancellationToken,
    ) -> CallOutcome {
        debug!(tool = %call.name, call_id = %call.id, "ToolExecutor::run: called");

        let Some(tool) = registry.lookup(&call.name) else {
            debug!("ToolExecutor::run: unknown tool");
            return CallOutcome::Rejected(ToolError::UnknownTool {
                name: call.name.clone(),
            });
        };

        if let Err(e) = tool.validate(&call.args, &self.ctx) {
            info!(tool = %call.name, error = %e, "Tool call rejected");
            return CallOutcome::Rejected(e);
        }

        if let Some(request) = tool.should_confirm(&call.args, &self.ctx).await {
            let outcome = tokio::select! {
                outcome = self.approval.request_confirmation(request) => outcome,
                _ = cancel.cancelled() => ConfirmationOutcome::Cancel,
            };
            if !outcome.proceeds() {
                info!(tool = %call.name, "Tool call declined");
                return CallOutcome::Declined {
                    tool: call.name.clone(),
                };
            }
        }

        let mut checkpoint = None;
        if tool.is_mutating()
            && let Some(service) = &self.checkpoints
        {
            match self.snapshot(service, call, conversation).await {
                Ok(record) => checkpoint = Some(record.tag),
                Err(e) if self.fail_closed => {
                    warn!(tool = %call.name, error = %e, "Snapshot failed, not executing");
                    return CallOutcome::Aborted(e.into());
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Snapshot failed, executing anyway");
                }
            }
        }

        let result = if tool.is_mutating()
            && let Some(service) = &self.checkpoints
        {
            let _guard = service.guard_mutation().await;
            tool.execute(call.args.clone(), &self.ctx, cancel).await
        } else {
            tool.execute(call.args.clone(), &self.ctx, cancel).await
        };

        info!(tool = %call.name, is_error = result.is_error, checkpoint = ?checkpoint, "Tool call completed");
        CallOutcome::Completed { result, checkpoint }
    }

    /// Restore the workspace to a checkpoint taken by this executor
    pub async fn restore(&self, tag: &str) -> Result<CheckpointRecord, ToolError> {
        debug!(%tag, "ToolExecutor::restore: called");
        let service = self.checkpoints.as_ref().ok_or_else(|| {
            ToolError::InvalidArgument("checkpointing is not enabled for this session".to_string())
        })?;
        Ok(service.restore(tag).await?)
    }

    async fn snapshot(
        &self,
        service: &CheckpointService,
        call: &ToolCall,
        conversation: &Value,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let file = call.args["path"].as_str().map(Path::new);
        let base = checkpoint_tag(&call.name, file);
        let mut attempt = 1;
        loop {
            let tag = if attempt == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            match service.snapshot(&tag, call, conversation).await {
                Err(CheckpointError::AlreadyExists(_)) if attempt < TAG_ATTEMPTS => attempt += 1,
                result => return result,
            }
        }
    }
}
