//! CloudFormation stack status classification

use stackprobe_cloud::StackAction;

const CANCELLED_REASON: &str = "Resource creation cancelled";

/// Coarse phase of a stack status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    /// An operation is still running
    InProgress,
    /// The last create/update/import finished cleanly
    Succeeded,
    /// The stack has been deleted
    Deleted,
    /// Failed, or rolled back
    Failed,
}

pub fn classify(status: &str) -> StackPhase {
    if status.ends_with("_IN_PROGRESS") {
        return StackPhase::InProgress;
    }
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => StackPhase::Succeeded,
        "DELETE_COMPLETE" => StackPhase::Deleted,
        _ => StackPhase::Failed,
    }
}

/// A stack left behind by a failed first create; it can only be deleted
pub fn is_unrecoverable(status: &str) -> bool {
    status == "ROLLBACK_COMPLETE" || status == "ROLLBACK_FAILED"
}

/// What deploy does with the stack it finds under the target name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreDeploy {
    Create,
    Update,
    /// Delete the leftover stack, then create
    Recreate,
    /// Another operation is still running on the stack
    Busy,
}

pub fn pre_deploy(existing: Option<&str>) -> PreDeploy {
    match existing {
        None => PreDeploy::Create,
        Some(status) => match classify(status) {
            StackPhase::InProgress => PreDeploy::Busy,
            StackPhase::Deleted => PreDeploy::Create,
            _ if is_unrecoverable(status) => PreDeploy::Recreate,
            // UPDATE_ROLLBACK_COMPLETE and friends accept updates
            _ => PreDeploy::Update,
        },
    }
}

/// Whether a settled stack counts as deployed
///
/// A no-op leaves the previous status in place, which may be a completed
/// update rollback.
pub fn deploy_succeeded(action: StackAction, status: &str) -> bool {
    action == StackAction::NoOp || classify(status) == StackPhase::Succeeded
}

/// Whether a delete finished; `None` means the stack is gone
pub fn delete_succeeded(status: Option<&str>) -> bool {
    match status {
        None => true,
        Some(status) => classify(status) == StackPhase::Deleted,
    }
}

/// The parts of a stack event needed to explain a failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    pub logical_id: Option<String>,
    pub status: Option<String>,
    pub reason: Option<String>,
}

/// First (most recent) failed event with a meaningful reason
///
/// Events come newest first. Resources cancelled because a sibling failed
/// are skipped.
pub fn failure_reason(events: &[EventRecord]) -> Option<String> {
    events
        .iter()
        .filter(|event| {
            event
                .status
                .as_deref()
                .is_some_and(|s| s.ends_with("_FAILED"))
        })
        .find_map(|event| {
            let reason = event.reason.as_deref()?;
            if reason.contains(CANCELLED_REASON) {
                return None;
            }
            Some(format!(
                "{}: {}",
                event.logical_id.as_deref().unwrap_or("?"),
                reason
            ))
        })
}
