//! Who may change an asset's descriptive fields at each lifecycle stage.
//!
//! This is separate from the workflow permission table: a verifier may not
//! submit, but may correct a submission it is reviewing.
use super::asset::{Asset, WorkflowStatus};
use super::error::{GuardViolation, WorkflowError};
use super::permission::{Action, Actor, PermissionGuard};
use super::workflow::ensure_in_scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditRight {
    /// Creator or maker working on their own draft or rejected asset.
    Owner,
    /// Reviewer fixing data during verification or authorization.
    Correction,
    /// Admin tier, any stage.
    Administrative,
}

pub struct EditPermissionResolver;

impl EditRight {
    pub fn may_reassign_project(self) -> bool {
        !matches!(self, EditRight::Correction)
    }
}

impl EditPermissionResolver {
    pub fn resolve(actor: &Actor, asset: &Asset) -> Result<EditRight, WorkflowError> {
        ensure_in_scope(actor, asset)?;
        if actor.role.is_admin_tier() {
            return Ok(EditRight::Administrative);
        }

        let is_owner = asset.created_by == actor.id || asset.made_by.as_deref() == Some(actor.id.as_str());
        match asset.workflow_status {
            WorkflowStatus::Draft | WorkflowStatus::Rejected => {
                if is_owner {
                    Ok(EditRight::Owner)
                } else {
                    Err(GuardViolation::NotOwner.into())
                }
            }
            WorkflowStatus::PendingVerification => {
                let is_maker = asset.made_by.as_deref() == Some(actor.id.as_str());
                Self::reviewer(actor, Action::Verify, is_maker)
            }
            WorkflowStatus::PendingAuthorization => {
                Self::reviewer(actor, Action::Authorize, asset.is_chain_member(&actor.id))
            }
            WorkflowStatus::Approved => Err(denied(actor)),
        }
    }

    pub fn can_edit(actor: &Actor, asset: &Asset) -> bool {
        Self::resolve(actor, asset).is_ok()
    }

    fn reviewer(actor: &Actor, step: Action, in_chain: bool) -> Result<EditRight, WorkflowError> {
        if in_chain {
            return Err(GuardViolation::ReviewerConflict.into());
        }
        if PermissionGuard::is_allowed(step, actor.role) {
            Ok(EditRight::Correction)
        } else {
            Err(denied(actor))
        }
    }
}

fn denied(actor: &Actor) -> WorkflowError {
    WorkflowError::PermissionDenied {
        role: actor.role,
        action: Action::Edit,
    }
}
