//! Maker-Verifier-Authorizer state machine
//!
//! ```text
//!   draft -> pending_verification -> pending_authorization -> approved
//!                  |                         |                  |
//!                  +-------> rejected <------+                  |
//!                               |                               |
//!   draft <---------------------+        (restock re-entry) ----+--> pending_verification
//! ```
//!
//! Every operation checks the role table before touching storage, then runs one
//! transaction: load, scope guard, state guard, self-transition guards, write,
//! audit. Failed attempts are logged and get their own `attempt_rejected` audit
//! record.
use super::asset::{Asset, AssetStatus, TimeStamp, WorkflowStatus};
use super::audit::{AuditAction, AuditDetail, AuditRecord, QuantityKind};
use super::error::{GuardViolation, StoreError, ValidationError, WorkflowError};
use super::ledger;
use super::permission::{Action, Actor, PermissionGuard};
use super::store::{
    AssetStore, Outcome, StoreTxn, TxnError, persist_asset, require_asset, require_category,
};
use super::utils::is_blank;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The edges of the approval graph, named by the operation that walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Verify,
    Authorize,
    RejectFromVerification,
    RejectFromAuthorization,
    ReturnToDraft,
    /// Reported stock merged into an approved item sends it back for review.
    RestockReentry,
}

pub struct WorkflowStateMachine<S: AssetStore> {
    store: Arc<S>,
}

impl Transition {
    pub const ALL: [Transition; 7] = [
        Transition::Submit,
        Transition::Verify,
        Transition::Authorize,
        Transition::RejectFromVerification,
        Transition::RejectFromAuthorization,
        Transition::ReturnToDraft,
        Transition::RestockReentry,
    ];

    pub fn endpoints(self) -> (WorkflowStatus, WorkflowStatus) {
        use WorkflowStatus::*;

        match self {
            Transition::Submit => (Draft, PendingVerification),
            Transition::Verify => (PendingVerification, PendingAuthorization),
            Transition::Authorize => (PendingAuthorization, Approved),
            Transition::RejectFromVerification => (PendingVerification, Rejected),
            Transition::RejectFromAuthorization => (PendingAuthorization, Rejected),
            Transition::ReturnToDraft => (Rejected, Draft),
            Transition::RestockReentry => (Approved, PendingVerification),
        }
    }

    /// Looks up the edge joining two states, if there is one.
    pub fn between(from: WorkflowStatus, to: WorkflowStatus) -> Option<Transition> {
        Self::ALL
            .into_iter()
            .find(|transition| transition.endpoints() == (from, to))
    }
}

impl WorkflowStatus {
    /// Review edges only. The restock re-entry edge is reachable solely through intake.
    pub fn next_states(self) -> &'static [WorkflowStatus] {
        use WorkflowStatus::*;

        match self {
            Draft => &[PendingVerification],
            PendingVerification => &[PendingAuthorization, Rejected],
            PendingAuthorization => &[Approved, Rejected],
            Approved => &[],
            Rejected => &[Draft],
        }
    }

    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        self.next_states().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }
}

/// Project scope guard shared by every asset-level operation.
pub(crate) fn ensure_in_scope(actor: &Actor, asset: &Asset) -> Result<(), GuardViolation> {
    if actor.can_reach(asset.project_id.as_deref()) {
        Ok(())
    } else {
        Err(GuardViolation::OutsideProject)
    }
}

pub(crate) fn expect_state(
    action: Action,
    asset: &Asset,
    expected: WorkflowStatus,
) -> Result<(), WorkflowError> {
    if asset.workflow_status == expected {
        return Ok(());
    }
    Err(WorkflowError::StateConflict {
        action,
        actual: asset.workflow_status,
        expected,
    })
}

/// Stages `amount` as a pending addition and, for an approved item, walks the
/// restock re-entry edge. The reporter becomes the maker of a new review cycle;
/// an open cycle keeps its maker.
pub(crate) fn begin_restock_review(
    asset: &mut Asset,
    actor: &Actor,
    amount: u64,
) -> Result<WorkflowStatus, ValidationError> {
    let from = asset.workflow_status;
    ledger::stage_addition(asset, amount)?;
    if from == WorkflowStatus::Approved {
        asset.workflow_status = WorkflowStatus::PendingVerification;
        asset.made_by = Some(actor.id.clone());
        asset.clear_verification();
    }
    Ok(from)
}

impl<S: AssetStore> WorkflowStateMachine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// draft -> pending_verification
    pub fn submit(&self, asset_id: &str, actor: &Actor) -> Result<Outcome<Asset>, StoreError> {
        self.run(Action::Submit, asset_id, actor, Ok(()), |txn| {
            let mut asset = require_asset(txn, asset_id)?;
            ensure_in_scope(actor, &asset)?;
            expect_state(Action::Submit, &asset, WorkflowStatus::Draft)?;

            let missing = asset.missing_required_fields();
            if !missing.is_empty() {
                return Err(ValidationError::MissingFields(missing).into());
            }
            let category = require_category(txn, &asset.category_id)?;

            asset.workflow_status = WorkflowStatus::PendingVerification;
            asset.made_by = Some(actor.id.clone());
            // a resubmission starts a fresh review cycle
            asset.clear_verification();
            persist_asset(txn, &mut asset, category.is_consumable)?;

            txn.append_audit(AuditRecord::transition(
                actor,
                AuditAction::AssetSubmitted,
                asset_id,
                WorkflowStatus::Draft,
                WorkflowStatus::PendingVerification,
                None,
            ))?;
            Ok(asset)
        })
    }

    /// pending_verification -> pending_authorization
    pub fn verify(
        &self,
        asset_id: &str,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<Outcome<Asset>, StoreError> {
        self.run(Action::Verify, asset_id, actor, Ok(()), |txn| {
            let mut asset = require_asset(txn, asset_id)?;
            ensure_in_scope(actor, &asset)?;
            expect_state(Action::Verify, &asset, WorkflowStatus::PendingVerification)?;
            if asset.made_by.as_deref() == Some(actor.id.as_str()) {
                return Err(GuardViolation::SelfVerification.into());
            }
            let category = require_category(txn, &asset.category_id)?;

            asset.workflow_status = WorkflowStatus::PendingAuthorization;
            asset.verified_by = Some(actor.id.clone());
            asset.verification_date = Some(TimeStamp::new());
            asset.verification_notes = notes.clone();
            persist_asset(txn, &mut asset, category.is_consumable)?;

            txn.append_audit(AuditRecord::transition(
                actor,
                AuditAction::AssetVerified,
                asset_id,
                WorkflowStatus::PendingVerification,
                WorkflowStatus::PendingAuthorization,
                notes.clone(),
            ))?;
            Ok(asset)
        })
    }

    /// pending_authorization -> approved. Any pending addition becomes real stock
    /// in the same write as the state change.
    pub fn authorize(
        &self,
        asset_id: &str,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<Outcome<Asset>, StoreError> {
        self.run(Action::Authorize, asset_id, actor, Ok(()), |txn| {
            let mut asset = require_asset(txn, asset_id)?;
            ensure_in_scope(actor, &asset)?;
            expect_state(Action::Authorize, &asset, WorkflowStatus::PendingAuthorization)?;
            if asset.is_chain_member(&actor.id) {
                return Err(GuardViolation::SelfAuthorization.into());
            }
            let category = require_category(txn, &asset.category_id)?;

            let available_before = asset.available_quantity;
            let folded = ledger::fold_pending(&mut asset)?;
            asset.workflow_status = WorkflowStatus::Approved;
            asset.status = AssetStatus::Available;
            asset.authorized_by = Some(actor.id.clone());
            asset.authorization_date = Some(TimeStamp::new());
            asset.authorization_notes = notes.clone();
            persist_asset(txn, &mut asset, category.is_consumable)?;

            txn.append_audit(AuditRecord::transition(
                actor,
                AuditAction::AssetAuthorized,
                asset_id,
                WorkflowStatus::PendingAuthorization,
                WorkflowStatus::Approved,
                notes.clone(),
            ))?;
            if folded > 0 {
                txn.append_audit(AuditRecord::new(
                    actor,
                    AuditAction::QuantityAdded,
                    asset_id,
                    format!("authorized restock of {folded} added to stock"),
                    AuditDetail::Quantity {
                        kind: QuantityKind::Added,
                        requested: folded,
                        applied: folded,
                        available_before,
                        available_after: asset.available_quantity,
                        reason: "restock authorized".to_string(),
                        reference: None,
                    },
                ))?;
            }
            Ok(asset)
        })
    }

    /// pending_verification | pending_authorization -> rejected. The caller names
    /// the state it believes the asset is in; a mismatch is a state conflict.
    /// Any staged restock is dropped with the cycle.
    pub fn reject(
        &self,
        asset_id: &str,
        actor: &Actor,
        reason: &str,
        expected_from: WorkflowStatus,
    ) -> Result<Outcome<Asset>, StoreError> {
        let precheck = if is_blank(reason) {
            Err(ValidationError::EmptyReason.into())
        } else if !expected_from.can_transition_to(WorkflowStatus::Rejected) {
            Err(ValidationError::IllegalRejection {
                from: expected_from,
            }
            .into())
        } else {
            Ok(())
        };
        let reason = reason.trim();

        self.run(Action::Reject, asset_id, actor, precheck, |txn| {
            let mut asset = require_asset(txn, asset_id)?;
            ensure_in_scope(actor, &asset)?;
            expect_state(Action::Reject, &asset, expected_from)?;
            let category = require_category(txn, &asset.category_id)?;

            asset.workflow_status = WorkflowStatus::Rejected;
            asset.rejected_by = Some(actor.id.clone());
            asset.rejection_date = Some(TimeStamp::new());
            asset.rejection_reason = Some(reason.to_string());
            // a rejected restock never reaches stock
            let discarded = std::mem::take(&mut asset.pending_quantity_addition);
            persist_asset(txn, &mut asset, category.is_consumable)?;

            txn.append_audit(AuditRecord::transition(
                actor,
                AuditAction::AssetRejected,
                asset_id,
                expected_from,
                WorkflowStatus::Rejected,
                Some(reason.to_string()),
            ))?;
            if discarded > 0 {
                txn.append_audit(AuditRecord::new(
                    actor,
                    AuditAction::RestockDiscarded,
                    asset_id,
                    format!("staged restock of {discarded} discarded on rejection"),
                    AuditDetail::Discarded {
                        amount: discarded,
                        reason: reason.to_string(),
                    },
                ))?;
            }
            Ok(asset)
        })
    }

    /// rejected -> draft, by the original maker or an admin-tier role.
    pub fn return_to_draft(
        &self,
        asset_id: &str,
        actor: &Actor,
    ) -> Result<Outcome<Asset>, StoreError> {
        self.run(Action::ReturnToDraft, asset_id, actor, Ok(()), |txn| {
            let mut asset = require_asset(txn, asset_id)?;
            ensure_in_scope(actor, &asset)?;
            expect_state(Action::ReturnToDraft, &asset, WorkflowStatus::Rejected)?;
            if asset.owner() != actor.id && !actor.role.is_admin_tier() {
                return Err(GuardViolation::NotMakerOrAdmin.into());
            }
            let category = require_category(txn, &asset.category_id)?;

            asset.workflow_status = WorkflowStatus::Draft;
            asset.clear_rejection();
            persist_asset(txn, &mut asset, category.is_consumable)?;

            txn.append_audit(AuditRecord::transition(
                actor,
                AuditAction::AssetReturnedToDraft,
                asset_id,
                WorkflowStatus::Rejected,
                WorkflowStatus::Draft,
                None,
            ))?;
            Ok(asset)
        })
    }

    fn run<F>(
        &self,
        action: Action,
        asset_id: &str,
        actor: &Actor,
        precheck: Result<(), WorkflowError>,
        body: F,
    ) -> Result<Outcome<Asset>, StoreError>
    where
        F: Fn(&dyn StoreTxn) -> Result<Asset, TxnError>,
    {
        let outcome = if !PermissionGuard::is_allowed(action, actor.role) {
            Err(WorkflowError::PermissionDenied {
                role: actor.role,
                action,
            })
        } else if let Err(e) = precheck {
            Err(e)
        } else {
            self.store.transact(body).inspect_err(|e| {
                error!(asset_id, actor = %actor.id, %action, error = %e, "workflow transaction failed");
            })?
        };

        match outcome {
            Ok(asset) => {
                info!(
                    asset_id,
                    actor = %actor.id,
                    %action,
                    state = %asset.workflow_status,
                    "workflow transition committed"
                );
                Ok(Ok(asset))
            }
            Err(e) => {
                warn!(asset_id, actor = %actor.id, %action, kind = ?e.kind(), error = %e, "workflow transition refused");
                self.record_attempt(action, asset_id, actor, &e);
                Ok(Err(e))
            }
        }
    }

    fn record_attempt(
        &self,
        action: Action,
        asset_id: &str,
        actor: &Actor,
        err: &WorkflowError,
    ) {
        let record = AuditRecord::new(
            actor,
            AuditAction::AttemptRejected,
            asset_id,
            format!("{} attempted to {action}: {err}", actor.id),
            AuditDetail::Denied {
                attempted: action,
                kind: err.kind(),
                message: err.to_string(),
            },
        );
        match self.store.transact(|txn| txn.append_audit(record.clone())) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(asset_id, actor = %actor.id, error = %e, "refused attempt was not recorded"),
            Err(e) => error!(asset_id, actor = %actor.id, error = %e, "refused attempt was not recorded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_graph_matches_transitions() {
        use WorkflowStatus::*;

        assert!(Draft.can_transition_to(PendingVerification));
        assert!(PendingVerification.can_transition_to(Rejected));
        assert!(PendingAuthorization.can_transition_to(Approved));
        assert!(Rejected.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(PendingVerification));
        assert!(Approved.is_terminal());
    }

    #[test]
    fn every_review_edge_is_named() {
        for from in [
            WorkflowStatus::Draft,
            WorkflowStatus::PendingVerification,
            WorkflowStatus::PendingAuthorization,
            WorkflowStatus::Approved,
            WorkflowStatus::Rejected,
        ] {
            for to in from.next_states() {
                assert!(Transition::between(from, *to).is_some());
            }
        }
        assert_eq!(
            Transition::between(WorkflowStatus::Approved, WorkflowStatus::PendingVerification),
            Some(Transition::RestockReentry)
        );
        assert_eq!(
            Transition::between(WorkflowStatus::Draft, WorkflowStatus::Approved),
            None
        );
    }
}
