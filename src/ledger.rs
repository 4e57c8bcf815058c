//! Quantity ledger for consumable stock
//!
//! The counters on [`Asset`] are the materialised state; every change also
//! appends a quantity audit record inside the same transaction, so a failed
//! audit write rolls the counter change back with it.
use super::asset::{Asset, WorkflowStatus};
use super::audit::{AuditAction, AuditDetail, AuditRecord, QuantityKind};
use super::error::{StoreError, ValidationError, WorkflowError};
use super::permission::{Action, Actor, PermissionGuard};
use super::store::{AssetStore, Outcome, TxnError, persist_asset, require_asset, require_category};
use super::workflow::ensure_in_scope;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What a ledger call did to an asset's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityChange {
    pub asset: Asset,
    pub kind: QuantityKind,
    pub requested: u64,
    pub applied: u64,
    /// Set when less than `requested` was applied (restore capped at total).
    pub warning: Option<String>,
}

pub struct QuantityLedger<S: AssetStore> {
    store: Arc<S>,
}

/// Rejects zero and negative amounts.
pub fn positive(amount: i64) -> Result<u64, ValidationError> {
    u64::try_from(amount)
        .ok()
        .filter(|value| *value > 0)
        .ok_or(ValidationError::NonPositiveQuantity(amount))
}

pub fn apply_consume(asset: &mut Asset, amount: u64) -> Result<(), WorkflowError> {
    if amount > asset.available_quantity {
        return Err(WorkflowError::InsufficientQuantity {
            requested: amount,
            available: asset.available_quantity,
        });
    }
    asset.available_quantity -= amount;
    Ok(())
}

/// Returns the amount actually restored. Never lifts available above total.
pub fn apply_restore(asset: &mut Asset, amount: u64) -> u64 {
    let headroom = asset.quantity.saturating_sub(asset.available_quantity);
    let applied = amount.min(headroom);
    asset.available_quantity += applied;
    applied
}

pub fn apply_add(asset: &mut Asset, amount: u64) -> Result<(), ValidationError> {
    let quantity = asset
        .quantity
        .checked_add(amount)
        .ok_or(ValidationError::QuantityOverflow)?;
    let available = asset
        .available_quantity
        .checked_add(amount)
        .ok_or(ValidationError::QuantityOverflow)?;
    asset.quantity = quantity;
    asset.available_quantity = available;
    Ok(())
}

/// Queues `amount` for the next authorization. Returns the pending total.
pub fn stage_addition(asset: &mut Asset, amount: u64) -> Result<u64, ValidationError> {
    asset.pending_quantity_addition = asset
        .pending_quantity_addition
        .checked_add(amount)
        .ok_or(ValidationError::QuantityOverflow)?;
    Ok(asset.pending_quantity_addition)
}

/// Moves the pending addition into both counters. Returns the amount folded.
pub fn fold_pending(asset: &mut Asset) -> Result<u64, ValidationError> {
    let pending = asset.pending_quantity_addition;
    if pending == 0 {
        return Ok(0);
    }
    apply_add(asset, pending)?;
    asset.pending_quantity_addition = 0;
    Ok(pending)
}

impl<S: AssetStore> QuantityLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn consume(
        &self,
        asset_id: &str,
        actor: &Actor,
        amount: i64,
        reason: &str,
    ) -> Result<Outcome<QuantityChange>, StoreError> {
        self.run(Action::Consume, QuantityKind::Consumed, asset_id, actor, amount, reason, None)
    }

    pub fn restore(
        &self,
        asset_id: &str,
        actor: &Actor,
        amount: i64,
        reason: &str,
    ) -> Result<Outcome<QuantityChange>, StoreError> {
        self.run(Action::Restore, QuantityKind::Restored, asset_id, actor, amount, reason, None)
    }

    /// Direct stock increase without review. Reserved for administrative
    /// corrections; restocks go through intake and re-authorization.
    pub fn add(
        &self,
        asset_id: &str,
        actor: &Actor,
        amount: i64,
        reason: &str,
        procurement_ref: Option<&str>,
    ) -> Result<Outcome<QuantityChange>, StoreError> {
        self.run(
            Action::AdjustStock,
            QuantityKind::Added,
            asset_id,
            actor,
            amount,
            reason,
            procurement_ref,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        action: Action,
        kind: QuantityKind,
        asset_id: &str,
        actor: &Actor,
        amount: i64,
        reason: &str,
        reference: Option<&str>,
    ) -> Result<Outcome<QuantityChange>, StoreError> {
        let outcome = if !PermissionGuard::is_allowed(action, actor.role) {
            Err(WorkflowError::PermissionDenied {
                role: actor.role,
                action,
            })
        } else {
            match positive(amount) {
                Err(e) => Err(e.into()),
                Ok(amount) => self
                    .store
                    .transact(|txn| {
                        let mut asset = require_asset(txn, asset_id)?;
                        ensure_in_scope(actor, &asset)?;
                        if !require_category(txn, &asset.category_id)?.is_consumable {
                            return Err(ValidationError::NotConsumable.into());
                        }

                        let before = asset.available_quantity;
                        let applied = match kind {
                            QuantityKind::Consumed => {
                                if !asset.has_been_approved() {
                                    return Err(WorkflowError::StateConflict {
                                        action,
                                        actual: asset.workflow_status,
                                        expected: WorkflowStatus::Approved,
                                    }
                                    .into());
                                }
                                apply_consume(&mut asset, amount)?;
                                amount
                            }
                            QuantityKind::Restored => apply_restore(&mut asset, amount),
                            QuantityKind::Added => {
                                apply_add(&mut asset, amount)?;
                                amount
                            }
                        };
                        // a restore with no headroom left changes nothing
                        if applied > 0 {
                            persist_asset(txn, &mut asset, true)?;

                            txn.append_audit(AuditRecord::new(
                                actor,
                                audit_action(kind),
                                asset_id,
                                format!("{} {} of {}: {reason}", actor.id, verb(kind), applied),
                                AuditDetail::Quantity {
                                    kind,
                                    requested: amount,
                                    applied,
                                    available_before: before,
                                    available_after: asset.available_quantity,
                                    reason: reason.to_string(),
                                    reference: reference.map(str::to_string),
                                },
                            ))?;
                        }

                        let warning = (applied < amount).then(|| {
                            format!(
                                "restore capped at total quantity: requested={amount}, restored={applied}"
                            )
                        });
                        Ok::<_, TxnError>(QuantityChange {
                            asset,
                            kind,
                            requested: amount,
                            applied,
                            warning,
                        })
                    })
                    .inspect_err(|e| {
                        error!(asset_id, actor = %actor.id, %action, error = %e, "ledger transaction failed");
                    })?,
            }
        };

        match &outcome {
            Ok(change) => {
                info!(
                    asset_id,
                    actor = %actor.id,
                    %action,
                    applied = change.applied,
                    available = change.asset.available_quantity,
                    "ledger change committed"
                );
                if let Some(warning) = &change.warning {
                    warn!(asset_id, %warning, "ledger change adjusted");
                }
            }
            Err(e) => {
                warn!(asset_id, actor = %actor.id, %action, amount, kind = ?e.kind(), error = %e, "ledger change refused");
            }
        }
        Ok(outcome)
    }
}

fn audit_action(kind: QuantityKind) -> AuditAction {
    match kind {
        QuantityKind::Consumed => AuditAction::QuantityConsumed,
        QuantityKind::Restored => AuditAction::QuantityRestored,
        QuantityKind::Added => AuditAction::QuantityAdded,
    }
}

fn verb(kind: QuantityKind) -> &'static str {
    match kind {
        QuantityKind::Consumed => "consumed",
        QuantityKind::Restored => "restored",
        QuantityKind::Added => "added",
    }
}
