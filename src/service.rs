//! Service layer API for asset registration, intake and corrections
use super::asset::{Asset, Category, InventorySource, NewAsset, TimeStamp, WorkflowStatus};
use super::audit::{AuditAction, AuditDetail, AuditRecord};
use super::config::EngineConfig;
use super::edit::EditPermissionResolver;
use super::error::{GuardViolation, StoreError, ValidationError, WorkflowError};
use super::ledger::{self, QuantityLedger};
use super::matcher::{DuplicateCheck, DuplicateMatcher, ProposedConsumable};
use super::permission::{Action, Actor, PermissionGuard};
use super::store::{
    AssetStore, Outcome, SledStore, StoreTxn, TxnError, persist_asset, require_asset,
    require_category,
};
use super::utils::{is_blank, new_asset_id};
use super::workflow::{WorkflowStateMachine, begin_restock_review, ensure_in_scope};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AssetService<S: AssetStore> {
    store: Arc<S>,
    workflow: WorkflowStateMachine<S>,
    ledger: QuantityLedger<S>,
    matcher: DuplicateMatcher,
}

/// What intake did with a reported consumable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeDecision {
    /// Merged into an existing record as a pending addition awaiting review.
    Restocked {
        asset: Asset,
        added: u64,
        from: WorkflowStatus,
    },
    Created { asset: Asset, check: DuplicateCheck },
}

/// Descriptive fields a correction may change. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct AssetCorrection {
    pub name: Option<String>,
    pub model: Option<String>,
    pub specifications: Option<String>,
    pub unit: Option<String>,
    pub project_id: Option<String>,
    pub acquired_date: Option<TimeStamp<Utc>>,
}

impl IntakeDecision {
    pub fn asset(&self) -> &Asset {
        match self {
            IntakeDecision::Restocked { asset, .. } | IntakeDecision::Created { asset, .. } => asset,
        }
    }
}

impl AssetCorrection {
    /// Applies the set fields and returns their names.
    fn apply(&self, asset: &mut Asset) -> Vec<String> {
        let mut changed = vec![];
        if let Some(name) = &self.name {
            asset.name = name.trim().to_string();
            changed.push("name".to_string());
        }
        if let Some(model) = &self.model {
            asset.model = Some(model.clone());
            changed.push("model".to_string());
        }
        if let Some(specifications) = &self.specifications {
            asset.specifications = Some(specifications.clone());
            changed.push("specifications".to_string());
        }
        if let Some(unit) = &self.unit {
            asset.unit = Some(unit.clone());
            changed.push("unit".to_string());
        }
        if let Some(project_id) = &self.project_id {
            asset.project_id = Some(project_id.clone());
            changed.push("project".to_string());
        }
        if let Some(date) = &self.acquired_date {
            asset.acquired_date = Some(date.clone());
            changed.push("acquired date".to_string());
        }
        changed
    }
}

impl AssetService<SledStore> {
    /// Opens the sled database named by the configuration.
    pub fn open(config: &EngineConfig) -> anyhow::Result<Self> {
        let store = SledStore::open(&config.db_path)
            .with_context(|| format!("failed to open asset store at {}", config.db_path))?;
        Ok(Self::new(Arc::new(store), config))
    }
}

impl<S: AssetStore> AssetService<S> {
    pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            workflow: WorkflowStateMachine::new(store.clone()),
            ledger: QuantityLedger::new(store.clone()),
            matcher: DuplicateMatcher::new(config.matcher.clone()),
            store,
        }
    }

    pub fn workflow(&self) -> &WorkflowStateMachine<S> {
        &self.workflow
    }

    pub fn ledger(&self) -> &QuantityLedger<S> {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn asset(&self, asset_id: &str) -> Result<Outcome<Asset>, StoreError> {
        self.store.transact(|txn| require_asset(txn, asset_id))
    }

    pub fn audit_trail(&self, asset_id: &str) -> Result<Vec<AuditRecord>, StoreError> {
        self.store.audit_trail(asset_id)
    }

    pub fn register_category(
        &self,
        actor: &Actor,
        category: Category,
    ) -> Result<Outcome<Category>, StoreError> {
        if !PermissionGuard::is_allowed(Action::ManageCategories, actor.role) {
            return Ok(Err(denied(actor, Action::ManageCategories)));
        }
        if is_blank(&category.name) {
            return Ok(Err(ValidationError::MissingFields(vec!["name"]).into()));
        }

        let outcome = self.store.transact(|txn| {
            txn.save_category(&category)?;
            txn.append_audit(
                AuditRecord::new(
                    actor,
                    AuditAction::CategoryRegistered,
                    &category.id,
                    format!("{} registered category {}", actor.id, category.name),
                    AuditDetail::Created,
                )
                .for_category(),
            )?;
            Ok(category.clone())
        })?;
        if outcome.is_ok() {
            info!(category_id = %category.id, actor = %actor.id, "category registered");
        }
        Ok(outcome)
    }

    /// Creation path. Legacy items enter as drafts for the full review; other
    /// sources are approved on arrival.
    pub fn register_asset(
        &self,
        actor: &Actor,
        draft: NewAsset,
    ) -> Result<Outcome<Asset>, StoreError> {
        if !PermissionGuard::is_allowed(Action::Register, actor.role) {
            return Ok(Err(denied(actor, Action::Register)));
        }
        if !actor.can_reach(draft.project_id()) {
            return Ok(Err(GuardViolation::OutsideProject.into()));
        }
        let id = match new_asset_id() {
            Ok(id) => id,
            Err(e) => return Err(StoreError::Identifier(e.to_string())),
        };

        let outcome = self
            .store
            .transact(|txn| {
                let category = require_category(txn, draft.category_id())?;
                let mut asset =
                    draft
                        .clone()
                        .validate_and_finalise(id.clone(), &category, actor)?;
                insert_new(txn, actor, &mut asset, category.is_consumable)?;
                Ok(asset)
            })
            .inspect_err(|e| error!(actor = %actor.id, error = %e, "asset registration failed"))?;

        match &outcome {
            Ok(asset) => info!(asset_id = %asset.id, actor = %actor.id, state = %asset.workflow_status, "asset registered"),
            Err(e) => warn!(actor = %actor.id, error = %e, "asset registration refused"),
        }
        Ok(outcome)
    }

    /// Reconciles reported consumable stock: merges it into a matching record
    /// as a pending addition, or creates a new record when nothing matches or
    /// the duplicate search fails.
    pub fn report_consumable(
        &self,
        actor: &Actor,
        proposal: ProposedConsumable,
        source: InventorySource,
    ) -> Result<Outcome<IntakeDecision>, StoreError> {
        if !PermissionGuard::is_allowed(Action::ReportStock, actor.role) {
            return Ok(Err(denied(actor, Action::ReportStock)));
        }
        if !actor.can_reach(Some(&proposal.project_id)) {
            return Ok(Err(GuardViolation::OutsideProject.into()));
        }
        let amount = match ledger::positive(proposal.quantity) {
            Ok(amount) => amount,
            Err(e) => return Ok(Err(e.into())),
        };
        if is_blank(&proposal.name) {
            return Ok(Err(ValidationError::MissingFields(vec!["name"]).into()));
        }
        let category = match self
            .store
            .transact(|txn| require_category(txn, &proposal.category_id))?
        {
            Ok(category) if category.is_consumable => category,
            Ok(_) => return Ok(Err(ValidationError::NotConsumable.into())),
            Err(e) => return Ok(Err(e)),
        };

        let (check, candidate) = self.matcher.check(&*self.store, &proposal);

        if let Some(candidate) = candidate {
            let merged = self.store.transact(|txn| {
                // re-read: the candidate may have moved on since the scan
                let mut asset = require_asset(txn, &candidate.id)?;
                if !self.matcher.is_match(&asset, &proposal) {
                    return Ok(None);
                }
                let from = begin_restock_review(&mut asset, actor, amount)?;
                persist_asset(txn, &mut asset, category.is_consumable)?;
                txn.append_audit(AuditRecord::new(
                    actor,
                    AuditAction::RestockRequested,
                    &asset.id,
                    format!(
                        "{} reported {amount} more of {}, awaiting verification",
                        actor.id, asset.name
                    ),
                    AuditDetail::Restock {
                        added: amount,
                        pending_total: asset.pending_quantity_addition,
                        from,
                    },
                ))?;
                Ok(Some(IntakeDecision::Restocked {
                    asset,
                    added: amount,
                    from,
                }))
            })?;

            match merged {
                Ok(Some(decision)) => {
                    info!(
                        asset_id = %decision.asset().id,
                        actor = %actor.id,
                        added = amount,
                        "reported stock merged into existing record"
                    );
                    return Ok(Ok(decision));
                }
                Ok(None) => {
                    warn!(asset_id = %candidate.id, "duplicate candidate changed before merge, creating instead");
                }
                Err(e) => return Ok(Err(e)),
            }
        }

        let mut draft = NewAsset::new(proposal.name.clone(), proposal.category_id.clone())
            .set_project(proposal.project_id.clone())
            .set_quantity(amount)
            .set_source(source)
            .set_acquired_date(TimeStamp::new());
        if let Some(model) = &proposal.model {
            draft = draft.set_model(model.clone());
        }
        if let Some(specifications) = &proposal.specifications {
            draft = draft.set_specifications(specifications.clone());
        }
        if let Some(unit) = &proposal.unit {
            draft = draft.set_unit(unit.clone());
        }

        Ok(self
            .register_asset(actor, draft)?
            .map(|asset| IntakeDecision::Created { asset, check }))
    }

    /// Descriptive edits, gated by the edit resolver for the asset's current stage.
    pub fn correct(
        &self,
        asset_id: &str,
        actor: &Actor,
        correction: AssetCorrection,
    ) -> Result<Outcome<Asset>, StoreError> {
        if !PermissionGuard::is_allowed(Action::Edit, actor.role) {
            return Ok(Err(denied(actor, Action::Edit)));
        }

        let outcome = self.store.transact(|txn| {
            let mut asset = require_asset(txn, asset_id)?;
            let right = EditPermissionResolver::resolve(actor, &asset)?;
            if correction.project_id.is_some() && !right.may_reassign_project() {
                return Err(GuardViolation::ProjectReassignment.into());
            }
            if correction.name.as_deref().is_some_and(is_blank) {
                return Err(ValidationError::MissingFields(vec!["name"]).into());
            }

            let fields = correction.apply(&mut asset);
            if fields.is_empty() {
                return Err(ValidationError::EmptyCorrection.into());
            }
            // a reassigned asset must still be reachable by whoever moved it
            ensure_in_scope(actor, &asset)?;
            let category = require_category(txn, &asset.category_id)?;
            persist_asset(txn, &mut asset, category.is_consumable)?;

            txn.append_audit(AuditRecord::new(
                actor,
                AuditAction::AssetCorrected,
                asset_id,
                format!("{} corrected {}", actor.id, fields.join(", ")),
                AuditDetail::Corrected { fields },
            ))?;
            Ok(asset)
        })?;

        match &outcome {
            Ok(asset) => info!(asset_id, actor = %actor.id, version = asset.version, "asset corrected"),
            Err(e) => warn!(asset_id, actor = %actor.id, kind = ?e.kind(), error = %e, "correction refused"),
        }
        Ok(outcome)
    }
}

fn insert_new(
    txn: &dyn StoreTxn,
    actor: &Actor,
    asset: &mut Asset,
    consumable: bool,
) -> Result<(), TxnError> {
    persist_asset(txn, asset, consumable)?;
    txn.append_audit(AuditRecord::new(
        actor,
        AuditAction::AssetRegistered,
        &asset.id,
        format!("{} registered {} as {}", actor.id, asset.name, asset.workflow_status),
        AuditDetail::Transition {
            from: None,
            to: asset.workflow_status,
            notes: None,
        },
    ))?;
    Ok(())
}

fn denied(actor: &Actor, action: Action) -> WorkflowError {
    WorkflowError::PermissionDenied {
        role: actor.role,
        action,
    }
}
