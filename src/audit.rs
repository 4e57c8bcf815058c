//! Append-only audit records for workflow transitions and quantity operations
use super::asset::{TimeStamp, WorkflowStatus};
use super::error::ErrorKind;
use super::permission::{Action, Actor};
use chrono::Utc;

pub const SUBJECT_ASSETS: &str = "assets";
pub const SUBJECT_CATEGORIES: &str = "categories";

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct AuditRecord {
    #[n(0)]
    pub actor: String,
    #[n(1)]
    pub action: AuditAction,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub subject_type: String,
    #[n(4)]
    pub subject_id: String,
    #[n(5)]
    pub timestamp: TimeStamp<Utc>,
    #[n(6)]
    pub prev_digest: Option<String>, // digest of the previous record for this subject
    #[n(7)]
    pub detail: AuditDetail,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Copy)]
pub enum AuditAction {
    #[n(0)]
    AssetRegistered,
    #[n(1)]
    AssetSubmitted,
    #[n(2)]
    AssetVerified,
    #[n(3)]
    AssetAuthorized,
    #[n(4)]
    AssetRejected,
    #[n(5)]
    AssetReturnedToDraft,
    #[n(6)]
    RestockRequested,
    #[n(7)]
    QuantityConsumed,
    #[n(8)]
    QuantityRestored,
    #[n(9)]
    QuantityAdded,
    #[n(10)]
    AssetCorrected,
    #[n(11)]
    CategoryRegistered,
    #[n(12)]
    AttemptRejected,
    #[n(13)]
    RestockDiscarded,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Copy)]
pub enum QuantityKind {
    #[n(0)]
    Consumed,
    #[n(1)]
    Restored,
    #[n(2)]
    Added,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum AuditDetail {
    #[n(0)]
    Transition {
        #[n(0)]
        from: Option<WorkflowStatus>, // None when the record was just created
        #[n(1)]
        to: WorkflowStatus,
        #[n(2)]
        notes: Option<String>,
    },
    #[n(1)]
    Quantity {
        #[n(0)]
        kind: QuantityKind,
        #[n(1)]
        requested: u64,
        #[n(2)]
        applied: u64,
        #[n(3)]
        available_before: u64,
        #[n(4)]
        available_after: u64,
        #[n(5)]
        reason: String,
        #[n(6)]
        reference: Option<String>,
    },
    #[n(2)]
    Restock {
        #[n(0)]
        added: u64,
        #[n(1)]
        pending_total: u64,
        #[n(2)]
        from: WorkflowStatus,
    },
    #[n(3)]
    Corrected {
        #[n(0)]
        fields: Vec<String>,
    },
    #[n(4)]
    Denied {
        #[n(0)]
        attempted: Action,
        #[n(1)]
        kind: ErrorKind,
        #[n(2)]
        message: String,
    },
    #[n(5)]
    Created,
    #[n(6)]
    Discarded {
        #[n(0)]
        amount: u64, // staged addition dropped with the rejected cycle
        #[n(1)]
        reason: String,
    },
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::AssetRegistered => "asset_registered",
            AuditAction::AssetSubmitted => "asset_submitted",
            AuditAction::AssetVerified => "asset_verified",
            AuditAction::AssetAuthorized => "asset_authorized",
            AuditAction::AssetRejected => "asset_rejected",
            AuditAction::AssetReturnedToDraft => "asset_returned_to_draft",
            AuditAction::RestockRequested => "restock_requested",
            AuditAction::QuantityConsumed => "quantity_consumed",
            AuditAction::QuantityRestored => "quantity_restored",
            AuditAction::QuantityAdded => "quantity_added",
            AuditAction::AssetCorrected => "asset_corrected",
            AuditAction::CategoryRegistered => "category_registered",
            AuditAction::AttemptRejected => "attempt_rejected",
            AuditAction::RestockDiscarded => "restock_discarded",
        }
    }
}

impl AuditRecord {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        subject_id: &str,
        description: impl Into<String>,
        detail: AuditDetail,
    ) -> Self {
        Self {
            actor: actor.id.clone(),
            action,
            description: description.into(),
            subject_type: SUBJECT_ASSETS.to_string(),
            subject_id: subject_id.to_string(),
            timestamp: TimeStamp::new(),
            prev_digest: None,
            detail,
        }
    }
    pub fn for_category(mut self) -> Self {
        self.subject_type = SUBJECT_CATEGORIES.to_string();
        self
    }
    pub fn transition(
        actor: &Actor,
        action: AuditAction,
        asset_id: &str,
        from: WorkflowStatus,
        to: WorkflowStatus,
        notes: Option<String>,
    ) -> Self {
        Self::new(
            actor,
            action,
            asset_id,
            format!("{} moved asset from {from} to {to}", actor.id),
            AuditDetail::Transition {
                from: Some(from),
                to,
                notes,
            },
        )
    }
    /// Serialises the record and returns its digest alongside the encoding.
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// True when every record names the digest of the one before it.
pub fn verify_chain(records: &[AuditRecord]) -> anyhow::Result<bool> {
    let Some(first) = records.first() else {
        return Ok(true);
    };
    if first.prev_digest.is_some() {
        return Ok(false);
    }
    for pair in records.windows(2) {
        let (digest, _) = pair[0].build()?;
        if pair[1].prev_digest.as_deref() != Some(digest.as_str()) {
            return Ok(false);
        }
    }
    Ok(true)
}
