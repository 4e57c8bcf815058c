//! Storage contract and the sled-backed implementation
//!
//! Every engine operation is a single call to [`AssetStore::transact`]. The body
//! re-reads the rows it needs, validates against what it just read, and writes
//! the row plus its audit record. Implementations must detect concurrent writes
//! to the same keys and either re-run the body on fresh state or fail; sled's
//! multi-tree transactions re-run the body on conflict.
use super::asset::{Asset, Category};
use super::audit::AuditRecord;
use super::error::{GuardViolation, StoreError, ValidationError, WorkflowError};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, UnabortableTransactionError,
};
use std::path::Path;
use std::sync::Arc;
use uuid7::uuid7;

/// Business result of a committed or rolled-back operation.
pub type Outcome<T> = Result<T, WorkflowError>;

/// Why a transaction body stopped.
#[derive(Debug)]
pub enum TxnError {
    /// Business rule failed, roll back and hand the error to the caller.
    Rejected(WorkflowError),
    Store(StoreError),
    /// Concurrent write detected, the store re-runs the body.
    Conflict,
}

/// Reads and writes visible inside one transaction.
pub trait StoreTxn {
    fn load_asset(&self, id: &str) -> Result<Option<Asset>, TxnError>;
    fn save_asset(&self, asset: &Asset) -> Result<(), TxnError>;
    fn load_category(&self, id: &str) -> Result<Option<Category>, TxnError>;
    fn save_category(&self, category: &Category) -> Result<(), TxnError>;
    /// Links the record to the subject's previous record and stores it. Returns its digest.
    fn append_audit(&self, record: AuditRecord) -> Result<String, TxnError>;
}

pub trait AssetStore: Send + Sync {
    /// Runs `body` atomically. `Ok(Err(_))` is a rolled-back business failure,
    /// `Err(_)` an infrastructure failure (also rolled back).
    fn transact<T, F>(&self, body: F) -> Result<Outcome<T>, StoreError>
    where
        F: Fn(&dyn StoreTxn) -> Result<T, TxnError>;

    fn scan_assets(&self) -> Result<Vec<Asset>, StoreError>;

    fn audit_trail(&self, subject_id: &str) -> Result<Vec<AuditRecord>, StoreError>;
}

pub struct SledStore {
    instance: Arc<sled::Db>,
    assets: sled::Tree,
    categories: sled::Tree,
    audit: sled::Tree,
}

struct SledTxn<'a> {
    assets: &'a TransactionalTree,
    categories: &'a TransactionalTree,
    audit: &'a TransactionalTree,
}

impl From<WorkflowError> for TxnError {
    fn from(value: WorkflowError) -> Self {
        TxnError::Rejected(value)
    }
}

impl From<ValidationError> for TxnError {
    fn from(value: ValidationError) -> Self {
        TxnError::Rejected(value.into())
    }
}

impl From<GuardViolation> for TxnError {
    fn from(value: GuardViolation) -> Self {
        TxnError::Rejected(value.into())
    }
}

impl From<StoreError> for TxnError {
    fn from(value: StoreError) -> Self {
        TxnError::Store(value)
    }
}

impl From<minicbor::decode::Error> for TxnError {
    fn from(value: minicbor::decode::Error) -> Self {
        TxnError::Store(value.into())
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for TxnError {
    fn from(value: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        TxnError::Store(value.into())
    }
}

impl From<UnabortableTransactionError> for TxnError {
    fn from(value: UnabortableTransactionError) -> Self {
        match value {
            UnabortableTransactionError::Conflict => TxnError::Conflict,
            UnabortableTransactionError::Storage(e) => TxnError::Store(e.into()),
        }
    }
}

/// Loads an asset or rejects with `NotFound`.
pub fn require_asset(txn: &dyn StoreTxn, id: &str) -> Result<Asset, TxnError> {
    txn.load_asset(id)?
        .ok_or_else(|| WorkflowError::not_found_asset(id).into())
}

pub fn require_category(txn: &dyn StoreTxn, id: &str) -> Result<Category, TxnError> {
    txn.load_category(id)?
        .ok_or_else(|| WorkflowError::not_found_category(id).into())
}

/// Checks the counter invariants, bumps the row version and writes the asset.
pub fn persist_asset(txn: &dyn StoreTxn, asset: &mut Asset, consumable: bool) -> Result<(), TxnError> {
    asset.check_quantities(consumable)?;
    asset.version += 1;
    txn.save_asset(asset)
}

fn head_key(subject_id: &str) -> String {
    format!("head/{subject_id}")
}

fn log_prefix(subject_id: &str) -> String {
    format!("log/{subject_id}/")
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        let assets = instance.open_tree("assets")?;
        let categories = instance.open_tree("categories")?;
        let audit = instance.open_tree("audit")?;

        Ok(Self {
            instance,
            assets,
            categories,
            audit,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::new(Arc::new(db))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }
}

impl AssetStore for SledStore {
    fn transact<T, F>(&self, body: F) -> Result<Outcome<T>, StoreError>
    where
        F: Fn(&dyn StoreTxn) -> Result<T, TxnError>,
    {
        let result = (&self.assets, &self.categories, &self.audit).transaction(
            |(assets, categories, audit)| {
                let txn = SledTxn {
                    assets,
                    categories,
                    audit,
                };
                body(&txn).map_err(|e| match e {
                    TxnError::Conflict => ConflictableTransactionError::Conflict,
                    other => ConflictableTransactionError::Abort(other),
                })
            },
        );

        match result {
            Ok(value) => Ok(Ok(value)),
            Err(TransactionError::Abort(TxnError::Rejected(e))) => Ok(Err(e)),
            Err(TransactionError::Abort(TxnError::Store(e))) => Err(e),
            Err(TransactionError::Abort(TxnError::Conflict)) => Err(StoreError::Conflict),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn scan_assets(&self) -> Result<Vec<Asset>, StoreError> {
        self.assets
            .iter()
            .values()
            .map(|value| -> Result<Asset, StoreError> { Ok(minicbor::decode(&value?)?) })
            .collect()
    }

    fn audit_trail(&self, subject_id: &str) -> Result<Vec<AuditRecord>, StoreError> {
        self.audit
            .scan_prefix(log_prefix(subject_id).as_bytes())
            .values()
            .map(|value| -> Result<AuditRecord, StoreError> { Ok(minicbor::decode(&value?)?) })
            .collect()
    }
}

impl StoreTxn for SledTxn<'_> {
    fn load_asset(&self, id: &str) -> Result<Option<Asset>, TxnError> {
        match self.assets.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_asset(&self, asset: &Asset) -> Result<(), TxnError> {
        self.assets
            .insert(asset.id.as_bytes(), minicbor::to_vec(asset)?)?;
        Ok(())
    }

    fn load_category(&self, id: &str) -> Result<Option<Category>, TxnError> {
        match self.categories.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_category(&self, category: &Category) -> Result<(), TxnError> {
        self.categories
            .insert(category.id.as_bytes(), minicbor::to_vec(category)?)?;
        Ok(())
    }

    fn append_audit(&self, mut record: AuditRecord) -> Result<String, TxnError> {
        let head = head_key(&record.subject_id);
        record.prev_digest = match self.audit.get(head.as_bytes())? {
            Some(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            None => None,
        };

        let cbor = minicbor::to_vec(&record)?;
        let digest = sha256::digest(&cbor);
        // uuid7 is time ordered, so hex keys scan in append order
        let key = format!(
            "{}{}",
            log_prefix(&record.subject_id),
            hex::encode(uuid7().as_bytes())
        );

        self.audit.insert(key.as_bytes(), cbor)?;
        self.audit.insert(head.as_bytes(), digest.as_bytes())?;
        Ok(digest)
    }
}
