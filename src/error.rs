use crate::asset::WorkflowStatus;
use crate::permission::{Action, Role};

/// Tag carried by every business failure.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[n(0)]
    Validation,
    #[n(1)]
    PermissionDenied,
    #[n(2)]
    GuardViolation,
    #[n(3)]
    StateConflict,
    #[n(4)]
    InsufficientQuantity,
    #[n(5)]
    NotFound,
}

/// Expected business outcomes. Returned as values, never propagated with `?`
/// past the engine boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("role {role} is not permitted to {action}")]
    PermissionDenied { role: Role, action: Action },
    #[error(transparent)]
    Guard(#[from] GuardViolation),
    #[error("cannot {action} an asset in state {actual} (requires {expected})")]
    StateConflict {
        action: Action,
        actual: WorkflowStatus,
        expected: WorkflowStatus,
    },
    #[error("insufficient quantity available: available={available}")]
    InsufficientQuantity { requested: u64, available: u64 },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(i64),
    #[error("a rejection reason is required")]
    EmptyReason,
    #[error("asset is not consumable")]
    NotConsumable,
    #[error("{from} -> rejected is not a legal transition")]
    IllegalRejection { from: WorkflowStatus },
    #[error("quantity arithmetic overflowed")]
    QuantityOverflow,
    #[error("quantity invariant violated: quantity={quantity}, available={available}")]
    QuantityInvariant { quantity: u64, available: u64 },
    #[error("non-consumable assets must hold exactly one unit")]
    NonUnitQuantity,
    #[error("category {0} does not generate assets")]
    ExpenseOnlyCategory(String),
    #[error("acquisition cost {cost} is below the capitalization threshold {threshold}")]
    BelowCapitalizationThreshold { cost: u64, threshold: u64 },
    #[error("correction contains no changes")]
    EmptyCorrection,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    #[error("cannot verify an asset you submitted")]
    SelfVerification,
    #[error("cannot authorize an asset you submitted or verified")]
    SelfAuthorization,
    #[error("asset belongs to a project outside your assignment")]
    OutsideProject,
    #[error("only the original maker or an administrator may return an asset to draft")]
    NotMakerOrAdmin,
    #[error("only the asset's owner may edit it at this stage")]
    NotOwner,
    #[error("cannot edit an asset you are part of the approval chain for")]
    ReviewerConflict,
    #[error("corrections may not move an asset to another project")]
    ProjectReassignment,
}

/// Infrastructure failures. The only errors that propagate out of the engine.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to mint identifier: {0}")]
    Identifier(String),
    #[error("unresolved write conflict")]
    Conflict,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            WorkflowError::Guard(_) => ErrorKind::GuardViolation,
            WorkflowError::StateConflict { .. } => ErrorKind::StateConflict,
            WorkflowError::InsufficientQuantity { .. } => ErrorKind::InsufficientQuantity,
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Text safe to show an end user. Identifiers and role names stay in `Display`.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::PermissionDenied { action, .. } => {
                format!("You do not have permission to {action} assets.")
            }
            WorkflowError::NotFound { entity, .. } => format!("The requested {entity} does not exist."),
            WorkflowError::StateConflict {
                action,
                actual,
                expected,
            } => format!(
                "This asset is {} and must be {} before you can {}.",
                actual.label(),
                expected.label(),
                action.as_str().replace('_', " ")
            ),
            other => {
                let mut message = other.to_string();
                if let Some(first) = message.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                message.push('.');
                message
            }
        }
    }

    pub fn not_found_asset(id: &str) -> Self {
        WorkflowError::NotFound {
            entity: "asset",
            id: id.to_string(),
        }
    }

    pub fn not_found_category(id: &str) -> Self {
        WorkflowError::NotFound {
            entity: "category",
            id: id.to_string(),
        }
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for StoreError {
    fn from(value: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        StoreError::Encode(value.to_string())
    }
}
