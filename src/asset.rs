//! Core asset and category records
use super::error::ValidationError;
use super::permission::Actor;
use super::utils::is_blank;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingVerification,
    #[n(2)]
    PendingAuthorization,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
}

/// Physical condition, independent of the approval workflow.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    #[n(0)]
    Available,
    #[n(1)]
    InUse,
    #[n(2)]
    UnderMaintenance,
    #[n(3)]
    Retired,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventorySource {
    #[n(0)]
    Legacy,
    #[n(1)]
    Manual,
    #[n(2)]
    Procurement,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    #[n(0)]
    Capital,
    #[n(1)]
    Inventory,
    #[n(2)]
    Expense,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Category {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub is_consumable: bool,
    #[n(3)]
    pub asset_type: AssetType,
    #[n(4)]
    pub generates_assets: bool,
    #[n(5)]
    pub capitalization_threshold: Option<u64>, // minor currency units
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub category_id: String,
    #[n(3)]
    pub project_id: Option<String>,
    #[n(4)]
    pub model: Option<String>,
    #[n(5)]
    pub specifications: Option<String>,
    #[n(6)]
    pub unit: Option<String>,
    #[n(7)]
    pub acquired_date: Option<TimeStamp<Utc>>,
    #[n(8)]
    pub acquisition_cost: Option<u64>,
    #[n(9)]
    pub status: AssetStatus,
    #[n(10)]
    pub inventory_source: InventorySource,
    #[n(11)]
    pub quantity: u64,
    #[n(12)]
    pub available_quantity: u64,
    #[n(13)]
    pub pending_quantity_addition: u64,
    #[n(14)]
    pub workflow_status: WorkflowStatus,
    #[n(15)]
    pub made_by: Option<String>,
    #[n(16)]
    pub verified_by: Option<String>,
    #[n(17)]
    pub authorized_by: Option<String>,
    #[n(18)]
    pub rejected_by: Option<String>,
    #[n(19)]
    pub verification_date: Option<TimeStamp<Utc>>,
    #[n(20)]
    pub authorization_date: Option<TimeStamp<Utc>>,
    #[n(21)]
    pub rejection_date: Option<TimeStamp<Utc>>,
    #[n(22)]
    pub rejection_reason: Option<String>,
    #[n(23)]
    pub verification_notes: Option<String>,
    #[n(24)]
    pub authorization_notes: Option<String>,
    #[n(25)]
    pub created_by: String,
    #[n(26)]
    pub created_at: TimeStamp<Utc>,
    #[n(27)]
    pub version: u64, // bumped on every committed write
}

// Also used for registration drafts
#[derive(Debug, Default, Clone)]
pub struct NewAsset {
    name: String,
    category_id: String,
    project_id: Option<String>,
    model: Option<String>,
    specifications: Option<String>,
    unit: Option<String>,
    acquired_date: Option<TimeStamp<Utc>>,
    acquisition_cost: Option<u64>,
    quantity: Option<u64>,
    source: Option<InventorySource>,
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::PendingVerification => "pending_verification",
            WorkflowStatus::PendingAuthorization => "pending_authorization",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Rejected => "rejected",
        }
    }
    /// Human wording for user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "a draft",
            WorkflowStatus::PendingVerification => "awaiting verification",
            WorkflowStatus::PendingAuthorization => "awaiting authorization",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_consumable: false,
            asset_type,
            generates_assets: asset_type != AssetType::Expense,
            capitalization_threshold: None,
        }
    }
    pub fn consumable(mut self) -> Self {
        self.is_consumable = true;
        self
    }
    pub fn set_generates_assets(mut self, generates: bool) -> Self {
        self.generates_assets = generates;
        self
    }
    pub fn set_capitalization_threshold(mut self, threshold: u64) -> Self {
        self.capitalization_threshold = Some(threshold);
        self
    }
}

impl Asset {
    /// Fields `submit` insists on, by name, in display order.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if is_blank(&self.name) {
            missing.push("name");
        }
        if is_blank(&self.category_id) {
            missing.push("category");
        }
        if self.project_id.as_deref().is_none_or(is_blank) {
            missing.push("project");
        }
        if self.acquired_date.is_none() {
            missing.push("acquired date");
        }
        missing
    }

    /// Checks the counter invariants for an asset whose category consumability is known.
    pub fn check_quantities(&self, consumable: bool) -> Result<(), ValidationError> {
        if self.available_quantity > self.quantity {
            return Err(ValidationError::QuantityInvariant {
                quantity: self.quantity,
                available: self.available_quantity,
            });
        }
        if !consumable
            && (self.quantity != 1
                || self.available_quantity != 1
                || self.pending_quantity_addition != 0)
        {
            return Err(ValidationError::NonUnitQuantity);
        }
        Ok(())
    }

    /// Stock counts as usable once the asset has passed authorization at least once,
    /// including while a later restock is under review.
    pub fn has_been_approved(&self) -> bool {
        self.workflow_status == WorkflowStatus::Approved || self.authorization_date.is_some()
    }

    pub fn is_chain_member(&self, actor_id: &str) -> bool {
        self.made_by.as_deref() == Some(actor_id) || self.verified_by.as_deref() == Some(actor_id)
    }

    /// Maker of the current cycle, falling back to whoever registered the draft.
    pub fn owner(&self) -> &str {
        self.made_by.as_deref().unwrap_or(&self.created_by)
    }

    pub(crate) fn clear_verification(&mut self) {
        self.verified_by = None;
        self.verification_date = None;
        self.verification_notes = None;
    }

    pub(crate) fn clear_rejection(&mut self) {
        self.rejected_by = None;
        self.rejection_date = None;
        self.rejection_reason = None;
    }
}

impl NewAsset {
    /// Construct a new builder object, this becomes the basis for a registration
    pub fn new(name: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category_id: category_id.into(),
            ..Self::default()
        }
    }
    pub fn set_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
    pub fn set_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
    pub fn set_specifications(mut self, specifications: impl Into<String>) -> Self {
        self.specifications = Some(specifications.into());
        self
    }
    pub fn set_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
    pub fn set_acquired_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.acquired_date = Some(date);
        self
    }
    pub fn set_acquisition_cost(mut self, cost: u64) -> Self {
        self.acquisition_cost = Some(cost);
        self
    }
    pub fn set_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }
    pub fn set_source(mut self, source: InventorySource) -> Self {
        self.source = Some(source);
        self
    }
    pub fn category_id(&self) -> &str {
        &self.category_id
    }
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Checks the draft against its category and produces the stored record.
    /// Legacy items start as drafts; every other source is auto-approved.
    pub fn validate_and_finalise(
        self,
        id: String,
        category: &Category,
        creator: &Actor,
    ) -> Result<Asset, ValidationError> {
        if is_blank(&self.name) {
            return Err(ValidationError::MissingFields(vec!["name"]));
        }
        if category.asset_type == AssetType::Expense || !category.generates_assets {
            return Err(ValidationError::ExpenseOnlyCategory(category.name.clone()));
        }
        if let (false, Some(threshold), Some(cost)) = (
            category.is_consumable,
            category.capitalization_threshold,
            self.acquisition_cost,
        ) {
            if cost < threshold {
                return Err(ValidationError::BelowCapitalizationThreshold { cost, threshold });
            }
        }

        let quantity = match (category.is_consumable, self.quantity) {
            (true, Some(0)) => return Err(ValidationError::NonPositiveQuantity(0)),
            (true, Some(q)) => q,
            (false, None | Some(1)) | (true, None) => 1,
            (false, Some(_)) => return Err(ValidationError::NonUnitQuantity),
        };

        let source = self.source.unwrap_or(InventorySource::Manual);
        let (workflow_status, made_by, approved_at) = match source {
            InventorySource::Legacy => (WorkflowStatus::Draft, None, None),
            _ => (
                WorkflowStatus::Approved,
                Some(creator.id.clone()),
                Some(TimeStamp::new()),
            ),
        };

        Ok(Asset {
            id,
            name: self.name.trim().to_string(),
            category_id: self.category_id,
            project_id: self.project_id,
            model: self.model,
            specifications: self.specifications,
            unit: self.unit,
            acquired_date: self.acquired_date,
            acquisition_cost: self.acquisition_cost,
            status: AssetStatus::Available,
            inventory_source: source,
            quantity,
            available_quantity: quantity,
            pending_quantity_addition: 0,
            workflow_status,
            made_by,
            verified_by: None,
            authorized_by: None,
            rejected_by: None,
            verification_date: None,
            authorization_date: approved_at,
            rejection_date: None,
            rejection_reason: None,
            verification_notes: None,
            authorization_notes: None,
            created_by: creator.id.clone(),
            created_at: TimeStamp::new(),
            version: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Role;

    fn consumables() -> Category {
        Category::new("cat_1", "Cement", AssetType::Inventory).consumable()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::new_with(2024, 3, 1, 8, 0, 0).unwrap();
        let later = TimeStamp::new_with(2024, 3, 1, 8, 0, 1).unwrap();

        assert!(earlier < later);
        assert_eq!(earlier.cmp(&earlier.clone()), std::cmp::Ordering::Equal);
        assert_eq!(vec![later.clone(), earlier.clone()].into_iter().min(), Some(earlier));
    }

    #[test]
    fn legacy_assets_start_as_drafts() {
        let clerk = Actor::new("user_clerk", Role::Warehouseman);
        let asset = NewAsset::new("Portland cement", "cat_1")
            .set_quantity(40)
            .set_source(InventorySource::Legacy)
            .validate_and_finalise("asset_1".into(), &consumables(), &clerk)
            .unwrap();

        assert_eq!(asset.workflow_status, WorkflowStatus::Draft);
        assert_eq!(asset.made_by, None);
        assert_eq!(asset.quantity, 40);
        assert_eq!(asset.available_quantity, 40);
    }

    #[test]
    fn non_consumables_hold_one_unit() {
        let tools = Category::new("cat_2", "Power tools", AssetType::Capital);
        let clerk = Actor::new("user_clerk", Role::Warehouseman);

        let err = NewAsset::new("Rotary hammer", "cat_2")
            .set_quantity(3)
            .validate_and_finalise("asset_2".into(), &tools, &clerk)
            .unwrap_err();
        assert_eq!(err, ValidationError::NonUnitQuantity);

        let asset = NewAsset::new("Rotary hammer", "cat_2")
            .validate_and_finalise("asset_2".into(), &tools, &clerk)
            .unwrap();
        assert!(asset.check_quantities(false).is_ok());
    }

    #[test]
    fn expense_categories_are_refused() {
        let expenses = Category::new("cat_3", "Office supplies", AssetType::Expense);
        let clerk = Actor::new("user_clerk", Role::Warehouseman);

        let err = NewAsset::new("Stapler", "cat_3")
            .validate_and_finalise("asset_3".into(), &expenses, &clerk)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ExpenseOnlyCategory(_)));
    }

    #[test]
    fn missing_fields_reported_together() {
        let clerk = Actor::new("user_clerk", Role::Warehouseman);
        let asset = NewAsset::new("Scaffold clamp", "cat_1")
            .validate_and_finalise("asset_4".into(), &consumables(), &clerk)
            .unwrap();

        assert_eq!(asset.missing_required_fields(), vec!["project", "acquired date"]);
    }
}
