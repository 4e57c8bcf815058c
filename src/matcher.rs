//! Duplicate detection for reported consumable stock
use super::asset::{Asset, AssetStatus, WorkflowStatus};
use super::config::MatcherConfig;
use super::error::StoreError;
use super::store::AssetStore;
use super::utils::{is_blank, normalise};
use tracing::{debug, warn};

/// A consumable someone reports on site, before we know whether it is new stock
/// of an item we already track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedConsumable {
    pub name: String,
    pub category_id: String,
    pub project_id: String,
    pub model: Option<String>,
    pub specifications: Option<String>,
    pub unit: Option<String>,
    pub quantity: i64,
}

/// How the duplicate search went, kept in the intake result for auditing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    Matched { asset_id: String },
    NoMatch,
    /// The search itself failed; intake carried on and created a new record.
    Failed { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateMatcher {
    config: MatcherConfig,
}

impl ProposedConsumable {
    pub fn new(
        name: impl Into<String>,
        category_id: impl Into<String>,
        project_id: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            name: name.into(),
            category_id: category_id.into(),
            project_id: project_id.into(),
            model: None,
            specifications: None,
            unit: None,
            quantity,
        }
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
}

impl DuplicateMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Whether `candidate` may absorb new stock at all: same project and
    /// category, physically available, and either approved or already awaiting
    /// verification of an earlier restock. A first submission awaiting
    /// verification is not a restock and stays out.
    pub fn is_candidate(&self, candidate: &Asset, proposal: &ProposedConsumable) -> bool {
        let open_to_stock = match candidate.workflow_status {
            WorkflowStatus::Approved => true,
            WorkflowStatus::PendingVerification => candidate.authorization_date.is_some(),
            _ => false,
        };
        open_to_stock
            && candidate.category_id == proposal.category_id
            && candidate.project_id.as_deref() == Some(proposal.project_id.as_str())
            && candidate.status == AssetStatus::Available
    }

    /// Partial name match plus the optional model and specification checks.
    pub fn is_match(&self, candidate: &Asset, proposal: &ProposedConsumable) -> bool {
        if !self.is_candidate(candidate, proposal) {
            return false;
        }

        let existing = normalise(&candidate.name);
        let proposed = normalise(&proposal.name);
        if proposed.is_empty() {
            return false;
        }
        let names_match = if existing == proposed {
            true
        } else if existing.len().min(proposed.len()) < self.config.min_name_len {
            false
        } else {
            existing.contains(&proposed) || proposed.contains(&existing)
        };
        if !names_match {
            return false;
        }

        if self.config.match_model {
            if let Some(model) = proposal.model.as_deref().filter(|m| !is_blank(m)) {
                match candidate.model.as_deref() {
                    Some(existing) if normalise(existing) == normalise(model) => {}
                    _ => return false,
                }
            }
        }

        if self.config.match_specifications {
            if let Some(specs) = proposal.specifications.as_deref().filter(|s| !is_blank(s)) {
                let wanted = normalise(specs);
                match candidate.specifications.as_deref() {
                    Some(existing) if normalise(existing).contains(&wanted) => {}
                    _ => return false,
                }
            }
        }

        true
    }

    /// Best match among `assets`: exact name first, then the oldest record.
    pub fn best_match<'a>(
        &self,
        assets: &'a [Asset],
        proposal: &ProposedConsumable,
    ) -> Option<&'a Asset> {
        let proposed = normalise(&proposal.name);
        assets
            .iter()
            .filter(|asset| self.is_match(asset, proposal))
            .min_by(|a, b| {
                let exact_a = normalise(&a.name) == proposed;
                let exact_b = normalise(&b.name) == proposed;
                exact_b
                    .cmp(&exact_a)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// Searches the store. Errors are returned to the caller, who decides
    /// whether to fail open.
    pub fn find_match<S: AssetStore>(
        &self,
        store: &S,
        proposal: &ProposedConsumable,
    ) -> Result<Option<Asset>, StoreError> {
        let assets = store.scan_assets()?;
        let found = self.best_match(&assets, proposal).cloned();
        debug!(
            name = %proposal.name,
            project = %proposal.project_id,
            matched = found.as_ref().map(|a| a.id.as_str()),
            "duplicate search finished"
        );
        Ok(found)
    }

    /// [`find_match`](Self::find_match) with the fail-open policy applied: a
    /// storage error is logged and reported as [`DuplicateCheck::Failed`],
    /// never as a blocked intake.
    pub fn check<S: AssetStore>(
        &self,
        store: &S,
        proposal: &ProposedConsumable,
    ) -> (DuplicateCheck, Option<Asset>) {
        match self.find_match(store, proposal) {
            Ok(Some(asset)) => (
                DuplicateCheck::Matched {
                    asset_id: asset.id.clone(),
                },
                Some(asset),
            ),
            Ok(None) => (DuplicateCheck::NoMatch, None),
            Err(e) => {
                warn!(
                    name = %proposal.name,
                    project = %proposal.project_id,
                    error = %e,
                    "duplicate check failed, creating a new record instead"
                );
                (
                    DuplicateCheck::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetType, Category, NewAsset, TimeStamp};
    use crate::permission::{Actor, Role};

    fn approved(id: &str, name: &str) -> Asset {
        let category = Category::new("cat_c", "Cement", AssetType::Inventory).consumable();
        NewAsset::new(name, "cat_c")
            .set_project("proj_n")
            .set_model("Type I")
            .set_specifications("40kg bag, grade 42.5")
            .set_quantity(10)
            .validate_and_finalise(
                id.into(),
                &category,
                &Actor::new("user_a", Role::ProcurementOfficer),
            )
            .unwrap()
    }

    #[test]
    fn partial_names_match_case_insensitively() {
        let matcher = DuplicateMatcher::default();
        let existing = approved("asset_1", "Portland Cement");

        let proposal = ProposedConsumable::new("portland cement 40kg", "cat_c", "proj_n", 5);
        assert!(matcher.is_match(&existing, &proposal));

        let elsewhere = ProposedConsumable::new("Portland Cement", "cat_c", "proj_s", 5);
        assert!(!matcher.is_match(&existing, &elsewhere));
    }

    #[test]
    fn short_names_need_exact_match() {
        let matcher = DuplicateMatcher::default();
        let existing = approved("asset_1", "Portland Cement");
        let proposal = ProposedConsumable::new("ce", "cat_c", "proj_n", 5);
        assert!(!matcher.is_match(&existing, &proposal));
    }

    #[test]
    fn model_and_specifications_narrow_the_match() {
        let matcher = DuplicateMatcher::default();
        let existing = approved("asset_1", "Portland Cement");

        let other_model =
            ProposedConsumable::new("Portland Cement", "cat_c", "proj_n", 5).set_model("Type III");
        assert!(!matcher.is_match(&existing, &other_model));

        let same_specs = ProposedConsumable::new("Portland Cement", "cat_c", "proj_n", 5)
            .set_model("type i")
            .set_specifications("Grade 42.5");
        assert!(matcher.is_match(&existing, &same_specs));

        let loose = DuplicateMatcher::new(MatcherConfig {
            match_model: false,
            ..MatcherConfig::default()
        });
        assert!(loose.is_match(&existing, &other_model));
    }

    #[test]
    fn exact_name_preferred_over_older_partial() {
        let matcher = DuplicateMatcher::default();
        let older = approved("asset_1", "Portland Cement Premium");
        let exact = approved("asset_2", "Portland Cement");
        let assets = vec![older, exact];

        let proposal = ProposedConsumable::new("Portland Cement", "cat_c", "proj_n", 5);
        let found = matcher.best_match(&assets, &proposal).unwrap();
        assert_eq!(found.id, "asset_2");
    }

    #[test]
    fn items_under_authorization_are_not_candidates() {
        let matcher = DuplicateMatcher::default();
        let mut existing = approved("asset_1", "Portland Cement");
        existing.workflow_status = WorkflowStatus::PendingAuthorization;

        let proposal = ProposedConsumable::new("Portland Cement", "cat_c", "proj_n", 5);
        assert!(!matcher.is_match(&existing, &proposal));
    }

    #[test]
    fn first_submissions_are_not_candidates() {
        let matcher = DuplicateMatcher::default();
        let mut submitted = approved("asset_1", "Portland Cement");
        submitted.workflow_status = WorkflowStatus::PendingVerification;
        submitted.authorization_date = None;

        let proposal = ProposedConsumable::new("Portland Cement", "cat_c", "proj_n", 5);
        assert!(!matcher.is_candidate(&submitted, &proposal));

        // an approved record re-entering review for a restock still absorbs stock
        submitted.authorization_date = Some(TimeStamp::new());
        assert!(matcher.is_candidate(&submitted, &proposal));
    }

    #[test]
    fn oldest_record_wins_among_equal_names() {
        let matcher = DuplicateMatcher::default();
        let mut newer = approved("asset_a", "Portland Cement");
        newer.created_at = TimeStamp::new_with(2024, 6, 2, 9, 0, 0).unwrap();
        let mut older = approved("asset_b", "Portland Cement");
        older.created_at = TimeStamp::new_with(2024, 6, 1, 9, 0, 0).unwrap();

        let proposal = ProposedConsumable::new("Portland Cement", "cat_c", "proj_n", 5);
        let assets = [newer, older];
        let found = matcher.best_match(&assets, &proposal).unwrap();
        assert_eq!(found.id, "asset_b");
    }
}
