//! Role based permission table for workflow and ledger actions
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    SystemAdmin,
    #[n(1)]
    AssetDirector,
    #[n(2)]
    FinanceDirector,
    #[n(3)]
    ProcurementOfficer,
    #[n(4)]
    ProjectManager,
    #[n(5)]
    Warehouseman,
    #[n(6)]
    SiteInventoryClerk,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    #[n(0)]
    Submit,
    #[n(1)]
    Verify,
    #[n(2)]
    Authorize,
    #[n(3)]
    Reject,
    #[n(4)]
    ReturnToDraft,
    #[n(5)]
    Register,
    #[n(6)]
    ReportStock,
    #[n(7)]
    Consume,
    #[n(8)]
    Restore,
    #[n(9)]
    AdjustStock,
    #[n(10)]
    ManageCategories,
    #[n(11)]
    Edit,
}

/// The identity a caller acts under. Always supplied per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    // home project for project-scoped roles
    pub project_id: Option<String>,
}

/// Stateless lookup over the static role table.
pub struct PermissionGuard;

impl Role {
    pub const ALL: [Role; 7] = [
        Role::SystemAdmin,
        Role::AssetDirector,
        Role::FinanceDirector,
        Role::ProcurementOfficer,
        Role::ProjectManager,
        Role::Warehouseman,
        Role::SiteInventoryClerk,
    ];

    /// Roles that may override ownership rules (return-to-draft, approved edits).
    pub fn is_admin_tier(self) -> bool {
        matches!(self, Role::SystemAdmin | Role::AssetDirector)
    }

    /// Roles whose reach is limited to the actor's own project.
    pub fn is_project_scoped(self) -> bool {
        matches!(
            self,
            Role::ProjectManager | Role::Warehouseman | Role::SiteInventoryClerk
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SystemAdmin => "system_admin",
            Role::AssetDirector => "asset_director",
            Role::FinanceDirector => "finance_director",
            Role::ProcurementOfficer => "procurement_officer",
            Role::ProjectManager => "project_manager",
            Role::Warehouseman => "warehouseman",
            Role::SiteInventoryClerk => "site_inventory_clerk",
        }
    }
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Submit => "submit",
            Action::Verify => "verify",
            Action::Authorize => "authorize",
            Action::Reject => "reject",
            Action::ReturnToDraft => "return_to_draft",
            Action::Register => "register",
            Action::ReportStock => "report_stock",
            Action::Consume => "consume",
            Action::Restore => "restore",
            Action::AdjustStock => "adjust_stock",
            Action::ManageCategories => "manage_categories",
            Action::Edit => "edit",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            project_id: None,
        }
    }
    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
    /// Project scope check. Roles outside the project-scoped set reach every project.
    pub fn can_reach(&self, asset_project: Option<&str>) -> bool {
        if !self.role.is_project_scoped() {
            return true;
        }
        match (self.project_id.as_deref(), asset_project) {
            (Some(home), Some(target)) => home == target,
            _ => false,
        }
    }
}

impl PermissionGuard {
    /// Total over `Action x Role`. Denial is an answer, not an error.
    pub fn is_allowed(action: Action, role: Role) -> bool {
        use Role::*;

        match action {
            Action::Submit | Action::Register | Action::ReportStock => matches!(
                role,
                SystemAdmin | AssetDirector | ProcurementOfficer | Warehouseman | SiteInventoryClerk
            ),
            Action::Verify => matches!(role, SystemAdmin | AssetDirector | ProjectManager),
            Action::Authorize => matches!(role, SystemAdmin | AssetDirector | FinanceDirector),
            Action::Reject => matches!(
                role,
                SystemAdmin | AssetDirector | ProjectManager | FinanceDirector
            ),
            Action::Consume | Action::Restore => matches!(
                role,
                SystemAdmin | AssetDirector | ProjectManager | Warehouseman | SiteInventoryClerk
            ),
            Action::AdjustStock | Action::ManageCategories => role.is_admin_tier(),
            // ownership decides, see edit.rs and workflow::return_to_draft
            Action::ReturnToDraft | Action::Edit => true,
        }
    }

    /// Every role granted `action`, in table order.
    pub fn roles_for(action: Action) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| Self::is_allowed(action, *role))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_chain_roles_are_disjoint_below_admin_tier() {
        for role in Role::ALL.into_iter().filter(|r| !r.is_admin_tier()) {
            let steps = [Action::Submit, Action::Verify, Action::Authorize]
                .into_iter()
                .filter(|a| PermissionGuard::is_allowed(*a, role))
                .count();
            assert!(steps <= 1, "{role} holds more than one approval step");
        }
    }

    #[test]
    fn stock_adjustment_is_admin_only() {
        assert_eq!(
            PermissionGuard::roles_for(Action::AdjustStock),
            vec![Role::SystemAdmin, Role::AssetDirector]
        );
    }

    #[test]
    fn project_scope() {
        let clerk = Actor::new("user_a", Role::SiteInventoryClerk).in_project("proj_north");
        assert!(clerk.can_reach(Some("proj_north")));
        assert!(!clerk.can_reach(Some("proj_south")));
        assert!(!clerk.can_reach(None));

        let director = Actor::new("user_b", Role::FinanceDirector);
        assert!(director.can_reach(Some("proj_south")));
    }
}
