use crate::{jwt::SessionData, schema::UserRole};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[ActionType::ManageOwnRecipes, ActionType::ManageOwnLists],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnLists,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    /// Create recipes and edit the ones you wrote.
    ManageOwnRecipes,
    /// Favorites, shopping cart and subscriptions.
    ManageOwnLists,

    ManageAllRecipes,
    /// Create tags and ingredients.
    ManageCatalog,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find(|(role, _)| *role == session.role)
            .map(|(_, actions)| actions.contains(&self))
            .unwrap_or(false)
    }
}
