use serde::{Deserialize, Serialize};

pub type Id = i64;

#[derive(
    Clone, Copy, Debug, PartialEq, PartialOrd, sqlx::Type, Serialize, Eq, Ord, Hash, Deserialize,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl TryFrom<&str> for UserRole {
    type Error = crate::error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(crate::error::ErrorKind::Validation.field("role", "Invalid variant")),
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub role: UserRole,
}

/// Public part of a user, as returned on registration.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct UserInfo {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UserProfileRow {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,

    pub count: i64,
}

impl From<UserProfileRow> for UserProfile {
    fn from(row: UserProfileRow) -> Self {
        Self {
            email: row.email,
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_subscribed: row.is_subscribed,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedRecipeTag {
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl From<LinkedRecipeTag> for Tag {
    fn from(row: LinkedRecipeTag) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color: row.color,
            slug: row.slug,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

/// An ingredient as it appears inside a recipe: the catalog entry plus its amount.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct RecipeIngredient {
    #[serde(skip)]
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipeRow {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i64,

    pub author_id: Id,
    pub author_email: String,
    pub author_username: String,
    pub author_first_name: String,
    pub author_last_name: String,
    pub author_is_subscribed: bool,

    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,

    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recipe {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i64,
}

impl Recipe {
    pub fn from_row(
        row: RecipeRow,
        tags: Vec<Tag>,
        ingredients: Vec<RecipeIngredient>,
        image_url: String,
    ) -> Self {
        Self {
            id: row.id,
            tags,
            author: UserProfile {
                email: row.author_email,
                id: row.author_id,
                username: row.author_username,
                first_name: row.author_first_name,
                last_name: row.author_last_name,
                is_subscribed: row.author_is_subscribed,
            },
            ingredients,
            is_favorited: row.is_favorited,
            is_in_shopping_cart: row.is_in_shopping_cart,
            name: row.name,
            image: image_url,
            text: row.text,
            cooking_time: row.cooking_time,
        }
    }
}

/// Ownership data needed to authorize writes on a recipe.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipeOwner {
    pub id: Id,
    pub author_id: Id,
    pub image: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ShortRecipeRow {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i64,
    pub author_id: Id,
}

impl ShortRecipeRow {
    pub fn into_short(self, image_url: String) -> ShortRecipe {
        ShortRecipe {
            id: self.id,
            name: self.name,
            image: image_url,
            cooking_time: self.cooking_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShortRecipe {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i64,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SubscriptionRow {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes_count: i64,

    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionProfile {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<ShortRecipe>,
    pub recipes_count: i64,
}

impl SubscriptionProfile {
    pub fn from_row(row: SubscriptionRow, recipes: Vec<ShortRecipe>) -> Self {
        Self {
            email: row.email,
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_subscribed: row.is_subscribed,
            recipes,
            recipes_count: row.recipes_count,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}
