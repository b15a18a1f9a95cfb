use std::{collections::HashSet, str::FromStr};

use serde::Deserialize;

use super::error::{Error, ErrorKind};
use crate::{
    constants::{
        MAX_AMOUNT, MAX_COOKING_TIME, MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, MAX_USER_FIELD_LENGTH,
        MIN_AMOUNT, MIN_COOKING_TIME,
    },
    media::{decode_image, Image},
    schema::Id,
};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

/// Query string pairs in their original order; keys may repeat.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    inner: Vec<(String, String)>,
}

impl QueryParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { inner: pairs }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn get_number<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
    {
        match self.get_str(key) {
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_e| ErrorKind::Validation.field(key, "A valid integer is required.")),
            None => Ok(None),
        }
    }

    /// `1`/`true` and `0`/`false`; absent means `false`.
    pub fn get_flag(&self, key: &str) -> Result<bool, Error> {
        match self.get_str(key) {
            Some("1") | Some("true") | Some("True") => Ok(true),
            Some("0") | Some("false") | Some("False") | None => Ok(false),
            Some(_) => Err(ErrorKind::Validation.field(key, "Must be a valid boolean.")),
        }
    }
}

fn required_text(field: &str, value: &Option<String>, max_length: usize) -> Result<String, Error> {
    let value = value
        .as_deref()
        .ok_or_else(|| ErrorKind::Validation.field(field, REQUIRED))?
        .trim();

    if value.is_empty() {
        return Err(ErrorKind::Validation.field(field, BLANK));
    }
    if value.chars().count() > max_length {
        return Err(ErrorKind::Validation.field(
            field,
            &format!("Ensure this field has no more than {max_length} characters."),
        ));
    }

    Ok(value.to_string())
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i64,
}

/// Recipe payload as sent by the client, for both create and update.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeForm {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<Id>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
}

/// A recipe payload that passed validation. The image is decoded but not stored yet.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<Id>,
    pub image: Option<Image>,
    pub name: String,
    pub text: String,
    pub cooking_time: i64,
}

impl RecipeForm {
    /// Checks every field and decodes the image. `image_required` is set on create.
    pub fn validate(self, image_required: bool) -> Result<RecipeDraft, Error> {
        let ingredients = self.ingredients.unwrap_or_default();
        if ingredients.is_empty() {
            return Err(ErrorKind::Validation.field(
                "ingredients",
                "At least one ingredient is required.",
            ));
        }
        let mut seen = HashSet::new();
        for part in ingredients.iter() {
            if !seen.insert(part.id) {
                return Err(
                    ErrorKind::Validation.field("ingredients", "Ingredients must be unique.")
                );
            }
            if !(MIN_AMOUNT..=MAX_AMOUNT).contains(&part.amount) {
                return Err(ErrorKind::Validation.field(
                    "ingredients",
                    &format!("Amount must be between {MIN_AMOUNT} and {MAX_AMOUNT}."),
                ));
            }
        }

        let tags = self.tags.unwrap_or_default();
        if tags.is_empty() {
            return Err(ErrorKind::Validation.field("tags", "At least one tag is required."));
        }
        if tags.iter().collect::<HashSet<_>>().len() < tags.len() {
            return Err(ErrorKind::Validation.field("tags", "Tags must be unique."));
        }

        let cooking_time = self
            .cooking_time
            .ok_or_else(|| ErrorKind::Validation.field("cooking_time", REQUIRED))?;
        if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&cooking_time) {
            return Err(ErrorKind::Validation.field(
                "cooking_time",
                &format!("Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME}."),
            ));
        }

        let name = required_text("name", &self.name, MAX_NAME_LENGTH)?;
        let text = required_text("text", &self.text, usize::MAX)?;

        let image = match self.image.as_deref().map(str::trim) {
            Some(data) if !data.is_empty() => Some(decode_image(data)?),
            _ if image_required => {
                return Err(ErrorKind::Validation.field("image", "An image is required."))
            }
            _ => None,
        };

        Ok(RecipeDraft {
            ingredients,
            tags,
            image,
            name,
            text,
            cooking_time,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegisterForm {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<NewUser, Error> {
        let email = required_text("email", &self.email, MAX_EMAIL_LENGTH)?;
        if !is_email(&email) {
            return Err(ErrorKind::Validation.field("email", "Enter a valid email address."));
        }

        let username = required_text("username", &self.username, MAX_USER_FIELD_LENGTH)?;
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || "_.@+-".contains(c))
        {
            return Err(ErrorKind::Validation.field(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            ));
        }

        let first_name = required_text("first_name", &self.first_name, MAX_USER_FIELD_LENGTH)?;
        let last_name = required_text("last_name", &self.last_name, MAX_USER_FIELD_LENGTH)?;

        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ErrorKind::Validation.field("password", REQUIRED))?;

        Ok(NewUser {
            email: email.to_lowercase(),
            username,
            first_name,
            last_name,
            password,
        })
    }
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SetPasswordForm {
    pub new_password: Option<String>,
    pub current_password: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TagForm {
    pub name: Option<String>,
    pub color: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl TagForm {
    pub fn validate(self) -> Result<NewTag, Error> {
        let name = required_text("name", &self.name, MAX_NAME_LENGTH)?;

        let color = required_text("color", &self.color, 7)?;
        let digits = color.strip_prefix('#').unwrap_or("");
        if !(digits.len() == 3 || digits.len() == 6)
            || !digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(ErrorKind::Validation.field(
                "color",
                "Enter a HEX colour code, for example #49B64E.",
            ));
        }

        let slug = required_text("slug", &self.slug, MAX_NAME_LENGTH)?;
        if !slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ErrorKind::Validation.field(
                "slug",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
            ));
        }

        Ok(NewTag {
            name,
            color: color.to_uppercase(),
            slug,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IngredientForm {
    pub name: Option<String>,
    pub measurement_unit: Option<String>,
}

impl IngredientForm {
    pub fn validate(self) -> Result<(String, String), Error> {
        let name = required_text("name", &self.name, MAX_NAME_LENGTH)?;
        let unit = required_text("measurement_unit", &self.measurement_unit, MAX_NAME_LENGTH)?;

        Ok((name, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    fn recipe_form() -> RecipeForm {
        RecipeForm {
            ingredients: Some(vec![
                IngredientAmount { id: 1, amount: 10 },
                IngredientAmount { id: 2, amount: 20 },
            ]),
            tags: Some(vec![1, 2]),
            image: Some(PIXEL.to_string()),
            name: Some(String::from("Pancakes")),
            text: Some(String::from("Whisk and fry.")),
            cooking_time: Some(20),
        }
    }

    fn field_of(error: Error) -> String {
        assert_eq!(error.kind, ErrorKind::Validation);
        error.field.unwrap()
    }

    #[test]
    fn accepts_a_complete_recipe() {
        let draft = recipe_form().validate(true).unwrap();

        assert_eq!(draft.ingredients.len(), 2);
        assert_eq!(draft.tags, vec![1, 2]);
        assert_eq!(draft.image.unwrap().extension, "png");
        assert_eq!(draft.name, "Pancakes");
    }

    #[test]
    fn rejects_empty_and_duplicate_ingredients() {
        let mut form = recipe_form();
        form.ingredients = Some(vec![]);
        assert_eq!(field_of(form.validate(true).unwrap_err()), "ingredients");

        let mut form = recipe_form();
        form.ingredients = None;
        assert_eq!(field_of(form.validate(true).unwrap_err()), "ingredients");

        let mut form = recipe_form();
        form.ingredients = Some(vec![
            IngredientAmount { id: 1, amount: 10 },
            IngredientAmount { id: 1, amount: 5 },
        ]);
        assert_eq!(field_of(form.validate(true).unwrap_err()), "ingredients");
    }

    #[test]
    fn rejects_amounts_out_of_bounds() {
        for amount in [0, MAX_AMOUNT + 1] {
            let mut form = recipe_form();
            form.ingredients = Some(vec![IngredientAmount { id: 1, amount }]);
            assert_eq!(field_of(form.validate(true).unwrap_err()), "ingredients");
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_tags() {
        let mut form = recipe_form();
        form.tags = Some(vec![]);
        assert_eq!(field_of(form.validate(true).unwrap_err()), "tags");

        let mut form = recipe_form();
        form.tags = Some(vec![3, 3]);
        assert_eq!(field_of(form.validate(true).unwrap_err()), "tags");
    }

    #[test]
    fn cooking_time_is_bounded() {
        for cooking_time in [0, MAX_COOKING_TIME + 1] {
            let mut form = recipe_form();
            form.cooking_time = Some(cooking_time);
            assert_eq!(field_of(form.validate(true).unwrap_err()), "cooking_time");
        }

        let mut form = recipe_form();
        form.cooking_time = Some(MAX_COOKING_TIME);
        assert!(form.validate(true).is_ok());
    }

    #[test]
    fn image_is_only_required_on_create() {
        let mut form = recipe_form();
        form.image = None;
        assert_eq!(field_of(form.clone().validate(true).unwrap_err()), "image");

        let draft = form.validate(false).unwrap();
        assert!(draft.image.is_none());
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut form = recipe_form();
        form.name = Some(String::from("   "));
        assert_eq!(field_of(form.validate(true).unwrap_err()), "name");
    }

    #[test]
    fn register_form_checks_fields() {
        let form = RegisterForm {
            email: Some(String::from("Cook@Example.com")),
            username: Some(String::from("cook.42")),
            first_name: Some(String::from("Ann")),
            last_name: Some(String::from("Lee")),
            password: Some(String::from("secret")),
        };
        let user = form.clone().validate().unwrap();
        assert_eq!(user.email, "cook@example.com");

        let mut bad = form.clone();
        bad.email = Some(String::from("not-an-email"));
        assert_eq!(field_of(bad.validate().unwrap_err()), "email");

        let mut bad = form.clone();
        bad.username = Some(String::from("has space"));
        assert_eq!(field_of(bad.validate().unwrap_err()), "username");

        let mut bad = form;
        bad.password = None;
        assert_eq!(field_of(bad.validate().unwrap_err()), "password");
    }

    #[test]
    fn tag_form_checks_color_and_slug() {
        let form = TagForm {
            name: Some(String::from("Breakfast")),
            color: Some(String::from("#e26c2d")),
            slug: Some(String::from("breakfast")),
        };
        assert_eq!(form.clone().validate().unwrap().color, "#E26C2D");

        let mut bad = form.clone();
        bad.color = Some(String::from("red"));
        assert_eq!(field_of(bad.validate().unwrap_err()), "color");

        let mut bad = form;
        bad.slug = Some(String::from("early breakfast"));
        assert_eq!(field_of(bad.validate().unwrap_err()), "slug");
    }

    #[test]
    fn query_params_keep_repeated_keys() {
        let params = QueryParams::from_pairs(vec![
            (String::from("tags"), String::from("lunch")),
            (String::from("page"), String::from("2")),
            (String::from("tags"), String::from("dinner")),
            (String::from("is_favorited"), String::from("1")),
        ]);

        assert_eq!(params.get_all("tags"), vec!["lunch", "dinner"]);
        assert_eq!(params.get_number::<i64>("page").unwrap(), Some(2));
        assert_eq!(params.get_number::<i64>("limit").unwrap(), None);
        assert!(params.get_flag("is_favorited").unwrap());
        assert!(!params.get_flag("is_in_shopping_cart").unwrap());
    }

    #[test]
    fn query_params_reject_garbage_numbers() {
        let params =
            QueryParams::from_pairs(vec![(String::from("page"), String::from("two"))]);

        assert_eq!(
            field_of(params.get_number::<i64>("page").unwrap_err()),
            "page"
        );
    }
}
