pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Recipe previews attached to a subscription profile when `recipes_limit` is absent.
pub const SUBSCRIPTION_RECIPE_PREVIEW: i64 = 3;

pub const MIN_COOKING_TIME: i64 = 1;
pub const MAX_COOKING_TIME: i64 = 400;

pub const MIN_AMOUNT: i64 = 1;
pub const MAX_AMOUNT: i64 = 9999;

pub const MAX_NAME_LENGTH: usize = 200;
pub const MAX_USER_FIELD_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;

pub const IMAGE_DIRECTORY: &str = "recipes/images";

pub const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

pub const SHOPPING_LIST_FORMATS: &[(&str, &str)] = &[
    ("txt", "text/plain; charset=utf-8"),
    ("csv", "text/csv; charset=utf-8"),
];
