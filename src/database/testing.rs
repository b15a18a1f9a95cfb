use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::{
    actions::users::register_user,
    form::RegisterForm,
    jwt::SessionData,
    pool::{connect, migrate},
    schema::{Id, UserRole},
};

/// A private in-memory database. One connection, kept alive for the pool's lifetime.
pub async fn memory_pool() -> Pool<Sqlite> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();

    migrate(&pool).await.unwrap();
    pool
}

/// A fresh database file shared by several connections, for tests that race requests.
pub async fn file_pool(name: &str) -> Pool<Sqlite> {
    let path = std::env::temp_dir().join(format!(
        "foodgram-{name}-{}.sqlite3",
        std::process::id()
    ));
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }

    connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap()
}

pub async fn create_user(username: &str, pool: &Pool<Sqlite>) -> Id {
    let form = RegisterForm {
        email: Some(format!("{username}@example.com")),
        username: Some(username.to_string()),
        first_name: Some(String::from("Test")),
        last_name: Some(String::from("User")),
        password: Some(String::from("correct horse battery staple")),
    };

    register_user(form, pool).await.unwrap().id
}

pub fn session(user_id: Id, username: &str) -> SessionData {
    SessionData {
        user_id,
        username: username.to_string(),
        role: UserRole::User,
        is_admin: false,
    }
}

pub async fn create_ingredient(name: &str, unit: &str, pool: &Pool<Sqlite>) -> Id {
    let id: Option<(Id,)> = sqlx::query_as(
        "INSERT INTO ingredients (name, name_lower, measurement_unit) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(name.to_lowercase())
    .bind(unit)
    .fetch_optional(pool)
    .await
    .unwrap();

    id.unwrap().0
}

pub async fn create_tag(name: &str, color: &str, slug: &str, pool: &Pool<Sqlite>) -> Id {
    let id: Option<(Id,)> =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING id")
            .bind(name)
            .bind(color)
            .bind(slug)
            .fetch_optional(pool)
            .await
            .unwrap();

    id.unwrap().0
}

/// Inserts a recipe directly, bypassing validation and media storage.
pub async fn create_recipe(
    author_id: Id,
    name: &str,
    tags: &[Id],
    ingredients: &[(Id, i64)],
    pool: &Pool<Sqlite>,
) -> Id {
    let id: Option<(Id,)> = sqlx::query_as(
        "INSERT INTO recipes (author_id, name, image, text, cooking_time) VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(author_id)
    .bind(name)
    .bind("recipes/images/test.png")
    .bind("Mix and serve.")
    .bind(10_i64)
    .fetch_optional(pool)
    .await
    .unwrap();
    let id = id.unwrap();

    for tag in tags {
        sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES ($1, $2)")
            .bind(id.0)
            .bind(tag)
            .execute(pool)
            .await
            .unwrap();
    }

    for (ingredient, amount) in ingredients {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES ($1, $2, $3)",
        )
        .bind(id.0)
        .bind(ingredient)
        .bind(amount)
        .execute(pool)
        .await
        .unwrap();
    }

    id.0
}

pub async fn count_rows(table: &str, pool: &Pool<Sqlite>) -> i64 {
    let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap();

    count.0
}
