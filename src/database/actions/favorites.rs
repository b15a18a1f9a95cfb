use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{Error, ErrorKind, QueryError},
    media::MediaStore,
    schema::{Id, ShortRecipe},
};

use super::recipes::get_short_recipe;

use sqlx::{Pool, Sqlite};

/// Per-user recipe lists with the same add/remove semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    fn table(&self) -> &'static str {
        match self {
            RecipeList::Favorites => "favorites",
            RecipeList::ShoppingCart => "shopping_carts",
        }
    }

    fn already_added(&self) -> &'static str {
        match self {
            RecipeList::Favorites => "Recipe is already in favorites.",
            RecipeList::ShoppingCart => "Recipe is already in the shopping cart.",
        }
    }

    fn not_added(&self) -> &'static str {
        match self {
            RecipeList::Favorites => "Recipe is not in favorites.",
            RecipeList::ShoppingCart => "Recipe is not in the shopping cart.",
        }
    }
}

/// Returns the short form of the added recipe. A pair that already exists is a Conflict,
/// including when a concurrent request inserted it first.
pub async fn add_to_list(
    list: RecipeList,
    session: &SessionData,
    recipe_id: Id,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<ShortRecipe, Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let recipe = get_short_recipe(recipe_id, media, pool)
        .await?
        .ok_or_else(|| ErrorKind::NotFound.default())?;

    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        list.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.new(list.already_added()));
    }
    log::debug!(
        "User {} added recipe {recipe_id} to {}",
        session.user_id,
        list.table()
    );

    Ok(recipe)
}

pub async fn remove_from_list(
    list: RecipeList,
    session: &SessionData,
    recipe_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let exists: Option<(Id,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;
    if exists.is_none() {
        return Err(ErrorKind::NotFound.default());
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        list.table()
    ))
    .bind(session.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new(list.not_added()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{count_rows, create_recipe, create_user, file_pool, memory_pool, session};

    fn media() -> MediaStore {
        MediaStore::new(std::env::temp_dir(), "/media/")
    }

    async fn is_in_list(
        list: RecipeList,
        user_id: Id,
        recipe_id: Id,
        pool: &Pool<Sqlite>,
    ) -> bool {
        let row: Option<(Id,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE user_id = $1 AND recipe_id = $2",
            list.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .fetch_optional(pool)
        .await
        .unwrap();

        row.is_some()
    }

    #[tokio::test]
    async fn adding_twice_conflicts() {
        let pool = memory_pool().await;
        let ann = create_user("ann", &pool).await;
        let recipe = create_recipe(ann, "Soup", &[], &[], &pool).await;
        let session = session(ann, "ann");

        for list in [RecipeList::Favorites, RecipeList::ShoppingCart] {
            let short = add_to_list(list, &session, recipe, &media(), &pool)
                .await
                .unwrap();
            assert_eq!(short.id, recipe);
            assert_eq!(short.cooking_time, 10);
            assert!(is_in_list(list, ann, recipe, &pool).await);

            let error = add_to_list(list, &session, recipe, &media(), &pool)
                .await
                .unwrap_err();
            assert_eq!(error.kind, ErrorKind::Conflict);
        }
        assert_eq!(count_rows("favorites", &pool).await, 1);
        assert_eq!(count_rows("shopping_carts", &pool).await, 1);
    }

    #[tokio::test]
    async fn removing_twice_is_not_found() {
        let pool = memory_pool().await;
        let ann = create_user("ann", &pool).await;
        let recipe = create_recipe(ann, "Soup", &[], &[], &pool).await;
        let session = session(ann, "ann");

        add_to_list(RecipeList::Favorites, &session, recipe, &media(), &pool)
            .await
            .unwrap();
        remove_from_list(RecipeList::Favorites, &session, recipe, &pool)
            .await
            .unwrap();

        let error = remove_from_list(RecipeList::Favorites, &session, recipe, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert!(!is_in_list(RecipeList::Favorites, ann, recipe, &pool).await);
    }

    #[tokio::test]
    async fn missing_recipe_is_not_found() {
        let pool = memory_pool().await;
        let ann = create_user("ann", &pool).await;
        let session = session(ann, "ann");

        let error = add_to_list(RecipeList::ShoppingCart, &session, 42, &media(), &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);

        let error = remove_from_list(RecipeList::ShoppingCart, &session, 42, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_yield_one_winner() {
        let pool = file_pool("concurrent-favorites").await;
        let ann = create_user("ann", &pool).await;
        let recipe = create_recipe(ann, "Soup", &[], &[], &pool).await;

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    add_to_list(
                        RecipeList::Favorites,
                        &session(ann, "ann"),
                        recipe,
                        &media(),
                        &pool,
                    )
                    .await
                    .map(|_| ())
                    .map_err(|e| e.kind)
                })
            })
            .collect();

        let mut results = vec![];
        for task in tasks {
            results.push(task.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .all(|r| matches!(r, Ok(()) | Err(ErrorKind::Conflict))));
        assert_eq!(count_rows("favorites", &pool).await, 1);
    }
}
