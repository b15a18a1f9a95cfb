use std::collections::HashMap;

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::{Error, ErrorKind, QueryError},
    form::{QueryParams, RecipeDraft, RecipeForm},
    media::MediaStore,
    pagination::{PageContext, PageRequest},
    pool::WriteTransaction,
    schema::{
        Id, LinkedRecipeTag, Recipe, RecipeIngredient, RecipeOwner, RecipeRow, ShortRecipe,
        ShortRecipeRow, Tag,
    },
};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, Pool};

/// List filters. Favorite and cart filters only apply to a known viewer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs, any of which must be on the recipe.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeFilter {
    pub fn from_query(params: &QueryParams) -> Result<Self, Error> {
        Ok(Self {
            author: params.get_number("author")?,
            tags: params
                .get_all("tags")
                .into_iter()
                .map(str::trim)
                .filter(|slug| !slug.is_empty())
                .map(String::from)
                .collect(),
            is_favorited: params.get_flag("is_favorited")?,
            is_in_shopping_cart: params.get_flag("is_in_shopping_cart")?,
        })
    }
}

/// Recipe rows joined with their author. The viewer's flags come from correlated sub-selects,
/// so an anonymous viewer (NULL) gets `false` everywhere.
fn recipe_query<'a>(viewer: Option<Id>) -> QueryBuilder<'a, Sqlite> {
    let mut query = QueryBuilder::new(
        "
        SELECT r.id, r.name, r.image, r.text, r.cooking_time,
            u.id AS author_id, u.email AS author_email, u.username AS author_username,
            u.first_name AS author_first_name, u.last_name AS author_last_name,
            EXISTS(SELECT 1 FROM subscriptions s WHERE s.author_id = u.id AND s.user_id = ",
    );
    query.push_bind(viewer);
    query.push(
        ") AS author_is_subscribed,
            EXISTS(SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ",
    );
    query.push_bind(viewer);
    query.push(
        ") AS is_favorited,
            EXISTS(SELECT 1 FROM shopping_carts c WHERE c.recipe_id = r.id AND c.user_id = ",
    );
    query.push_bind(viewer);
    query.push(
        ") AS is_in_shopping_cart,
            COUNT(*) OVER() AS count
        FROM recipes r
        INNER JOIN users u ON u.id = r.author_id
        WHERE 1 = 1",
    );

    query
}

async fn fetch_recipe_tags(
    ids: &[Id],
    pool: &Pool<Sqlite>,
) -> Result<HashMap<Id, Vec<Tag>>, Error> {
    let mut map: HashMap<Id, Vec<Tag>> = HashMap::new();
    if ids.is_empty() {
        return Ok(map);
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id IN (",
    );
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY t.id");

    let rows: Vec<LinkedRecipeTag> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    rows.into_iter()
        .for_each(|row| map.entry(row.recipe_id).or_default().push(row.into()));
    Ok(map)
}

async fn fetch_recipe_ingredients(
    ids: &[Id],
    pool: &Pool<Sqlite>,
) -> Result<HashMap<Id, Vec<RecipeIngredient>>, Error> {
    let mut map: HashMap<Id, Vec<RecipeIngredient>> = HashMap::new();
    if ids.is_empty() {
        return Ok(map);
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id IN (",
    );
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY ri.id");

    let rows: Vec<RecipeIngredient> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    rows.into_iter()
        .for_each(|row| map.entry(row.recipe_id).or_default().push(row));
    Ok(map)
}

/// Attaches tags and ingredients to a batch of rows with one query per relation.
async fn assemble(
    rows: Vec<RecipeRow>,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Vec<Recipe>, Error> {
    let ids: Vec<Id> = rows.iter().map(|r| r.id).collect();
    let mut tags = fetch_recipe_tags(&ids, pool).await?;
    let mut ingredients = fetch_recipe_ingredients(&ids, pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let image = media.url(&row.image);
            let tags = tags.remove(&row.id).unwrap_or_default();
            let ingredients = ingredients.remove(&row.id).unwrap_or_default();
            Recipe::from_row(row, tags, ingredients, image)
        })
        .collect())
}

pub async fn fetch_recipes(
    viewer: Option<Id>,
    filter: &RecipeFilter,
    page: &PageRequest,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<PageContext<Recipe>, Error> {
    let mut query = recipe_query(viewer);

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        query.push(
            " AND EXISTS(SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug IN (",
        );
        let mut separated = query.separated(", ");
        for slug in filter.tags.iter() {
            separated.push_bind(slug.clone());
        }
        separated.push_unseparated("))");
    }

    if let Some(viewer) = viewer {
        if filter.is_favorited {
            query
                .push(" AND r.id IN (SELECT recipe_id FROM favorites WHERE user_id = ")
                .push_bind(viewer)
                .push(")");
        }
        if filter.is_in_shopping_cart {
            query
                .push(" AND r.id IN (SELECT recipe_id FROM shopping_carts WHERE user_id = ")
                .push_bind(viewer)
                .push(")");
        }
    }

    query
        .push(" ORDER BY r.created DESC, r.id DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;
    log::trace!("> Recipe page {} matched {} rows", page.page, rows.len());

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let recipes = assemble(rows, media, pool).await?;

    PageContext::from_rows(recipes, total_count, page)
}

pub async fn get_recipe(
    viewer: Option<Id>,
    id: Id,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, Error> {
    let mut query = recipe_query(viewer);
    query.push(" AND r.id = ").push_bind(id);

    let row: Option<RecipeRow> = query
        .build_query_as()
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;
    let row = row.ok_or_else(|| ErrorKind::NotFound.default())?;

    assemble(vec![row], media, pool)
        .await?
        .pop()
        .ok_or_else(|| ErrorKind::NotFound.default())
}

pub async fn get_short_recipe(
    id: Id,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Option<ShortRecipe>, Error> {
    let row: Option<ShortRecipeRow> = sqlx::query_as(
        "SELECT id, name, image, cooking_time, author_id FROM recipes WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.map(|row| {
        let image = media.url(&row.image);
        row.into_short(image)
    }))
}

/// Loads a recipe for writing. Only the author, or someone allowed to manage every recipe, gets it.
pub async fn get_recipe_mut(
    session: &SessionData,
    id: Id,
    pool: &Pool<Sqlite>,
) -> Result<RecipeOwner, Error> {
    let owner: Option<RecipeOwner> =
        sqlx::query_as("SELECT id, author_id, image FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;
    let owner = owner.ok_or_else(|| ErrorKind::NotFound.default())?;

    if owner.author_id == session.user_id {
        session.authenticate(ActionType::ManageOwnRecipes)?;
    } else {
        session.authenticate(ActionType::ManageAllRecipes)?;
    }

    Ok(owner)
}

async fn count_existing(
    table: &str,
    ids: &[Id],
    conn: &mut SqliteConnection,
) -> Result<usize, Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table} WHERE id IN ("));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let count: (i64,) = query
        .build_query_as()
        .fetch_one(conn)
        .await
        .map_err(QueryError::from)?;

    Ok(count.0 as usize)
}

/// Every referenced ingredient and tag must exist. Ids are already known to be unique.
async fn check_references(draft: &RecipeDraft, conn: &mut SqliteConnection) -> Result<(), Error> {
    let ingredient_ids: Vec<Id> = draft.ingredients.iter().map(|i| i.id).collect();
    if count_existing("ingredients", &ingredient_ids, &mut *conn).await? != ingredient_ids.len() {
        return Err(ErrorKind::Validation.field("ingredients", "Ingredient does not exist."));
    }

    if count_existing("tags", &draft.tags, &mut *conn).await? != draft.tags.len() {
        return Err(ErrorKind::Validation.field("tags", "Tag does not exist."));
    }

    Ok(())
}

/// Replaces the tag and ingredient links of a recipe.
async fn replace_links(
    recipe_id: Id,
    draft: &RecipeDraft,
    conn: &mut SqliteConnection,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    let mut tags = QueryBuilder::<Sqlite>::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    tags.push_values(draft.tags.iter(), |mut b, tag| {
        b.push_bind(recipe_id).push_bind(*tag);
    });
    tags.build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    let mut ingredients = QueryBuilder::<Sqlite>::new(
        "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
    );
    ingredients.push_values(draft.ingredients.iter(), |mut b, part| {
        b.push_bind(recipe_id)
            .push_bind(part.id)
            .push_bind(part.amount);
    });
    ingredients
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

/// Deletes the stored file once no recipe points at it.
async fn release_image(path: &str, media: &MediaStore, pool: &Pool<Sqlite>) -> Result<(), Error> {
    let users: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE image = $1")
        .bind(path)
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    if users.0 == 0 {
        media.remove(path).await;
    }
    Ok(())
}

/// Drops a freshly stored image after a failed write. Another recipe may share the file.
async fn discard_image(path: &str, media: &MediaStore, pool: &Pool<Sqlite>) {
    if let Err(e) = release_image(path, media, pool).await {
        log::warn!("Failed to release image {path}: {e}");
    }
}

async fn store_recipe(
    author_id: Id,
    draft: &RecipeDraft,
    image: &str,
    pool: &Pool<Sqlite>,
) -> Result<Id, Error> {
    let mut tx = WriteTransaction::begin(pool).await?;
    check_references(draft, tx.conn()?).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(&draft.name)
    .bind(image)
    .bind(&draft.text)
    .bind(draft.cooking_time)
    .fetch_one(tx.conn()?)
    .await
    .map_err(QueryError::from)?;

    replace_links(id.0, draft, tx.conn()?).await?;
    tx.commit().await?;

    Ok(id.0)
}

async fn write_recipe(
    id: Id,
    draft: &RecipeDraft,
    image: &str,
    pool: &Pool<Sqlite>,
) -> Result<(), Error> {
    let mut tx = WriteTransaction::begin(pool).await?;
    check_references(draft, tx.conn()?).await?;

    sqlx::query("UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4 WHERE id = $5")
        .bind(&draft.name)
        .bind(image)
        .bind(&draft.text)
        .bind(draft.cooking_time)
        .bind(id)
        .execute(tx.conn()?)
        .await
        .map_err(QueryError::from)?;

    replace_links(id, draft, tx.conn()?).await?;
    tx.commit().await
}

pub async fn create_recipe(
    session: &SessionData,
    form: RecipeForm,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let draft = form.validate(true)?;

    let image = draft
        .image
        .as_ref()
        .ok_or_else(|| ErrorKind::Validation.field("image", "An image is required."))?;
    let image = media.save(image).await?;

    let id = match store_recipe(session.user_id, &draft, &image, pool).await {
        Ok(id) => id,
        Err(e) => {
            discard_image(&image, media, pool).await;
            return Err(e);
        }
    };
    log::info!("User {} created recipe {id}", session.user_id);

    get_recipe(Some(session.user_id), id, media, pool).await
}

/// Full replacement of the recipe's fields and links. Without a new image the stored one is kept.
pub async fn update_recipe(
    session: &SessionData,
    id: Id,
    form: RecipeForm,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Recipe, Error> {
    let owner = get_recipe_mut(session, id, pool).await?;
    let draft = form.validate(false)?;

    let image = match draft.image.as_ref() {
        Some(image) => media.save(image).await?,
        None => owner.image.clone(),
    };

    if let Err(e) = write_recipe(id, &draft, &image, pool).await {
        if image != owner.image {
            discard_image(&image, media, pool).await;
        }
        return Err(e);
    }
    log::info!("User {} updated recipe {id}", session.user_id);

    if image != owner.image {
        release_image(&owner.image, media, pool).await?;
    }

    get_recipe(Some(session.user_id), id, media, pool).await
}

/// Favorites, cart entries and links go with the recipe through cascades.
pub async fn delete_recipe(
    session: &SessionData,
    id: Id,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<(), Error> {
    let owner = get_recipe_mut(session, id, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(owner.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;
    log::info!("User {} deleted recipe {id}", session.user_id);

    release_image(&owner.image, media, pool).await
}
