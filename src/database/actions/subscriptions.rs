use std::collections::HashMap;

use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::SUBSCRIPTION_RECIPE_PREVIEW,
    error::{Error, ErrorKind, QueryError},
    form::QueryParams,
    media::MediaStore,
    pagination::{PageContext, PageRequest},
    schema::{Id, ShortRecipe, ShortRecipeRow, SubscriptionProfile, SubscriptionRow},
};

use super::users::get_user_by_id;

use sqlx::{Pool, QueryBuilder, Sqlite};

/// `recipes_limit` query parameter, defaulting to a short preview.
pub fn recipes_limit(params: &QueryParams) -> Result<i64, Error> {
    let limit = params
        .get_number::<i64>("recipes_limit")?
        .unwrap_or(SUBSCRIPTION_RECIPE_PREVIEW);

    if limit < 0 {
        return Err(ErrorKind::Validation.field(
            "recipes_limit",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    Ok(limit)
}

/// Newest `limit` recipes of each author, in one windowed query.
async fn fetch_recipe_previews(
    author_ids: &[Id],
    limit: i64,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<HashMap<Id, Vec<ShortRecipe>>, Error> {
    let mut map: HashMap<Id, Vec<ShortRecipe>> = HashMap::new();
    if author_ids.is_empty() || limit == 0 {
        return Ok(map);
    }

    let mut query = QueryBuilder::<Sqlite>::new(
        "
        SELECT id, name, image, cooking_time, author_id
        FROM (
            SELECT r.id, r.name, r.image, r.cooking_time, r.author_id,
                ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.created DESC, r.id DESC) AS position
            FROM recipes r
            WHERE r.author_id IN (",
    );
    let mut separated = query.separated(", ");
    for id in author_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")) WHERE position <= ");
    query.push_bind(limit);
    query.push(" ORDER BY author_id, position");

    let rows: Vec<ShortRecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    rows.into_iter().for_each(|row| {
        let image = media.url(&row.image);
        map.entry(row.author_id)
            .or_default()
            .push(row.into_short(image));
    });
    Ok(map)
}

async fn with_previews(
    rows: Vec<SubscriptionRow>,
    recipes_limit: i64,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<Vec<SubscriptionProfile>, Error> {
    let ids: Vec<Id> = rows.iter().map(|r| r.id).collect();
    let mut previews = fetch_recipe_previews(&ids, recipes_limit, media, pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let recipes = previews.remove(&row.id).unwrap_or_default();
            SubscriptionProfile::from_row(row, recipes)
        })
        .collect())
}

async fn get_subscription_profile(
    follower: Id,
    author: Id,
    recipes_limit: i64,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<SubscriptionProfile, Error> {
    let row: Option<SubscriptionRow> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            EXISTS(SELECT 1 FROM subscriptions s WHERE s.user_id = $1 AND s.author_id = u.id) AS is_subscribed,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            1 AS count
        FROM users u
        WHERE u.id = $2
    ",
    )
    .bind(follower)
    .bind(author)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;
    let row = row.ok_or_else(|| ErrorKind::NotFound.default())?;

    with_previews(vec![row], recipes_limit, media, pool)
        .await?
        .pop()
        .ok_or_else(|| ErrorKind::NotFound.default())
}

pub async fn subscribe(
    session: &SessionData,
    author_id: Id,
    recipes_limit: i64,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<SubscriptionProfile, Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ErrorKind::NotFound.default());
    }
    if author_id == session.user_id {
        return Err(ErrorKind::Validation.new("You cannot subscribe to yourself."));
    }

    let result = sqlx::query(
        "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::Conflict.new("You are already subscribed to this author."));
    }
    log::debug!("User {} subscribed to {author_id}", session.user_id);

    get_subscription_profile(session.user_id, author_id, recipes_limit, media, pool).await
}

pub async fn unsubscribe(
    session: &SessionData,
    author_id: Id,
    pool: &Pool<Sqlite>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnLists)?;

    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ErrorKind::NotFound.default());
    }

    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(ErrorKind::NotFound.new("You are not subscribed to this author."));
    }
    Ok(())
}

/// Authors the user follows, in subscription order.
pub async fn fetch_subscriptions(
    session: &SessionData,
    page: &PageRequest,
    recipes_limit: i64,
    media: &MediaStore,
    pool: &Pool<Sqlite>,
) -> Result<PageContext<SubscriptionProfile>, Error> {
    let rows: Vec<SubscriptionRow> = sqlx::query_as(
        "
        SELECT u.email, u.id, u.username, u.first_name, u.last_name,
            1 AS is_subscribed,
            (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count,
            COUNT(*) OVER() AS count
        FROM subscriptions s
        INNER JOIN users u ON u.id = s.author_id
        WHERE s.user_id = $1
        ORDER BY s.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    let profiles = with_previews(rows, recipes_limit, media, pool).await?;

    PageContext::from_rows(profiles, total_count, page)
}
