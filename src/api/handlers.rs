use serde::Serialize;
use serde_json::json;
use warp::{
    http::{header, StatusCode},
    reply::Response,
    Rejection, Reply,
};

use super::context::Context;
use crate::{
    actions::{
        favorites::{self, RecipeList},
        ingredients, recipes,
        recipes::RecipeFilter,
        shopping_list::{self, content_disposition, ShoppingListFormat},
        subscriptions, tags, users,
    },
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::{RECIPE_COUNT_PER_PAGE, USER_COUNT_PER_PAGE},
    form::{
        IngredientForm, LoginForm, QueryParams, RecipeForm, RegisterForm, SetPasswordForm, TagForm,
    },
    pagination::PageRequest,
    schema::Id,
};

fn reply_json<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn viewer(session: &Option<SessionData>) -> Option<Id> {
    session.as_ref().map(|s| s.user_id)
}

// Users

pub async fn register(form: RegisterForm, ctx: Context) -> Result<Response, Rejection> {
    let user = users::register_user(form, &ctx.pool).await?;
    Ok(reply_json(&user, StatusCode::CREATED))
}

pub async fn list_users(
    params: QueryParams,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<Response, Rejection> {
    let page = PageRequest::from_query(&params, USER_COUNT_PER_PAGE)?;
    let users = users::fetch_users(viewer(&session), &page, &ctx.pool).await?;
    Ok(reply_json(&users, StatusCode::OK))
}

pub async fn get_user(
    id: Id,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<Response, Rejection> {
    let profile = users::get_profile(viewer(&session), id, &ctx.pool).await?;
    Ok(reply_json(&profile, StatusCode::OK))
}

pub async fn me(session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    let profile = users::get_profile(Some(session.user_id), session.user_id, &ctx.pool).await?;
    Ok(reply_json(&profile, StatusCode::OK))
}

pub async fn set_password(
    session: SessionData,
    form: SetPasswordForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    users::set_password(&session, form, &ctx.pool).await?;
    Ok(no_content())
}

pub async fn login(form: LoginForm, ctx: Context) -> Result<Response, Rejection> {
    let token = users::login_user(form, &ctx.config, &ctx.pool).await?;
    Ok(reply_json(&json!({ "auth_token": token }), StatusCode::OK))
}

/// Tokens are stateless, so there is nothing to revoke.
pub async fn logout(session: SessionData) -> Result<Response, Rejection> {
    log::debug!("User {} logged out", session.user_id);
    Ok(no_content())
}

// Subscriptions

pub async fn list_subscriptions(
    session: SessionData,
    params: QueryParams,
    ctx: Context,
) -> Result<Response, Rejection> {
    let page = PageRequest::from_query(&params, USER_COUNT_PER_PAGE)?;
    let limit = subscriptions::recipes_limit(&params)?;

    let page =
        subscriptions::fetch_subscriptions(&session, &page, limit, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&page, StatusCode::OK))
}

pub async fn subscribe(
    author_id: Id,
    session: SessionData,
    params: QueryParams,
    ctx: Context,
) -> Result<Response, Rejection> {
    let limit = subscriptions::recipes_limit(&params)?;

    let profile =
        subscriptions::subscribe(&session, author_id, limit, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&profile, StatusCode::CREATED))
}

pub async fn unsubscribe(
    author_id: Id,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    subscriptions::unsubscribe(&session, author_id, &ctx.pool).await?;
    Ok(no_content())
}

// Catalog

pub async fn list_tags(ctx: Context) -> Result<Response, Rejection> {
    let tags = tags::list_tags(&ctx.pool).await?;
    Ok(reply_json(&tags, StatusCode::OK))
}

pub async fn get_tag(id: Id, ctx: Context) -> Result<Response, Rejection> {
    let tag = tags::get_tag(id, &ctx.pool).await?;
    Ok(reply_json(&tag, StatusCode::OK))
}

pub async fn create_tag(
    session: SessionData,
    form: TagForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;

    let tag = tags::create_tag(form, &ctx.pool).await?;
    Ok(reply_json(&tag, StatusCode::CREATED))
}

pub async fn list_ingredients(params: QueryParams, ctx: Context) -> Result<Response, Rejection> {
    let ingredients = ingredients::list_ingredients(params.get_str("name"), &ctx.pool).await?;
    Ok(reply_json(&ingredients, StatusCode::OK))
}

pub async fn get_ingredient(id: Id, ctx: Context) -> Result<Response, Rejection> {
    let ingredient = ingredients::get_ingredient(id, &ctx.pool).await?;
    Ok(reply_json(&ingredient, StatusCode::OK))
}

pub async fn create_ingredient(
    session: SessionData,
    form: IngredientForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageCatalog)?;

    let ingredient = ingredients::create_ingredient(form, &ctx.pool).await?;
    Ok(reply_json(&ingredient, StatusCode::CREATED))
}

// Recipes

pub async fn list_recipes(
    params: QueryParams,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<Response, Rejection> {
    let page = PageRequest::from_query(&params, RECIPE_COUNT_PER_PAGE)?;
    let filter = RecipeFilter::from_query(&params)?;

    let recipes =
        recipes::fetch_recipes(viewer(&session), &filter, &page, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&recipes, StatusCode::OK))
}

pub async fn get_recipe(
    id: Id,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipe = recipes::get_recipe(viewer(&session), id, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&recipe, StatusCode::OK))
}

pub async fn create_recipe(
    session: SessionData,
    form: RecipeForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipe = recipes::create_recipe(&session, form, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&recipe, StatusCode::CREATED))
}

pub async fn update_recipe(
    id: Id,
    session: SessionData,
    form: RecipeForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipe = recipes::update_recipe(&session, id, form, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&recipe, StatusCode::OK))
}

pub async fn delete_recipe(
    id: Id,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    recipes::delete_recipe(&session, id, &ctx.media, &ctx.pool).await?;
    Ok(no_content())
}

pub async fn add_to_list(
    id: Id,
    list: RecipeList,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipe = favorites::add_to_list(list, &session, id, &ctx.media, &ctx.pool).await?;
    Ok(reply_json(&recipe, StatusCode::CREATED))
}

pub async fn remove_from_list(
    id: Id,
    list: RecipeList,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    favorites::remove_from_list(list, &session, id, &ctx.pool).await?;
    Ok(no_content())
}

pub async fn download_shopping_cart(
    session: SessionData,
    params: QueryParams,
    ctx: Context,
) -> Result<Response, Rejection> {
    let format = ShoppingListFormat::from_query(params.get_str("format"))?;
    let export = shopping_list::export(&session, format, &ctx.pool).await?;

    let reply = warp::reply::with_header(export.body, header::CONTENT_TYPE, export.content_type);
    let reply = warp::reply::with_header(
        reply,
        header::CONTENT_DISPOSITION,
        content_disposition(&export.filename),
    );
    Ok(reply.into_response())
}
