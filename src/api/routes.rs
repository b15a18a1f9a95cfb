use std::convert::Infallible;

use serde::de::DeserializeOwned;
use warp::{filters::BoxedFilter, reply::Response, Filter, Rejection, Reply};

use super::{
    context::{with_context, Context},
    handlers,
    rejection::handle_rejection,
};
use crate::{
    actions::favorites::RecipeList,
    form::QueryParams,
    middleware::{with_possible_session, with_session},
    schema::Id,
};

/// Explicit list of routes, tried in registration order.
pub struct RouteTable {
    routes: Option<BoxedFilter<(Response,)>>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: None }
    }

    pub fn register(mut self, route: BoxedFilter<(Response,)>) -> Self {
        self.routes = Some(match self.routes.take() {
            Some(routes) => routes.or(route).unify().boxed(),
            None => route,
        });
        self
    }

    pub fn build(self) -> BoxedFilter<(Response,)> {
        match self.routes {
            Some(routes) => routes,
            None => warp::any()
                .and_then(|| async { Err::<Response, Rejection>(warp::reject::not_found()) })
                .boxed(),
        }
    }
}

fn json_body<T>(limit: u64) -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(limit).and(warp::body::json())
}

fn query_params() -> impl Filter<Extract = (QueryParams,), Error = Rejection> + Clone {
    warp::query::<Vec<(String, String)>>().map(QueryParams::from_pairs)
}

fn list(list: RecipeList) -> impl Filter<Extract = (RecipeList,), Error = Infallible> + Clone {
    warp::any().map(move || list)
}

pub fn route_table(ctx: Context) -> RouteTable {
    let config = ctx.config.clone();
    let limit = config.max_body_bytes;

    let session = || with_session(config.clone());
    let maybe_session = || with_possible_session(config.clone());
    let context = || with_context(ctx.clone());

    RouteTable::new()
        // Users
        .register(
            warp::path!("api" / "users")
                .and(warp::post())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::register)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users")
                .and(warp::get())
                .and(query_params())
                .and(maybe_session())
                .and(context())
                .and_then(handlers::list_users)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users" / "me")
                .and(warp::get())
                .and(session())
                .and(context())
                .and_then(handlers::me)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users" / "set_password")
                .and(warp::post())
                .and(session())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::set_password)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users" / "subscriptions")
                .and(warp::get())
                .and(session())
                .and(query_params())
                .and(context())
                .and_then(handlers::list_subscriptions)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users" / Id)
                .and(warp::get())
                .and(maybe_session())
                .and(context())
                .and_then(handlers::get_user)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users" / Id / "subscribe")
                .and(warp::post())
                .and(session())
                .and(query_params())
                .and(context())
                .and_then(handlers::subscribe)
                .boxed(),
        )
        .register(
            warp::path!("api" / "users" / Id / "subscribe")
                .and(warp::delete())
                .and(session())
                .and(context())
                .and_then(handlers::unsubscribe)
                .boxed(),
        )
        // Token authentication
        .register(
            warp::path!("api" / "auth" / "token" / "login")
                .and(warp::post())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::login)
                .boxed(),
        )
        .register(
            warp::path!("api" / "auth" / "token" / "logout")
                .and(warp::post())
                .and(session())
                .and_then(handlers::logout)
                .boxed(),
        )
        // Catalog
        .register(
            warp::path!("api" / "tags")
                .and(warp::get())
                .and(context())
                .and_then(handlers::list_tags)
                .boxed(),
        )
        .register(
            warp::path!("api" / "tags")
                .and(warp::post())
                .and(session())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::create_tag)
                .boxed(),
        )
        .register(
            warp::path!("api" / "tags" / Id)
                .and(warp::get())
                .and(context())
                .and_then(handlers::get_tag)
                .boxed(),
        )
        .register(
            warp::path!("api" / "ingredients")
                .and(warp::get())
                .and(query_params())
                .and(context())
                .and_then(handlers::list_ingredients)
                .boxed(),
        )
        .register(
            warp::path!("api" / "ingredients")
                .and(warp::post())
                .and(session())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::create_ingredient)
                .boxed(),
        )
        .register(
            warp::path!("api" / "ingredients" / Id)
                .and(warp::get())
                .and(context())
                .and_then(handlers::get_ingredient)
                .boxed(),
        )
        // Recipes
        .register(
            warp::path!("api" / "recipes")
                .and(warp::get())
                .and(query_params())
                .and(maybe_session())
                .and(context())
                .and_then(handlers::list_recipes)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes")
                .and(warp::post())
                .and(session())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::create_recipe)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / "download_shopping_cart")
                .and(warp::get())
                .and(session())
                .and(query_params())
                .and(context())
                .and_then(handlers::download_shopping_cart)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id)
                .and(warp::get())
                .and(maybe_session())
                .and(context())
                .and_then(handlers::get_recipe)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id)
                .and(warp::patch())
                .and(session())
                .and(json_body(limit))
                .and(context())
                .and_then(handlers::update_recipe)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id)
                .and(warp::delete())
                .and(session())
                .and(context())
                .and_then(handlers::delete_recipe)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id / "favorite")
                .and(warp::post())
                .and(list(RecipeList::Favorites))
                .and(session())
                .and(context())
                .and_then(handlers::add_to_list)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id / "favorite")
                .and(warp::delete())
                .and(list(RecipeList::Favorites))
                .and(session())
                .and(context())
                .and_then(handlers::remove_from_list)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id / "shopping_cart")
                .and(warp::post())
                .and(list(RecipeList::ShoppingCart))
                .and(session())
                .and(context())
                .and_then(handlers::add_to_list)
                .boxed(),
        )
        .register(
            warp::path!("api" / "recipes" / Id / "shopping_cart")
                .and(warp::delete())
                .and(list(RecipeList::ShoppingCart))
                .and(session())
                .and(context())
                .and_then(handlers::remove_from_list)
                .boxed(),
        )
        // Uploaded images
        .register(
            warp::path("media")
                .and(warp::fs::dir(ctx.media.root().to_path_buf()))
                .map(|file: warp::fs::File| file.into_response())
                .boxed(),
        )
}

/// Every route with error rendering and request logging.
pub fn routes(
    ctx: Context,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static {
    route_table(ctx)
        .build()
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use warp::http::StatusCode;

    use super::*;
    use crate::{
        config::tests::test_config,
        schema::UserRole,
        testing::{create_ingredient, create_tag, memory_pool},
    };

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    async fn context() -> Context {
        let mut config = test_config();
        config.media_root =
            std::env::temp_dir().join(format!("foodgram-api-{}", std::process::id()));
        Context::from_parts(memory_pool().await, config)
    }

    fn body<B: AsRef<[u8]>>(response: &warp::http::Response<B>) -> Value {
        serde_json::from_slice(response.body().as_ref()).unwrap()
    }

    async fn sign_up(username: &str, ctx: &Context) -> String {
        let api = routes(ctx.clone());

        let response = warp::test::request()
            .method("POST")
            .path("/api/users/")
            .json(&json!({
                "email": format!("{username}@example.com"),
                "username": username,
                "first_name": "Test",
                "last_name": "User",
                "password": "pa55word",
            }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/token/login/")
            .json(&json!({ "email": format!("{username}@example.com"), "password": "pa55word" }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let token = body(&response)["auth_token"].as_str().unwrap().to_string();
        format!("Token {token}")
    }

    #[tokio::test]
    async fn me_requires_a_token() {
        let ctx = context().await;
        let api = routes(ctx.clone());
        let token = sign_up("ann", &ctx).await;

        let response = warp::test::request()
            .path("/api/users/me/")
            .header("authorization", &token)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response)["username"], "ann");

        let response = warp::test::request()
            .path("/api/users/me/")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body(&response)["detail"].is_string());
    }

    #[tokio::test]
    async fn framework_rejections_use_the_error_shape() {
        let ctx = context().await;
        let api = routes(ctx);

        let response = warp::test::request().path("/api/nothing/").reply(&api).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), json!({ "detail": "Not found." }));

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/token/login/")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = warp::test::request()
            .method("PUT")
            .path("/api/tags/")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn overflowing_page_is_invalid() {
        let ctx = context().await;
        let api = routes(ctx);

        let response = warp::test::request()
            .path("/api/recipes/?page=9223372036854775807&limit=100")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), json!({ "detail": "Invalid page." }));
    }

    #[tokio::test]
    async fn catalog_writes_need_an_admin() {
        let ctx = context().await;
        let api = routes(ctx.clone());
        let token = sign_up("ann", &ctx).await;
        let tag = json!({ "name": "Lunch", "color": "#49B64E", "slug": "lunch" });

        let response = warp::test::request()
            .method("POST")
            .path("/api/tags/")
            .header("authorization", &token)
            .json(&tag)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        crate::actions::users::set_role("ann@example.com", UserRole::Admin, &ctx.pool)
            .await
            .unwrap();
        let token = {
            let response = warp::test::request()
                .method("POST")
                .path("/api/auth/token/login/")
                .json(&json!({ "email": "ann@example.com", "password": "pa55word" }))
                .reply(&api)
                .await;
            format!("Token {}", body(&response)["auth_token"].as_str().unwrap())
        };

        let response = warp::test::request()
            .method("POST")
            .path("/api/tags/")
            .header("authorization", &token)
            .json(&tag)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = warp::test::request().path("/api/tags/").reply(&api).await;
        assert_eq!(body(&response).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recipe_lifecycle_over_http() {
        let ctx = context().await;
        let api = routes(ctx.clone());
        let token = sign_up("ann", &ctx).await;
        let salt = create_ingredient("Salt", "g", &ctx.pool).await;
        let lunch = create_tag("Lunch", "#49B64E", "lunch", &ctx.pool).await;

        let response = warp::test::request()
            .method("POST")
            .path("/api/recipes/")
            .header("authorization", &token)
            .json(&json!({
                "ingredients": [{ "id": salt, "amount": 10 }],
                "tags": [lunch],
                "image": PIXEL,
                "name": "Soup",
                "text": "Boil.",
                "cooking_time": 30,
            }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let recipe = body(&response);
        let id = recipe["id"].as_i64().unwrap();
        assert_eq!(recipe["is_favorited"], false);
        assert_eq!(recipe["ingredients"][0]["amount"], 10);

        let response = warp::test::request()
            .path("/api/recipes/?page=1&limit=6")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body(&response);
        assert_eq!(page["count"], 1);
        assert_eq!(page["next"], Value::Null);
        assert_eq!(page["results"][0]["is_in_shopping_cart"], false);

        let cart = format!("/api/recipes/{id}/shopping_cart/");
        let response = warp::test::request()
            .method("POST")
            .path(&cart)
            .header("authorization", &token)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body(&response)["name"], "Soup");

        let response = warp::test::request()
            .method("POST")
            .path(&cart)
            .header("authorization", &token)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = warp::test::request()
            .path("/api/recipes/download_shopping_cart/?format=csv")
            .header("authorization", &token)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"ann_shopping_cart.csv\""
        );
        assert_eq!(
            std::str::from_utf8(response.body().as_ref()).unwrap(),
            "\"Shopping list for ann\",amount,measurement_unit\r\nSalt,10,g\r\n"
        );

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/recipes/{id}/"))
            .header("authorization", &token)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = warp::test::request()
            .path(&format!("/api/recipes/{id}/"))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn subscribing_to_yourself_is_rejected() {
        let ctx = context().await;
        let api = routes(ctx.clone());
        let token = sign_up("ann", &ctx).await;

        let me = warp::test::request()
            .path("/api/users/me/")
            .header("authorization", &token)
            .reply(&api)
            .await;
        let id = body(&me)["id"].as_i64().unwrap();

        let response = warp::test::request()
            .method("POST")
            .path(&format!("/api/users/{id}/subscribe/"))
            .header("authorization", &token)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
