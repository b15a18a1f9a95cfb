use std::{convert::Infallible, sync::Arc};

use sqlx::{Pool, Sqlite};
use warp::Filter;

use crate::{config::Config, error::Error, media::MediaStore, pool::connect};

/// Shared request state: the connection pool, settings and image storage.
#[derive(Clone, Debug)]
pub struct Context {
    pub pool: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub media: MediaStore,
}

impl Context {
    pub async fn new(config: Config) -> Result<Self, Error> {
        let pool = connect(&config.database_url).await?;
        log::info!("Connected to {}", config.database_url);

        Ok(Self::from_parts(pool, config))
    }

    pub fn from_parts(pool: Pool<Sqlite>, config: Config) -> Self {
        let media = MediaStore::from_config(&config);

        Self {
            pool,
            config: Arc::new(config),
            media,
        }
    }
}

pub fn with_context(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}
