mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod pool;
    pub mod schema;
    pub mod seed;

    #[cfg(test)]
    pub mod testing;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod api {
    pub mod context;
    pub mod handlers;
    pub mod rejection;
    pub mod routes;
    pub mod server;
}
pub mod config;
mod constants;
pub mod media;

pub use api::*;
pub use authentication::*;
pub use constants::*;
pub use database::*;
pub use pool::connect;
pub use server::serve;
