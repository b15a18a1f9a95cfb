use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use super::jwt::{verify_jwt_session, SessionData};
use crate::{config::Config, error::ErrorKind};

/// Accepts `Token <jwt>` and `Bearer <jwt>`.
fn token_from_header(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        return Some(token);
    }
    None
}

async fn authorize(header: Option<String>, config: Arc<Config>) -> Result<SessionData, Rejection> {
    let header = header.ok_or_else(|| ErrorKind::Unauthorized.default())?;
    let token = token_from_header(&header)
        .ok_or_else(|| ErrorKind::Unauthorized.new("Invalid token header."))?;

    let session = verify_jwt_session(token, &config)?;
    Ok(session.into())
}

async fn maybe_authorize(
    header: Option<String>,
    config: Arc<Config>,
) -> Result<Option<SessionData>, Rejection> {
    match header {
        Some(header) => authorize(Some(header), config).await.map(Some),
        None => Ok(None),
    }
}

/// Rejects with Unauthorized unless a valid token is present.
pub fn with_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| authorize(header, config.clone()))
}

/// Anonymous requests pass as `None`; a token that is present must still be valid.
pub fn with_possible_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| maybe_authorize(header, config.clone()))
}
