use chrono::{Duration, Local};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::permissions::ActionType;
use crate::{
    config::Config,
    error::{Error, ErrorKind},
    schema::{Id, User, UserRole},
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, ttl_hours: i64) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(ttl_hours)).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(ErrorKind::Forbidden.default());
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
        }
    }
}

fn signing_key(config: &Config) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(config.secret_key.as_bytes()).map_err(|e| {
        log::error!("Unusable secret key: {e}");
        ErrorKind::Internal.default()
    })
}

pub fn generate_jwt_session(user: &User, config: &Config) -> Result<String, Error> {
    let key = signing_key(config)?;
    let claims = JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role,
        config.token_ttl_hours,
    );

    claims.sign_with_key(&key).map_err(|e| {
        log::error!("Failed to sign session token: {e}");
        ErrorKind::Internal.default()
    })
}

pub fn verify_jwt_session(token: &str, config: &Config) -> Result<JwtSessionData, Error> {
    let key = signing_key(config)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| ErrorKind::Unauthorized.new("Invalid token."))?;

    if session.exp < Local::now().timestamp() {
        return Err(ErrorKind::Unauthorized.new("Token expired."));
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    fn user() -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Ann"),
            last_name: String::from("Lee"),
            password: String::new(),
            role: UserRole::Admin,
        }
    }

    #[test]
    fn token_round_trips_claims() {
        let config = test_config();
        let token = generate_jwt_session(&user(), &config).unwrap();

        let session: SessionData = verify_jwt_session(&token, &config).unwrap().into();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.username, "cook");
        assert!(session.is_admin);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = test_config();
        let token = generate_jwt_session(&user(), &config).unwrap();

        let mut other = test_config();
        other.secret_key = String::from("another secret");
        let error = verify_jwt_session(&token, &other).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Unauthorized);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut config = test_config();
        config.token_ttl_hours = -1;
        let token = generate_jwt_session(&user(), &config).unwrap();

        let error = verify_jwt_session(&token, &config).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Unauthorized);
    }
}
