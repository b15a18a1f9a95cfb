use std::path::PathBuf;

use clap::Parser;

pub const DEVELOPMENT_SECRET_KEY: &str = "foodgram-development-secret-key";

/// Server settings. Every option can also come from the environment or a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(name = "foodgram")]
#[command(about = "Recipe sharing backend")]
#[command(version)]
pub struct Config {
    /// Port to listen on
    #[arg(long, default_value_t = 8000, env = "FOODGRAM_PORT")]
    pub port: u16,

    #[arg(long, default_value = "sqlite:foodgram.db?mode=rwc", env = "DATABASE_URL")]
    pub database_url: String,

    /// HMAC key for session tokens
    #[arg(
        long,
        default_value = DEVELOPMENT_SECRET_KEY,
        env = "FOODGRAM_SECRET_KEY",
        hide_env_values = true
    )]
    pub secret_key: String,

    #[arg(long, default_value_t = 24, env = "FOODGRAM_TOKEN_TTL_HOURS")]
    pub token_ttl_hours: i64,

    /// Directory uploaded images are written to
    #[arg(long, default_value = "./media", env = "FOODGRAM_MEDIA_ROOT")]
    pub media_root: PathBuf,

    /// Public URL prefix of `media_root`
    #[arg(long, default_value = "/media/", env = "FOODGRAM_MEDIA_URL")]
    pub media_url: String,

    #[arg(long, default_value_t = 10 * 1024 * 1024, env = "FOODGRAM_MAX_BODY_BYTES")]
    pub max_body_bytes: u64,
}

impl Config {
    /// Reads `.env` when present, then the command line and environment.
    pub fn load() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }
        Self::parse()
    }

    pub fn warn_on_defaults(&self) {
        if self.secret_key == DEVELOPMENT_SECRET_KEY {
            log::warn!("Using the development secret key; set FOODGRAM_SECRET_KEY in production");
        }
        if self.token_ttl_hours <= 0 {
            log::warn!("Token lifetime is {} hours, every login expires at once", self.token_ttl_hours);
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn test_config() -> Config {
        Config {
            port: 0,
            database_url: String::from("sqlite::memory:"),
            secret_key: String::from("test secret"),
            token_ttl_hours: 1,
            media_root: std::env::temp_dir().join("foodgram-test-media"),
            media_url: String::from("/media/"),
            max_body_bytes: 1024 * 1024,
        }
    }

    #[test]
    fn defaults_apply_without_arguments() {
        let config = Config::try_parse_from(["foodgram"]).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "foodgram",
            "--port",
            "9000",
            "--media-root",
            "/srv/media",
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
    }
}
