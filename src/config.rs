use rocket::figment::providers::Env;
use rocket::figment::Figment;

pub const DEFAULT_STREAM_LIMIT: i64 = 100;

/// Application settings, read from `Rocket.toml`, `ROCKET_*` variables and a
/// bare `DATABASE_URL` (usually coming from `.env`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub pool_size: u32,
    pub pool_timeout_secs: u64,
    pub busy_timeout_ms: u64,
    pub stream_limit: i64,
    pub session_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: "microfeed.db".to_owned(),
            pool_size: 8,
            pool_timeout_secs: 5,
            busy_timeout_ms: 5000,
            stream_limit: DEFAULT_STREAM_LIMIT,
            session_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

pub fn figment() -> Figment {
    rocket::Config::figment().merge(Env::raw().only(&["database_url"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn database_url_comes_from_plain_env() {
        Jail::expect_with(|jail| {
            jail.set_env("DATABASE_URL", "/tmp/from-env.db");
            let config: AppConfig = figment().extract()?;
            assert_eq!(config.database_url, "/tmp/from-env.db");
            assert_eq!(config.stream_limit, DEFAULT_STREAM_LIMIT);
            Ok(())
        });
    }

    #[test]
    fn rocket_toml_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Rocket.toml",
                r#"
                [default]
                stream_limit = 20
                session_ttl_secs = 60
                "#,
            )?;
            let config: AppConfig = figment().extract()?;
            assert_eq!(config.stream_limit, 20);
            assert_eq!(config.session_ttl_secs, 60);
            assert_eq!(config.pool_size, 8);
            Ok(())
        });
    }
}
