use crate::config::AppConfig;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};
use diesel::result::Error as DieselError;
use diesel::sqlite::SqliteConnection;
use rocket::fairing;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest};
use rocket::tokio::task::spawn_blocking;
use rocket::{Build, Request, Rocket};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

pub mod schema;

// An alias to the type for a pool of Diesel SQLite connections.
pub type Pool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub struct DbConnection(pub r2d2::PooledConnection<ConnectionManager<SqliteConnection>>);

error_chain! {
    foreign_links {
        R2D2(r2d2::Error);
        Diesel(DieselError);
    }
}

static SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    joined_at TIMESTAMP NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users (id),
    content TEXT NOT NULL,
    timestamp TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS posts_user_id_timestamp ON posts (user_id, timestamp);
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    from_user_id INTEGER NOT NULL REFERENCES users (id),
    to_user_id INTEGER NOT NULL REFERENCES users (id),
    UNIQUE (from_user_id, to_user_id)
);
CREATE INDEX IF NOT EXISTS relationships_to_user_id ON relationships (to_user_id);
";

/// Per-connection pragmas, applied every time r2d2 opens a connection.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> ::std::result::Result<(), diesel::r2d2::Error> {
        let pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        );
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Attempts to retrieve a single connection from the managed database pool. If
/// no pool is currently managed, fails with an `InternalServerError` status. If
/// no connections are available, fails with a `ServiceUnavailable` status.
///
/// The connection goes back to the pool when the guard is dropped at the end of
/// the request, whichever way the handler exits.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for DbConnection {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<DbConnection, ()> {
        let pool = match request.rocket().state::<Pool>() {
            Some(pool) => pool.clone(),
            None => return Outcome::Error((Status::InternalServerError, ())),
        };
        match spawn_blocking(move || pool.get()).await {
            Ok(Ok(conn)) => Outcome::Success(DbConnection(conn)),
            Ok(Err(e)) => {
                warn!("database pool exhausted: {}", e);
                Outcome::Error((Status::ServiceUnavailable, ()))
            }
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

// For the convenience of using an &mut DbConnection as an &mut SqliteConnection.
impl Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub fn init_pool(config: &AppConfig) -> Result<Pool> {
    let manager = ConnectionManager::<SqliteConnection>::new(config.database_url.as_str());
    let options = ConnectionOptions {
        busy_timeout: Duration::from_millis(config.busy_timeout_ms),
    };
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(config.pool_timeout_secs))
        .connection_customizer(Box::new(options))
        .build(manager)?;
    initialize(&pool)?;
    Ok(pool)
}

/// Creates the tables if they are missing. Safe to run against an existing file.
pub fn initialize(pool: &Pool) -> Result<()> {
    let mut conn = pool.get()?;
    conn.batch_execute(SCHEMA)?;
    Ok(())
}

/// Ignition stage: builds the pool from the managed `AppConfig` and hands it to Rocket.
pub async fn stage(rocket: Rocket<Build>) -> fairing::Result {
    let config = match rocket.state::<AppConfig>() {
        Some(config) => config.clone(),
        None => {
            error!("application config is not managed");
            return Err(rocket);
        }
    };
    let url = config.database_url.clone();
    match spawn_blocking(move || init_pool(&config)).await {
        Ok(Ok(pool)) => {
            info!("database ready at {}", url);
            Ok(rocket.manage(pool))
        }
        Ok(Err(e)) => {
            error!("failed to initialize database: {}", e);
            Err(rocket)
        }
        Err(e) => {
            error!("database initialization panicked: {}", e);
            Err(rocket)
        }
    }
}
