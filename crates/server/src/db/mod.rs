pub mod assignments;
pub mod auth;
pub mod comments;
pub mod departments;
pub mod notifications;
pub mod profiles;
pub mod projects;
pub mod tags;
pub mod tasks;

use sqlx::{PgPool, Postgres, Transaction, migrate::MigrateError, postgres::PgPoolOptions};

pub(crate) type Tx<'a> = Transaction<'a, Postgres>;

/// Default number of PostgreSQL connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Gets the maximum number of PostgreSQL connections from the environment.
///
/// Reads `TASKDESK_PG_MAX_CONNECTIONS`; unset, unparsable or zero values fall
/// back to [`DEFAULT_MAX_CONNECTIONS`].
pub fn get_max_connections() -> u32 {
    std::env::var("TASKDESK_PG_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}

pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(get_max_connections())
        .connect(database_url)
        .await
}

/// Name of the unique/foreign-key constraint a database error tripped, if any.
pub(crate) fn violated_constraint(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}
