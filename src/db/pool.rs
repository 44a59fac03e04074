/*!
 * Database Connection Pool
 *
 * Creates and manages PostgreSQL connection pools using SQLx.
 */

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;

/// Create a PostgreSQL connection pool with the provided configuration
///
/// # Arguments
///
/// * `config` - Database configuration containing connection parameters
///
/// # Returns
///
/// A configured `PgPool` instance
///
/// # Errors
///
/// Returns an error if the connection to the database fails or if the
/// connection parameters are invalid.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, SqlxError> {
    tracing::info!("Creating database connection pool...");
    tracing::debug!("Max connections: {}", config.max_connections);
    tracing::debug!("Min connections: {}", config.min_connections);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .connect(&config.url)
        .await?;

    tracing::info!("Database connection pool established");

    Ok(pool)
}
