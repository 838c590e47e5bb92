pub mod entity;
pub mod jobs;
pub mod sync;
pub mod tenant;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use storemesh_common::error::{MeshError, MeshResult};

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> MeshResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| MeshError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_fails_with_invalid_url() {
        let result = create_pool("postgres://invalid:5432/nonexistent").await;
        assert!(result.is_err());
    }
}
