use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info};

use super::store::{DocumentId, DocumentPermission, DocumentStore, StoreError, UserId};

/// Postgres backed document store
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    /// * `max_connections` - Upper bound for the pool size
    ///
    /// # Returns
    /// * `Result<Self, SqlxError>` - Database connection pool or error
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(2) // Keep some connections alive
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn log_pool_state(&self, operation: &str, document_id: DocumentId) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "{} for document {}. Pool connections: {} idle, {} in use",
            operation,
            document_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    /// Look up whether a user owns or was shared a document
    ///
    /// # Arguments
    /// * `document_id` - The ID of the document to check
    /// * `user_id` - The user asking for access
    ///
    /// # Returns
    /// * `Ok(None)` if the document does not exist
    async fn permission(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> Result<Option<DocumentPermission>, StoreError> {
        self.log_pool_state("Checking permission", document_id);

        let query_sql = r#"
            SELECT
                d.owner_id = $2 AS is_owner,
                EXISTS (
                    SELECT 1 FROM document_shared_users s
                    WHERE s.document_id = d.id AND s.user_id = $2
                ) AS is_shared
            FROM documents d
            WHERE d.id = $1
        "#;

        let row = sqlx::query(query_sql)
            .bind(document_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to check permission on document {}: {}", document_id, e);
                e
            })?;

        match row {
            Some(row) => Ok(Some(DocumentPermission {
                owner: row.try_get("is_owner")?,
                shared: row.try_get("is_shared")?,
            })),
            None => Ok(None),
        }
    }

    async fn read_content(&self, document_id: DocumentId) -> Result<Option<String>, StoreError> {
        self.log_pool_state("Reading content", document_id);

        let row = sqlx::query("SELECT content FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("content")?)),
            None => Ok(None),
        }
    }

    /// Replace the content of a document
    ///
    /// A single UPDATE statement, so a failed write leaves the stored content untouched.
    ///
    /// # Returns
    /// * `Ok(false)` if no row matched, i.e. the document was deleted
    async fn write_content(&self, document_id: DocumentId, content: &str) -> Result<bool, StoreError> {
        self.log_pool_state("Writing content", document_id);

        let result = sqlx::query(
            "UPDATE documents SET content = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(document_id)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to write content of document {}: {}", document_id, e);
            e
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
