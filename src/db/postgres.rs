use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::PartyEvent,
    services::party::{PartyOp, PartySession, PartyStore},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Party store backed by a `parties` table
///
/// Each update runs in its own transaction holding the party row lock
/// (`SELECT ... FOR UPDATE`), which serializes writers of the same party
/// across every server instance.
#[derive(Clone)]
pub struct PgPartyStore {
    pool: PgPool,
}

impl PgPartyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PartyStore for PgPartyStore {
    async fn insert(&self, session: &PartySession) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO parties (id, slug, status, created_by, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(session.party.id)
        .bind(&session.party.slug)
        .bind(session.party.status.as_str())
        .bind(&session.party.created_by)
        .bind(Json(session))
        .bind(session.party.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, party_id: Uuid) -> AppResult<Option<PartySession>> {
        let row: Option<(Json<PartySession>,)> =
            sqlx::query_as("SELECT state FROM parties WHERE id = $1")
                .bind(party_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(session),)| session))
    }

    async fn find_by_slug(&self, slug: &str) -> AppResult<Option<PartySession>> {
        let row: Option<(Json<PartySession>,)> =
            sqlx::query_as("SELECT state FROM parties WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(session),)| session))
    }

    async fn update(
        &self,
        party_id: Uuid,
        op: PartyOp,
    ) -> AppResult<(PartySession, Vec<PartyEvent>)> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Json<PartySession>,)> =
            sqlx::query_as("SELECT state FROM parties WHERE id = $1 FOR UPDATE")
                .bind(party_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((Json(mut session),)) = row else {
            return Err(AppError::NotFound(format!("Party {} not found", party_id)));
        };

        // Dropping `tx` on error rolls the transaction back
        let events = op(&mut session)?;

        sqlx::query(
            r#"
            UPDATE parties
            SET state = $2, status = $3, version = version + 1, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(party_id)
        .bind(Json(&session))
        .bind(session.party.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(party_id = %party_id, events = events.len(), "Party state committed");

        Ok((session, events))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
