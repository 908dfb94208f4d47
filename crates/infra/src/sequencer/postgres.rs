use sqlx::PgPool;

use forgeerp_core::TenantId;

use super::{format_number, Sequencer, SequencerError};

/// Postgres-backed `Sequencer` atop the `sequence_counters` table.
///
/// `next_number` relies on `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
/// to make the increment a single round trip: the row lock taken by the
/// upsert serializes concurrent callers for the same `(tenant_id, prefix, year)`,
/// so two simultaneous `IssueInvoice` commands for one tenant never see the
/// same sequence value.
#[derive(Debug, Clone)]
pub struct PostgresSequencer {
    pool: PgPool,
}

impl PostgresSequencer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn next_number_async(
        &self,
        tenant_id: TenantId,
        year: i32,
        prefix: &str,
    ) -> Result<String, SequencerError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO sequence_counters (tenant_id, prefix, year, sequence)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (tenant_id, prefix, year)
            DO UPDATE SET sequence = sequence_counters.sequence + 1
            RETURNING sequence
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(prefix)
        .bind(year)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SequencerError::Unavailable(e.to_string()))?;

        Ok(format_number(prefix, year, row.0 as u64))
    }
}

impl Sequencer for PostgresSequencer {
    fn next_number(&self, tenant_id: TenantId, year: i32, prefix: &str) -> Result<String, SequencerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SequencerError::Unavailable(
                "PostgresSequencer requires a tokio runtime context".to_string(),
            )
        })?;

        handle.block_on(self.next_number_async(tenant_id, year, prefix))
    }
}
