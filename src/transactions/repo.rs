use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewTransaction, Transaction, TransactionFilter, TransactionPatch};
use crate::error::AppResult;

/// Persistence for transactions. Soft-deleted rows stay in storage.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, new: NewTransaction) -> AppResult<Transaction>;

    /// Internal lookup that also returns soft-deleted rows.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Transaction>>;

    /// Live rows of `owner_id`, newest first.
    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>>;

    /// Merge `patch` into a live row. `None` if the row is absent or deleted.
    async fn update(&self, id: Uuid, patch: &TransactionPatch) -> AppResult<Option<Transaction>>;

    /// Stamp `deleted_at` on a live row. `None` if the row is absent or already deleted.
    async fn soft_delete(&self, id: Uuid) -> AppResult<Option<OffsetDateTime>>;
}

#[derive(Clone)]
pub struct PgTransactionStore {
    db: PgPool,
}

impl PgTransactionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, new: NewTransaction) -> AppResult<Transaction> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (id, user_id, type, amount, title, category, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, type, amount, title, category, description,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(new.id)
        .bind(new.owner_id)
        .bind(new.kind)
        .bind(new.amount)
        .bind(&new.title)
        .bind(&new.category)
        .bind(&new.description)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, type, amount, title, category, description,
                   created_at, updated_at, deleted_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>> {
        // NULL parameters disable their predicate; LIMIT NULL means no limit
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, type, amount, title, category, description,
                   created_at, updated_at, deleted_at
            FROM transactions
            WHERE user_id = $1
              AND deleted_at IS NULL
              AND ($2::transaction_type IS NULL OR type = $2)
              AND ($3::text IS NULL OR lower(category) = lower($3))
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(owner_id)
        .bind(filter.kind)
        .bind(filter.category.as_deref())
        .bind(filter.limit)
        .bind(filter.offset.unwrap_or(0))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, patch: &TransactionPatch) -> AppResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
               SET type        = COALESCE($2, type),
                   amount      = COALESCE($3, amount),
                   title       = COALESCE($4, title),
                   category    = COALESCE($5, category),
                   description = COALESCE($6, description),
                   updated_at  = now()
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, user_id, type, amount, title, category, description,
                      created_at, updated_at, deleted_at
            "#,
        )
        .bind(id)
        .bind(patch.kind)
        .bind(patch.amount)
        .bind(&patch.title)
        .bind(&patch.category)
        .bind(&patch.description)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<Option<OffsetDateTime>> {
        let deleted_at = sqlx::query_scalar::<_, OffsetDateTime>(
            r#"
            UPDATE transactions
               SET deleted_at = now(),
                   updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
            RETURNING deleted_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(deleted_at)
    }
}
