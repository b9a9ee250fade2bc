use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Direction of a transaction; amounts themselves are always positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
}

/// Transaction record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    #[sqlx(rename = "user_id")]
    pub owner_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub title: String,
    pub category: String,
    #[serde(rename = "desc")]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Transaction {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A validated transaction ready to insert.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub title: String,
    pub category: String,
    pub description: Option<String>,
}

/// Validated partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub kind: Option<TransactionType>,
    pub amount: Option<Decimal>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl TransactionPatch {
    pub fn apply(&self, t: &mut Transaction) {
        if let Some(kind) = self.kind {
            t.kind = kind;
        }
        if let Some(amount) = self.amount {
            t.amount = amount;
        }
        if let Some(title) = &self.title {
            t.title = title.clone();
        }
        if let Some(category) = &self.category {
            t.category = category.clone();
        }
        if let Some(description) = &self.description {
            t.description = Some(description.clone());
        }
    }
}

/// Optional narrowing for owner listings. The default returns everything.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionType>,
    /// Matched case-insensitively.
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, t: &Transaction) -> bool {
        let kind_ok = self.kind.map_or(true, |k| k == t.kind);
        let category_ok = self
            .category
            .as_deref()
            .map_or(true, |c| c.to_lowercase() == t.category.to_lowercase());
        kind_ok && category_ok
    }
}
