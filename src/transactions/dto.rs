use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{TransactionFilter, TransactionType};

/// Request body for creating a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub category: String,
    #[serde(rename = "desc")]
    pub description: Option<String>,
}

/// Request body for PATCH; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTransactionRequest {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
}

/// Query string of `GET /transaction`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<ListQuery> for TransactionFilter {
    fn from(q: ListQuery) -> Self {
        Self {
            kind: q.kind,
            category: q.category.filter(|c| !c.trim().is_empty()),
            limit: q.limit,
            offset: q.offset,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: Uuid,
}

/// Dashboard aggregates over the caller's live transactions.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub balance: Decimal,
    pub count: usize,
    pub categories: Vec<CategoryTotal>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub count: usize,
}
