use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CategoryTotal, CreateTransactionRequest, DeleteResponse, Summary, UpdateTransactionRequest},
    repo::TransactionStore,
    repo_types::{NewTransaction, Transaction, TransactionFilter, TransactionPatch, TransactionType},
};
use crate::error::{AppError, AppResult};

const MAX_TITLE_LEN: usize = 255;
const MAX_CATEGORY_LEN: usize = 100;
const MAX_DESC_LEN: usize = 1000;
const MAX_PAGE_SIZE: i64 = 500;

// NUMERIC(10, 2)
fn max_amount() -> Decimal {
    Decimal::from(100_000_000i64)
}

fn validate_amount(amount: Decimal) -> AppResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be a positive number".into()));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::Validation(
            "amount must have at most two decimal places".into(),
        ));
    }
    if amount >= max_amount() {
        return Err(AppError::Validation(format!(
            "amount must be less than {}",
            max_amount()
        )));
    }
    let mut amount = amount;
    amount.rescale(2);
    Ok(amount)
}

fn required_text(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn bounded_text(field: &str, value: String, max: usize) -> AppResult<String> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

fn validate_patch(req: UpdateTransactionRequest) -> AppResult<TransactionPatch> {
    Ok(TransactionPatch {
        kind: req.kind,
        amount: req.amount.map(validate_amount).transpose()?,
        title: req
            .title
            .map(|t| required_text("title", &t, MAX_TITLE_LEN))
            .transpose()?,
        category: req
            .category
            .map(|c| required_text("category", &c, MAX_CATEGORY_LEN))
            .transpose()?,
        description: req
            .description
            .map(|d| bounded_text("desc", d, MAX_DESC_LEN))
            .transpose()?,
    })
}

fn validate_filter(filter: &TransactionFilter) -> AppResult<()> {
    if let Some(limit) = filter.limit {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
    }
    if filter.offset.is_some_and(|o| o < 0) {
        return Err(AppError::Validation("offset must not be negative".into()));
    }
    Ok(())
}

/// Existence first, then ownership: soft-deleted rows count as absent.
async fn owned(store: &dyn TransactionStore, id: Uuid, caller_id: Uuid) -> AppResult<Transaction> {
    match store.find_by_id(id).await? {
        Some(t) if !t.is_deleted() => {
            if t.owner_id != caller_id {
                warn!(transaction_id = %id, %caller_id, owner_id = %t.owner_id, "ownership check failed");
                return Err(AppError::Forbidden);
            }
            Ok(t)
        }
        _ => Err(AppError::NotFound),
    }
}

pub async fn create(
    store: &dyn TransactionStore,
    owner_id: Uuid,
    req: CreateTransactionRequest,
) -> AppResult<Transaction> {
    let new = NewTransaction {
        id: Uuid::new_v4(),
        owner_id,
        kind: req.kind,
        amount: validate_amount(req.amount)?,
        title: required_text("title", &req.title, MAX_TITLE_LEN)?,
        category: required_text("category", &req.category, MAX_CATEGORY_LEN)?,
        description: req
            .description
            .map(|d| bounded_text("desc", d, MAX_DESC_LEN))
            .transpose()?,
    };

    let created = store.insert(new).await?;
    info!(transaction_id = %created.id, %owner_id, kind = ?created.kind, "transaction created");
    Ok(created)
}

pub async fn list_for_owner(
    store: &dyn TransactionStore,
    owner_id: Uuid,
    filter: TransactionFilter,
) -> AppResult<Vec<Transaction>> {
    validate_filter(&filter)?;
    store.list_by_owner(owner_id, &filter).await
}

pub async fn get_for_owner(
    store: &dyn TransactionStore,
    id: Uuid,
    caller_id: Uuid,
) -> AppResult<Transaction> {
    owned(store, id, caller_id).await
}

pub async fn update(
    store: &dyn TransactionStore,
    id: Uuid,
    req: UpdateTransactionRequest,
    caller_id: Uuid,
) -> AppResult<Transaction> {
    let patch = validate_patch(req)?;
    owned(store, id, caller_id).await?;

    // deleted between the check and the write
    let updated = store.update(id, &patch).await?.ok_or(AppError::NotFound)?;
    info!(transaction_id = %id, %caller_id, "transaction updated");
    Ok(updated)
}

pub async fn remove(
    store: &dyn TransactionStore,
    id: Uuid,
    caller_id: Uuid,
) -> AppResult<DeleteResponse> {
    owned(store, id, caller_id).await?;

    let deleted_at = store.soft_delete(id).await?.ok_or(AppError::NotFound)?;
    info!(transaction_id = %id, %caller_id, %deleted_at, "transaction soft-deleted");
    Ok(DeleteResponse {
        message: "Transaction deleted successfully".into(),
        id,
    })
}

pub async fn summary(store: &dyn TransactionStore, owner_id: Uuid) -> AppResult<Summary> {
    let rows = store
        .list_by_owner(owner_id, &TransactionFilter::default())
        .await?;
    Ok(summarize(&rows))
}

pub fn summarize(rows: &[Transaction]) -> Summary {
    let mut total_income = Decimal::ZERO;
    let mut total_expense = Decimal::ZERO;
    // grouped case-insensitively like the category filter; the newest
    // spelling seen labels the group
    let mut by_category: BTreeMap<String, CategoryTotal> = BTreeMap::new();

    for t in rows {
        let entry = by_category
            .entry(t.category.to_lowercase())
            .or_insert_with(|| CategoryTotal {
                category: t.category.clone(),
                income: Decimal::ZERO,
                expense: Decimal::ZERO,
                count: 0,
            });
        entry.count += 1;
        match t.kind {
            TransactionType::Income => {
                total_income += t.amount;
                entry.income += t.amount;
            }
            TransactionType::Expense => {
                total_expense += t.amount;
                entry.expense += t.amount;
            }
        }
    }

    Summary {
        total_income,
        total_expense,
        balance: total_income - total_expense,
        count: rows.len(),
        categories: by_category.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransactionStore;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn expense(amount: &str, category: &str) -> CreateTransactionRequest {
        CreateTransactionRequest {
            title: "purchase".into(),
            kind: TransactionType::Expense,
            amount: dec(amount),
            category: category.into(),
            description: None,
        }
    }

    fn income(amount: &str, category: &str) -> CreateTransactionRequest {
        CreateTransactionRequest {
            kind: TransactionType::Income,
            ..expense(amount, category)
        }
    }

    #[tokio::test]
    async fn create_then_list_round_trips_fields() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();

        let created = create(
            &store,
            owner,
            CreateTransactionRequest {
                title: "lunch".into(),
                ..expense("12.50", "food")
            },
        )
        .await
        .expect("create");

        let listed = list_for_owner(&store, owner, TransactionFilter::default())
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        let t = &listed[0];
        assert_eq!(t.id, created.id);
        assert_eq!(t.owner_id, owner);
        assert_eq!(t.kind, TransactionType::Expense);
        assert_eq!(t.amount, dec("12.50"));
        assert_eq!(t.category, "food");
        assert_eq!(t.title, "lunch");
        assert_eq!(t.created_at, created.created_at);
        assert!(t.deleted_at.is_none());
    }

    #[tokio::test]
    async fn create_rejects_bad_amounts() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        for amount in ["0", "-5.00", "1.234", "100000000"] {
            let err = create(&store, owner, expense(amount, "food"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{amount}: {err:?}");
        }
        // trailing zeros beyond two places are still two places of precision
        let trimmed = create(&store, owner, expense("3.1000", "food"))
            .await
            .expect("3.1000 is 3.10");
        assert_eq!(trimmed.amount.to_string(), "3.10");
    }

    #[tokio::test]
    async fn create_stores_amounts_with_two_decimal_places() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        for (input, stored) in [("12.5", "12.50"), ("7", "7.00"), ("0.10", "0.10")] {
            let created = create(&store, owner, expense(input, "food")).await.unwrap();
            assert_eq!(created.amount.to_string(), stored);
            assert_eq!(created.amount.scale(), 2);
        }

        let created = create(&store, owner, expense("1.00", "food")).await.unwrap();
        let patched = update(
            &store,
            created.id,
            UpdateTransactionRequest {
                amount: Some(dec("4.5")),
                ..Default::default()
            },
            owner,
        )
        .await
        .unwrap();
        assert_eq!(patched.amount.to_string(), "4.50");
    }

    #[tokio::test]
    async fn create_rejects_bad_text_fields() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();

        let cases = [
            expense("1.00", "   "),
            expense("1.00", &"c".repeat(MAX_CATEGORY_LEN + 1)),
            CreateTransactionRequest {
                title: "".into(),
                ..expense("1.00", "food")
            },
            CreateTransactionRequest {
                title: "t".repeat(MAX_TITLE_LEN + 1),
                ..expense("1.00", "food")
            },
            CreateTransactionRequest {
                description: Some("d".repeat(MAX_DESC_LEN + 1)),
                ..expense("1.00", "food")
            },
        ];
        for req in cases {
            let err = create(&store, owner, req).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{err:?}");
        }
        assert!(list_for_owner(&store, owner, TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let store = MemoryTransactionStore::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let a1 = create(&store, alice, expense("1.00", "food")).await.unwrap();
        let a2 = create(&store, alice, income("2.00", "salary")).await.unwrap();
        let b1 = create(&store, bob, expense("3.00", "rent")).await.unwrap();

        let alice_ids: Vec<Uuid> = list_for_owner(&store, alice, TransactionFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(alice_ids, vec![a2.id, a1.id]);

        let bob_rows = list_for_owner(&store, bob, TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(bob_rows.len(), 1);
        assert_eq!(bob_rows[0].id, b1.id);
    }

    #[tokio::test]
    async fn list_filters_by_type_and_category() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        create(&store, owner, expense("1.00", "Food")).await.unwrap();
        create(&store, owner, expense("2.00", "rent")).await.unwrap();
        create(&store, owner, income("3.00", "food")).await.unwrap();

        let food = list_for_owner(
            &store,
            owner,
            TransactionFilter {
                category: Some("FOOD".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(food.len(), 2);

        let food_expenses = list_for_owner(
            &store,
            owner,
            TransactionFilter {
                kind: Some(TransactionType::Expense),
                category: Some("food".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(food_expenses.len(), 1);
        assert_eq!(food_expenses[0].amount, dec("1.00"));

        let err = list_for_owner(
            &store,
            owner,
            TransactionFilter {
                limit: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn update_merges_only_present_fields() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        let created = create(
            &store,
            owner,
            CreateTransactionRequest {
                title: "lunch".into(),
                description: Some("with team".into()),
                ..expense("12.50", "food")
            },
        )
        .await
        .unwrap();

        let updated = update(
            &store,
            created.id,
            UpdateTransactionRequest {
                amount: Some(dec("15.00")),
                category: Some("  dining ".into()),
                ..Default::default()
            },
            owner,
        )
        .await
        .expect("update");

        assert_eq!(updated.amount, dec("15.00"));
        assert_eq!(updated.category, "dining");
        assert_eq!(updated.title, "lunch");
        assert_eq!(updated.description.as_deref(), Some("with team"));
        assert_eq!(updated.kind, TransactionType::Expense);
        assert_eq!(updated.owner_id, owner);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_and_remove_by_non_owner_are_forbidden_and_change_nothing() {
        let store = MemoryTransactionStore::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let created = create(&store, alice, income("100.00", "salary"))
            .await
            .unwrap();

        let err = update(
            &store,
            created.id,
            UpdateTransactionRequest {
                amount: Some(dec("1.00")),
                ..Default::default()
            },
            bob,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let err = remove(&store, created.id, bob).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let err = get_for_owner(&store, created.id, bob).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let stored = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = MemoryTransactionStore::default();
        let caller = Uuid::new_v4();
        let id = Uuid::new_v4();

        assert!(matches!(
            get_for_owner(&store, id, caller).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            update(&store, id, UpdateTransactionRequest::default(), caller)
                .await
                .unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            remove(&store, id, caller).await.unwrap_err(),
            AppError::NotFound
        ));
    }

    #[tokio::test]
    async fn remove_is_a_soft_delete() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        let created = create(&store, owner, expense("9.99", "books"))
            .await
            .unwrap();

        let resp = remove(&store, created.id, owner).await.expect("remove");
        assert_eq!(resp.id, created.id);
        assert_eq!(resp.message, "Transaction deleted successfully");

        assert!(list_for_owner(&store, owner, TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());

        let stored = store
            .find_by_id(created.id)
            .await
            .unwrap()
            .expect("row still stored");
        assert!(stored.deleted_at.is_some());

        // soft-deleted rows behave as absent, even for their owner
        assert!(matches!(
            get_for_owner(&store, created.id, owner).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            remove(&store, created.id, owner).await.unwrap_err(),
            AppError::NotFound
        ));
        assert!(matches!(
            remove(&store, created.id, Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound
        ));
    }

    #[tokio::test]
    async fn summary_totals_live_rows_of_owner() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        create(&store, owner, income("100.00", "salary")).await.unwrap();
        create(&store, owner, expense("12.50", "food")).await.unwrap();
        create(&store, owner, expense("7.25", "food")).await.unwrap();
        let gone = create(&store, owner, expense("50.00", "rent")).await.unwrap();
        remove(&store, gone.id, owner).await.unwrap();
        create(&store, Uuid::new_v4(), expense("999.00", "food"))
            .await
            .unwrap();

        let s = summary(&store, owner).await.expect("summary");
        assert_eq!(s.total_income, dec("100.00"));
        assert_eq!(s.total_expense, dec("19.75"));
        assert_eq!(s.balance, dec("80.25"));
        assert_eq!(s.count, 3);
        assert_eq!(
            s.categories,
            vec![
                CategoryTotal {
                    category: "food".into(),
                    income: Decimal::ZERO,
                    expense: dec("19.75"),
                    count: 2,
                },
                CategoryTotal {
                    category: "salary".into(),
                    income: dec("100.00"),
                    expense: Decimal::ZERO,
                    count: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn summary_groups_categories_ignoring_case() {
        let store = MemoryTransactionStore::default();
        let owner = Uuid::new_v4();
        create(&store, owner, expense("10.00", "food")).await.unwrap();
        create(&store, owner, expense("5.00", "Food")).await.unwrap();
        create(&store, owner, income("2.00", "FOOD")).await.unwrap();

        let s = summary(&store, owner).await.expect("summary");
        assert_eq!(s.categories.len(), 1);
        let food = &s.categories[0];
        assert_eq!(food.category, "FOOD");
        assert_eq!(food.expense, dec("15.00"));
        assert_eq!(food.income, dec("2.00"));
        assert_eq!(food.count, 3);

        let filtered = list_for_owner(
            &store,
            owner,
            TransactionFilter {
                category: Some("food".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(filtered.len(), food.count);
    }

    #[test]
    fn summarize_empty_is_zero() {
        let s = summarize(&[]);
        assert_eq!(s.balance, Decimal::ZERO);
        assert_eq!(s.count, 0);
        assert!(s.categories.is_empty());
    }
}
