//! In-process store backends. Used by `AppState::fake()` so the service and
//! HTTP layers can be exercised without a database.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::anyhow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        repo::CredentialStore,
        repo_types::{NewUser, User},
    },
    error::{AppError, AppResult},
    transactions::{
        repo::TransactionStore,
        repo_types::{NewTransaction, Transaction, TransactionFilter, TransactionPatch},
    },
};

fn lock<T>(m: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| AppError::Internal(anyhow!("memory store lock poisoned")))
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    /// Mark the active holder of `username` inactive. Returns whether one existed.
    pub fn deactivate(&self, username: &str) -> bool {
        let Ok(mut users) = self.users.lock() else {
            return false;
        };
        match users
            .values_mut()
            .find(|u| u.is_active && u.username == username)
        {
            Some(user) => {
                user.is_active = false;
                user.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_active_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let users = lock(&self.users)?;
        Ok(users
            .values()
            .find(|u| u.is_active && u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        let mut users = lock(&self.users)?;
        if users
            .values()
            .any(|u| u.is_active && u.username == new.username)
        {
            return Err(AppError::Conflict("Record already exists".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: new.id,
            name: new.name,
            username: new.username,
            password_hash: new.password_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    // insertion order breaks created_at ties, matching "newest first"
    rows: Mutex<Vec<Transaction>>,
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, new: NewTransaction) -> AppResult<Transaction> {
        let now = OffsetDateTime::now_utc();
        let row = Transaction {
            id: new.id,
            owner_id: new.owner_id,
            kind: new.kind,
            amount: new.amount,
            title: new.title,
            category: new.category,
            description: new.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        lock(&self.rows)?.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        Ok(lock(&self.rows)?.iter().find(|t| t.id == id).cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<Transaction>> {
        let rows = lock(&self.rows)?;
        let mut out: Vec<Transaction> = rows
            .iter()
            .rev()
            .filter(|t| t.owner_id == owner_id && !t.is_deleted() && filter.matches(t))
            .cloned()
            .collect();
        // stable: equal timestamps keep reverse insertion order
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    async fn update(&self, id: Uuid, patch: &TransactionPatch) -> AppResult<Option<Transaction>> {
        let mut rows = lock(&self.rows)?;
        let Some(row) = rows.iter_mut().find(|t| t.id == id && !t.is_deleted()) else {
            return Ok(None);
        };
        patch.apply(row);
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<Option<OffsetDateTime>> {
        let mut rows = lock(&self.rows)?;
        let Some(row) = rows.iter_mut().find(|t| t.id == id && !t.is_deleted()) else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(Some(now))
    }
}
