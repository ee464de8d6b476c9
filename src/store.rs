use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::schemas::{Expense, User, UserKey};

/// Per-operation time budgets. A store call exceeding its budget fails with
/// [`crate::error::StoreError::Timeout`]; nothing is retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeouts {
    pub lookup: Duration,
    pub write: Duration,
    pub scan: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            lookup: Duration::from_secs(5),
            write: Duration::from_secs(10),
            scan: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Fails with `DuplicateKey` if the email or mobile number is taken.
    async fn insert_user(&self, user: User) -> StoreResult<User>;

    async fn find_users_by_ids(&self, ids: &[UserKey]) -> StoreResult<Vec<User>>;

    /// `email` is expected lowercase already.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_mobile(&self, mobile_number: &str) -> StoreResult<Option<User>>;

    /// Case-insensitive, whole-name match.
    async fn find_users_by_name(&self, name: &str) -> StoreResult<Vec<User>>;

    /// All users, oldest first.
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn insert_expense(&self, expense: Expense) -> StoreResult<Expense>;

    /// Expenses the user paid for or takes part in.
    async fn find_expenses_for_user(&self, user: &UserKey) -> StoreResult<Vec<Expense>>;

    /// A page of expenses, newest first.
    async fn list_expenses(&self, skip: u64, limit: i64) -> StoreResult<Vec<Expense>>;

    async fn list_all_expenses(&self) -> StoreResult<Vec<Expense>>;
}

/// Loads every user referenced by `expenses`, keyed by id.
pub async fn user_directory(
    repo: &dyn Repository,
    expenses: &[Expense],
) -> StoreResult<HashMap<UserKey, User>> {
    let mut ids: Vec<UserKey> = expenses
        .iter()
        .flat_map(|expense| expense.involved_users().copied())
        .collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = repo.find_users_by_ids(&ids).await?;
    Ok(users.into_iter().map(|user| (user.id, user)).collect())
}
