use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::schemas::{Expense, User, UserKey};
use crate::store::Repository;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    users: RwLock<Vec<User>>,
    expenses: RwLock<Vec<Expense>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(expenses: &mut [Expense]) {
    expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let taken = users.iter().any(|existing| {
            existing.email == user.email || existing.mobile_number == user.mobile_number
        });
        if taken {
            return Err(StoreError::DuplicateKey);
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn find_users_by_ids(&self, ids: &[UserKey]) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|user| ids.contains(&user.id))
            .cloned()
            .collect())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_user_by_mobile(&self, mobile_number: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|user| user.mobile_number == mobile_number)
            .cloned())
    }

    async fn find_users_by_name(&self, name: &str) -> StoreResult<Vec<User>> {
        let name = name.to_lowercase();
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|user| user.name.to_lowercase() == name)
            .cloned()
            .collect())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users = self.users.read().await.clone();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn insert_expense(&self, expense: Expense) -> StoreResult<Expense> {
        self.expenses.write().await.push(expense.clone());
        Ok(expense)
    }

    async fn find_expenses_for_user(&self, user: &UserKey) -> StoreResult<Vec<Expense>> {
        let mut found: Vec<Expense> = self
            .expenses
            .read()
            .await
            .iter()
            .filter(|expense| expense.payer == *user || expense.participants.contains(user))
            .cloned()
            .collect();
        newest_first(&mut found);
        Ok(found)
    }

    async fn list_expenses(&self, skip: u64, limit: i64) -> StoreResult<Vec<Expense>> {
        let mut all = self.expenses.read().await.clone();
        newest_first(&mut all);
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(all.into_iter().skip(skip).take(limit).collect())
    }

    async fn list_all_expenses(&self) -> StoreResult<Vec<Expense>> {
        Ok(self.expenses.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::NewUser;

    fn user(name: &str, email: &str, mobile: &str) -> User {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            mobile_number: mobile.to_string(),
        }
        .into_user()
    }

    #[tokio::test]
    async fn rejects_duplicate_email_and_mobile() {
        let repo = MemoryRepository::new();
        repo.insert_user(user("A", "a@x.com", "9000000001"))
            .await
            .unwrap();
        let err = repo
            .insert_user(user("B", "a@x.com", "9000000002"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey));
        let err = repo
            .insert_user(user("C", "c@x.com", "9000000001"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey));
        assert_eq!(repo.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn name_lookup_is_whole_and_case_insensitive() {
        let repo = MemoryRepository::new();
        repo.insert_user(user("Bob Stone", "b@x.com", "9000000001"))
            .await
            .unwrap();
        assert_eq!(repo.find_users_by_name("bob stone").await.unwrap().len(), 1);
        assert!(repo.find_users_by_name("bob").await.unwrap().is_empty());
    }
}
