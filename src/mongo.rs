use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document, Regex},
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client, Collection, IndexModel,
};

use crate::error::{StoreError, StoreResult};
use crate::schemas::{Expense, User, UserKey};
use crate::store::{Repository, Timeouts};

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoRepository {
    users: Collection<User>,
    expenses: Collection<Expense>,
    timeouts: Timeouts,
}

impl MongoRepository {
    pub async fn connect(uri: &str, database: &str, timeouts: Timeouts) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        bounded("ping", timeouts.write, db.run_command(doc! { "ping": 1 }, None)).await?;
        tracing::info!("Connected to MongoDB database {database}");

        let repo = MongoRepository {
            users: db.collection("users"),
            expenses: db.collection("expenses"),
            timeouts,
        };
        repo.create_indexes().await;
        Ok(repo)
    }

    async fn create_indexes(&self) {
        for field in ["email", "mobile_number"] {
            let index = IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            let created = bounded(
                "create index",
                self.timeouts.write,
                self.users.create_index(index, None),
            )
            .await;
            if let Err(err) = created {
                tracing::warn!("Failed to create index on {field}: {err}");
            }
        }
    }

    async fn find_users(
        &self,
        filter: Document,
        options: Option<FindOptions>,
        budget: Duration,
    ) -> StoreResult<Vec<User>> {
        bounded("find users", budget, async {
            let cursor = self.users.find(filter, options).await?;
            cursor.try_collect::<Vec<User>>().await
        })
        .await
    }

    async fn find_expenses(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> StoreResult<Vec<Expense>> {
        bounded("find expenses", self.timeouts.scan, async {
            let cursor = self.expenses.find(filter, options).await?;
            cursor.try_collect::<Vec<Expense>>().await
        })
        .await
    }
}

async fn bounded<T, F>(op: &'static str, budget: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, mongodb::error::Error>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(classify),
        Err(_) => Err(StoreError::Timeout(op)),
    }
}

fn classify(err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY =>
        {
            StoreError::DuplicateKey
        }
        ErrorKind::BsonDeserialization(decode_error) => {
            StoreError::Corrupt(decode_error.to_string())
        }
        _ => StoreError::Backend(err),
    }
}

#[async_trait]
impl Repository for MongoRepository {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        bounded(
            "insert user",
            self.timeouts.write,
            self.users.insert_one(&user, None),
        )
        .await?;
        Ok(user)
    }

    async fn find_users_by_ids(&self, ids: &[UserKey]) -> StoreResult<Vec<User>> {
        self.find_users(
            doc! { "_id": { "$in": ids.to_vec() } },
            None,
            self.timeouts.lookup,
        )
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        bounded(
            "find user by email",
            self.timeouts.lookup,
            self.users.find_one(doc! { "email": email }, None),
        )
        .await
    }

    async fn find_user_by_mobile(&self, mobile_number: &str) -> StoreResult<Option<User>> {
        bounded(
            "find user by mobile number",
            self.timeouts.lookup,
            self.users.find_one(doc! { "mobile_number": mobile_number }, None),
        )
        .await
    }

    async fn find_users_by_name(&self, name: &str) -> StoreResult<Vec<User>> {
        let pattern = Regex {
            pattern: format!("^{}$", regex::escape(name)),
            options: "i".to_string(),
        };
        self.find_users(doc! { "name": pattern }, None, self.timeouts.lookup).await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1, "_id": 1 })
            .build();
        self.find_users(doc! {}, Some(options), self.timeouts.scan).await
    }

    async fn insert_expense(&self, expense: Expense) -> StoreResult<Expense> {
        bounded(
            "insert expense",
            self.timeouts.write,
            self.expenses.insert_one(&expense, None),
        )
        .await?;
        Ok(expense)
    }

    async fn find_expenses_for_user(&self, user: &UserKey) -> StoreResult<Vec<Expense>> {
        let filter = doc! {
            "$or": [
                { "payer": *user },
                { "participants": *user },
            ]
        };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        self.find_expenses(filter, Some(options)).await
    }

    async fn list_expenses(&self, skip: u64, limit: i64) -> StoreResult<Vec<Expense>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(limit)
            .build();
        self.find_expenses(doc! {}, Some(options)).await
    }

    async fn list_all_expenses(&self) -> StoreResult<Vec<Expense>> {
        self.find_expenses(doc! {}, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_gives_up_after_budget() {
        let result: StoreResult<()> = bounded(
            "stalled read",
            Duration::from_millis(1),
            std::future::pending::<Result<(), mongodb::error::Error>>(),
        )
        .await;
        assert!(matches!(result, Err(StoreError::Timeout("stalled read"))));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let result = bounded("ready", Duration::from_secs(1), async {
            Ok::<_, mongodb::error::Error>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
