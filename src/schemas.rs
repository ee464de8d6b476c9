use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use bson::{oid::ObjectId, DateTime};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{SplitError, ValidationError};
use crate::identity::is_email;

pub type UserKey = ObjectId;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserKey,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub created_at: DateTime,
}

/// Registration payload for `POST /users`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub mobile_number: String,
}

impl NewUser {
    /// Trims every field and lowercases the email, then checks the result.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let user = NewUser {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            mobile_number: self.mobile_number.trim().to_string(),
        };
        if user.name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if user.email.is_empty() {
            return Err(ValidationError::MissingField("email"));
        }
        if !is_email(&user.email) {
            return Err(ValidationError::InvalidEmail(user.email));
        }
        if user.mobile_number.is_empty() {
            return Err(ValidationError::MissingField("mobile_number"));
        }
        Ok(user)
    }

    pub fn into_user(self) -> User {
        User {
            id: ObjectId::new(),
            name: self.name,
            email: self.email,
            mobile_number: self.mobile_number,
            created_at: DateTime::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SplitPolicy {
    Equal,
    Exact,
    Percentage,
}

impl FromStr for SplitPolicy {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Equal" => Ok(SplitPolicy::Equal),
            "Exact" => Ok(SplitPolicy::Exact),
            "Percentage" => Ok(SplitPolicy::Percentage),
            other => Err(SplitError::InvalidPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitPolicy::Equal => "Equal",
            SplitPolicy::Exact => "Exact",
            SplitPolicy::Percentage => "Percentage",
        };
        f.write_str(name)
    }
}

/// A raw value from `split_details`. Clients may send any JSON value, only
/// the numeric variants are usable as an amount or a percentage.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SplitValue {
    Int64(i64),
    Float64(f64),
    Int32(i32),
    Float32(f32),
    Other(serde_json::Value),
}

impl SplitValue {
    pub fn to_f64(&self) -> Option<f64> {
        match *self {
            SplitValue::Int64(v) => Some(v as f64),
            SplitValue::Float64(v) => Some(v),
            SplitValue::Int32(v) => Some(f64::from(v)),
            SplitValue::Float32(v) => Some(f64::from(v)),
            SplitValue::Other(_) => None,
        }
    }
}

/// Payload for `POST /expenses`. Identifiers are free-form: email, mobile
/// number or name.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseInput {
    pub description: String,
    pub amount: f64,
    pub created_by: String,
    pub split_type: String,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_details: Option<BTreeMap<String, SplitValue>>,
}

impl ExpenseInput {
    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        self.description = self.description.trim().to_string();
        self.created_by = self.created_by.trim().to_string();
        self.split_type = self.split_type.trim().to_string();
        if self.description.is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        if self.created_by.is_empty() {
            return Err(ValidationError::MissingField("created_by"));
        }
        if self.split_type.is_empty() {
            return Err(ValidationError::MissingField("split_type"));
        }
        if self.participants.iter().all(|p| p.trim().is_empty()) {
            return Err(ValidationError::NoParticipants);
        }
        Ok(self)
    }
}

/// Owed amount of a single participant, frozen at creation time.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Split {
    pub user_id: UserKey,
    pub amount: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub description: String,
    pub amount: f64,
    pub payer: UserKey,
    pub split_type: SplitPolicy,
    pub participants: Vec<UserKey>,
    pub splits: Vec<Split>,
    pub created_at: DateTime,
}

impl Expense {
    pub fn owed_by(&self, user: &UserKey) -> Option<f64> {
        self.splits
            .iter()
            .find(|split| split.user_id == *user)
            .map(|split| split.amount)
    }

    /// Every user the expense refers to, payer first.
    pub fn involved_users(&self) -> impl Iterator<Item = &UserKey> {
        std::iter::once(&self.payer)
            .chain(self.participants.iter())
            .chain(self.splits.iter().map(|split| &split.user_id))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id.to_hex(),
            name: user.name.clone(),
            email: user.email.clone(),
            mobile_number: user.mobile_number.clone(),
            created_at: user.created_at.to_chrono(),
        }
    }
}

/// JSON rendering of an [`Expense`]. `split_details` is keyed by the current
/// email of each participant, looked up when the view is built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseView {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub created_by: String,
    pub split_type: SplitPolicy,
    pub participants: Vec<String>,
    pub split_details: BTreeMap<String, f64>,
    pub created_at: chrono::DateTime<Utc>,
}

impl ExpenseView {
    pub fn render(expense: &Expense, directory: &HashMap<UserKey, User>) -> Self {
        let label = |key: &UserKey| {
            directory
                .get(key)
                .map(|user| user.email.clone())
                .unwrap_or_else(|| key.to_hex())
        };
        ExpenseView {
            id: expense.id.to_hex(),
            description: expense.description.clone(),
            amount: expense.amount,
            created_by: expense.payer.to_hex(),
            split_type: expense.split_type,
            participants: expense.participants.iter().map(|id| id.to_hex()).collect(),
            split_details: expense
                .splits
                .iter()
                .map(|split| (label(&split.user_id), split.amount))
                .collect(),
            created_at: expense.created_at.to_chrono(),
        }
    }
}
