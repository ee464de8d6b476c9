use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ApiError, IdentityError};
use crate::schemas::User;
use crate::store::Repository;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("email pattern is valid")
});
// Indian 10-digit mobile numbers.
static MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[6-9][0-9]{9}$").expect("mobile pattern is valid"));

pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    Email(String),
    Mobile(String),
    Name(String),
}

impl Identifier {
    /// Emails are compared lowercase, so an identifier that only looks like an
    /// email after lowercasing is still treated as one.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        if is_email(&lowered) {
            Identifier::Email(lowered)
        } else if MOBILE.is_match(trimmed) {
            Identifier::Mobile(trimmed.to_string())
        } else {
            Identifier::Name(trimmed.to_string())
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Email(_) => f.write_str("the given email"),
            Identifier::Mobile(_) => f.write_str("the given mobile number"),
            Identifier::Name(name) => write!(f, "the identifier '{name}'"),
        }
    }
}

/// Looks up the single user `raw` refers to. Read-only.
///
/// Store failures surface as [`ApiError::Store`], unmatched or ambiguous
/// identifiers as [`ApiError::Identity`].
pub async fn resolve_user(repo: &dyn Repository, raw: &str) -> Result<User, ApiError> {
    let identifier = Identifier::classify(raw);
    let found = match &identifier {
        Identifier::Email(email) => repo.find_user_by_email(email).await?,
        Identifier::Mobile(mobile) => repo.find_user_by_mobile(mobile).await?,
        Identifier::Name(name) => {
            let mut users = repo.find_users_by_name(name).await?;
            if users.len() > 1 {
                return Err(IdentityError::Ambiguous(name.clone()).into());
            }
            users.pop()
        }
    };
    found.ok_or_else(|| IdentityError::NotFound(identifier).into())
}
